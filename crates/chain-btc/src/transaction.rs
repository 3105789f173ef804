use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::key::TapTweak;
use bitcoin::script::{PushBytesBuf, ScriptBuf};
use bitcoin::secp256k1::{Keypair, Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::transaction::Version;
use bitcoin::{Amount, CompressedPublicKey, OutPoint, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use crate::address::{self, ScriptKind};
use crate::error::BtcError;
use crate::fee::TransactionDraft;
use crate::DUST_LIMIT_SAT;

/// Largest tolerated gap, in satoshis, between the declared fee and the fee
/// recomputed from the final input/output sums. Anything beyond rounding is
/// an internal-consistency failure and the build is aborted.
const FEE_TOLERANCE_SAT: u64 = 1;

/// Previous-output record for one input, resolved once at lookup time.
///
/// SegWit and Taproot inputs commit to the locking script and value;
/// legacy inputs need the full previous transaction bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrevOut {
    Witness { script: Vec<u8>, value_sat: u64 },
    Legacy { raw_tx: Vec<u8> },
}

/// Whether a build is an ordinary outgoing payment or an RBF replacement.
/// Only replacements may reuse inputs whose origin is still unconfirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    Primary,
    Replacement,
}

/// Broadcast-ready artifact. Ownership transfers to the caller; the engine
/// never broadcasts on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hex: String,
    pub txid: String,
    pub fee_sat: u64,
}

/// Assemble and sign the transaction described by `draft`.
///
/// Re-verifies the planner's work (inputs confirmed for primary sends,
/// inputs cover amount + fee, change either zero or above the dust limit)
/// and aborts on the first inconsistency; a partial or half-signed
/// transaction is never returned. Every input gets the RBF-enabling
/// sequence so the result stays fee-bumpable.
pub fn sign_draft(
    draft: &TransactionDraft,
    prevouts: &[PrevOut],
    private_key: &[u8; 32],
    sender_address: &str,
    send_kind: SendKind,
) -> Result<SignedTransaction, BtcError> {
    if draft.inputs.is_empty() {
        return Err(BtcError::TransactionBuild("no inputs selected".into()));
    }
    if prevouts.len() != draft.inputs.len() {
        return Err(BtcError::TransactionBuild(format!(
            "have {} previous-output records for {} inputs",
            prevouts.len(),
            draft.inputs.len()
        )));
    }

    if send_kind == SendKind::Primary {
        if let Some(pending) = draft.inputs.iter().find(|u| !u.confirmed) {
            return Err(BtcError::UnconfirmedInput {
                txid: pending.txid.clone(),
                vout: pending.vout,
            });
        }
    }

    let total_input_sat = draft.total_input_sat();
    if total_input_sat < draft.amount_sat + draft.fee_sat {
        return Err(BtcError::TransactionBuild(format!(
            "inputs hold {total_input_sat} sat but amount + fee needs {} sat",
            draft.amount_sat + draft.fee_sat
        )));
    }
    if draft.change_sat > 0 && draft.change_sat < DUST_LIMIT_SAT {
        return Err(BtcError::DustOutput {
            change_sat: draft.change_sat,
        });
    }

    // The wallet key must re-derive the sender address before any input is
    // accepted. A mismatch means a corrupted or wrong-network wallet.
    let kind = ScriptKind::detect(sender_address);
    if kind == ScriptKind::Legacy {
        return Err(BtcError::InvalidAddress(format!(
            "sender address is neither segwit nor taproot: {sender_address}"
        )));
    }
    let derived = address::address_for_key(private_key, kind)?;
    if derived != sender_address {
        return Err(BtcError::AddressKeyMismatch {
            derived,
            stored: sender_address.to_string(),
        });
    }

    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(private_key)
        .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secret key: {e}")))?;
    let public_key = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
    let compressed = CompressedPublicKey(public_key);

    let sender_script = address::parse_mainnet(sender_address)?.script_pubkey();
    let legacy_script = ScriptBuf::new_p2pkh(&compressed.pubkey_hash());

    // Inputs plus their prevout txouts, in matching order.
    let mut tx_inputs = Vec::with_capacity(draft.inputs.len());
    let mut prevout_txouts = Vec::with_capacity(draft.inputs.len());

    for (utxo, prevout) in draft.inputs.iter().zip(prevouts) {
        let txid: Txid = utxo
            .txid
            .parse()
            .map_err(|e| BtcError::TransactionBuild(format!("invalid txid: {e}")))?;

        tx_inputs.push(TxIn {
            previous_output: OutPoint::new(txid, utxo.vout),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        });

        let txout = match prevout {
            PrevOut::Witness { script, value_sat } => {
                let script = ScriptBuf::from(script.clone());
                if script != sender_script {
                    return Err(BtcError::PrevoutScriptMismatch {
                        txid: utxo.txid.clone(),
                        vout: utxo.vout,
                    });
                }
                if *value_sat != utxo.value_sat {
                    return Err(BtcError::TransactionBuild(format!(
                        "prevout of {}:{} holds {value_sat} sat but the snapshot says {} sat",
                        utxo.txid, utxo.vout, utxo.value_sat
                    )));
                }
                TxOut {
                    value: Amount::from_sat(*value_sat),
                    script_pubkey: script,
                }
            }
            PrevOut::Legacy { raw_tx } => {
                let prev_tx: Transaction = bitcoin::consensus::deserialize(raw_tx)
                    .map_err(|e| {
                        BtcError::TransactionBuild(format!("invalid previous transaction: {e}"))
                    })?;
                let out = prev_tx
                    .output
                    .get(utxo.vout as usize)
                    .ok_or_else(|| BtcError::MissingPrevout {
                        txid: utxo.txid.clone(),
                        vout: utxo.vout,
                    })?;
                if out.script_pubkey != legacy_script {
                    return Err(BtcError::PrevoutScriptMismatch {
                        txid: utxo.txid.clone(),
                        vout: utxo.vout,
                    });
                }
                out.clone()
            }
        };
        prevout_txouts.push(txout);
    }

    let mut tx_outputs = Vec::new();
    if draft.amount_sat > 0 {
        let recipient = address::parse_mainnet(&draft.recipient)?;
        tx_outputs.push(TxOut {
            value: Amount::from_sat(draft.amount_sat),
            script_pubkey: recipient.script_pubkey(),
        });
    }
    if draft.change_sat > 0 {
        let change = address::parse_mainnet(&draft.change_address)?;
        tx_outputs.push(TxOut {
            value: Amount::from_sat(draft.change_sat),
            script_pubkey: change.script_pubkey(),
        });
    }

    let unsigned = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: tx_inputs,
        output: tx_outputs,
    };

    // The fee implied by the final input/output sums must equal the
    // declared fee; a silent divergence must never reach broadcast.
    let total_output_sat: u64 = unsigned.output.iter().map(|o| o.value.to_sat()).sum();
    let actual_fee_sat = total_input_sat - total_output_sat;
    if actual_fee_sat.abs_diff(draft.fee_sat) > FEE_TOLERANCE_SAT {
        return Err(BtcError::FeeMismatch {
            declared_sat: draft.fee_sat,
            actual_sat: actual_fee_sat,
        });
    }

    tracing::debug!(
        inputs = unsigned.input.len(),
        outputs = unsigned.output.len(),
        fee_sat = actual_fee_sat,
        kind = %kind,
        "signing transaction"
    );

    let mut signed = unsigned.clone();
    let mut sighash_cache = SighashCache::new(&unsigned);

    for (index, prevout) in prevouts.iter().enumerate() {
        match prevout {
            PrevOut::Witness { .. } if kind == ScriptKind::Taproot => {
                let sighash = sighash_cache
                    .taproot_key_spend_signature_hash(
                        index,
                        &Prevouts::All(&prevout_txouts),
                        TapSighashType::Default,
                    )
                    .map_err(|e| BtcError::Signing(format!("taproot sighash failed: {e}")))?;
                let msg = Message::from_digest(sighash.to_byte_array());

                // Key-path spend: tweak handles the odd-parity negation and
                // the TapTweak-tagged scalar addition.
                let keypair = Keypair::from_secret_key(&secp, &secret_key);
                let tweaked = keypair.tap_tweak(&secp, None);
                let signature = secp.sign_schnorr_no_aux_rand(&msg, &tweaked.to_keypair());

                let mut witness = Witness::new();
                // Default sighash type needs no trailing type byte.
                witness.push(signature.serialize());
                signed.input[index].witness = witness;
            }
            PrevOut::Witness { .. } => {
                let script_code = ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash());
                let sighash = sighash_cache
                    .p2wpkh_signature_hash(
                        index,
                        &script_code,
                        prevout_txouts[index].value,
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| BtcError::Signing(format!("segwit sighash failed: {e}")))?;
                let msg = Message::from_digest(sighash.to_byte_array());
                let signature = secp.sign_ecdsa(&msg, &secret_key);

                let mut sig_bytes = signature.serialize_der().to_vec();
                sig_bytes.push(EcdsaSighashType::All as u8);

                let mut witness = Witness::new();
                witness.push(&sig_bytes);
                witness.push(public_key.serialize());
                signed.input[index].witness = witness;
            }
            PrevOut::Legacy { .. } => {
                let script_code = &prevout_txouts[index].script_pubkey;
                let sighash = sighash_cache
                    .legacy_signature_hash(index, script_code, EcdsaSighashType::All as u32)
                    .map_err(|e| BtcError::Signing(format!("legacy sighash failed: {e}")))?;
                let msg = Message::from_digest(sighash.to_byte_array());
                let signature = secp.sign_ecdsa(&msg, &secret_key);

                let mut sig_bytes = signature.serialize_der().to_vec();
                sig_bytes.push(EcdsaSighashType::All as u8);
                let sig_push = PushBytesBuf::try_from(sig_bytes)
                    .map_err(|_| BtcError::Signing("signature exceeds push limit".into()))?;

                signed.input[index].script_sig = bitcoin::script::Builder::new()
                    .push_slice(sig_push)
                    .push_key(&bitcoin::PublicKey::new(public_key))
                    .into_script();
            }
        }
    }

    Ok(SignedTransaction {
        hex: hex::encode(bitcoin::consensus::serialize(&signed)),
        txid: signed.compute_txid().to_string(),
        fee_sat: actual_fee_sat,
    })
}
