//! The engine façade consumed by the presentation layer.
//!
//! Owns the data-provider handle, the fee-quote cache, and the per-wallet
//! build serialization. All monetary values are integer satoshis; decimal
//! conversion is a presentation concern.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use chain_btc::address;
use chain_btc::fee::{self, FeePolicy, PlanOutcome};
use chain_btc::rbf;
use chain_btc::transaction::{self, SendKind, SignedTransaction};
use chain_btc::utxo;

use crate::error::EngineError;
use crate::provider::{DataProvider, FeeQuoteCache};
use crate::wallet::Wallet;

/// Fee choice for a payment build. `Recommended` derives the fee from the
/// cached network quote and the size model; `Manual` is honored exactly
/// and never silently adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeSelection {
    Recommended,
    Manual(u64),
}

/// Typed result of a build. Callers branch on data: economic shortfalls
/// come back as values carrying exact satoshi amounts, not as errors to
/// string-match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Built and signed at the requested fee.
    Signed(SignedTransaction),
    /// Built and signed, with sub-dust change folded into the fee.
    DustFolded {
        tx: SignedTransaction,
        adjusted_fee_sat: u64,
    },
    /// Confirmed funds cannot cover amount + fee.
    Insufficient {
        required_sat: u64,
        available_sat: u64,
    },
    /// A manual fee would strand sub-dust change; carries the change and
    /// the fee a fold would need, so the caller can suggest either fix.
    DustChange {
        change_sat: u64,
        fee_if_folded_sat: u64,
    },
}

/// Transaction/fee engine over a blockchain-data provider.
pub struct Engine<P> {
    provider: P,
    fee_cache: FeeQuoteCache,
    in_flight: Mutex<HashSet<String>>,
}

/// Removes its wallet id from the in-flight set when the build ends.
struct BuildGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    wallet_id: String,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .expect("in-flight set poisoned")
            .remove(&self.wallet_id);
    }
}

impl<P: DataProvider> Engine<P> {
    pub fn new(provider: P, quote_ttl: Duration) -> Self {
        Self {
            provider,
            fee_cache: FeeQuoteCache::new(quote_ttl),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// The underlying provider, e.g. for broadcasting a signed
    /// transaction. The engine itself never broadcasts.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Serialize builds per wallet: a private key must never be used by
    /// two concurrent signing operations, and overlapping selections could
    /// double-spend. Fails fast instead of queueing.
    fn begin_build(&self, wallet_id: &str) -> Result<BuildGuard<'_>, EngineError> {
        let mut in_flight = self.in_flight.lock().expect("in-flight set poisoned");
        if !in_flight.insert(wallet_id.to_string()) {
            return Err(EngineError::BuildInProgress(wallet_id.to_string()));
        }
        Ok(BuildGuard {
            in_flight: &self.in_flight,
            wallet_id: wallet_id.to_string(),
        })
    }

    fn quote(&self) -> Result<fee::FeeQuote, EngineError> {
        Ok(self.fee_cache.get_or_fetch(|| self.provider.fee_quote())?)
    }

    /// Recommended absolute fee for sending `amount_sat` from this wallet,
    /// from the cached network quote and the address-type size model.
    pub fn recommended_fee(&self, wallet: &Wallet, amount_sat: u64) -> Result<u64, EngineError> {
        let utxos = self.provider.confirmed_utxos(&wallet.address)?;
        self.recommended_fee_for(wallet, amount_sat, &utxos)
    }

    fn recommended_fee_for(
        &self,
        wallet: &Wallet,
        amount_sat: u64,
        utxos: &[utxo::Utxo],
    ) -> Result<u64, EngineError> {
        let kind = wallet.address_type.script_kind();
        let confirmed_count = utxos.iter().filter(|u| u.confirmed).count();
        let confirmed_total = utxo::confirmed_total_sat(utxos);

        let inputs = fee::estimate_input_count(confirmed_count);
        let outputs = fee::estimate_output_count(kind, inputs, amount_sat, confirmed_total);
        let quote = self.quote()?;
        Ok(fee::recommended_fee_sat(&quote, kind, inputs, outputs))
    }

    /// Largest sendable amount at the given fee, from live confirmed
    /// balance. Recompute whenever the fee or the UTXO set changes.
    pub fn max_sendable(&self, wallet: &Wallet, fee_sat: u64) -> Result<u64, EngineError> {
        let utxos = self.provider.confirmed_utxos(&wallet.address)?;
        Ok(fee::max_sendable_sat(utxo::confirmed_total_sat(&utxos), fee_sat))
    }

    /// Build and sign a payment. The returned transaction is ready for
    /// broadcast; ownership transfers to the caller.
    pub fn build_payment(
        &self,
        wallet: &Wallet,
        recipient: &str,
        amount_sat: u64,
        fee: FeeSelection,
    ) -> Result<BuildOutcome, EngineError> {
        wallet.verify_integrity()?;
        if amount_sat == 0 {
            return Err(EngineError::InvalidAmount(
                "amount must be positive".into(),
            ));
        }
        if !address::is_valid_mainnet(recipient) {
            return Err(EngineError::InvalidAddress(format!(
                "recipient is not a valid mainnet address: {recipient}"
            )));
        }
        if let FeeSelection::Manual(fee_sat) = fee {
            if fee_sat < 1 {
                return Err(EngineError::InvalidFee(
                    "fee must be at least 1 satoshi".into(),
                ));
            }
        }

        let _guard = self.begin_build(&wallet.id)?;
        let utxos = self.provider.confirmed_utxos(&wallet.address)?;

        let policy = match fee {
            FeeSelection::Manual(fee_sat) => FeePolicy::Manual { fee_sat },
            FeeSelection::Recommended => FeePolicy::Automatic {
                fee_sat: self.recommended_fee_for(wallet, amount_sat, &utxos)?,
            },
        };

        tracing::info!(
            wallet_id = %wallet.id,
            amount_sat,
            fee_sat = policy.fee_sat(),
            manual = policy.is_manual(),
            "building payment"
        );

        let plan = fee::plan_payment(&utxos, recipient, &wallet.address, amount_sat, policy);
        self.finish_plan(wallet, plan, SendKind::Primary)
    }

    /// Replace an unconfirmed outgoing transaction with one paying
    /// `new_fee_sat`, keeping the original payment output.
    pub fn accelerate(
        &self,
        wallet: &Wallet,
        txid: &str,
        new_fee_sat: u64,
    ) -> Result<BuildOutcome, EngineError> {
        wallet.verify_integrity()?;
        if new_fee_sat < 1 {
            return Err(EngineError::InvalidFee(
                "fee must be at least 1 satoshi".into(),
            ));
        }

        let _guard = self.begin_build(&wallet.id)?;
        let prior = self.provider.transaction(txid)?;
        if !prior.confirmed && !self.provider.supports_rbf(txid)? {
            return Err(EngineError::NotReplaceable(txid.to_string()));
        }
        let spare = self.provider.confirmed_utxos(&wallet.address)?;

        tracing::info!(wallet_id = %wallet.id, txid, new_fee_sat, "accelerating transaction");
        let plan = rbf::plan_accelerate(&prior, &wallet.address, new_fee_sat, &spare)?;
        self.finish_plan(wallet, plan, SendKind::Replacement)
    }

    /// Replace an unconfirmed outgoing transaction with one returning all
    /// funds to the wallet at `new_fee_sat`.
    pub fn cancel(
        &self,
        wallet: &Wallet,
        txid: &str,
        new_fee_sat: u64,
    ) -> Result<BuildOutcome, EngineError> {
        wallet.verify_integrity()?;
        if new_fee_sat < 1 {
            return Err(EngineError::InvalidFee(
                "fee must be at least 1 satoshi".into(),
            ));
        }

        let _guard = self.begin_build(&wallet.id)?;
        let prior = self.provider.transaction(txid)?;
        if !prior.confirmed && !self.provider.supports_rbf(txid)? {
            return Err(EngineError::NotReplaceable(txid.to_string()));
        }

        tracing::info!(wallet_id = %wallet.id, txid, new_fee_sat, "cancelling transaction");
        let plan = rbf::plan_cancel(&prior, &wallet.address, new_fee_sat)?;
        self.finish_plan(wallet, plan, SendKind::Replacement)
    }

    /// Resolve per-input prevout records, sign, and map the plan to its
    /// outcome. All lookups complete before signing starts.
    fn finish_plan(
        &self,
        wallet: &Wallet,
        plan: PlanOutcome,
        send_kind: SendKind,
    ) -> Result<BuildOutcome, EngineError> {
        let draft = match plan {
            PlanOutcome::Insufficient {
                required_sat,
                available_sat,
            } => {
                return Ok(BuildOutcome::Insufficient {
                    required_sat,
                    available_sat,
                })
            }
            PlanOutcome::DustChange {
                change_sat,
                fee_if_folded_sat,
            } => {
                return Ok(BuildOutcome::DustChange {
                    change_sat,
                    fee_if_folded_sat,
                })
            }
            PlanOutcome::Funded(draft) => draft,
        };

        let mut prevouts = Vec::with_capacity(draft.inputs.len());
        for input in &draft.inputs {
            prevouts.push(self.provider.prev_out(&input.txid, input.vout)?);
        }

        let signed = transaction::sign_draft(
            &draft,
            &prevouts,
            &wallet.private_key,
            &wallet.address,
            send_kind,
        )?;

        tracing::info!(
            wallet_id = %wallet.id,
            txid = %signed.txid,
            fee_sat = signed.fee_sat,
            dust_folded = draft.dust_folded,
            "transaction signed"
        );

        if draft.dust_folded {
            Ok(BuildOutcome::DustFolded {
                adjusted_fee_sat: signed.fee_sat,
                tx: signed,
            })
        } else {
            Ok(BuildOutcome::Signed(signed))
        }
    }
}
