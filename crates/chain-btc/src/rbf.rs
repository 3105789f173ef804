//! Replace-by-fee reconstruction.
//!
//! Builds the replacement drafts for accelerating or cancelling an
//! unconfirmed transaction. Both paths are pure planning: they produce a
//! [`TransactionDraft`] that is signed through [`crate::transaction`] with
//! the same consistency checks as any other build.

use crate::error::BtcError;
use crate::fee::{PlanOutcome, TransactionDraft};
use crate::utxo::Utxo;
use crate::DUST_LIMIT_SAT;

/// One input of a previously broadcast transaction, with its
/// previous-output address and value as reported by the data provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorInput {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    pub value_sat: u64,
}

/// One output of a previously broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorOutput {
    pub address: String,
    pub value_sat: u64,
}

/// Snapshot of a previously broadcast transaction, the starting point for a
/// replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorTransaction {
    pub txid: String,
    pub confirmed: bool,
    pub inputs: Vec<PriorInput>,
    pub outputs: Vec<PriorOutput>,
}

impl PriorTransaction {
    /// Total value of inputs whose previous output belongs to `owner`.
    pub fn owned_input_sat(&self, owner: &str) -> u64 {
        self.inputs
            .iter()
            .filter(|i| i.address == owner)
            .map(|i| i.value_sat)
            .sum()
    }

    /// Total value across all outputs.
    pub fn output_sat(&self) -> u64 {
        self.outputs.iter().map(|o| o.value_sat).sum()
    }

    /// Total value paid to addresses other than `owner`.
    pub fn sent_sat(&self, owner: &str) -> u64 {
        self.outputs
            .iter()
            .filter(|o| o.address != owner)
            .map(|o| o.value_sat)
            .sum()
    }

    /// Whether this transaction spends the given outpoint.
    pub fn spends(&self, txid: &str, vout: u32) -> bool {
        self.inputs.iter().any(|i| i.vout == vout && i.txid == txid)
    }

    /// The owned inputs re-expressed as spendable UTXOs for the
    /// replacement. Their previous outputs are on-chain, so they are
    /// confirmed from the replacement's point of view.
    fn owned_inputs_as_utxos(&self, owner: &str) -> Vec<Utxo> {
        self.inputs
            .iter()
            .filter(|i| i.address == owner)
            .map(|i| Utxo {
                txid: i.txid.clone(),
                vout: i.vout,
                value_sat: i.value_sat,
                confirmed: true,
                block_height: None,
                block_time: None,
            })
            .collect()
    }

    /// Fee the transaction actually pays: owned input value minus all
    /// output value. Errors when the transaction does not spend this
    /// wallet's funds, or when foreign inputs would make the computation
    /// meaningless.
    fn fee_sat(&self, owner: &str) -> Result<u64, BtcError> {
        let owned = self.owned_input_sat(owner);
        if owned == 0 {
            return Err(BtcError::TransactionBuild(format!(
                "transaction {} spends no inputs owned by this wallet",
                self.txid
            )));
        }
        owned.checked_sub(self.output_sat()).ok_or_else(|| {
            BtcError::TransactionBuild(format!(
                "transaction {} is partly funded by foreign inputs and cannot be replaced here",
                self.txid
            ))
        })
    }
}

/// Plan a replacement that keeps the original payment but pays
/// `new_fee_sat`.
///
/// The original inputs are reused; when the fee increase exceeds what the
/// original change output can absorb, additional confirmed UTXOs are
/// pulled from `spare` (excluding anything the original already spends)
/// until the shortfall is covered. Sub-dust change folds into the fee, as
/// in a primary build with an automatic fee.
pub fn plan_accelerate(
    prior: &PriorTransaction,
    owner: &str,
    new_fee_sat: u64,
    spare: &[Utxo],
) -> Result<PlanOutcome, BtcError> {
    if prior.confirmed {
        return Err(BtcError::AlreadyConfirmed {
            txid: prior.txid.clone(),
        });
    }

    let original_fee_sat = prior.fee_sat(owner)?;
    if new_fee_sat <= original_fee_sat {
        return Err(BtcError::FeeNotIncreased {
            original_sat: original_fee_sat,
            requested_sat: new_fee_sat,
        });
    }

    let payments: Vec<&PriorOutput> =
        prior.outputs.iter().filter(|o| o.address != owner).collect();
    let payment = match payments.as_slice() {
        [single] => *single,
        [] => {
            return Err(BtcError::TransactionBuild(format!(
                "transaction {} has no external payment output; cancel it instead",
                prior.txid
            )))
        }
        _ => {
            return Err(BtcError::TransactionBuild(format!(
                "transaction {} pays multiple recipients, which acceleration does not support",
                prior.txid
            )))
        }
    };

    let mut inputs = prior.owned_inputs_as_utxos(owner);
    let mut total_in_sat: u64 = inputs.iter().map(|u| u.value_sat).sum();

    let mut candidates: Vec<&Utxo> = spare
        .iter()
        .filter(|u| u.confirmed && !prior.spends(&u.txid, u.vout))
        .collect();
    candidates.sort_by(|a, b| b.value_sat.cmp(&a.value_sat));
    let spare_total_sat: u64 = candidates.iter().map(|u| u.value_sat).sum();

    let floor_sat = payment.value_sat + new_fee_sat;
    let mut cursor = 0;
    while total_in_sat < floor_sat && cursor < candidates.len() {
        inputs.push(candidates[cursor].clone());
        total_in_sat += candidates[cursor].value_sat;
        cursor += 1;
    }
    if total_in_sat < floor_sat {
        return Ok(PlanOutcome::Insufficient {
            required_sat: floor_sat,
            available_sat: prior.owned_input_sat(owner) + spare_total_sat,
        });
    }

    let mut change_sat = total_in_sat - floor_sat;
    while change_sat > 0 && change_sat < DUST_LIMIT_SAT && cursor < candidates.len() {
        inputs.push(candidates[cursor].clone());
        total_in_sat += candidates[cursor].value_sat;
        cursor += 1;
        change_sat = total_in_sat - floor_sat;
    }

    let draft = if change_sat > 0 && change_sat < DUST_LIMIT_SAT {
        // No input left to clear the dust limit; absorb the remainder.
        let folded_fee_sat = total_in_sat - payment.value_sat;
        tracing::debug!(
            txid = %prior.txid,
            change_sat,
            folded_fee_sat,
            "acceleration folds sub-dust change into fee"
        );
        TransactionDraft {
            inputs,
            recipient: payment.address.clone(),
            amount_sat: payment.value_sat,
            fee_sat: folded_fee_sat,
            change_sat: 0,
            change_address: owner.to_string(),
            dust_folded: true,
        }
    } else {
        TransactionDraft {
            inputs,
            recipient: payment.address.clone(),
            amount_sat: payment.value_sat,
            fee_sat: new_fee_sat,
            change_sat,
            change_address: owner.to_string(),
            dust_folded: false,
        }
    };

    Ok(PlanOutcome::Funded(draft))
}

/// Plan a replacement that claws the funds back to `owner` at
/// `new_fee_sat`.
///
/// The fee increase is capped by the amount the original transaction sent
/// away: spending more on the cancellation than it recovers is refused.
/// A returned amount below the dust limit collapses the replacement to
/// fee-only, with no outputs at all.
pub fn plan_cancel(
    prior: &PriorTransaction,
    owner: &str,
    new_fee_sat: u64,
) -> Result<PlanOutcome, BtcError> {
    if prior.confirmed {
        return Err(BtcError::AlreadyConfirmed {
            txid: prior.txid.clone(),
        });
    }

    let original_fee_sat = prior.fee_sat(owner)?;
    if new_fee_sat <= original_fee_sat {
        return Err(BtcError::FeeNotIncreased {
            original_sat: original_fee_sat,
            requested_sat: new_fee_sat,
        });
    }

    let increase_sat = new_fee_sat - original_fee_sat;
    let sent_sat = prior.sent_sat(owner);
    if increase_sat > sent_sat {
        return Err(BtcError::CancelFeeCeiling {
            increase_sat,
            sent_sat,
        });
    }

    let inputs = prior.owned_inputs_as_utxos(owner);
    let total_owned_sat = prior.owned_input_sat(owner);
    if new_fee_sat > total_owned_sat {
        return Ok(PlanOutcome::Insufficient {
            required_sat: new_fee_sat,
            available_sat: total_owned_sat,
        });
    }

    let return_sat = total_owned_sat - new_fee_sat;
    let draft = if return_sat < DUST_LIMIT_SAT {
        // Too small to return; the whole input value becomes fee.
        tracing::debug!(
            txid = %prior.txid,
            return_sat,
            fee_sat = total_owned_sat,
            "cancellation collapses to fee-only"
        );
        TransactionDraft {
            inputs,
            recipient: owner.to_string(),
            amount_sat: 0,
            fee_sat: total_owned_sat,
            change_sat: 0,
            change_address: owner.to_string(),
            dust_folded: return_sat > 0,
        }
    } else {
        TransactionDraft {
            inputs,
            recipient: owner.to_string(),
            amount_sat: return_sat,
            fee_sat: new_fee_sat,
            change_sat: 0,
            change_address: owner.to_string(),
            dust_folded: false,
        }
    };

    Ok(PlanOutcome::Funded(draft))
}
