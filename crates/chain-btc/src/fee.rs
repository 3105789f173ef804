use serde::{Deserialize, Serialize};

use crate::address::ScriptKind;
use crate::utxo::{select_utxos, Selection, Utxo};
use crate::DUST_LIMIT_SAT;

/// Network fee-rate quote in sat/vByte, as served by the data provider's
/// fee oracle. The engine treats it as an opaque input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub fastest: u64,
    pub half_hour: u64,
    pub hour: u64,
    pub economy: u64,
    pub minimum: u64,
}

/// Fee rate the engine quotes in sat/vB when probing whether a change
/// output will survive, before the live quote is applied.
const OUTPUT_PROBE_RATE: u64 = 3;

/// How the fee for a build was chosen. A manual fee is honored exactly;
/// only automatic fees may be silently raised to absorb sub-dust change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    Automatic { fee_sat: u64 },
    Manual { fee_sat: u64 },
}

impl FeePolicy {
    pub fn fee_sat(self) -> u64 {
        match self {
            FeePolicy::Automatic { fee_sat } | FeePolicy::Manual { fee_sat } => fee_sat,
        }
    }

    pub fn is_manual(self) -> bool {
        matches!(self, FeePolicy::Manual { .. })
    }
}

/// Approximate virtual size of a native single-key spend with `inputs`
/// inputs and `outputs` outputs. No script-path Taproot, no hybrid legacy
/// inputs.
pub fn estimate_vbytes(kind: ScriptKind, inputs: usize, outputs: usize) -> u64 {
    let (per_input, per_output) = match kind {
        ScriptKind::Legacy => (148, 34),
        ScriptKind::Segwit => (68, 31),
        ScriptKind::Taproot => (57, 43),
    };
    10 + per_input * inputs as u64 + per_output * outputs as u64
}

/// Rate policy: conservative but not cheapest. The midpoint of the economy
/// and hour rates, rounded up, clamped to at least the network's stated
/// economy floor.
pub fn conservative_rate(quote: &FeeQuote) -> u64 {
    quote.economy.max((quote.economy + quote.hour).div_ceil(2))
}

/// Input-count heuristic for quoting a fee before selection has run:
/// assume up to three of the confirmed UTXOs get consumed, never fewer
/// than one.
pub fn estimate_input_count(confirmed_utxo_count: usize) -> usize {
    confirmed_utxo_count.clamp(1, 3)
}

/// Output-count heuristic: payment plus change, unless the projected
/// post-fee balance cannot sustain a 2x-dust safety margin, in which case
/// the whole balance consolidates into payment plus fee.
pub fn estimate_output_count(
    kind: ScriptKind,
    input_count: usize,
    amount_sat: u64,
    confirmed_total_sat: u64,
) -> usize {
    let probe_fee = OUTPUT_PROBE_RATE * estimate_vbytes(kind, input_count, 1);
    let needed = amount_sat + probe_fee + DUST_LIMIT_SAT;
    if confirmed_total_sat >= needed + 2 * DUST_LIMIT_SAT {
        2
    } else {
        1
    }
}

/// Absolute recommended fee for the given quote and size parameters.
pub fn recommended_fee_sat(
    quote: &FeeQuote,
    kind: ScriptKind,
    inputs: usize,
    outputs: usize,
) -> u64 {
    conservative_rate(quote) * estimate_vbytes(kind, inputs, outputs)
}

/// Largest amount sendable at the given fee: the confirmed balance minus
/// the fee, floored at zero.
pub fn max_sendable_sat(confirmed_total_sat: u64, fee_sat: u64) -> u64 {
    confirmed_total_sat.saturating_sub(fee_sat)
}

/// Ephemeral aggregate describing one fully planned build. Owned by the
/// build call that created it; discarded after signing or on error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub inputs: Vec<Utxo>,
    pub recipient: String,
    pub amount_sat: u64,
    pub fee_sat: u64,
    pub change_sat: u64,
    pub change_address: String,
    /// True when sub-dust change was folded into the fee, leaving a single
    /// payment output.
    pub dust_folded: bool,
}

impl TransactionDraft {
    pub fn total_input_sat(&self) -> u64 {
        self.inputs.iter().map(|u| u.value_sat).sum()
    }
}

/// Typed outcome of payment planning. Callers branch on data; economic
/// shortfalls are never encoded as error strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// A buildable draft. `draft.dust_folded` tells whether the fee was
    /// silently raised to absorb sub-dust change.
    Funded(TransactionDraft),
    /// Confirmed funds cannot cover amount + fee.
    Insufficient { required_sat: u64, available_sat: u64 },
    /// A manually fixed fee would strand sub-dust change. Carries the
    /// stranded change and the fee a fold would produce, so the caller can
    /// suggest either correction.
    DustChange { change_sat: u64, fee_if_folded_sat: u64 },
}

/// Select inputs for `amount_sat` at the given fee policy and reconcile the
/// change against the dust limit.
///
/// With an automatic fee, change strictly between zero and the dust limit
/// is folded into the fee and the draft carries a single payment output.
/// With a manual fee the plan refuses instead: the user's fee is never
/// silently changed.
pub fn plan_payment(
    utxos: &[Utxo],
    recipient: &str,
    change_address: &str,
    amount_sat: u64,
    fee: FeePolicy,
) -> PlanOutcome {
    let fee_sat = fee.fee_sat();

    let (selected, total_sat) = match select_utxos(utxos, amount_sat, fee_sat) {
        Selection::Funded { selected, total_sat } => (selected, total_sat),
        Selection::Insufficient {
            required_sat,
            available_sat,
        } => {
            return PlanOutcome::Insufficient {
                required_sat,
                available_sat,
            }
        }
    };

    let change_sat = total_sat - amount_sat - fee_sat;
    if change_sat > 0 && change_sat < DUST_LIMIT_SAT {
        let fee_if_folded_sat = total_sat - amount_sat;
        if fee.is_manual() {
            return PlanOutcome::DustChange {
                change_sat,
                fee_if_folded_sat,
            };
        }
        tracing::debug!(
            change_sat,
            fee_sat,
            adjusted_fee_sat = fee_if_folded_sat,
            "folding sub-dust change into fee"
        );
        return PlanOutcome::Funded(TransactionDraft {
            inputs: selected,
            recipient: recipient.to_string(),
            amount_sat,
            fee_sat: fee_if_folded_sat,
            change_sat: 0,
            change_address: change_address.to_string(),
            dust_folded: true,
        });
    }

    PlanOutcome::Funded(TransactionDraft {
        inputs: selected,
        recipient: recipient.to_string(),
        amount_sat,
        fee_sat,
        change_sat,
        change_address: change_address.to_string(),
        dust_folded: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote() -> FeeQuote {
        FeeQuote {
            fastest: 20,
            half_hour: 10,
            hour: 5,
            economy: 2,
            minimum: 1,
        }
    }

    fn utxo(txid: &str, value_sat: u64) -> Utxo {
        Utxo {
            txid: txid.to_string(),
            vout: 0,
            value_sat,
            confirmed: true,
            block_height: Some(800_000),
            block_time: None,
        }
    }

    const RECIPIENT: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const CHANGE: &str = "bc1q9vza2e8x573nczrlzms0wvx3gsqjx7vavgkx0l";

    #[test]
    fn size_model_matches_per_type_constants() {
        assert_eq!(estimate_vbytes(ScriptKind::Legacy, 1, 2), 10 + 148 + 68);
        assert_eq!(estimate_vbytes(ScriptKind::Segwit, 1, 2), 10 + 68 + 62);
        assert_eq!(estimate_vbytes(ScriptKind::Taproot, 1, 2), 10 + 57 + 86);
        assert_eq!(estimate_vbytes(ScriptKind::Segwit, 3, 1), 10 + 204 + 31);
    }

    #[test]
    fn rate_is_midpoint_rounded_up() {
        // (2 + 5) / 2 rounds up to 4, above the economy floor of 2.
        assert_eq!(conservative_rate(&quote()), 4);
    }

    #[test]
    fn rate_is_clamped_to_economy_floor() {
        let q = FeeQuote {
            fastest: 9,
            half_hour: 8,
            hour: 2,
            economy: 8,
            minimum: 1,
        };
        // Midpoint (8+2)/2 = 5 is below the economy floor.
        assert_eq!(conservative_rate(&q), 8);
    }

    #[test]
    fn input_count_clamps_between_one_and_three() {
        assert_eq!(estimate_input_count(0), 1);
        assert_eq!(estimate_input_count(2), 2);
        assert_eq!(estimate_input_count(12), 3);
    }

    #[test]
    fn output_count_assumes_change_when_balance_allows() {
        assert_eq!(
            estimate_output_count(ScriptKind::Segwit, 1, 50_000, 100_000),
            2
        );
    }

    #[test]
    fn output_count_drops_change_near_full_consolidation() {
        assert_eq!(
            estimate_output_count(ScriptKind::Segwit, 1, 99_000, 100_000),
            1
        );
    }

    #[test]
    fn recommended_fee_is_rate_times_size() {
        let fee = recommended_fee_sat(&quote(), ScriptKind::Taproot, 1, 2);
        assert_eq!(fee, 4 * estimate_vbytes(ScriptKind::Taproot, 1, 2));
    }

    #[test]
    fn max_sendable_floors_at_zero() {
        assert_eq!(max_sendable_sat(100_000, 1_000), 99_000);
        assert_eq!(max_sendable_sat(500, 1_000), 0);
    }

    #[test]
    fn plan_with_clean_change() {
        let utxos = vec![utxo("a", 100_000)];
        let fee = FeePolicy::Automatic { fee_sat: 1_000 };
        match plan_payment(&utxos, RECIPIENT, CHANGE, 50_000, fee) {
            PlanOutcome::Funded(draft) => {
                assert_eq!(draft.inputs.len(), 1);
                assert_eq!(draft.amount_sat, 50_000);
                assert_eq!(draft.fee_sat, 1_000);
                assert_eq!(draft.change_sat, 49_000);
                assert!(!draft.dust_folded);
            }
            other => panic!("expected funded plan, got {other:?}"),
        }
    }

    #[test]
    fn automatic_fee_folds_sub_dust_change() {
        // 100,000 in, send 99,500 at fee 400: raw change 100 < 546, so the
        // fee becomes 500 and the change output disappears.
        let utxos = vec![utxo("a", 100_000)];
        let fee = FeePolicy::Automatic { fee_sat: 400 };
        match plan_payment(&utxos, RECIPIENT, CHANGE, 99_500, fee) {
            PlanOutcome::Funded(draft) => {
                assert!(draft.dust_folded);
                assert_eq!(draft.fee_sat, 500);
                assert_eq!(draft.change_sat, 0);
                assert_eq!(draft.amount_sat, 99_500);
            }
            other => panic!("expected folded plan, got {other:?}"),
        }
    }

    #[test]
    fn manual_fee_refuses_sub_dust_change() {
        let utxos = vec![utxo("a", 100_000)];
        let fee = FeePolicy::Manual { fee_sat: 400 };
        match plan_payment(&utxos, RECIPIENT, CHANGE, 99_500, fee) {
            PlanOutcome::DustChange {
                change_sat,
                fee_if_folded_sat,
            } => {
                assert_eq!(change_sat, 100);
                assert_eq!(fee_if_folded_sat, 500);
            }
            other => panic!("expected dust refusal, got {other:?}"),
        }
    }

    #[test]
    fn overspend_reports_required_vs_available() {
        let utxos = vec![utxo("a", 100_000)];
        let fee = FeePolicy::Automatic { fee_sat: 1_000 };
        match plan_payment(&utxos, RECIPIENT, CHANGE, 200_000, fee) {
            PlanOutcome::Insufficient {
                required_sat,
                available_sat,
            } => {
                assert_eq!(required_sat, 201_000);
                assert_eq!(available_sat, 100_000);
            }
            other => panic!("expected insufficient, got {other:?}"),
        }
    }

    #[test]
    fn exact_spend_has_zero_change() {
        let utxos = vec![utxo("a", 100_000)];
        let fee = FeePolicy::Manual { fee_sat: 1_000 };
        match plan_payment(&utxos, RECIPIENT, CHANGE, 99_000, fee) {
            PlanOutcome::Funded(draft) => {
                assert_eq!(draft.change_sat, 0);
                assert!(!draft.dust_folded);
            }
            other => panic!("expected funded plan, got {other:?}"),
        }
    }

    #[test]
    fn plan_is_idempotent_on_fixed_inputs() {
        let utxos = vec![utxo("a", 40_000), utxo("b", 70_000), utxo("c", 15_000)];
        let fee = FeePolicy::Automatic { fee_sat: 2_000 };
        let first = plan_payment(&utxos, RECIPIENT, CHANGE, 80_000, fee);
        let second = plan_payment(&utxos, RECIPIENT, CHANGE, 80_000, fee);
        assert_eq!(first, second);
    }
}
