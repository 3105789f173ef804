use serde::{Deserialize, Serialize};

use crate::DUST_LIMIT_SAT;

/// A single unspent transaction output, as snapshotted from the data
/// provider. Never persisted; staleness is tolerated because the builder
/// re-validates adequacy before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Transaction ID as a hex string (display order).
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
    /// Value in satoshis.
    pub value_sat: u64,
    /// Whether the funding transaction is confirmed.
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_time: Option<u64>,
}

impl Utxo {
    /// Whether this UTXO is the given outpoint.
    pub fn is_outpoint(&self, txid: &str, vout: u32) -> bool {
        self.vout == vout && self.txid == txid
    }
}

/// Sum of confirmed UTXO values.
pub fn confirmed_total_sat(utxos: &[Utxo]) -> u64 {
    utxos
        .iter()
        .filter(|u| u.confirmed)
        .map(|u| u.value_sat)
        .sum()
}

/// Result of coin selection: either a funded input set or a shortfall
/// stated in exact satoshis so the caller can suggest a corrected amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Funded { selected: Vec<Utxo>, total_sat: u64 },
    Insufficient { required_sat: u64, available_sat: u64 },
}

/// Select confirmed UTXOs to cover `amount_sat + fee_sat` plus a dust-safe
/// change margin.
///
/// Deterministic largest-first accumulation: UTXOs are sorted by descending
/// value and consumed until the running total reaches
/// `amount + fee + DUST_LIMIT_SAT`. If the set is exhausted first, the
/// selection is still accepted as long as it covers `amount + fee`; the
/// builder re-checks final adequacy. When the resulting change would land
/// strictly between zero and the dust limit, additional UTXOs are pulled to
/// push it back over the limit (or the set runs dry and the fee
/// reconciliation in [`crate::fee`] decides between folding and refusing).
///
/// Unconfirmed UTXOs never participate; replacement builds are the only
/// path that may reuse unconfirmed-origin inputs, and they do not go
/// through selection.
pub fn select_utxos(utxos: &[Utxo], amount_sat: u64, fee_sat: u64) -> Selection {
    let mut candidates: Vec<&Utxo> = utxos.iter().filter(|u| u.confirmed).collect();
    candidates.sort_by(|a, b| b.value_sat.cmp(&a.value_sat));

    let available_sat: u64 = candidates.iter().map(|u| u.value_sat).sum();
    let floor_sat = amount_sat + fee_sat;
    let target_sat = floor_sat + DUST_LIMIT_SAT;

    let mut selected: Vec<Utxo> = Vec::new();
    let mut total_sat: u64 = 0;
    let mut cursor = 0;

    for (i, utxo) in candidates.iter().enumerate() {
        selected.push((*utxo).clone());
        total_sat += utxo.value_sat;
        cursor = i + 1;
        if total_sat >= target_sat {
            break;
        }
    }

    if total_sat < floor_sat {
        return Selection::Insufficient {
            required_sat: floor_sat,
            available_sat,
        };
    }

    // Change strictly between zero and the dust limit: keep pulling inputs
    // until it clears the limit or the set is exhausted.
    let mut change_sat = total_sat - floor_sat;
    if change_sat > 0 && change_sat < DUST_LIMIT_SAT {
        for utxo in &candidates[cursor..] {
            selected.push((*utxo).clone());
            total_sat += utxo.value_sat;
            change_sat = total_sat - floor_sat;
            if change_sat >= DUST_LIMIT_SAT {
                break;
            }
        }
    }

    Selection::Funded { selected, total_sat }
}
