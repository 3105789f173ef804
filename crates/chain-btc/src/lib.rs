//! Bitcoin mainnet transaction core for the wallet engine.
//!
//! Provides address derivation and classification (P2WPKH and key-path
//! P2TR), largest-first coin selection under the dust limit, the fee size
//! model with dust reconciliation, transaction building and signing, and
//! replace-by-fee reconstruction (accelerate / cancel).

pub mod address;
pub mod error;
pub mod fee;
pub mod rbf;
pub mod transaction;
pub mod utxo;

/// Minimum economically spendable output value in satoshis. Outputs below
/// this are never emitted; sub-dust change is folded into the fee or the
/// build is refused.
pub const DUST_LIMIT_SAT: u64 = 546;
