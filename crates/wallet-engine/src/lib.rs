//! # wallet-engine
//!
//! Transaction-construction and fee-management engine of a non-custodial
//! single-signature Bitcoin mainnet wallet. Turns a mnemonic or raw key
//! into a deterministic SegWit or Taproot wallet, selects UTXOs, computes
//! fees under dust-limit constraints, produces fully signed transactions,
//! and fee-bumps unconfirmed ones (accelerate / cancel).
//!
//! Blockchain data, wallet persistence, and presentation are external
//! collaborators behind the [`provider::DataProvider`] and
//! [`storage::WalletStore`] traits.

pub mod engine;
pub mod error;
pub mod keys;
pub mod mnemonic;
pub mod provider;
pub mod storage;
pub mod wallet;

pub use engine::{BuildOutcome, Engine, FeeSelection};
pub use error::EngineError;
pub use mnemonic::{generate_mnemonic, is_valid_word, validate_mnemonic, word_list};
pub use wallet::{
    derive_wallet, derive_wallet_from_raw_key, AddressType, RawKeyNormalization, Wallet,
};

pub use chain_btc::fee::FeeQuote;
pub use chain_btc::transaction::SignedTransaction;
pub use chain_btc::utxo::Utxo;
pub use chain_btc::DUST_LIMIT_SAT;
