use thiserror::Error;

use crate::provider::ProviderError;
use crate::storage::StoreError;

/// Engine-level errors.
///
/// Economic shortfalls the caller can correct are not represented here;
/// they come back as data through [`crate::engine::BuildOutcome`]. These
/// variants cover input validation, integrity violations, and collaborator
/// failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid fee: {0}")]
    InvalidFee(String),

    #[error(
        "wallet {wallet_id} failed its integrity check: stored address \
         {stored} does not match the address {derived} derived from its key"
    )]
    Integrity {
        wallet_id: String,
        stored: String,
        derived: String,
    },

    #[error("a build is already in flight for wallet {0}")]
    BuildInProgress(String),

    #[error("transaction {0} does not signal replaceability")]
    NotReplaceable(String),

    #[error(transparent)]
    Chain(#[from] chain_btc::error::BtcError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_error_names_both_addresses() {
        let err = EngineError::Integrity {
            wallet_id: "w1".into(),
            stored: "bc1qstored".into(),
            derived: "bc1qderived".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("bc1qstored"));
        assert!(msg.contains("bc1qderived"));
    }

    #[test]
    fn chain_errors_pass_through_unchanged() {
        let inner = chain_btc::error::BtcError::DustOutput { change_sat: 100 };
        let expected = inner.to_string();
        let err: EngineError = inner.into();
        assert_eq!(err.to_string(), expected);
    }
}
