use thiserror::Error;

/// Bitcoin transaction-core errors.
///
/// Economic shortfalls that a caller can correct (insufficient funds,
/// sub-dust change under a manual fee) are not errors; they are reported as
/// data through [`crate::fee::PlanOutcome`]. The variants here are either
/// input-validation failures or integrity failures where proceeding would
/// risk funds.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transaction build error: {0}")]
    TransactionBuild(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("input {txid}:{vout} has no previous-output record; refusing to sign")]
    MissingPrevout { txid: String, vout: u32 },

    #[error("input {txid}:{vout} is unconfirmed and cannot fund a primary send")]
    UnconfirmedInput { txid: String, vout: u32 },

    #[error(
        "previous-output script of {txid}:{vout} does not belong to the \
         spending wallet"
    )]
    PrevoutScriptMismatch { txid: String, vout: u32 },

    #[error(
        "wallet key does not match its stored address (derived {derived}, \
         stored {stored}); refusing to sign"
    )]
    AddressKeyMismatch { derived: String, stored: String },

    #[error(
        "actual fee {actual_sat} sat diverges from declared fee \
         {declared_sat} sat beyond rounding tolerance"
    )]
    FeeMismatch { declared_sat: u64, actual_sat: u64 },

    #[error("change of {change_sat} sat is below the dust limit and must not be emitted")]
    DustOutput { change_sat: u64 },

    #[error(
        "replacement fee {requested_sat} sat does not exceed the original \
         fee {original_sat} sat"
    )]
    FeeNotIncreased { original_sat: u64, requested_sat: u64 },

    #[error(
        "cancellation fee increase of {increase_sat} sat exceeds the \
         originally sent amount {sent_sat} sat"
    )]
    CancelFeeCeiling { increase_sat: u64, sent_sat: u64 },

    #[error("transaction {txid} is already confirmed and can no longer be replaced")]
    AlreadyConfirmed { txid: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monetary_errors_state_integer_satoshis() {
        let err = BtcError::FeeMismatch {
            declared_sat: 1_000,
            actual_sat: 1_546,
        };
        let msg = err.to_string();
        assert!(msg.contains("1546 sat"));
        assert!(msg.contains("1000 sat"));
    }

    #[test]
    fn missing_prevout_names_the_outpoint() {
        let err = BtcError::MissingPrevout {
            txid: "ab".repeat(32),
            vout: 3,
        };
        assert!(err.to_string().contains(":3"));
    }

    #[test]
    fn cancel_ceiling_reports_both_amounts() {
        let err = BtcError::CancelFeeCeiling {
            increase_sat: 70_000,
            sent_sat: 50_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("70000"));
        assert!(msg.contains("50000"));
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn std::error::Error> = Box::new(BtcError::Signing("sighash failed".into()));
        assert!(err.to_string().contains("sighash failed"));
    }
}
