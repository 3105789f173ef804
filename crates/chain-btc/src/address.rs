use bitcoin::address::{Address, NetworkUnchecked};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{CompressedPublicKey, Network};

use crate::error::BtcError;

/// Script family of an address, as used by the fee size model and the
/// signer. The engine only derives Segwit and Taproot wallets; Legacy
/// exists for classifying foreign recipient addresses and sizing inputs
/// that would require full previous transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Legacy,
    Segwit,
    Taproot,
}

impl ScriptKind {
    /// Classify a mainnet address string by its shape.
    ///
    /// Matches the structural rules the engine also enforces after
    /// derivation: `bc1p` + 62 chars is Taproot, `bc1` + 42 chars is native
    /// SegWit, everything else is treated as legacy.
    pub fn detect(address: &str) -> ScriptKind {
        if address.starts_with("bc1p") && address.len() == 62 {
            ScriptKind::Taproot
        } else if address.starts_with("bc1") && address.len() == 42 {
            ScriptKind::Segwit
        } else {
            ScriptKind::Legacy
        }
    }
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptKind::Legacy => write!(f, "legacy"),
            ScriptKind::Segwit => write!(f, "segwit"),
            ScriptKind::Taproot => write!(f, "taproot"),
        }
    }
}

/// Derive a P2WPKH (native SegWit bech32) mainnet address from a 33-byte
/// compressed public key.
pub fn p2wpkh_address(pubkey_bytes: &[u8; 33]) -> Result<String, BtcError> {
    let compressed = CompressedPublicKey::from_slice(pubkey_bytes).map_err(|e| {
        BtcError::InvalidPublicKey(format!("failed to parse compressed public key: {e}"))
    })?;
    Ok(Address::p2wpkh(&compressed, Network::Bitcoin).to_string())
}

/// Derive a key-path-only P2TR (Taproot) mainnet address from a 33-byte
/// compressed public key. The x-only internal key is tweaked with an empty
/// script tree.
pub fn p2tr_address(pubkey_bytes: &[u8; 33]) -> Result<String, BtcError> {
    let secp = Secp256k1::new();
    let pubkey = bitcoin::secp256k1::PublicKey::from_slice(pubkey_bytes).map_err(|e| {
        BtcError::InvalidPublicKey(format!("failed to parse public key: {e}"))
    })?;
    let (x_only, _parity) = pubkey.x_only_public_key();
    Ok(Address::p2tr(&secp, x_only, None, Network::Bitcoin).to_string())
}

/// Derive the mainnet address of `kind` directly from a 32-byte private
/// key. Used by the signer's self-check and by wallet integrity
/// verification.
pub fn address_for_key(private_key: &[u8; 32], kind: ScriptKind) -> Result<String, BtcError> {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(private_key)
        .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secret key: {e}")))?;
    let pubkey = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &secret);
    let pubkey_bytes: [u8; 33] = pubkey.serialize();

    let address = match kind {
        ScriptKind::Segwit => p2wpkh_address(&pubkey_bytes)?,
        ScriptKind::Taproot => p2tr_address(&pubkey_bytes)?,
        ScriptKind::Legacy => {
            return Err(BtcError::InvalidAddress(
                "legacy wallet addresses are not derived by this engine".into(),
            ))
        }
    };
    check_structure(&address, kind)?;
    Ok(address)
}

/// Enforce the per-type structural invariant on a freshly derived address.
///
/// A derived key must never be used when its address fails this check:
/// Taproot addresses are exactly 62 chars with a `bc1p` prefix, SegWit
/// addresses exactly 42 chars with a `bc1` prefix.
pub fn check_structure(address: &str, kind: ScriptKind) -> Result<(), BtcError> {
    let ok = match kind {
        ScriptKind::Taproot => address.len() == 62 && address.starts_with("bc1p"),
        ScriptKind::Segwit => address.len() == 42 && address.starts_with("bc1"),
        ScriptKind::Legacy => !address.is_empty(),
    };
    if ok {
        Ok(())
    } else {
        Err(BtcError::InvalidAddress(format!(
            "derived {kind} address failed its structural check: {address}"
        )))
    }
}

/// Parse and validate an address for Bitcoin mainnet.
pub fn parse_mainnet(address: &str) -> Result<Address, BtcError> {
    address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address: {e}")))?
        .require_network(Network::Bitcoin)
        .map_err(|e| BtcError::InvalidAddress(format!("address is not for mainnet: {e}")))
}

/// Whether a string is a valid Bitcoin mainnet address of any supported
/// script family.
pub fn is_valid_mainnet(address: &str) -> bool {
    parse_mainnet(address).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Well-known test vector: private key 0x...01.
    /// Compressed pubkey 0279BE66...F81798, P2WPKH mainnet address below.
    const KEY_ONE: [u8; 32] = {
        let mut k = [0u8; 32];
        k[31] = 1;
        k
    };

    #[test]
    fn p2wpkh_mainnet_test_vector() {
        let pubkey_hex = "0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798";
        let pubkey_bytes: [u8; 33] = hex::decode(pubkey_hex).unwrap().try_into().unwrap();
        let address = p2wpkh_address(&pubkey_bytes).unwrap();
        assert_eq!(address, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    }

    #[test]
    fn taproot_address_shape() {
        let address = address_for_key(&KEY_ONE, ScriptKind::Taproot).unwrap();
        assert!(address.starts_with("bc1p"));
        assert_eq!(address.len(), 62);
    }

    #[test]
    fn segwit_address_shape() {
        let address = address_for_key(&KEY_ONE, ScriptKind::Segwit).unwrap();
        assert!(address.starts_with("bc1q"));
        assert_eq!(address.len(), 42);
    }

    #[test]
    fn address_for_key_deterministic() {
        let a = address_for_key(&KEY_ONE, ScriptKind::Taproot).unwrap();
        let b = address_for_key(&KEY_ONE, ScriptKind::Taproot).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn segwit_and_taproot_addresses_differ() {
        let segwit = address_for_key(&KEY_ONE, ScriptKind::Segwit).unwrap();
        let taproot = address_for_key(&KEY_ONE, ScriptKind::Taproot).unwrap();
        assert_ne!(segwit, taproot);
    }

    #[test]
    fn legacy_wallet_derivation_is_refused() {
        assert!(address_for_key(&KEY_ONE, ScriptKind::Legacy).is_err());
    }

    #[test]
    fn invalid_private_key_is_rejected() {
        // Zero is not a valid secp256k1 scalar.
        assert!(address_for_key(&[0u8; 32], ScriptKind::Segwit).is_err());
    }

    #[test]
    fn detect_classifies_by_shape() {
        let taproot = address_for_key(&KEY_ONE, ScriptKind::Taproot).unwrap();
        let segwit = address_for_key(&KEY_ONE, ScriptKind::Segwit).unwrap();
        assert_eq!(ScriptKind::detect(&taproot), ScriptKind::Taproot);
        assert_eq!(ScriptKind::detect(&segwit), ScriptKind::Segwit);
        assert_eq!(
            ScriptKind::detect("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"),
            ScriptKind::Legacy
        );
    }

    #[test]
    fn check_structure_rejects_wrong_shape() {
        // A segwit-shaped address is not a valid taproot address.
        let segwit = address_for_key(&KEY_ONE, ScriptKind::Segwit).unwrap();
        assert!(check_structure(&segwit, ScriptKind::Taproot).is_err());
    }

    #[test]
    fn parse_mainnet_accepts_known_addresses() {
        assert!(is_valid_mainnet("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"));
        assert!(is_valid_mainnet("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
    }

    #[test]
    fn parse_mainnet_rejects_testnet_and_garbage() {
        assert!(!is_valid_mainnet("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx"));
        assert!(!is_valid_mainnet("notanaddress!!!"));
    }
}
