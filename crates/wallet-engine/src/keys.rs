use bip32::{DerivationPath, XPrv};
use k256::ecdsa::SigningKey;
use zeroize::Zeroize;

use crate::error::EngineError;
use crate::wallet::AddressType;

/// Fixed hardened derivation paths, account/change/index pinned to zero:
/// BIP-84 for native SegWit, BIP-86 for Taproot.
const SEGWIT_PATH: &str = "m/84'/0'/0'/0/0";
const TAPROOT_PATH: &str = "m/86'/0'/0'/0/0";

pub fn derivation_path(address_type: AddressType) -> &'static str {
    match address_type {
        AddressType::Segwit => SEGWIT_PATH,
        AddressType::Taproot => TAPROOT_PATH,
    }
}

/// A derived secp256k1 key. The private scalar is wiped on drop; nothing
/// outside the signing call stack may retain a copy.
pub struct DerivedKey {
    pub private_key: [u8; 32],
    pub public_key_compressed: [u8; 33],
    pub derivation_path: &'static str,
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// Derive the wallet key for an address type from a BIP-39 seed.
pub fn derive_key(seed: &[u8], address_type: AddressType) -> Result<DerivedKey, EngineError> {
    let path_str = derivation_path(address_type);
    let path: DerivationPath = path_str
        .parse()
        .map_err(|e: bip32::Error| EngineError::Derivation(e.to_string()))?;

    let xprv = XPrv::derive_from_path(seed, &path)
        .map_err(|e| EngineError::Derivation(e.to_string()))?;

    let private_key: [u8; 32] = xprv.to_bytes().into();
    let signing_key = SigningKey::from_bytes(&private_key.into())
        .map_err(|e| EngineError::Derivation(e.to_string()))?;

    let public_key_compressed: [u8; 33] = signing_key
        .verifying_key()
        .to_sec1_bytes()
        .as_ref()
        .try_into()
        .map_err(|_| EngineError::Derivation("unexpected public key length".into()))?;

    Ok(DerivedKey {
        private_key,
        public_key_compressed,
        derivation_path: path_str,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnemonic;

    fn test_seed() -> crypto_utils::SecretBytes {
        let mut words = vec!["abandon".to_string(); 11];
        words.push("about".to_string());
        mnemonic::words_to_seed(&words).unwrap()
    }

    #[test]
    fn segwit_uses_bip84_path() {
        let key = derive_key(&test_seed(), AddressType::Segwit).unwrap();
        assert_eq!(key.derivation_path, "m/84'/0'/0'/0/0");
    }

    #[test]
    fn taproot_uses_bip86_path() {
        let key = derive_key(&test_seed(), AddressType::Taproot).unwrap();
        assert_eq!(key.derivation_path, "m/86'/0'/0'/0/0");
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_key(&test_seed(), AddressType::Taproot).unwrap();
        let b = derive_key(&test_seed(), AddressType::Taproot).unwrap();
        assert_eq!(a.private_key, b.private_key);
        assert_eq!(a.public_key_compressed, b.public_key_compressed);
    }

    #[test]
    fn address_types_derive_distinct_keys() {
        let segwit = derive_key(&test_seed(), AddressType::Segwit).unwrap();
        let taproot = derive_key(&test_seed(), AddressType::Taproot).unwrap();
        assert_ne!(segwit.private_key, taproot.private_key);
    }

    #[test]
    fn public_key_is_compressed_sec1() {
        let key = derive_key(&test_seed(), AddressType::Segwit).unwrap();
        assert!(key.public_key_compressed[0] == 0x02 || key.public_key_compressed[0] == 0x03);
    }

    #[test]
    fn empty_seed_fails() {
        assert!(derive_key(&[], AddressType::Segwit).is_err());
    }
}
