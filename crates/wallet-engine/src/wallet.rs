use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use chain_btc::address::{self, ScriptKind};

use crate::error::EngineError;
use crate::keys;
use crate::mnemonic;

/// Address family of a wallet. The engine derives native SegWit (P2WPKH)
/// and key-path Taproot (P2TR) wallets only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Segwit,
    Taproot,
}

impl AddressType {
    pub fn script_kind(self) -> ScriptKind {
        match self {
            AddressType::Segwit => ScriptKind::Segwit,
            AddressType::Taproot => ScriptKind::Taproot,
        }
    }
}

impl std::fmt::Display for AddressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressType::Segwit => write!(f, "segwit"),
            AddressType::Taproot => write!(f, "taproot"),
        }
    }
}

/// How a raw imported key that is not exactly 32 bytes is treated.
///
/// `Strict` rejects it. `LegacyCompat` reproduces the historical
/// normalization (right-pad short hex with zeros, truncate long hex),
/// which can silently yield a usable-but-unintended key; it exists only to
/// re-import wallets created under that rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawKeyNormalization {
    #[default]
    Strict,
    LegacyCompat,
}

/// A single-signature wallet record. The private key is exclusively owned
/// here and wiped on drop; `address` must always be re-derivable from
/// `private_key` and `address_type`, which [`Wallet::verify_integrity`]
/// enforces before any signing use.
#[derive(Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(with = "hex_key")]
    pub private_key: [u8; 32],
    /// Ordered recovery words; 12 entries, or empty for raw-key imports.
    pub seed_words: Vec<String>,
    pub address_type: AddressType,
    /// Unix timestamp (seconds).
    pub created_at: u64,
}

impl Drop for Wallet {
    fn drop(&mut self) {
        self.private_key.zeroize();
        for word in &mut self.seed_words {
            word.zeroize();
        }
    }
}

impl std::fmt::Debug for Wallet {
    // Key material and recovery words stay out of debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("address_type", &self.address_type)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Re-derive the address from the stored key and compare it with the
    /// stored address. A mismatch is a fatal integrity violation: the key
    /// must not be used for anything afterwards.
    pub fn verify_integrity(&self) -> Result<(), EngineError> {
        let derived = address::address_for_key(&self.private_key, self.address_type.script_kind())?;
        if derived != self.address {
            return Err(EngineError::Integrity {
                wallet_id: self.id.clone(),
                stored: self.address.clone(),
                derived,
            });
        }
        Ok(())
    }
}

/// Derive a wallet from a validated 12-word mnemonic.
pub fn derive_wallet(
    words: &[String],
    name: &str,
    address_type: AddressType,
) -> Result<Wallet, EngineError> {
    if !mnemonic::validate_mnemonic(words) {
        return Err(EngineError::InvalidMnemonic(
            "mnemonic failed word-count, wordlist, or checksum validation".into(),
        ));
    }
    let seed = mnemonic::words_to_seed(words)?;
    let key = keys::derive_key(&seed, address_type)?;

    let wallet = Wallet {
        id: crypto_utils::random_hex_id(16),
        name: name.to_string(),
        address: derive_checked_address(&key.public_key_compressed, address_type)?,
        private_key: key.private_key,
        seed_words: words.to_vec(),
        address_type,
        created_at: now_unix(),
    };
    tracing::info!(wallet_id = %wallet.id, address_type = %address_type, "derived wallet from mnemonic");
    Ok(wallet)
}

/// Derive a wallet from a raw hex-encoded private key. A `0x` prefix and
/// surrounding whitespace are tolerated; anything that does not decode to
/// exactly 32 bytes is rejected unless legacy-compat normalization is
/// requested explicitly.
pub fn derive_wallet_from_raw_key(
    hex_key: &str,
    name: &str,
    address_type: AddressType,
    normalization: RawKeyNormalization,
) -> Result<Wallet, EngineError> {
    let mut cleaned: String = hex_key.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if let Some(stripped) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        cleaned = stripped.to_string();
    }

    if normalization == RawKeyNormalization::LegacyCompat {
        if cleaned.len() < 64 {
            cleaned = format!("{cleaned:0<64}");
        } else if cleaned.len() > 64 {
            cleaned.truncate(64);
        }
    }

    let decoded = hex::decode(&cleaned)
        .map_err(|e| EngineError::InvalidPrivateKey(format!("not valid hex: {e}")))?;
    let private_key: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
        EngineError::InvalidPrivateKey(format!(
            "key is {} bytes, expected exactly 32",
            decoded.len()
        ))
    })?;

    let key = keys_from_raw(&private_key)?;
    let wallet = Wallet {
        id: crypto_utils::random_hex_id(16),
        name: name.to_string(),
        address: derive_checked_address(&key, address_type)?,
        private_key,
        seed_words: Vec::new(),
        address_type,
        created_at: now_unix(),
    };
    tracing::info!(wallet_id = %wallet.id, address_type = %address_type, "derived wallet from raw key");
    Ok(wallet)
}

/// Compressed public key for a raw private scalar, rejecting invalid
/// scalars (zero, >= curve order).
fn keys_from_raw(private_key: &[u8; 32]) -> Result<[u8; 33], EngineError> {
    let signing_key = k256::ecdsa::SigningKey::from_bytes(private_key.into())
        .map_err(|e| EngineError::InvalidPrivateKey(e.to_string()))?;
    signing_key
        .verifying_key()
        .to_sec1_bytes()
        .as_ref()
        .try_into()
        .map_err(|_| EngineError::Derivation("unexpected public key length".into()))
}

/// Derive the address for a compressed public key and run the per-type
/// structural check; a failed check discards the key.
fn derive_checked_address(
    public_key: &[u8; 33],
    address_type: AddressType,
) -> Result<String, EngineError> {
    let addr = match address_type {
        AddressType::Segwit => address::p2wpkh_address(public_key)?,
        AddressType::Taproot => address::p2tr_address(public_key)?,
    };
    address::check_structure(&addr, address_type.script_kind())?;
    Ok(addr)
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("private key must be 32 bytes"))
    }
}
