use bip39::{Language, Mnemonic};
use zeroize::Zeroize;

use crypto_utils::SecretBytes;

use crate::error::EngineError;

/// Recovery phrases are always 12 words (128 bits of entropy).
pub const WORD_COUNT: usize = 12;

/// Generate a fresh 12-word BIP-39 mnemonic from OS entropy.
///
/// Fails only when the entropy cannot be encoded, which is fatal.
pub fn generate_mnemonic() -> Result<Vec<String>, EngineError> {
    let mut entropy: [u8; 16] = crypto_utils::random_bytes_fixed();
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| EngineError::InvalidMnemonic(e.to_string()))?;
    entropy.zeroize();
    Ok(mnemonic.words().map(str::to_string).collect())
}

/// Validate word count, wordlist membership, and checksum. Order matters:
/// the same words shuffled fail the checksum.
pub fn validate_mnemonic(words: &[String]) -> bool {
    if words.len() != WORD_COUNT {
        return false;
    }
    Mnemonic::parse_in_normalized(Language::English, &words.join(" ")).is_ok()
}

/// Stretch a validated mnemonic into the 64-byte BIP-39 seed (PBKDF2,
/// empty passphrase). The seed is returned in a zeroizing container.
pub fn words_to_seed(words: &[String]) -> Result<SecretBytes, EngineError> {
    if words.len() != WORD_COUNT {
        return Err(EngineError::InvalidMnemonic(format!(
            "expected {WORD_COUNT} words, got {}",
            words.len()
        )));
    }
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, &words.join(" "))
        .map_err(|e| EngineError::InvalidMnemonic(e.to_string()))?;
    Ok(SecretBytes::new(mnemonic.to_seed("").to_vec()))
}

/// The full BIP-39 word list, for presentation-layer autocomplete.
pub fn word_list() -> &'static [&'static str] {
    Language::English.word_list()
}

/// Whether a single word belongs to the BIP-39 word list.
pub fn is_valid_word(word: &str) -> bool {
    Language::English.find_word(word).is_some()
}
