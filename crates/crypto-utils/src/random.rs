use rand::RngCore;
use rand_core::OsRng;

/// Generates `len` cryptographically secure random bytes.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Generates a fixed-size array of cryptographically secure random bytes.
pub fn random_bytes_fixed<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Generates a random identifier of `n_bytes` entropy, hex-encoded.
///
/// Used for wallet ids, where collision resistance matters more than
/// readability.
pub fn random_hex_id(n_bytes: usize) -> String {
    hex::encode(random_bytes(n_bytes))
}
