//! # crypto-utils
//!
//! Secure random generation and memory-safety utilities shared by the
//! wallet engine: entropy sourcing for mnemonics and wallet ids, and
//! zeroizing containers for seed material.

pub mod random;
pub mod zeroizing;

pub use random::{random_bytes, random_bytes_fixed, random_hex_id};
pub use zeroizing::SecretBytes;
