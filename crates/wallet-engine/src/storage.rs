//! Wallet-record storage collaborator.
//!
//! The engine consumes storage through [`WalletStore`] and never owns the
//! persistence mechanism. [`MemoryStore`] backs tests and hosts without a
//! platform store.

use std::sync::Mutex;

use thiserror::Error;

use crate::wallet::Wallet;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("storage record malformed: {0}")]
    Malformed(String),

    #[error("no wallet with id {0}")]
    NotFound(String),
}

/// Key-value wallet store keyed by wallet id.
pub trait WalletStore {
    fn load_wallets(&self) -> Result<Vec<Wallet>, StoreError>;

    /// Insert or overwrite a wallet record by id.
    fn save_wallet(&self, wallet: &Wallet) -> Result<(), StoreError>;

    fn delete_wallet(&self, id: &str) -> Result<(), StoreError>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    wallets: Mutex<Vec<Wallet>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WalletStore for MemoryStore {
    fn load_wallets(&self) -> Result<Vec<Wallet>, StoreError> {
        Ok(self.wallets.lock().expect("store poisoned").clone())
    }

    fn save_wallet(&self, wallet: &Wallet) -> Result<(), StoreError> {
        let mut wallets = self.wallets.lock().expect("store poisoned");
        match wallets.iter_mut().find(|w| w.id == wallet.id) {
            Some(existing) => *existing = wallet.clone(),
            None => wallets.push(wallet.clone()),
        }
        Ok(())
    }

    fn delete_wallet(&self, id: &str) -> Result<(), StoreError> {
        let mut wallets = self.wallets.lock().expect("store poisoned");
        let before = wallets.len();
        wallets.retain(|w| w.id != id);
        if wallets.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{derive_wallet_from_raw_key, AddressType, RawKeyNormalization};

    fn wallet(name: &str) -> Wallet {
        let key_hex = hex::encode([0xcd; 32]);
        derive_wallet_from_raw_key(&key_hex, name, AddressType::Segwit, RawKeyNormalization::Strict)
            .unwrap()
    }

    #[test]
    fn save_and_load_roundtrip() {
        let store = MemoryStore::new();
        let w = wallet("savings");
        store.save_wallet(&w).unwrap();

        let loaded = store.load_wallets().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, w.id);
        assert_eq!(loaded[0].address, w.address);
    }

    #[test]
    fn save_overwrites_by_id() {
        let store = MemoryStore::new();
        let mut w = wallet("old name");
        store.save_wallet(&w).unwrap();

        w.name = "new name".into();
        store.save_wallet(&w).unwrap();

        let loaded = store.load_wallets().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "new name");
    }

    #[test]
    fn delete_removes_only_the_named_wallet() {
        let store = MemoryStore::new();
        let keep = wallet("keep");
        let drop = wallet("drop");
        store.save_wallet(&keep).unwrap();
        store.save_wallet(&drop).unwrap();

        store.delete_wallet(&drop.id).unwrap();
        let loaded = store.load_wallets().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, keep.id);
    }

    #[test]
    fn delete_of_unknown_id_errors() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.delete_wallet("missing"),
            Err(StoreError::NotFound(_))
        ));
    }
}
