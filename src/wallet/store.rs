//! Custodial wallet storage and transaction signing.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::WalletConfig;
use crate::wallet::ownership::verify_signature;

/// Errors raised by the wallet store.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet not found: {0}")]
    NotFound(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("keystore persistence failed: {0}")]
    Persistence(String),
}

/// Reference to a custodial wallet. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletHandle {
    pub identifier: String,
    pub address: Address,
}

/// A legacy (gas price) transaction ready for signing.
#[derive(Debug, Clone)]
pub struct UnsignedTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

/// EIP-2718 encoded signed transaction.
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub hash: TxHash,
    pub raw: Bytes,
}

struct WalletEntry {
    address: Address,
    signer: PrivateKeySigner,
}

#[derive(Serialize, Deserialize)]
struct KeystoreRecord {
    identifier: String,
    address: Address,
    private_key: B256,
}

#[derive(Serialize, Deserialize, Default)]
struct KeystoreFile {
    wallets: Vec<KeystoreRecord>,
}

/// Thread-safe store of custodial wallets, keyed by identifier.
pub struct WalletStore {
    by_identifier: DashMap<String, Arc<WalletEntry>>,
    by_address: DashMap<Address, String>,
    /// Serializes creation and keystore writes.
    create_lock: Mutex<()>,
    keystore_path: Option<PathBuf>,
    challenge_message: String,
}

impl WalletStore {
    /// Create an empty, memory-only store.
    pub fn new(challenge_message: impl Into<String>) -> Self {
        Self {
            by_identifier: DashMap::new(),
            by_address: DashMap::new(),
            create_lock: Mutex::new(()),
            keystore_path: None,
            challenge_message: challenge_message.into(),
        }
    }

    /// Build the store from configuration, loading the keystore file if present.
    pub fn from_config(config: &WalletConfig) -> Result<Self, WalletError> {
        let mut store = Self::new(config.challenge_message.clone());
        if let Some(path) = &config.keystore_path {
            store.keystore_path = Some(PathBuf::from(path));
            store.load(Path::new(path))?;
        }
        Ok(store)
    }

    fn load(&self, path: &Path) -> Result<(), WalletError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Keystore not found, starting empty");
            return Ok(());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| WalletError::Persistence(format!("read {}: {}", path.display(), e)))?;
        let file: KeystoreFile = serde_json::from_str(&content)
            .map_err(|e| WalletError::Persistence(format!("parse {}: {}", path.display(), e)))?;

        for record in file.wallets {
            let signer = PrivateKeySigner::from_bytes(&record.private_key)
                .map_err(|e| WalletError::InvalidKey(format!("{}: {}", record.address, e)))?;
            if signer.address() != record.address {
                return Err(WalletError::InvalidKey(format!(
                    "key for {} derives a different address",
                    record.address
                )));
            }
            self.insert(record.identifier, signer);
        }

        tracing::info!(wallets = self.by_identifier.len(), "Loaded custodial wallets");
        Ok(())
    }

    fn insert(&self, identifier: String, signer: PrivateKeySigner) -> Arc<WalletEntry> {
        let entry = Arc::new(WalletEntry {
            address: signer.address(),
            signer,
        });
        self.by_address.insert(entry.address, identifier.clone());
        self.by_identifier.insert(identifier, entry.clone());
        entry
    }

    /// Return the wallet for `identifier`, creating it on first use.
    ///
    /// A `0x` address identifier is only looked up, never created.
    pub fn get_or_create(&self, identifier: &str) -> Result<WalletHandle, WalletError> {
        if is_address_identifier(identifier) {
            return self.get(identifier);
        }

        let key = normalize(identifier);
        if let Some(entry) = self.by_identifier.get(&key) {
            return Ok(handle(&key, &entry));
        }

        let _guard = self.create_lock.lock().unwrap_or_else(|p| p.into_inner());
        // Another caller may have created it while we waited.
        if let Some(entry) = self.by_identifier.get(&key) {
            return Ok(handle(&key, &entry));
        }

        let signer = generate_signer()?;
        let entry = self.insert(key.clone(), signer);

        if let Err(e) = self.persist() {
            self.by_identifier.remove(&key);
            self.by_address.remove(&entry.address);
            return Err(e);
        }

        tracing::info!(address = %entry.address, "Created custodial wallet");
        Ok(handle(&key, &entry))
    }

    /// Look up an existing wallet by identifier or address.
    pub fn get(&self, identifier: &str) -> Result<WalletHandle, WalletError> {
        if is_address_identifier(identifier) {
            let address: Address = identifier
                .parse()
                .map_err(|_| WalletError::NotFound(identifier.to_string()))?;
            let key = self
                .by_address
                .get(&address)
                .map(|r| r.value().clone())
                .ok_or_else(|| WalletError::NotFound(identifier.to_string()))?;
            return self.get(&key);
        }

        let key = normalize(identifier);
        self.by_identifier
            .get(&key)
            .map(|entry| handle(&key, &entry))
            .ok_or_else(|| WalletError::NotFound(identifier.to_string()))
    }

    /// Sign a legacy EIP-155 transaction with the wallet's key.
    pub fn sign(&self, wallet: &WalletHandle, tx: UnsignedTx) -> Result<SignedTx, WalletError> {
        let entry = self
            .by_identifier
            .get(&wallet.identifier)
            .map(|r| r.value().clone())
            .ok_or_else(|| WalletError::NotFound(wallet.identifier.clone()))?;

        let mut legacy = TxLegacy {
            chain_id: Some(tx.chain_id),
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: TxKind::Call(tx.to),
            value: tx.value,
            input: tx.input,
        };

        let signature = entry
            .signer
            .sign_transaction_sync(&mut legacy)
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        let signed = legacy.into_signed(signature);
        let hash = *signed.hash();
        let raw = TxEnvelope::from(signed).encoded_2718();

        Ok(SignedTx {
            hash,
            raw: raw.into(),
        })
    }

    /// Verify an ownership signature over the configured challenge message.
    pub fn verify_ownership(&self, address: Address, signature_hex: &str) -> bool {
        verify_signature(address, signature_hex, &self.challenge_message)
    }

    pub fn challenge_message(&self) -> &str {
        &self.challenge_message
    }

    pub fn len(&self) -> usize {
        self.by_identifier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identifier.is_empty()
    }

    /// Write all wallets to the keystore file. Caller holds `create_lock`.
    fn persist(&self) -> Result<(), WalletError> {
        let Some(path) = &self.keystore_path else {
            return Ok(());
        };

        let mut wallets: Vec<KeystoreRecord> = self
            .by_identifier
            .iter()
            .map(|r| KeystoreRecord {
                identifier: r.key().clone(),
                address: r.value().address,
                private_key: r.value().signer.to_bytes(),
            })
            .collect();
        wallets.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        let json = serde_json::to_vec_pretty(&KeystoreFile { wallets })
            .map_err(|e| WalletError::Persistence(e.to_string()))?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, path))
            .map_err(|e| WalletError::Persistence(format!("write {}: {}", path.display(), e)))
    }
}

impl std::fmt::Debug for WalletStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletStore")
            .field("wallets", &self.by_identifier.len())
            .field("keystore_path", &self.keystore_path)
            .finish()
    }
}

fn is_address_identifier(identifier: &str) -> bool {
    let s = identifier.trim();
    s.len() == 42 && (s.starts_with("0x") || s.starts_with("0X"))
}

fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

fn handle(identifier: &str, entry: &WalletEntry) -> WalletHandle {
    WalletHandle {
        identifier: identifier.to_string(),
        address: entry.address,
    }
}

fn generate_signer() -> Result<PrivateKeySigner, WalletError> {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    PrivateKeySigner::from_bytes(&B256::from(bytes)).map_err(|e| WalletError::InvalidKey(e.to_string()))
}
