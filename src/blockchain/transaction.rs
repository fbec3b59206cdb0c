//! Transaction pricing, signing, submission and confirmation.
//!
//! # Responsibilities
//! - Price transactions from the chain's gas price (ceiling + multiplier)
//! - Serialize nonce assignment per (wallet, chain) through submission
//! - Sign via the wallet store and broadcast through the chain client
//! - Wait for the receipt with the configured bound
//!
//! Submissions are never retried: a failed broadcast resets the local nonce
//! cursor and surfaces the error to the caller's stage.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::blockchain::client::ChainRpc;
use crate::blockchain::types::{ChainError, ChainKind, Receipt};
use crate::error::SettlementResult;
use crate::observability::metrics;
use crate::wallet::{UnsignedTx, WalletHandle, WalletStore};

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// What a stage wants executed on-chain.
#[derive(Debug, Clone)]
pub struct TxIntent {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    /// Operation label for logs and metrics (`swap`, `approve`, `stake`).
    pub label: &'static str,
}

/// Per-(wallet, chain) next-nonce cursors.
///
/// Each mutex is held from nonce acquisition until the broadcast returns, so
/// two submissions from the same wallet on the same chain never share a nonce.
#[derive(Default)]
pub struct NonceManager {
    cursors: DashMap<(Address, ChainKind), Arc<Mutex<Option<u64>>>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding the cursor for `(address, chain)`.
    pub fn lock_for(&self, address: Address, chain: ChainKind) -> Arc<Mutex<Option<u64>>> {
        self.cursors
            .entry((address, chain))
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Number of (wallet, chain) pairs with a cursor.
    pub fn tracked(&self) -> usize {
        self.cursors.len()
    }
}

/// A signed transaction waiting to be broadcast.
pub struct ReadyTx {
    pub hash: TxHash,
    pub nonce: u64,
    raw: Bytes,
    gas_price: u128,
    from: Address,
    label: &'static str,
    cursor: OwnedMutexGuard<Option<u64>>,
}

/// Signs and submits transactions for custodial wallets.
pub struct TxSubmitter {
    wallets: Arc<WalletStore>,
    nonces: NonceManager,
    receipt_timeout: Duration,
}

impl TxSubmitter {
    pub fn new(wallets: Arc<WalletStore>, receipt_timeout: Duration) -> Self {
        Self {
            wallets,
            nonces: NonceManager::new(),
            receipt_timeout,
        }
    }

    pub fn wallets(&self) -> &Arc<WalletStore> {
        &self.wallets
    }

    pub fn receipt_timeout(&self) -> Duration {
        self.receipt_timeout
    }

    /// Current gas price with the configured safety multiplier applied.
    ///
    /// Fails with `GasPriceTooHigh` when the network price exceeds the
    /// chain's ceiling.
    pub async fn gas_price(&self, chain: &dyn ChainRpc) -> Result<u128, ChainError> {
        let gas_price = chain.get_gas_price().await?;
        let gas_price_gwei = gas_price / WEI_PER_GWEI;

        let config = chain.config();
        if gas_price_gwei > config.max_gas_price_gwei as u128 {
            return Err(ChainError::GasPriceTooHigh {
                current_gwei: gas_price_gwei as u64,
                max_gwei: config.max_gas_price_gwei,
            });
        }

        Ok((gas_price as f64 * config.gas_price_multiplier) as u128)
    }

    /// Sign and broadcast `intent` from `wallet`. Returns once the node has
    /// accepted the transaction.
    pub async fn submit(
        &self,
        chain: &dyn ChainRpc,
        wallet: &WalletHandle,
        intent: TxIntent,
    ) -> SettlementResult<TxHash> {
        let signed = self.sign(chain, wallet, intent).await?;
        self.broadcast(chain, signed).await
    }

    /// Price, assign a nonce and sign `intent` without broadcasting it.
    ///
    /// The returned transaction holds the wallet's nonce lock until it is
    /// broadcast or dropped, so its hash can be recorded before it reaches
    /// the node.
    pub async fn sign(
        &self,
        chain: &dyn ChainRpc,
        wallet: &WalletHandle,
        intent: TxIntent,
    ) -> SettlementResult<ReadyTx> {
        let gas_price = self.gas_price(chain).await?;
        let kind = chain.kind();

        let cursor = self.nonces.lock_for(wallet.address, kind).lock_owned().await;
        let pending = chain.get_nonce(wallet.address).await?;
        let nonce = cursor.map_or(pending, |next| next.max(pending));

        let signed = self.wallets.sign(
            wallet,
            UnsignedTx {
                chain_id: chain.config().chain_id,
                nonce,
                gas_price,
                gas_limit: intent.gas_limit,
                to: intent.to,
                value: intent.value,
                input: intent.input,
            },
        )?;

        Ok(ReadyTx {
            hash: signed.hash,
            raw: signed.raw,
            nonce,
            gas_price,
            from: wallet.address,
            label: intent.label,
            cursor,
        })
    }

    /// Broadcast a transaction from [`TxSubmitter::sign`] and release its
    /// nonce lock.
    pub async fn broadcast(&self, chain: &dyn ChainRpc, tx: ReadyTx) -> SettlementResult<TxHash> {
        let ReadyTx {
            hash,
            raw,
            nonce,
            gas_price,
            from,
            label,
            mut cursor,
        } = tx;
        let kind = chain.kind();

        match chain.send_signed(raw).await {
            Ok(tx_hash) => {
                *cursor = Some(nonce + 1);
                if tx_hash != hash {
                    tracing::warn!(chain = %kind, expected = %hash, tx_hash = %tx_hash, "Node reported a different transaction hash");
                }
                metrics::record_tx_submitted(kind.as_str(), label);
                tracing::info!(
                    chain = %kind,
                    wallet = %from,
                    tx_hash = %tx_hash,
                    nonce,
                    gas_price,
                    operation = label,
                    "Transaction submitted"
                );
                Ok(tx_hash)
            }
            Err(e) => {
                // The node's pending count is authoritative again on next use.
                *cursor = None;
                Err(e.into())
            }
        }
    }

    /// Submit `intent` and wait for a successful receipt.
    ///
    /// The nonce lock is released before waiting, so other stages for the same
    /// wallet can be submitted while this one confirms.
    pub async fn submit_and_confirm(
        &self,
        chain: &dyn ChainRpc,
        wallet: &WalletHandle,
        intent: TxIntent,
    ) -> SettlementResult<Receipt> {
        let tx_hash = self.submit(chain, wallet, intent).await?;
        Ok(chain.wait_for_receipt(tx_hash, self.receipt_timeout).await?)
    }
}
