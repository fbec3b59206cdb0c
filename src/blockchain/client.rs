//! Blockchain RPC client with timeout and failover handling.
//!
//! # Responsibilities
//! - Connect to the JSON-RPC endpoints of one chain (primary + failovers)
//! - Query chain state (gas price, nonces, balances, contract calls)
//! - Broadcast pre-signed transactions and wait for receipts with a bound
//! - Decode blocks and receipts leniently on proof-of-authority chains
//!
//! The generic `ChainClient<N>` is instantiated with alloy's strict
//! `Ethereum` network for Ethereum and with `AnyNetwork` for chains whose
//! headers and receipts carry non-standard fields (BSC, Base).

use alloy::network::{Ethereum, Network, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::transports::TransportResult;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::blockchain::types::{ChainConfig, ChainError, ChainKind, ChainResult, Receipt};
use crate::observability::metrics;
use crate::resilience::poll_delay;

/// Uniform RPC primitives the settlement components need from a chain.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Static configuration of the chain this client talks to.
    fn config(&self) -> &ChainConfig;

    fn kind(&self) -> ChainKind {
        self.config().chain
    }

    async fn block_number(&self) -> ChainResult<u64>;

    /// Current gas price in wei.
    async fn get_gas_price(&self) -> ChainResult<u128>;

    /// Next nonce for `address`, counting transactions still in the mempool.
    async fn get_nonce(&self, address: Address) -> ChainResult<u64>;

    /// Native balance in wei.
    async fn get_balance(&self, address: Address) -> ChainResult<U256>;

    /// `eth_call` with raw calldata.
    async fn call(&self, to: Address, data: Bytes) -> ChainResult<Bytes>;

    /// Broadcast a signed, EIP-2718 encoded transaction.
    async fn send_signed(&self, raw: Bytes) -> ChainResult<TxHash>;

    async fn get_receipt(&self, tx_hash: TxHash) -> ChainResult<Option<Receipt>>;

    /// Poll for a receipt until it arrives or `wait` elapses.
    ///
    /// A failed receipt is `TransactionReverted`; no receipt in time is
    /// `ConfirmationTimeout`. RPC errors while polling are logged and polling
    /// continues, since the transaction has already been broadcast.
    async fn wait_for_receipt(&self, tx_hash: TxHash, wait: Duration) -> ChainResult<Receipt> {
        let started = Instant::now();
        let base = Duration::from_millis(self.config().receipt_poll_interval_ms);
        let max = base.saturating_mul(4);
        let chain = self.kind();
        let mut attempt = 0u32;

        loop {
            match self.get_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.success => return Ok(receipt),
                Ok(Some(receipt)) => {
                    let block = receipt
                        .block_number
                        .map(|b| b.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(ChainError::TransactionReverted {
                        tx_hash,
                        reason: format!(
                            "execution failed in block {} (gas used {})",
                            block, receipt.gas_used
                        ),
                    });
                }
                Ok(None) => {
                    tracing::debug!(chain = %chain, tx_hash = %tx_hash, attempt, "Transaction pending");
                }
                Err(e) => {
                    tracing::warn!(chain = %chain, tx_hash = %tx_hash, error = %e, "Receipt poll failed");
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= wait {
                return Err(ChainError::ConfirmationTimeout {
                    tx_hash,
                    waited_secs: wait.as_secs(),
                });
            }

            attempt += 1;
            tokio::time::sleep(poll_delay(attempt, base, max).min(wait - elapsed)).await;
        }
    }
}

/// Blockchain RPC client wrapper with failover support.
#[derive(Clone)]
pub struct ChainClient<N: Network = Ethereum> {
    /// List of providers (primary + failovers).
    providers: Vec<Arc<dyn Provider<N> + Send + Sync>>,
    config: ChainConfig,
    timeout_duration: Duration,
}

impl<N: Network> ChainClient<N> {
    /// Create a client for one chain.
    ///
    /// The chain ID reported by the endpoint is checked against the
    /// configuration; a mismatch or an unreachable endpoint is logged but does
    /// not fail construction.
    pub async fn connect(config: ChainConfig) -> ChainResult<Self> {
        let timeout_duration = config.rpc_timeout();
        let mut providers: Vec<Arc<dyn Provider<N> + Send + Sync>> = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Unavailable(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(RootProvider::<N>::new_http(primary_url)));

        for url_str in &config.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => providers.push(Arc::new(RootProvider::<N>::new_http(url))),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            providers,
            config,
            timeout_duration,
        };

        match client.verify_chain_id().await {
            Ok(()) => tracing::info!(
                chain = %client.config.chain,
                rpc_url = %client.config.rpc_url,
                chain_id = client.config.chain_id,
                poa = client.config.poa,
                "Chain client initialized"
            ),
            Err(e) => tracing::warn!(
                chain = %client.config.chain,
                error = %e,
                "Chain client initialized but chain verification failed"
            ),
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> ChainResult<()> {
        let actual = self
            .with_failover("eth_chainId", |p| async move { p.get_chain_id().await })
            .await?;
        if actual != self.config.chain_id {
            return Err(ChainError::ChainMismatch {
                expected: self.config.chain_id,
                actual,
            });
        }
        Ok(())
    }

    /// Run `op` against each provider in turn until one answers in time.
    async fn with_failover<T, F, Fut>(&self, method: &'static str, op: F) -> ChainResult<T>
    where
        F: Fn(Arc<dyn Provider<N> + Send + Sync>) -> Fut + Send + Sync,
        Fut: Future<Output = TransportResult<T>> + Send,
        T: Send,
    {
        let chain = self.config.chain;
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, op(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    metrics::record_rpc_error(chain.as_str(), method);
                    tracing::warn!(chain = %chain, provider_idx = i, method, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    metrics::record_rpc_error(chain.as_str(), method);
                    tracing::warn!(chain = %chain, provider_idx = i, method, "RPC timeout, trying next provider");
                }
            }
        }
        Err(ChainError::Unavailable(format!(
            "all RPC providers for {} failed on {}",
            chain, method
        )))
    }
}

#[async_trait]
impl<N: Network> ChainRpc for ChainClient<N> {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.with_failover("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
    }

    async fn get_gas_price(&self) -> ChainResult<u128> {
        self.with_failover("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn get_nonce(&self, address: Address) -> ChainResult<u64> {
        self.with_failover("eth_getTransactionCount", move |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn get_balance(&self, address: Address) -> ChainResult<U256> {
        self.with_failover("eth_getBalance", move |p| async move {
            p.get_balance(address).await
        })
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> ChainResult<Bytes> {
        let request = N::TransactionRequest::default().with_to(to).with_input(data);
        self.with_failover("eth_call", move |p| {
            let request = request.clone();
            async move { p.call(request).await }
        })
        .await
    }

    async fn send_signed(&self, raw: Bytes) -> ChainResult<TxHash> {
        let chain = self.config.chain;
        let mut last_error = None;
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.send_raw_transaction(&raw)).await {
                Ok(Ok(pending)) => return Ok(*pending.tx_hash()),
                Ok(Err(e)) => {
                    let message = e.to_string();
                    // A failover node may already have the transaction from an
                    // earlier attempt that timed out on our side.
                    if message.contains("already known") || message.contains("known transaction") {
                        return Ok(keccak256(&raw));
                    }
                    metrics::record_rpc_error(chain.as_str(), "eth_sendRawTransaction");
                    tracing::warn!(chain = %chain, provider_idx = i, error = %message, "Broadcast failed");
                    last_error = Some(message);
                }
                Err(_) => {
                    metrics::record_rpc_error(chain.as_str(), "eth_sendRawTransaction");
                    tracing::warn!(chain = %chain, provider_idx = i, "Broadcast timed out");
                    last_error = Some("timeout".to_string());
                }
            }
        }
        Err(ChainError::Unavailable(format!(
            "broadcast on {} failed: {}",
            chain,
            last_error.unwrap_or_else(|| "no providers".to_string())
        )))
    }

    async fn get_receipt(&self, tx_hash: TxHash) -> ChainResult<Option<Receipt>> {
        self.with_failover("eth_getTransactionReceipt", move |p| async move {
            p.get_transaction_receipt(tx_hash).await.map(|receipt| {
                receipt.map(|r| Receipt {
                    tx_hash: r.transaction_hash(),
                    block_number: r.block_number(),
                    success: r.status(),
                    gas_used: r.gas_used(),
                })
            })
        })
        .await
    }
}

impl<N: Network> std::fmt::Debug for ChainClient<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("chain", &self.config.chain)
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("providers", &self.providers.len())
            .finish()
    }
}
