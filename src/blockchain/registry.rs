//! Per-chain client registry.
//!
//! Built once at startup from the configured chains and shared by reference
//! with every settlement component.

use alloy::network::{AnyNetwork, Ethereum};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::blockchain::client::{ChainClient, ChainRpc};
use crate::blockchain::types::{ChainConfig, ChainError, ChainKind, ChainResult};
use crate::observability::metrics;

/// Reachability snapshot for one chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainHealth {
    pub chain: ChainKind,
    pub chain_id: u64,
    pub reachable: bool,
    pub block_number: Option<u64>,
}

/// Maps each configured chain to its RPC client.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    clients: HashMap<ChainKind, Arc<dyn ChainRpc>>,
}

impl ChainRegistry {
    /// Connect a client for every configured chain.
    ///
    /// Proof-of-authority chains get the lenient `AnyNetwork` decoding.
    pub async fn connect(chains: &[ChainConfig]) -> ChainResult<Self> {
        let mut clients: HashMap<ChainKind, Arc<dyn ChainRpc>> = HashMap::new();
        for config in chains {
            let client: Arc<dyn ChainRpc> = if config.poa {
                Arc::new(ChainClient::<AnyNetwork>::connect(config.clone()).await?)
            } else {
                Arc::new(ChainClient::<Ethereum>::connect(config.clone()).await?)
            };
            clients.insert(config.chain, client);
        }
        Ok(Self { clients })
    }

    /// Build a registry from ready-made clients.
    pub fn from_clients(clients: impl IntoIterator<Item = Arc<dyn ChainRpc>>) -> Self {
        Self {
            clients: clients.into_iter().map(|c| (c.kind(), c)).collect(),
        }
    }

    pub fn get(&self, chain: ChainKind) -> ChainResult<Arc<dyn ChainRpc>> {
        self.clients
            .get(&chain)
            .cloned()
            .ok_or(ChainError::UnsupportedChain(chain))
    }

    pub fn chains(&self) -> Vec<ChainKind> {
        let mut chains: Vec<ChainKind> = self.clients.keys().copied().collect();
        chains.sort_by_key(|c| c.as_str());
        chains
    }

    /// Probe every chain with `eth_blockNumber`.
    pub async fn health(&self) -> Vec<ChainHealth> {
        let mut report = Vec::with_capacity(self.clients.len());
        for chain in self.chains() {
            let Some(client) = self.clients.get(&chain) else {
                continue;
            };
            let block_number = client.block_number().await.ok();
            let reachable = block_number.is_some();
            metrics::record_chain_health(chain.as_str(), reachable);
            report.push(ChainHealth {
                chain,
                chain_id: client.config().chain_id,
                reachable,
                block_number,
            });
        }
        report
    }
}

impl std::fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRegistry")
            .field("chains", &self.chains())
            .finish()
    }
}
