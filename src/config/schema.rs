//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the settlement
//! service. All types derive Serde traits for deserialization from config files.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration for the settlement service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,

    /// Per-chain RPC and DEX settings.
    pub chains: Vec<ChainConfig>,

    /// Pipeline behaviour (slippage, deadlines, workers).
    pub settlement: SettlementConfig,

    /// Custodial wallet storage.
    pub wallet: WalletConfig,

    /// Fiat gateway checkout and callback settings.
    pub gateway: GatewayConfig,

    /// Projects that can receive stakes.
    pub projects: Vec<ProjectConfig>,

    /// Campaign ledger sink.
    pub ledger: LedgerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            chains: ChainKind::ALL.iter().map(|c| ChainConfig::preset(*c)).collect(),
            settlement: SettlementConfig::default(),
            wallet: WalletConfig::default(),
            gateway: GatewayConfig::default(),
            projects: Vec::new(),
            ledger: LedgerConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Look up the configuration of a chain.
    pub fn chain(&self, kind: ChainKind) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain == kind)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_size: 256 * 1024,
        }
    }
}

/// Supported settlement chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    #[serde(alias = "BSC")]
    Bsc,
    #[serde(alias = "eth", alias = "ETH")]
    Ethereum,
    #[serde(alias = "BASE")]
    Base,
}

impl ChainKind {
    pub const ALL: [ChainKind; 3] = [ChainKind::Bsc, ChainKind::Ethereum, ChainKind::Base];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::Bsc => "bsc",
            ChainKind::Ethereum => "ethereum",
            ChainKind::Base => "base",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bsc" | "bnb" => Ok(ChainKind::Bsc),
            "ethereum" | "eth" => Ok(ChainKind::Ethereum),
            "base" => Ok(ChainKind::Base),
            other => Err(format!("unknown chain '{}'", other)),
        }
    }
}

/// Gas limits per transaction type.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct GasLimits {
    pub swap: u64,
    pub approve: u64,
    pub stake: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            swap: 300_000,
            approve: 300_000,
            stake: 500_000,
        }
    }
}

/// Blockchain connection and DEX configuration for one chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Which chain this entry configures.
    pub chain: ChainKind,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// EIP-155 chain ID (56 for BSC, 1 for Ethereum, 8453 for Base).
    pub chain_id: u64,

    /// Native token symbol (BNB, ETH).
    pub native_symbol: String,

    /// Wrapped native token used as the first hop of swap paths.
    pub wrapped_native: Address,

    /// UniswapV2-compatible router.
    pub dex_router: Address,

    /// Block explorer base URL.
    pub explorer_url: String,

    /// Proof-of-authority / non-standard header chain.
    #[serde(default)]
    pub poa: bool,

    /// RPC request timeout in seconds.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    /// Base interval between receipt polls in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub receipt_poll_interval_ms: u64,

    /// Gas price multiplier (1.0 = node price, 1.1 = 10% buffer).
    #[serde(default = "default_gas_multiplier")]
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    #[serde(default = "default_max_gas_gwei")]
    pub max_gas_price_gwei: u64,

    #[serde(default)]
    pub gas_limits: GasLimits,
}

fn default_rpc_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    2_000
}

fn default_gas_multiplier() -> f64 {
    1.1
}

fn default_max_gas_gwei() -> u64 {
    300
}

impl ChainConfig {
    /// Mainnet defaults for a chain.
    pub fn preset(kind: ChainKind) -> Self {
        let (rpc_url, chain_id, native_symbol, wrapped_native, dex_router, explorer_url, poa) =
            match kind {
                ChainKind::Bsc => (
                    "https://bsc-dataseed.binance.org",
                    56,
                    "BNB",
                    address!("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"),
                    address!("0x10ED43C718714eb63d5aA57B78B54704E256024E"),
                    "https://bscscan.com",
                    true,
                ),
                ChainKind::Ethereum => (
                    "https://eth.llamarpc.com",
                    1,
                    "ETH",
                    address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
                    address!("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
                    "https://etherscan.io",
                    false,
                ),
                ChainKind::Base => (
                    "https://mainnet.base.org",
                    8453,
                    "ETH",
                    address!("0x4200000000000000000000000000000000000006"),
                    address!("0x4752ba5DBc23F44D41617B7d2713924549e8Cc01"),
                    "https://basescan.org",
                    true,
                ),
            };

        Self {
            chain: kind,
            rpc_url: rpc_url.to_string(),
            failover_urls: Vec::new(),
            chain_id,
            native_symbol: native_symbol.to_string(),
            wrapped_native,
            dex_router,
            explorer_url: explorer_url.to_string(),
            poa,
            rpc_timeout_secs: default_rpc_timeout(),
            receipt_poll_interval_ms: default_poll_interval(),
            gas_price_multiplier: default_gas_multiplier(),
            max_gas_price_gwei: default_max_gas_gwei(),
            gas_limits: GasLimits::default(),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Explorer link for a transaction hash.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

/// Allowance granted to the staking contract before staking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Approve exactly the swapped token amount.
    Exact,
    /// Approve `uint256::MAX` once per spender.
    Unlimited,
}

/// Settlement pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Maximum accepted swap slippage in basis points.
    pub max_slippage_bps: u16,

    /// Swap deadline relative to submission, in seconds.
    pub swap_deadline_secs: u64,

    /// Upper bound on waiting for a transaction receipt.
    pub receipt_timeout_secs: u64,

    pub approval: ApprovalMode,

    /// Concurrent settlement tasks.
    pub workers: usize,

    /// Pending settlement queue capacity.
    pub queue_capacity: usize,

    /// JSON file for settlement records. In-memory only when unset.
    pub store_path: Option<String>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_slippage_bps: 100,
            swap_deadline_secs: 20 * 60,
            receipt_timeout_secs: 90,
            approval: ApprovalMode::Exact,
            workers: 4,
            queue_capacity: 1024,
            store_path: None,
        }
    }
}

impl SettlementConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

/// Custodial wallet configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WalletConfig {
    /// JSON keystore path. Wallets are lost on restart when unset.
    pub keystore_path: Option<String>,

    /// Challenge message signed to prove wallet ownership.
    pub challenge_message: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keystore_path: None,
            challenge_message: "Sign to verify wallet ownership".to_string(),
        }
    }
}

/// Fiat payment gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway widget identifier.
    pub widget_id: String,

    /// Shared secret used to sign checkout URLs.
    /// Overridden by `SETTLEMENT_GATEWAY_SECRET`.
    pub secret_key: String,

    /// Base URL of the hosted checkout widget.
    pub checkout_base_url: String,

    pub fiat_currency: String,

    /// Chain whose native currency the gateway delivers.
    pub chain: ChainKind,

    /// Checkout session lifetime in seconds.
    pub session_ttl_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            widget_id: String::new(),
            secret_key: String::new(),
            checkout_base_url: "https://exchange.mercuryo.io".to_string(),
            fiat_currency: "USD".to_string(),
            chain: ChainKind::Bsc,
            session_ttl_secs: 30 * 60,
        }
    }
}

/// A project that accepts stakes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    pub id: u64,
    pub chain: ChainKind,
    pub token_address: Address,
    pub staking_contract: Address,
}

/// Campaign ledger sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Surrounding application's contribution webhook.
    /// Totals are kept in memory when unset.
    pub webhook_url: Option<String>,

    pub timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter, overridden by `RUST_LOG`.
    pub log_filter: String,

    /// Emit JSON log lines instead of human-readable output.
    pub json_logs: bool,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus listener address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "stake_settlement=info,tower_http=info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token for `/admin` routes. Overridden by `SETTLEMENT_ADMIN_KEY`.
    pub api_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chains() {
        let config = ServiceConfig::default();
        assert_eq!(config.chains.len(), 3);
        let bsc = config.chain(ChainKind::Bsc).unwrap();
        assert_eq!(bsc.chain_id, 56);
        assert!(bsc.poa);
        assert!(!config.chain(ChainKind::Ethereum).unwrap().poa);
        assert_eq!(config.settlement.max_slippage_bps, 100);
        assert_eq!(config.settlement.swap_deadline_secs, 1200);
    }

    #[test]
    fn test_parse_toml() {
        let raw = r#"
            [settlement]
            max_slippage_bps = 50
            approval = "unlimited"

            [[chains]]
            chain = "base"
            rpc_url = "http://localhost:8545"
            chain_id = 8453
            native_symbol = "ETH"
            wrapped_native = "0x4200000000000000000000000000000000000006"
            dex_router = "0x4752ba5DBc23F44D41617B7d2713924549e8Cc01"
            explorer_url = "https://basescan.org/"
            poa = true

            [[projects]]
            id = 7
            chain = "base"
            token_address = "0x1111111111111111111111111111111111111111"
            staking_contract = "0x2222222222222222222222222222222222222222"
        "#;
        let config: ServiceConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.settlement.approval, ApprovalMode::Unlimited);
        assert_eq!(config.settlement.receipt_timeout_secs, 90);
        let base = config.chain(ChainKind::Base).unwrap();
        assert_eq!(base.gas_limits.stake, 500_000);
        assert_eq!(base.explorer_tx_url("0xabc"), "https://basescan.org/tx/0xabc");
        assert_eq!(config.projects[0].id, 7);
    }

    #[test]
    fn test_chain_kind_from_str() {
        assert_eq!("BSC".parse::<ChainKind>().unwrap(), ChainKind::Bsc);
        assert_eq!("eth".parse::<ChainKind>().unwrap(), ChainKind::Ethereum);
        assert!("solana".parse::<ChainKind>().is_err());
    }
}
