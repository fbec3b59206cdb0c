//! DEX router integration: quotes and native → token swaps.

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::blockchain::abi::{call_contract, IDexRouter, IERC20};
use crate::blockchain::types::{ChainError, Receipt};
use crate::blockchain::{ChainRegistry, ChainRpc, TxIntent, TxSubmitter};
use crate::config::ChainKind;
use crate::error::{ErrorKind, SettlementError, SettlementResult};
use crate::swap::types::{PreparedSwap, Quote, SwapOutcome};
use crate::wallet::WalletHandle;

const DEFAULT_TOKEN_DECIMALS: u8 = 18;
const NATIVE_DECIMALS: u8 = 18;

/// Swaps native currency for project tokens through each chain's
/// UniswapV2-style router.
pub struct SwapRouter {
    registry: ChainRegistry,
    submitter: Arc<TxSubmitter>,
    default_slippage_bps: u16,
    deadline_secs: u64,
}

impl SwapRouter {
    pub fn new(
        registry: ChainRegistry,
        submitter: Arc<TxSubmitter>,
        default_slippage_bps: u16,
        deadline_secs: u64,
    ) -> Self {
        Self {
            registry,
            submitter,
            default_slippage_bps,
            deadline_secs,
        }
    }

    /// Quote `native_amount` of the chain's native currency into `token`.
    ///
    /// Read-only. A zero output means the pair has no usable liquidity.
    pub async fn quote(
        &self,
        chain: ChainKind,
        native_amount: U256,
        token: Address,
    ) -> SettlementResult<Quote> {
        if native_amount.is_zero() {
            return Err(SettlementError::InvalidQuote("native amount is zero".to_string()));
        }

        let client = self.registry.get(chain)?;
        let config = client.config();
        let call = IDexRouter::getAmountsOutCall {
            amountIn: native_amount,
            path: vec![config.wrapped_native, token],
        };
        let amounts = call_contract(client.as_ref(), config.dex_router, &call).await?;

        let token_out = amounts.last().copied().unwrap_or_default();
        if token_out.is_zero() {
            return Err(SettlementError::InvalidQuote(format!(
                "router returned no output for {} on {}",
                token, chain
            )));
        }

        let decimals = match call_contract(client.as_ref(), token, &IERC20::decimalsCall {}).await {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(token = %token, error = %e, "decimals() unreadable, assuming 18");
                DEFAULT_TOKEN_DECIMALS
            }
        };

        let quote = Quote {
            chain,
            token,
            native_in: native_amount,
            token_out,
            slippage_bps: 0,
            min_out: token_out,
            exchange_rate: exchange_rate(native_amount, token_out, decimals),
        }
        .with_slippage(self.default_slippage_bps);

        tracing::debug!(
            chain = %chain,
            token = %token,
            native_in = %native_amount,
            token_out = %token_out,
            "Swap quoted"
        );
        Ok(quote)
    }

    /// Quote and build the swap transaction without submitting it.
    ///
    /// Fails with `InsufficientBalance` when the wallet cannot cover
    /// `native_amount`.
    pub async fn prepare(
        &self,
        chain: ChainKind,
        wallet: &WalletHandle,
        native_amount: U256,
        token: Address,
        max_slippage_bps: u16,
    ) -> SettlementResult<PreparedSwap> {
        let client = self.registry.get(chain)?;
        let config = client.config();
        let quote = self
            .quote(chain, native_amount, token)
            .await?
            .with_slippage(max_slippage_bps);

        let available = client.get_balance(wallet.address).await?;
        if available < native_amount {
            return Err(SettlementError::InsufficientBalance {
                asset: config.native_symbol.clone(),
                needed: native_amount,
                available,
            });
        }

        let balance_before = token_balance(client.as_ref(), token, wallet.address).await?;

        let call = IDexRouter::swapExactETHForTokensCall {
            amountOutMin: quote.min_out,
            path: vec![config.wrapped_native, token],
            to: wallet.address,
            deadline: U256::from(unix_now() + self.deadline_secs),
        };

        Ok(PreparedSwap {
            quote,
            intent: TxIntent {
                to: config.dex_router,
                value: native_amount,
                input: call.abi_encode().into(),
                gas_limit: config.gas_limits.swap,
                label: "swap",
            },
            balance_before,
        })
    }

    /// Measure what a confirmed swap delivered and check it against the quote.
    pub async fn settle(
        &self,
        chain: ChainKind,
        wallet: &WalletHandle,
        quote: &Quote,
        balance_before: U256,
        receipt: &Receipt,
    ) -> SettlementResult<SwapOutcome> {
        let client = self.registry.get(chain)?;
        let balance_after = token_balance(client.as_ref(), quote.token, wallet.address).await?;
        let received = balance_after.saturating_sub(balance_before);

        if received < quote.min_out {
            return Err(SettlementError::SwapFailed {
                reason: format!(
                    "received {} tokens, below minimum {} ({} bps slippage)",
                    received, quote.min_out, quote.slippage_bps
                ),
                tx_hash: Some(receipt.tx_hash),
                cause: None,
            });
        }

        tracing::info!(
            chain = %chain,
            wallet = %wallet.address,
            tx_hash = %receipt.tx_hash,
            received = %received,
            quoted = %quote.token_out,
            "Swap confirmed"
        );

        Ok(SwapOutcome {
            tx_hash: receipt.tx_hash,
            token_amount_received: received,
            quote: quote.clone(),
        })
    }

    /// Quote, swap, wait for the receipt and measure the received amount.
    pub async fn execute(
        &self,
        chain: ChainKind,
        wallet: &WalletHandle,
        native_amount: U256,
        token: Address,
        max_slippage_bps: u16,
    ) -> SettlementResult<SwapOutcome> {
        let prepared = self
            .prepare(chain, wallet, native_amount, token, max_slippage_bps)
            .await?;
        let client = self.registry.get(chain)?;
        let receipt = self
            .submitter
            .submit_and_confirm(client.as_ref(), wallet, prepared.intent)
            .await
            .map_err(swap_failure)?;
        self.settle(chain, wallet, &prepared.quote, prepared.balance_before, &receipt)
            .await
    }
}

/// Wrap an on-chain revert of the swap as `SwapFailed`, keeping the revert
/// as the reported kind. Other errors pass through.
pub fn swap_failure(err: SettlementError) -> SettlementError {
    match err {
        SettlementError::Chain(e @ ChainError::TransactionReverted { .. }) => {
            SettlementError::SwapFailed {
                reason: e.to_string(),
                tx_hash: e.tx_hash(),
                cause: Some(ErrorKind::TransactionReverted),
            }
        }
        other => other,
    }
}

/// ERC20 balance of `owner`.
pub async fn token_balance(
    chain: &dyn ChainRpc,
    token: Address,
    owner: Address,
) -> SettlementResult<U256> {
    Ok(call_contract(chain, token, &IERC20::balanceOfCall { owner }).await?)
}

fn exchange_rate(native_in: U256, token_out: U256, decimals: u8) -> Option<Decimal> {
    let native = Decimal::from_str(&format_units(native_in, NATIVE_DECIMALS).ok()?).ok()?;
    let tokens = Decimal::from_str(&format_units(token_out, decimals).ok()?).ok()?;
    tokens.checked_div(native).map(|r| r.normalize())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
