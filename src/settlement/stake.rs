//! Token contributions to project staking contracts.

use alloy::primitives::{Address, TxHash, U256};
use alloy::sol_types::SolCall;
use std::sync::Arc;

use crate::blockchain::abi::IProjectStaking;
use crate::blockchain::{ChainRegistry, TxIntent, TxSubmitter};
use crate::config::ChainKind;
use crate::error::{SettlementError, SettlementResult};
use crate::swap::token_balance;
use crate::wallet::WalletHandle;

/// Submits `contribute(amount)` calls to staking contracts.
///
/// The allowance is not checked here; a missing allowance surfaces as a
/// reverted transaction.
pub struct StakeExecutor {
    registry: ChainRegistry,
    submitter: Arc<TxSubmitter>,
}

impl StakeExecutor {
    pub fn new(registry: ChainRegistry, submitter: Arc<TxSubmitter>) -> Self {
        Self { registry, submitter }
    }

    /// Check the wallet holds `token_amount` of `token` and build the
    /// contribution transaction.
    pub async fn prepare(
        &self,
        chain: ChainKind,
        wallet: &WalletHandle,
        staking_contract: Address,
        token: Address,
        token_amount: U256,
    ) -> SettlementResult<TxIntent> {
        let client = self.registry.get(chain)?;

        let available = token_balance(client.as_ref(), token, wallet.address).await?;
        if available < token_amount {
            return Err(SettlementError::InsufficientBalance {
                asset: token.to_string(),
                needed: token_amount,
                available,
            });
        }

        let call = IProjectStaking::contributeCall {
            amount: token_amount,
        };
        Ok(TxIntent {
            to: staking_contract,
            value: U256::ZERO,
            input: call.abi_encode().into(),
            gas_limit: client.config().gas_limits.stake,
            label: "stake",
        })
    }

    /// Stake `token_amount` into `staking_contract` and wait for the receipt.
    pub async fn stake(
        &self,
        chain: ChainKind,
        wallet: &WalletHandle,
        staking_contract: Address,
        token: Address,
        token_amount: U256,
    ) -> SettlementResult<TxHash> {
        let intent = self
            .prepare(chain, wallet, staking_contract, token, token_amount)
            .await?;
        let client = self.registry.get(chain)?;
        let receipt = self
            .submitter
            .submit_and_confirm(client.as_ref(), wallet, intent)
            .await?;

        tracing::info!(
            chain = %chain,
            wallet = %wallet.address,
            staking_contract = %staking_contract,
            amount = %token_amount,
            tx_hash = %receipt.tx_hash,
            "Stake confirmed"
        );
        Ok(receipt.tx_hash)
    }
}
