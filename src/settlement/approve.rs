//! ERC20 allowance grants for staking contracts.

use alloy::primitives::{Address, TxHash, U256};
use alloy::sol_types::SolCall;
use std::sync::Arc;

use crate::blockchain::abi::{call_contract, IERC20};
use crate::blockchain::types::ChainConfig;
use crate::blockchain::{ChainRegistry, TxIntent, TxSubmitter};
use crate::config::ChainKind;
use crate::error::SettlementResult;
use crate::wallet::WalletHandle;

/// Grants token allowances from custodial wallets.
pub struct TokenApprover {
    registry: ChainRegistry,
    submitter: Arc<TxSubmitter>,
}

impl TokenApprover {
    pub fn new(registry: ChainRegistry, submitter: Arc<TxSubmitter>) -> Self {
        Self { registry, submitter }
    }

    /// Build the `approve(spender, amount)` transaction. `None` approves
    /// `uint256::MAX`.
    pub fn intent(
        &self,
        config: &ChainConfig,
        token: Address,
        spender: Address,
        amount: Option<U256>,
    ) -> TxIntent {
        let call = IERC20::approveCall {
            spender,
            value: amount.unwrap_or(U256::MAX),
        };
        TxIntent {
            to: token,
            value: U256::ZERO,
            input: call.abi_encode().into(),
            gas_limit: config.gas_limits.approve,
            label: "approve",
        }
    }

    /// Approve `spender` to move `amount` of `token` and wait for the receipt.
    ///
    /// Re-approving overwrites the previous allowance; every call costs a
    /// transaction.
    pub async fn approve(
        &self,
        chain: ChainKind,
        wallet: &WalletHandle,
        token: Address,
        spender: Address,
        amount: Option<U256>,
    ) -> SettlementResult<TxHash> {
        let client = self.registry.get(chain)?;
        let intent = self.intent(client.config(), token, spender, amount);
        let receipt = self
            .submitter
            .submit_and_confirm(client.as_ref(), wallet, intent)
            .await?;

        tracing::info!(
            chain = %chain,
            wallet = %wallet.address,
            token = %token,
            spender = %spender,
            unlimited = amount.is_none(),
            tx_hash = %receipt.tx_hash,
            "Allowance granted"
        );
        Ok(receipt.tx_hash)
    }

    /// Current allowance of `owner` towards `spender`.
    pub async fn allowance(
        &self,
        chain: ChainKind,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> SettlementResult<U256> {
        let client = self.registry.get(chain)?;
        Ok(call_contract(client.as_ref(), token, &IERC20::allowanceCall { owner, spender }).await?)
    }
}
