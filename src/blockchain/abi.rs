//! Contract interfaces used by the settlement pipeline.

use alloy::primitives::Address;
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::blockchain::client::ChainRpc;
use crate::blockchain::types::{ChainError, ChainResult};

sol! {
    /// UniswapV2-style router (PancakeSwap on BSC, Uniswap on Ethereum and Base).
    #[derive(Debug)]
    interface IDexRouter {
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
        function swapExactETHForTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
    }

    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
        function decimals() external view returns (uint8);
    }

    /// Project staking contract.
    #[derive(Debug)]
    interface IProjectStaking {
        function contribute(uint256 amount) external;
    }
}

/// Encode `call`, execute it as `eth_call` against `to` and decode the return value.
pub async fn call_contract<C>(chain: &dyn ChainRpc, to: Address, call: &C) -> ChainResult<C::Return>
where
    C: SolCall + Send + Sync,
{
    let output = chain.call(to, call.abi_encode().into()).await?;
    C::abi_decode_returns(&output).map_err(|e| {
        ChainError::Decode(format!("{} on {}: {}", C::SIGNATURE, to, e))
    })
}
