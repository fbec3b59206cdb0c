//! Quote and swap outcome types.

use alloy::primitives::{Address, TxHash, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::blockchain::TxIntent;
use crate::config::ChainKind;

pub const BPS_DENOMINATOR: u64 = 10_000;

/// A router quote for swapping native currency into a project token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub chain: ChainKind,
    pub token: Address,
    /// Native amount in, wei.
    pub native_in: U256,
    /// Quoted token amount out, in token base units.
    pub token_out: U256,
    pub slippage_bps: u16,
    /// Minimum acceptable output after slippage.
    pub min_out: U256,
    /// Whole tokens per whole native unit.
    pub exchange_rate: Option<Decimal>,
}

impl Quote {
    /// Same quote with `min_out` recomputed for `slippage_bps`.
    pub fn with_slippage(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps;
        self.min_out = apply_slippage(self.token_out, slippage_bps);
        self
    }
}

/// `amount * (10000 - bps) / 10000`, rounding down. `bps` above 10000 is
/// treated as 10000.
pub fn apply_slippage(amount: U256, bps: u16) -> U256 {
    let bps = (bps as u64).min(BPS_DENOMINATOR);
    amount * U256::from(BPS_DENOMINATOR - bps) / U256::from(BPS_DENOMINATOR)
}

/// Result of a confirmed swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapOutcome {
    pub tx_hash: TxHash,
    /// Measured as the wallet's token balance delta across the swap.
    pub token_amount_received: U256,
    pub quote: Quote,
}

/// A swap ready for submission.
#[derive(Debug, Clone)]
pub struct PreparedSwap {
    pub quote: Quote,
    pub intent: TxIntent,
    /// Token balance before submission, for measuring the received amount.
    pub balance_before: U256,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_one_percent_slippage() {
        let quoted = U256::from(1000u64) * U256::from(10u64).pow(U256::from(18u64));
        let min = apply_slippage(quoted, 100);
        assert_eq!(min, U256::from(990u64) * U256::from(10u64).pow(U256::from(18u64)));
    }

    #[test]
    fn test_slippage_bounds() {
        assert_eq!(apply_slippage(U256::from(500u64), 0), U256::from(500u64));
        assert_eq!(apply_slippage(U256::from(500u64), 10_000), U256::ZERO);
        assert_eq!(apply_slippage(U256::from(500u64), u16::MAX), U256::ZERO);
    }

    proptest! {
        #[test]
        fn prop_min_out_within_slippage(amount in any::<u128>(), bps in 0u16..=10_000) {
            let amount = U256::from(amount);
            let min = apply_slippage(amount, bps);
            prop_assert!(min <= amount);
            // amount - min never exceeds the allowed fraction, rounded up by one unit.
            let allowed = amount * U256::from(bps) / U256::from(BPS_DENOMINATOR);
            prop_assert!(amount - min <= allowed + U256::from(1u8));
        }
    }
}
