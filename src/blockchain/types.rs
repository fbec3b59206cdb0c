//! Chain-specific types and error definitions.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::schema::{ChainConfig, ChainKind};

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC endpoint unreachable, timed out or returned a transport error.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    /// The transaction was mined with a failure status.
    #[error("transaction {tx_hash} reverted: {reason}")]
    TransactionReverted { tx_hash: TxHash, reason: String },

    /// No receipt within the wait budget. The transaction may still confirm.
    #[error("transaction {tx_hash} not confirmed after {waited_secs} seconds")]
    ConfirmationTimeout { tx_hash: TxHash, waited_secs: u64 },

    /// Gas price exceeded maximum allowed.
    #[error("gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// No client is registered for the chain.
    #[error("chain '{0}' is not configured")]
    UnsupportedChain(ChainKind),

    /// Contract return data could not be decoded.
    #[error("failed to decode contract response: {0}")]
    Decode(String),
}

impl ChainError {
    /// Whether the same operation can be attempted again without risking a
    /// duplicate on-chain effect.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Unavailable(_) | ChainError::GasPriceTooHigh { .. })
    }

    /// Hash of the submitted transaction, when one exists.
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            ChainError::TransactionReverted { tx_hash, .. }
            | ChainError::ConfirmationTimeout { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

/// Result type for blockchain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Network-independent view of a transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    /// `true` when the transaction executed successfully.
    pub success: bool,
    pub gas_used: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChainError::GasPriceTooHigh {
            current_gwei: 600,
            max_gwei: 500,
        };
        assert!(err.to_string().contains("600"));

        let err = ChainError::UnsupportedChain(ChainKind::Base);
        assert_eq!(err.to_string(), "chain 'base' is not configured");
    }

    #[test]
    fn test_retryable_and_hash() {
        assert!(ChainError::Unavailable("boom".into()).is_retryable());
        let reverted = ChainError::TransactionReverted {
            tx_hash: TxHash::repeat_byte(7),
            reason: "status 0".into(),
        };
        assert!(!reverted.is_retryable());
        assert_eq!(reverted.tx_hash(), Some(TxHash::repeat_byte(7)));
        let timeout = ChainError::ConfirmationTimeout {
            tx_hash: TxHash::repeat_byte(8),
            waited_secs: 90,
        };
        assert!(!timeout.is_retryable());
        assert_eq!(timeout.tx_hash(), Some(TxHash::repeat_byte(8)));
    }
}
