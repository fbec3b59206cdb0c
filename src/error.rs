//! Settlement error taxonomy.
//!
//! Component errors (`ChainError`, `WalletError`) are wrapped in
//! `SettlementError`. Every error maps to a serializable `ErrorKind`, which is
//! what gets persisted on a failed request and shown to operators.

use alloy::primitives::{TxHash, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::types::ChainError;
use crate::settlement::types::Stage;
use crate::wallet::WalletError;

/// Persisted classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ChainUnavailable,
    TransactionReverted,
    ConfirmationTimeout,
    InsufficientBalance,
    WalletNotFound,
    InvalidQuote,
    SwapFailed,
    GasPriceTooHigh,
    Interrupted,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ChainUnavailable => "ChainUnavailable",
            ErrorKind::TransactionReverted => "TransactionReverted",
            ErrorKind::ConfirmationTimeout => "ConfirmationTimeout",
            ErrorKind::InsufficientBalance => "InsufficientBalance",
            ErrorKind::WalletNotFound => "WalletNotFound",
            ErrorKind::InvalidQuote => "InvalidQuote",
            ErrorKind::SwapFailed => "SwapFailed",
            ErrorKind::GasPriceTooHigh => "GasPriceTooHigh",
            ErrorKind::Interrupted => "Interrupted",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the settlement components and pipeline.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Pre-flight balance check failed.
    #[error("insufficient {asset} balance: need {needed}, have {available}")]
    InsufficientBalance {
        asset: String,
        needed: U256,
        available: U256,
    },

    /// The router quoted nothing for the path.
    #[error("invalid quote: {0}")]
    InvalidQuote(String),

    /// The swap did not produce an acceptable output. `cause` carries the
    /// kind of the underlying failure when there was one.
    #[error("swap failed: {reason}")]
    SwapFailed {
        reason: String,
        tx_hash: Option<TxHash>,
        cause: Option<ErrorKind>,
    },

    #[error("settlement {0} not found")]
    RequestNotFound(Uuid),

    #[error("invalid stage transition {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("settlement {id} cannot be resumed: {reason}")]
    NotResumable { id: Uuid, reason: String },

    #[error("settlement {0} is already running")]
    AlreadyRunning(Uuid),

    /// The process stopped while a stage transaction may have been in flight.
    #[error("interrupted during {0}; on-chain state must be reconciled")]
    Interrupted(Stage),

    #[error("settlement store error: {0}")]
    Persistence(String),

    #[error("campaign ledger error: {0}")]
    Ledger(String),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Chain(e) => match e {
                ChainError::Unavailable(_) => ErrorKind::ChainUnavailable,
                ChainError::TransactionReverted { .. } => ErrorKind::TransactionReverted,
                ChainError::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
                ChainError::GasPriceTooHigh { .. } => ErrorKind::GasPriceTooHigh,
                ChainError::ChainMismatch { .. }
                | ChainError::UnsupportedChain(_)
                | ChainError::Decode(_) => ErrorKind::Internal,
            },
            SettlementError::Wallet(WalletError::NotFound(_)) => ErrorKind::WalletNotFound,
            SettlementError::Wallet(_) => ErrorKind::Internal,
            SettlementError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            SettlementError::InvalidQuote(_) => ErrorKind::InvalidQuote,
            SettlementError::SwapFailed { cause, .. } => cause.unwrap_or(ErrorKind::SwapFailed),
            SettlementError::Interrupted(_) => ErrorKind::Interrupted,
            SettlementError::RequestNotFound(_)
            | SettlementError::InvalidTransition { .. }
            | SettlementError::NotResumable { .. }
            | SettlementError::AlreadyRunning(_)
            | SettlementError::Persistence(_)
            | SettlementError::Ledger(_) => ErrorKind::Internal,
        }
    }

    /// Hash of the transaction involved in the failure, if any.
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            SettlementError::Chain(e) => e.tx_hash(),
            SettlementError::SwapFailed { tx_hash, .. } => *tx_hash,
            _ => None,
        }
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;
