//! Fiat gateway callback and checkout types.

use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Callback body. The gateway delivers either `{payload:{data:{..}}}` or
/// `{data:{..}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CallbackEnvelope {
    Wrapped { payload: DataEnvelope },
    Direct(DataEnvelope),
}

impl CallbackEnvelope {
    pub fn into_data(self) -> CallbackData {
        match self {
            CallbackEnvelope::Wrapped { payload } => payload.data,
            CallbackEnvelope::Direct(envelope) => envelope.data,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope {
    pub data: CallbackData,
}

/// Payment notification fields. Only `status` is required for every status.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackData {
    pub status: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub merchant_transaction_id: Option<String>,
    /// Native currency delivered, as a decimal string or number.
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub tx: Option<CallbackTx>,
    #[serde(default)]
    pub user: Option<CallbackUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackTx {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackUser {
    #[serde(default)]
    pub email: Option<String>,
}

/// Response to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackAck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_id: Option<Uuid>,
}

/// Checkout request from the contribution flow.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub email: String,
    pub usd_amount: Decimal,
    pub project_id: u64,
    #[serde(default)]
    pub incentive_id: Option<u64>,
    pub redirect_url: String,
}

/// A gateway checkout session.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub session_id: Uuid,
    pub checkout_url: String,
    pub wallet_address: Address,
    pub correlation_token: String,
    pub expires_at: u64,
}

/// Callback and checkout failures. Everything except `Settlement` is the
/// caller's fault.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid correlation token '{token}': {reason}")]
    InvalidCorrelationToken { token: String, reason: String },

    #[error("unknown project {0}")]
    UnknownProject(u64),

    #[error("no custodial wallet for {0}")]
    UnknownWallet(String),

    #[error("invalid checkout request: {0}")]
    InvalidRequest(String),

    /// The settlement could not be recorded. Details stay in the logs.
    #[error("settlement could not be recorded")]
    Settlement(String),
}

impl CallbackError {
    pub fn code(&self) -> &'static str {
        match self {
            CallbackError::Malformed(_) => "malformed_payload",
            CallbackError::MissingField(_) => "missing_field",
            CallbackError::InvalidCorrelationToken { .. } => "invalid_correlation_token",
            CallbackError::UnknownProject(_) => "unknown_project",
            CallbackError::UnknownWallet(_) => "unknown_wallet",
            CallbackError::InvalidRequest(_) => "invalid_request",
            CallbackError::Settlement(_) => "settlement_unavailable",
        }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self, CallbackError::Settlement(_))
    }
}
