//! Correlation tokens.
//!
//! The checkout embeds settlement metadata in the gateway's merchant
//! transaction id as `{usd}-{projectId}-{incentiveId|0}-{nonce}`; the callback
//! hands it back unchanged.

use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use crate::payments::types::CallbackError;

const NONCE_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationToken {
    pub usd_amount: Decimal,
    pub project_id: u64,
    pub incentive_id: Option<u64>,
    pub nonce: String,
}

impl CorrelationToken {
    /// New token with a random alphanumeric nonce.
    pub fn generate(usd_amount: Decimal, project_id: u64, incentive_id: Option<u64>) -> Self {
        let nonce = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        Self {
            usd_amount: usd_amount.normalize(),
            project_id,
            incentive_id: incentive_id.filter(|id| *id != 0),
            nonce,
        }
    }

    pub fn parse(token: &str) -> Result<Self, CallbackError> {
        let invalid = |reason: &str| CallbackError::InvalidCorrelationToken {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = token.split('-').collect();
        let [usd, project, incentive, nonce] = parts.as_slice() else {
            return Err(invalid("expected 4 dash-separated parts"));
        };

        let usd_amount = Decimal::from_str(usd).map_err(|_| invalid("amount is not a decimal"))?;
        if usd_amount <= Decimal::ZERO {
            return Err(invalid("amount must be positive"));
        }
        let project_id = project.parse::<u64>().map_err(|_| invalid("project id is not a number"))?;
        let incentive_id = incentive
            .parse::<u64>()
            .map_err(|_| invalid("incentive id is not a number"))?;
        if nonce.is_empty() || !nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("nonce must be alphanumeric"));
        }

        Ok(Self {
            usd_amount,
            project_id,
            incentive_id: (incentive_id != 0).then_some(incentive_id),
            nonce: nonce.to_string(),
        })
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.usd_amount,
            self.project_id,
            self.incentive_id.unwrap_or(0),
            self.nonce
        )
    }
}

impl FromStr for CorrelationToken {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
