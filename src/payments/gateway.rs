//! Fiat gateway adapter: checkout sessions out, payment callbacks in.

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::observability::metrics;
use crate::payments::catalog::ProjectCatalog;
use crate::payments::checkout::{checkout_url, CheckoutParams};
use crate::payments::correlation::CorrelationToken;
use crate::payments::types::{
    CallbackAck, CallbackEnvelope, CallbackError, CheckoutRequest, CheckoutSession,
};
use crate::settlement::types::unix_now;
use crate::settlement::{NewSettlement, SettlementPipeline};
use crate::wallet::WalletHandle;

const COMPLETED: &str = "completed";

pub struct PaymentGatewayAdapter {
    pipeline: Arc<SettlementPipeline>,
    catalog: Arc<dyn ProjectCatalog>,
    config: GatewayConfig,
}

impl PaymentGatewayAdapter {
    pub fn new(
        pipeline: Arc<SettlementPipeline>,
        catalog: Arc<dyn ProjectCatalog>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            pipeline,
            catalog,
            config,
        }
    }

    /// Handle a payment notification.
    ///
    /// Non-completed statuses are acknowledged and ignored; the gateway sends
    /// another callback on completion. A completed payment starts a
    /// settlement and is acknowledged with its id. How the settlement later
    /// fares is not reported here.
    pub async fn handle_callback(&self, payload: serde_json::Value) -> Result<CallbackAck, CallbackError> {
        let envelope: CallbackEnvelope = serde_json::from_value(payload).map_err(|e| {
            CallbackError::Malformed(format!("expected {{payload:{{data}}}} or {{data}}: {}", e))
        })?;
        let data = envelope.into_data();
        let status = data.status.trim().to_lowercase();
        metrics::record_callback(&status);

        if status != COMPLETED {
            tracing::info!(
                status = %status,
                gateway_id = ?data.id,
                "Payment not completed yet, acknowledged"
            );
            return Ok(CallbackAck {
                status,
                settlement_id: None,
            });
        }

        let token_str = data
            .merchant_transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(CallbackError::MissingField("merchant_transaction_id"))?;
        let token = CorrelationToken::parse(token_str)?;

        let native_amount = parse_native_amount(data.amount.as_ref())?;

        let address_str = data
            .tx
            .as_ref()
            .and_then(|tx| tx.address.as_deref())
            .ok_or(CallbackError::MissingField("tx.address"))?;
        let address: Address = address_str
            .trim()
            .parse()
            .map_err(|_| CallbackError::Malformed(format!("tx.address '{}' is not an address", address_str)))?;

        let email = data
            .user
            .and_then(|u| u.email)
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        let project = self
            .catalog
            .project(token.project_id)
            .await
            .ok_or(CallbackError::UnknownProject(token.project_id))?;

        let wallet = self.resolve_wallet(address)?;

        let request = self
            .pipeline
            .start(NewSettlement {
                correlation_token: token_str.to_string(),
                usd_amount: token.usd_amount,
                native_amount,
                chain: project.chain,
                project_id: project.id,
                incentive_id: token.incentive_id,
                token_address: project.token_address,
                staking_contract: project.staking_contract,
                wallet,
                contributor_email: email,
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, correlation_token = %token_str, "Failed to record settlement");
                CallbackError::Settlement(e.to_string())
            })?;

        Ok(CallbackAck {
            status,
            settlement_id: Some(request.id),
        })
    }

    fn resolve_wallet(&self, address: Address) -> Result<WalletHandle, CallbackError> {
        self.pipeline
            .wallets()
            .get(&address.to_string())
            .map_err(|_| CallbackError::UnknownWallet(address.to_string()))
    }

    /// Open a checkout session for a contribution.
    ///
    /// Creates the contributor's custodial wallet on first use and embeds the
    /// settlement metadata in the correlation token.
    pub async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, CallbackError> {
        let email = request.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(CallbackError::InvalidRequest("email is required".to_string()));
        }
        if request.usd_amount <= Decimal::ZERO {
            return Err(CallbackError::InvalidRequest("usd_amount must be positive".to_string()));
        }
        Url::parse(&request.redirect_url)
            .map_err(|e| CallbackError::InvalidRequest(format!("redirect_url: {}", e)))?;

        let project = self
            .catalog
            .project(request.project_id)
            .await
            .ok_or(CallbackError::UnknownProject(request.project_id))?;
        if project.chain != self.config.chain {
            return Err(CallbackError::InvalidRequest(format!(
                "project {} settles on {}, gateway delivers on {}",
                project.id, project.chain, self.config.chain
            )));
        }

        let chain = self
            .pipeline
            .registry()
            .get(project.chain)
            .map_err(|e| CallbackError::Settlement(e.to_string()))?;
        let wallet = self
            .pipeline
            .wallets()
            .get_or_create(email)
            .map_err(|e| CallbackError::Settlement(e.to_string()))?;

        let token = CorrelationToken::generate(request.usd_amount, project.id, request.incentive_id);
        let token_str = token.to_string();
        let checkout_url = checkout_url(
            &self.config,
            &CheckoutParams {
                address: wallet.address,
                fiat_amount: token.usd_amount,
                currency: &chain.config().native_symbol,
                email,
                redirect_url: &request.redirect_url,
                correlation_token: &token_str,
            },
        )?;

        let session = CheckoutSession {
            session_id: Uuid::new_v4(),
            checkout_url,
            wallet_address: wallet.address,
            correlation_token: token_str,
            expires_at: unix_now() + self.config.session_ttl_secs,
        };
        tracing::info!(
            session_id = %session.session_id,
            project_id = project.id,
            wallet = %wallet.address,
            "Checkout session created"
        );
        Ok(session)
    }
}

/// Parse the delivered native amount (whole units, string or number) to wei.
fn parse_native_amount(amount: Option<&serde_json::Value>) -> Result<U256, CallbackError> {
    let text = match amount {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(CallbackError::Malformed(format!("amount has unexpected type: {}", other)))
        }
        None => return Err(CallbackError::MissingField("amount")),
    };

    if text.starts_with('-') {
        return Err(CallbackError::Malformed(format!("amount '{}' is negative", text)));
    }
    let wei = parse_ether(&text)
        .map_err(|e| CallbackError::Malformed(format!("amount '{}': {}", text, e)))?;
    if wei.is_zero() {
        return Err(CallbackError::Malformed("amount must be positive".to_string()));
    }
    Ok(wei)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_native_amount_forms() {
        let expected = parse_ether("0.02").unwrap();
        assert_eq!(parse_native_amount(Some(&json!("0.02"))).unwrap(), expected);
        assert_eq!(parse_native_amount(Some(&json!(0.02))).unwrap(), expected);
        assert_eq!(parse_native_amount(Some(&json!(" 1 "))).unwrap(), parse_ether("1").unwrap());
    }

    #[test]
    fn test_native_amount_rejects() {
        assert!(matches!(parse_native_amount(None), Err(CallbackError::MissingField("amount"))));
        assert!(parse_native_amount(Some(&json!("abc"))).is_err());
        assert!(parse_native_amount(Some(&json!("0"))).is_err());
        assert!(parse_native_amount(Some(&json!("-1"))).is_err());
        assert!(parse_native_amount(Some(&json!(true))).is_err());
    }
}
