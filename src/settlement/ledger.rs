//! Campaign ledger sinks.
//!
//! The ledger lives in the surrounding application. A completed settlement
//! increments the project's raised amount and donor count exactly once.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;

use crate::error::{SettlementError, SettlementResult};

/// Receives completed contributions.
#[async_trait]
pub trait CampaignLedger: Send + Sync {
    /// Atomically add `usd_amount` and one donor to `project_id`.
    async fn record_contribution(&self, project_id: u64, usd_amount: Decimal) -> SettlementResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CampaignTotals {
    pub raised_usd: Decimal,
    pub donors: u64,
}

/// Process-local ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    totals: DashMap<u64, CampaignTotals>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self, project_id: u64) -> Option<CampaignTotals> {
        self.totals.get(&project_id).map(|t| t.value().clone())
    }
}

#[async_trait]
impl CampaignLedger for InMemoryLedger {
    async fn record_contribution(&self, project_id: u64, usd_amount: Decimal) -> SettlementResult<()> {
        // The entry guard holds the shard lock for the whole increment.
        let mut totals = self.totals.entry(project_id).or_default();
        totals.raised_usd += usd_amount;
        totals.donors += 1;
        Ok(())
    }
}

#[derive(Serialize)]
struct ContributionEvent {
    project_id: u64,
    usd_amount: Decimal,
}

/// Posts contributions to the application's ledger webhook, which performs
/// the increment on its side.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: reqwest::Client,
    url: String,
}

impl HttpLedger {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SettlementResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SettlementError::Ledger(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CampaignLedger for HttpLedger {
    async fn record_contribution(&self, project_id: u64, usd_amount: Decimal) -> SettlementResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&ContributionEvent {
                project_id,
                usd_amount,
            })
            .send()
            .await
            .map_err(|e| SettlementError::Ledger(format!("POST {}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SettlementError::Ledger(format!(
                "ledger webhook returned {}",
                status
            )));
        }
        Ok(())
    }
}
