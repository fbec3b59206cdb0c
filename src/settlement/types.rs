//! Settlement request model and stage machine.

use alloy::primitives::{Address, TxHash, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::config::ChainKind;
use crate::error::{ErrorKind, SettlementError};
use crate::swap::Quote;
use crate::wallet::WalletHandle;

/// Pipeline stage. Advances strictly forward or ends at `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Pending,
    Swapping,
    Swapped,
    Approving,
    Approved,
    Staking,
    Completed,
    Failed,
}

impl Stage {
    /// The happy path, in order.
    pub const SEQUENCE: [Stage; 7] = [
        Stage::Pending,
        Stage::Swapping,
        Stage::Swapped,
        Stage::Approving,
        Stage::Approved,
        Stage::Staking,
        Stage::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "PENDING",
            Stage::Swapping => "SWAPPING",
            Stage::Swapped => "SWAPPED",
            Stage::Approving => "APPROVING",
            Stage::Approved => "APPROVED",
            Stage::Staking => "STAKING",
            Stage::Completed => "COMPLETED",
            Stage::Failed => "FAILED",
        }
    }

    fn position(&self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|s| s == self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Stages during which a transaction may be outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Stage::Swapping | Stage::Approving | Stage::Staking)
    }

    /// Whether `self → to` is a legal forward transition.
    pub fn can_advance_to(&self, to: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == Stage::Failed {
            return true;
        }
        match (self.position(), to.position()) {
            (Some(from), Some(to)) => to == from + 1,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Completed,
    Failed,
}

impl From<Stage> for SettlementStatus {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Completed => SettlementStatus::Completed,
            Stage::Failed => SettlementStatus::Failed,
            _ => SettlementStatus::Pending,
        }
    }
}

/// Persisted failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    /// The error's message, verbatim.
    pub message: String,
    pub tx_hash: Option<TxHash>,
}

impl From<&SettlementError> for Failure {
    fn from(err: &SettlementError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            tx_hash: err.tx_hash(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub at: u64,
}

/// Input for a new settlement, decoded from a completed payment.
#[derive(Debug, Clone)]
pub struct NewSettlement {
    pub correlation_token: String,
    pub usd_amount: Decimal,
    pub native_amount: U256,
    pub chain: ChainKind,
    pub project_id: u64,
    pub incentive_id: Option<u64>,
    pub token_address: Address,
    pub staking_contract: Address,
    pub wallet: WalletHandle,
    pub contributor_email: Option<String>,
}

/// One contribution's journey from fiat payment to confirmed stake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub id: Uuid,
    pub correlation_token: String,
    pub usd_amount: Decimal,
    pub native_amount: U256,
    pub chain: ChainKind,
    pub project_id: u64,
    pub incentive_id: Option<u64>,
    pub token_address: Address,
    pub staking_contract: Address,
    pub wallet_identifier: String,
    pub wallet_address: Address,
    pub contributor_email: Option<String>,

    pub stage: Stage,
    pub swap_tx: Option<TxHash>,
    pub approve_tx: Option<TxHash>,
    pub stake_tx: Option<TxHash>,
    pub token_amount: Option<U256>,
    pub quote: Option<Quote>,
    /// Token balance before the swap was submitted.
    pub swap_balance_before: Option<U256>,

    pub failure: Option<Failure>,
    /// Stage that was in progress when the request failed.
    pub failed_stage: Option<Stage>,
    /// Signed transaction whose outcome is not yet recorded. Saved before
    /// the broadcast, so it may never have reached the node.
    pub pending_tx: Option<TxHash>,
    /// Nonce of `pending_tx`.
    #[serde(default)]
    pub pending_nonce: Option<u64>,
    pub ledger_recorded: bool,

    pub history: Vec<StageEvent>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl SettlementRequest {
    pub fn new(input: NewSettlement) -> Self {
        let now = unix_now();
        Self {
            id: Uuid::new_v4(),
            correlation_token: input.correlation_token,
            usd_amount: input.usd_amount,
            native_amount: input.native_amount,
            chain: input.chain,
            project_id: input.project_id,
            incentive_id: input.incentive_id,
            token_address: input.token_address,
            staking_contract: input.staking_contract,
            wallet_identifier: input.wallet.identifier,
            wallet_address: input.wallet.address,
            contributor_email: input.contributor_email,
            stage: Stage::Pending,
            swap_tx: None,
            approve_tx: None,
            stake_tx: None,
            token_amount: None,
            quote: None,
            swap_balance_before: None,
            failure: None,
            failed_stage: None,
            pending_tx: None,
            pending_nonce: None,
            ledger_recorded: false,
            history: vec![StageEvent {
                stage: Stage::Pending,
                at: now,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> SettlementStatus {
        self.stage.into()
    }

    pub fn wallet(&self) -> WalletHandle {
        WalletHandle {
            identifier: self.wallet_identifier.clone(),
            address: self.wallet_address,
        }
    }

    /// Move to `to`, recording it in the history.
    pub fn advance(&mut self, to: Stage) -> Result<(), SettlementError> {
        if !self.stage.can_advance_to(to) {
            return Err(SettlementError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        self.enter(to);
        Ok(())
    }

    /// Record a failure at the current stage.
    pub fn fail(&mut self, err: &SettlementError) -> Result<(), SettlementError> {
        let stage = self.stage;
        self.advance(Stage::Failed)?;
        let failure = Failure::from(err);
        // A reverted transaction is settled; only unknown outcomes stay pending.
        if failure.kind == ErrorKind::TransactionReverted {
            self.clear_pending();
        }
        self.failure = Some(failure);
        self.failed_stage = Some(stage);
        Ok(())
    }

    /// Forget the outstanding transaction.
    pub fn clear_pending(&mut self) {
        self.pending_tx = None;
        self.pending_nonce = None;
    }

    /// Re-enter the stage that failed. Only valid from `Failed`.
    pub fn reenter(&mut self) -> Result<Stage, SettlementError> {
        let stage = match (self.stage, self.failed_stage) {
            (Stage::Failed, Some(stage)) => stage,
            _ => {
                return Err(SettlementError::NotResumable {
                    id: self.id,
                    reason: format!("stage {} has no failed stage to re-enter", self.stage),
                })
            }
        };
        self.failure = None;
        self.failed_stage = None;
        self.enter(stage);
        Ok(stage)
    }

    fn enter(&mut self, stage: Stage) {
        let now = unix_now();
        self.stage = stage;
        self.history.push(StageEvent { stage, at: now });
        self.updated_at = now;
    }

    /// Stages visited, oldest first.
    pub fn stage_sequence(&self) -> Vec<Stage> {
        self.history.iter().map(|e| e.stage).collect()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
