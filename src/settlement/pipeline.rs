//! Settlement state machine.
//!
//! ```text
//! PENDING → SWAPPING → SWAPPED → APPROVING → APPROVED → STAKING → COMPLETED
//!                 ↘          ↘            ↘           ↘         ↘
//!                                    FAILED
//! ```
//!
//! Every transition is persisted before the next stage starts. A submitted
//! transaction hash is persisted before its receipt is awaited, so a request
//! that times out or is interrupted can be reconciled on resume instead of
//! resubmitted.

use alloy::primitives::{Address, TxHash};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::blockchain::types::Receipt;
use crate::blockchain::{ChainError, ChainRegistry, ChainRpc, TxIntent, TxSubmitter};
use crate::config::{ApprovalMode, ChainKind, SettlementConfig};
use crate::error::{SettlementError, SettlementResult};
use crate::observability::metrics;
use crate::settlement::approve::TokenApprover;
use crate::settlement::ledger::CampaignLedger;
use crate::settlement::stake::StakeExecutor;
use crate::settlement::store::SettlementStore;
use crate::settlement::types::{unix_now, NewSettlement, SettlementRequest, SettlementStatus, Stage};
use crate::swap::{swap_failure, SwapRouter};
use crate::wallet::{WalletHandle, WalletStore};

/// Outcome of startup recovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Requests at a checkpoint stage, put back on the queue.
    pub requeued: usize,
    /// Requests caught mid-stage, marked failed for an explicit resume.
    pub interrupted: usize,
    /// Completed requests whose ledger update is still outstanding.
    pub ledger_pending: usize,
}

/// Counts for the status surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSummary {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub ledger_pending: usize,
}

/// Removes the request from the in-flight set when dropped.
struct RunGuard<'a> {
    running: &'a DashMap<Uuid, ()>,
    id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.id);
    }
}

/// Drives settlement requests through swap, approve and stake.
pub struct SettlementPipeline {
    registry: ChainRegistry,
    submitter: Arc<TxSubmitter>,
    swap: SwapRouter,
    approver: TokenApprover,
    staker: StakeExecutor,
    store: Arc<dyn SettlementStore>,
    ledger: Arc<dyn CampaignLedger>,
    config: SettlementConfig,
    queue: mpsc::Sender<Uuid>,
    running: DashMap<Uuid, ()>,
    /// One settlement per wallet and chain at a time. The received swap
    /// amount is a balance delta, which another settlement's swap or stake
    /// on the same wallet would distort.
    wallet_locks: DashMap<(Address, ChainKind), Arc<Mutex<()>>>,
}

impl SettlementPipeline {
    pub fn new(
        registry: ChainRegistry,
        wallets: Arc<WalletStore>,
        store: Arc<dyn SettlementStore>,
        ledger: Arc<dyn CampaignLedger>,
        config: SettlementConfig,
        queue: mpsc::Sender<Uuid>,
    ) -> Self {
        let submitter = Arc::new(TxSubmitter::new(wallets, config.receipt_timeout()));
        let swap = SwapRouter::new(
            registry.clone(),
            submitter.clone(),
            config.max_slippage_bps,
            config.swap_deadline_secs,
        );
        let approver = TokenApprover::new(registry.clone(), submitter.clone());
        let staker = StakeExecutor::new(registry.clone(), submitter.clone());

        Self {
            registry,
            submitter,
            swap,
            approver,
            staker,
            store,
            ledger,
            config,
            queue,
            running: DashMap::new(),
            wallet_locks: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn wallets(&self) -> &Arc<WalletStore> {
        self.submitter.wallets()
    }

    pub fn swap_router(&self) -> &SwapRouter {
        &self.swap
    }

    pub fn approver(&self) -> &TokenApprover {
        &self.approver
    }

    pub fn staker(&self) -> &StakeExecutor {
        &self.staker
    }

    pub fn is_running(&self, id: Uuid) -> bool {
        self.running.contains_key(&id)
    }

    /// Persist a new PENDING request and queue it for the workers.
    ///
    /// A redelivered payment (same correlation token) returns the existing
    /// request without queueing it again.
    pub async fn start(&self, input: NewSettlement) -> SettlementResult<SettlementRequest> {
        let (request, created) = self.store.create(SettlementRequest::new(input)).await?;
        if !created {
            tracing::info!(
                settlement_id = %request.id,
                stage = %request.stage,
                "Duplicate payment notification, settlement already exists"
            );
            return Ok(request);
        }

        metrics::record_stage_transition(Stage::Pending.as_str());
        tracing::info!(
            settlement_id = %request.id,
            chain = %request.chain,
            project_id = request.project_id,
            native_amount = %request.native_amount,
            "Settlement created"
        );
        self.enqueue(request.id);
        Ok(request)
    }

    fn enqueue(&self, id: Uuid) {
        match self.queue.try_send(id) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => tracing::warn!(
                settlement_id = %id,
                "Settlement queue full, request stays pending until resumed or recovered"
            ),
            Err(TrySendError::Closed(_)) => tracing::warn!(
                settlement_id = %id,
                "Settlement queue closed, request stays pending"
            ),
        }
    }

    pub async fn get(&self, id: Uuid) -> SettlementResult<SettlementRequest> {
        self.store
            .get(id)
            .await?
            .ok_or(SettlementError::RequestNotFound(id))
    }

    pub async fn list(&self) -> SettlementResult<Vec<SettlementRequest>> {
        self.store.list().await
    }

    pub async fn summary(&self) -> SettlementResult<PipelineSummary> {
        let mut summary = PipelineSummary {
            running: self.running.len(),
            ..PipelineSummary::default()
        };
        for request in self.store.list().await? {
            summary.total += 1;
            match request.status() {
                SettlementStatus::Pending => summary.pending += 1,
                SettlementStatus::Completed => {
                    summary.completed += 1;
                    if !request.ledger_recorded {
                        summary.ledger_pending += 1;
                    }
                }
                SettlementStatus::Failed => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    fn claim(&self, id: Uuid) -> SettlementResult<RunGuard<'_>> {
        match self.running.entry(id) {
            Entry::Occupied(_) => Err(SettlementError::AlreadyRunning(id)),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(RunGuard {
                    running: &self.running,
                    id,
                })
            }
        }
    }

    /// Drive a request from its persisted stage to a terminal stage.
    ///
    /// Stage failures are persisted on the request and are not errors here;
    /// `Err` means the request could not be loaded, claimed or persisted.
    pub async fn run(&self, id: Uuid) -> SettlementResult<SettlementRequest> {
        let _guard = self.claim(id)?;
        let request = self.get(id).await?;
        self.drive_exclusive(request).await
    }

    /// Continue a request that failed or stalled.
    ///
    /// Completed stages are never repeated. A failed request re-enters the
    /// stage that failed; a pending transaction from that stage is reconciled
    /// before anything is resubmitted. A completed request whose ledger update
    /// failed only retries the ledger update.
    pub async fn resume(&self, id: Uuid) -> SettlementResult<SettlementRequest> {
        let _guard = self.claim(id)?;
        let mut request = self.get(id).await?;

        match request.stage {
            Stage::Completed if !request.ledger_recorded => {
                self.record_ledger(&mut request).await?;
                return Ok(request);
            }
            Stage::Completed => {
                return Err(SettlementError::NotResumable {
                    id,
                    reason: "settlement already completed".to_string(),
                })
            }
            Stage::Failed => {
                let previous = request.failure.as_ref().map(|f| f.kind);
                let stage = request.reenter()?;
                self.store.save(&request).await?;
                tracing::info!(
                    settlement_id = %id,
                    stage = %stage,
                    previous_failure = ?previous,
                    pending_tx = ?request.pending_tx,
                    "Resuming failed settlement"
                );
            }
            stage => {
                tracing::info!(settlement_id = %id, stage = %stage, "Resuming stalled settlement");
            }
        }

        self.drive_exclusive(request).await
    }

    /// Startup pass over persisted requests.
    ///
    /// Checkpoint stages are re-queued. In-flight stages are marked failed
    /// with kind `Interrupted`: their transaction may already be on-chain, so
    /// they wait for an explicit resume, which reconciles it.
    pub async fn recover(&self) -> SettlementResult<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for mut request in self.store.list().await? {
            match request.stage {
                Stage::Pending | Stage::Swapped | Stage::Approved => {
                    self.enqueue(request.id);
                    report.requeued += 1;
                }
                stage if stage.is_in_flight() => {
                    let err = SettlementError::Interrupted(stage);
                    request.fail(&err)?;
                    if let Some(failure) = request.failure.as_mut() {
                        failure.tx_hash = request.pending_tx;
                    }
                    self.store.save(&request).await?;
                    metrics::record_settlement_outcome("failed", err.kind().as_str());
                    tracing::warn!(
                        settlement_id = %request.id,
                        stage = %stage,
                        pending_tx = ?request.pending_tx,
                        "Settlement interrupted mid-stage, marked failed"
                    );
                    report.interrupted += 1;
                }
                Stage::Completed if !request.ledger_recorded => report.ledger_pending += 1,
                _ => {}
            }
        }

        tracing::info!(
            requeued = report.requeued,
            interrupted = report.interrupted,
            ledger_pending = report.ledger_pending,
            "Settlement recovery complete"
        );
        Ok(report)
    }

    async fn drive_exclusive(&self, request: SettlementRequest) -> SettlementResult<SettlementRequest> {
        let lock = self
            .wallet_locks
            .entry((request.wallet_address, request.chain))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _wallet = lock.lock().await;
        // The stored copy may have moved on while this run waited.
        let request = self.get(request.id).await?;
        self.drive(request).await
    }

    async fn drive(&self, mut request: SettlementRequest) -> SettlementResult<SettlementRequest> {
        loop {
            let stage = request.stage;
            let started = Instant::now();
            let result = match stage {
                Stage::Pending => self.transition(&mut request, Stage::Swapping).await,
                Stage::Swapping => self.swap_stage(&mut request).await,
                Stage::Swapped => self.transition(&mut request, Stage::Approving).await,
                Stage::Approving => self.approve_stage(&mut request).await,
                Stage::Approved => self.transition(&mut request, Stage::Staking).await,
                Stage::Staking => self.stake_stage(&mut request).await,
                Stage::Completed => {
                    if !request.ledger_recorded {
                        self.record_ledger(&mut request).await?;
                    }
                    return Ok(request);
                }
                Stage::Failed => return Ok(request),
            };

            if stage.is_in_flight() {
                metrics::record_stage_duration(stage.as_str(), started.elapsed());
            }

            match result {
                Ok(()) => {}
                Err(err @ SettlementError::Persistence(_)) => {
                    tracing::error!(settlement_id = %request.id, stage = %stage, error = %err, "Failed to persist settlement");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        settlement_id = %request.id,
                        stage = %stage,
                        kind = %err.kind(),
                        error = %err,
                        "Settlement stage failed"
                    );
                    request.fail(&err)?;
                    self.store.save(&request).await?;
                    metrics::record_stage_transition(Stage::Failed.as_str());
                    metrics::record_settlement_outcome("failed", err.kind().as_str());
                    return Ok(request);
                }
            }
        }
    }

    async fn transition(&self, request: &mut SettlementRequest, to: Stage) -> SettlementResult<()> {
        request.advance(to)?;
        self.store.save(request).await?;
        metrics::record_stage_transition(to.as_str());
        tracing::debug!(settlement_id = %request.id, stage = %to, "Settlement advanced");
        Ok(())
    }

    /// Sign `intent`, persist its hash, broadcast it, then wait for the
    /// receipt.
    ///
    /// The hash is saved before the broadcast: a run cut short after the
    /// node accepted the transaction still leaves it to reconcile.
    async fn submit_tracked(
        &self,
        request: &mut SettlementRequest,
        chain: &dyn ChainRpc,
        wallet: &WalletHandle,
        intent: TxIntent,
    ) -> SettlementResult<Receipt> {
        let ready = self.submitter.sign(chain, wallet, intent).await?;
        request.pending_tx = Some(ready.hash);
        request.pending_nonce = Some(ready.nonce);
        request.updated_at = unix_now();
        self.store.save(request).await?;

        let tx_hash = match self.submitter.broadcast(chain, ready).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                // Rejected by the node, nothing to reconcile.
                request.clear_pending();
                self.store.save(request).await?;
                return Err(e);
            }
        };
        if request.pending_tx != Some(tx_hash) {
            request.pending_tx = Some(tx_hash);
            self.store.save(request).await?;
        }

        Ok(chain
            .wait_for_receipt(tx_hash, self.submitter.receipt_timeout())
            .await?)
    }

    /// Settle a transaction left pending by an earlier attempt.
    ///
    /// `Some(receipt)` when it confirmed, `None` when it reverted and the
    /// stage should be attempted again. An outcome that is still unknown is
    /// returned as `ConfirmationTimeout`.
    async fn reconcile(
        &self,
        request: &mut SettlementRequest,
        chain: &dyn ChainRpc,
    ) -> SettlementResult<Option<Receipt>> {
        let Some(tx_hash) = request.pending_tx else {
            return Ok(None);
        };

        if let Some(nonce) = request.pending_nonce {
            let next = chain.get_nonce(request.wallet_address).await?;
            if next <= nonce {
                // The nonce is still unused: the transaction never reached the node.
                tracing::warn!(
                    settlement_id = %request.id,
                    tx_hash = %tx_hash,
                    nonce,
                    "Pending transaction was never broadcast, attempting stage again"
                );
                request.clear_pending();
                self.store.save(request).await?;
                return Ok(None);
            }
        }

        tracing::info!(settlement_id = %request.id, tx_hash = %tx_hash, "Reconciling pending transaction");
        match chain
            .wait_for_receipt(tx_hash, self.submitter.receipt_timeout())
            .await
        {
            Ok(receipt) => Ok(Some(receipt)),
            Err(ChainError::TransactionReverted { reason, .. }) => {
                tracing::warn!(
                    settlement_id = %request.id,
                    tx_hash = %tx_hash,
                    reason = %reason,
                    "Pending transaction reverted, attempting stage again"
                );
                request.clear_pending();
                self.store.save(request).await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn swap_stage(&self, request: &mut SettlementRequest) -> SettlementResult<()> {
        let client = self.registry.get(request.chain)?;
        let wallet = request.wallet();

        let receipt = match self
            .reconcile(request, client.as_ref())
            .await
            .map_err(swap_failure)?
        {
            Some(receipt) => receipt,
            None => {
                let prepared = self
                    .swap
                    .prepare(
                        request.chain,
                        &wallet,
                        request.native_amount,
                        request.token_address,
                        self.config.max_slippage_bps,
                    )
                    .await?;
                request.quote = Some(prepared.quote);
                request.swap_balance_before = Some(prepared.balance_before);
                self.store.save(request).await?;
                self.submit_tracked(request, client.as_ref(), &wallet, prepared.intent)
                    .await
                    .map_err(swap_failure)?
            }
        };

        let quote = request
            .quote
            .clone()
            .ok_or_else(|| SettlementError::InvalidQuote("no quote recorded for swap".to_string()))?;
        let outcome = self
            .swap
            .settle(
                request.chain,
                &wallet,
                &quote,
                request.swap_balance_before.unwrap_or_default(),
                &receipt,
            )
            .await?;

        request.swap_tx = Some(outcome.tx_hash);
        request.token_amount = Some(outcome.token_amount_received);
        request.clear_pending();
        self.transition(request, Stage::Swapped).await
    }

    async fn approve_stage(&self, request: &mut SettlementRequest) -> SettlementResult<()> {
        let client = self.registry.get(request.chain)?;
        let wallet = request.wallet();
        let token_amount = self.token_amount(request)?;

        let receipt = match self.reconcile(request, client.as_ref()).await? {
            Some(receipt) => receipt,
            None => {
                let amount = match self.config.approval {
                    ApprovalMode::Exact => Some(token_amount),
                    ApprovalMode::Unlimited => None,
                };
                let intent = self.approver.intent(
                    client.config(),
                    request.token_address,
                    request.staking_contract,
                    amount,
                );
                self.submit_tracked(request, client.as_ref(), &wallet, intent).await?
            }
        };

        request.approve_tx = Some(receipt.tx_hash);
        request.clear_pending();
        self.transition(request, Stage::Approved).await
    }

    async fn stake_stage(&self, request: &mut SettlementRequest) -> SettlementResult<()> {
        let client = self.registry.get(request.chain)?;
        let wallet = request.wallet();
        let token_amount = self.token_amount(request)?;

        let receipt = match self.reconcile(request, client.as_ref()).await? {
            Some(receipt) => receipt,
            None => {
                let intent = self
                    .staker
                    .prepare(
                        request.chain,
                        &wallet,
                        request.staking_contract,
                        request.token_address,
                        token_amount,
                    )
                    .await?;
                self.submit_tracked(request, client.as_ref(), &wallet, intent).await?
            }
        };

        request.stake_tx = Some(receipt.tx_hash);
        request.clear_pending();
        self.transition(request, Stage::Completed).await?;
        metrics::record_settlement_outcome("completed", "none");
        tracing::info!(
            settlement_id = %request.id,
            swap_tx = ?request.swap_tx,
            approve_tx = ?request.approve_tx,
            stake_tx = %receipt.tx_hash,
            "Settlement completed"
        );
        Ok(())
    }

    fn token_amount(&self, request: &SettlementRequest) -> SettlementResult<alloy::primitives::U256> {
        request.token_amount.ok_or_else(|| SettlementError::NotResumable {
            id: request.id,
            reason: "no swapped token amount recorded".to_string(),
        })
    }

    /// One ledger attempt. A failure leaves `ledger_recorded` false for a
    /// later resume.
    async fn record_ledger(&self, request: &mut SettlementRequest) -> SettlementResult<()> {
        match self
            .ledger
            .record_contribution(request.project_id, request.usd_amount)
            .await
        {
            Ok(()) => {
                request.ledger_recorded = true;
                request.updated_at = unix_now();
                self.store.save(request).await?;
                tracing::info!(
                    settlement_id = %request.id,
                    project_id = request.project_id,
                    usd_amount = %request.usd_amount,
                    "Contribution recorded in campaign ledger"
                );
            }
            Err(e) => {
                metrics::record_ledger_failure();
                tracing::error!(
                    settlement_id = %request.id,
                    project_id = request.project_id,
                    error = %e,
                    "Campaign ledger update failed"
                );
            }
        }
        Ok(())
    }

    /// Explorer links for the request's transactions.
    pub fn explorer_links(&self, request: &SettlementRequest) -> Vec<(Stage, String)> {
        let Ok(client) = self.registry.get(request.chain) else {
            return Vec::new();
        };
        let link = |hash: &TxHash| client.config().explorer_tx_url(&hash.to_string());
        [
            (Stage::Swapped, request.swap_tx.as_ref()),
            (Stage::Approved, request.approve_tx.as_ref()),
            (Stage::Completed, request.stake_tx.as_ref()),
        ]
        .into_iter()
        .filter_map(|(stage, hash)| hash.map(|h| (stage, link(h))))
        .collect()
    }
}
