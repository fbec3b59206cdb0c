//! Background settlement workers.
//!
//! A bounded queue of request ids feeds a loop that runs up to `workers`
//! settlements concurrently. Stages within one settlement stay sequential.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::SettlementError;
use crate::settlement::pipeline::SettlementPipeline;

/// Create the settlement queue.
pub fn queue(capacity: usize) -> (mpsc::Sender<Uuid>, mpsc::Receiver<Uuid>) {
    mpsc::channel(capacity)
}

pub struct SettlementWorker {
    pipeline: Arc<SettlementPipeline>,
    receiver: mpsc::Receiver<Uuid>,
    permits: Arc<Semaphore>,
    drain_timeout: Duration,
}

impl SettlementWorker {
    pub fn new(
        pipeline: Arc<SettlementPipeline>,
        receiver: mpsc::Receiver<Uuid>,
        workers: usize,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            receiver,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            drain_timeout,
        }
    }

    /// Consume the queue until shutdown, then wait up to the drain timeout
    /// for running settlements to reach a stage boundary.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut tasks = JoinSet::new();
        tracing::info!(workers = self.permits.available_permits(), "Settlement workers started");

        loop {
            // A permit is taken before an id leaves the queue, so an id is
            // never held while waiting for a busy worker.
            let permit = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Settlement workers stopping");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_joined(joined);
                    continue;
                }
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let id = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Settlement workers stopping");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_joined(joined);
                    continue;
                }
                next = self.receiver.recv() => match next {
                    Some(id) => id,
                    None => {
                        tracing::info!("Settlement queue closed");
                        break;
                    }
                },
            };

            let pipeline = self.pipeline.clone();
            tasks.spawn(async move {
                let _permit = permit;
                match pipeline.run(id).await {
                    Ok(request) => tracing::debug!(
                        settlement_id = %id,
                        stage = %request.stage,
                        "Settlement run finished"
                    ),
                    Err(SettlementError::AlreadyRunning(_)) => {
                        tracing::debug!(settlement_id = %id, "Settlement already running, skipped")
                    }
                    Err(e) => tracing::error!(settlement_id = %id, error = %e, "Settlement run aborted"),
                }
            });
        }

        if !tasks.is_empty() {
            tracing::info!(running = tasks.len(), "Waiting for running settlements");
            let drained = tokio::time::timeout(self.drain_timeout, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                tracing::warn!(
                    remaining = tasks.len(),
                    "Drain timeout reached, remaining settlements will be recovered on restart"
                );
                tasks.abort_all();
            }
        }
    }
}

fn log_joined(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Settlement task panicked");
    }
}
