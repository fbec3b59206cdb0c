//! Settlement request persistence.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{SettlementError, SettlementResult};
use crate::settlement::types::SettlementRequest;

/// Durable storage for settlement requests.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Insert `request` unless one with the same correlation token exists.
    /// Returns the stored request and whether it was newly created.
    async fn create(&self, request: SettlementRequest) -> SettlementResult<(SettlementRequest, bool)>;

    /// Overwrite the stored copy of `request`.
    async fn save(&self, request: &SettlementRequest) -> SettlementResult<()>;

    async fn get(&self, id: Uuid) -> SettlementResult<Option<SettlementRequest>>;

    async fn find_by_correlation(&self, token: &str) -> SettlementResult<Option<SettlementRequest>>;

    /// All requests, oldest first.
    async fn list(&self) -> SettlementResult<Vec<SettlementRequest>>;
}

/// In-memory store, optionally flushed to a JSON file on every write.
pub struct FileSettlementStore {
    requests: DashMap<Uuid, SettlementRequest>,
    by_correlation: DashMap<String, Uuid>,
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl FileSettlementStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            requests: DashMap::new(),
            by_correlation: DashMap::new(),
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Memory-only store.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Open the store at `path`, loading existing requests if the file exists.
    pub fn load_from_file(path: impl AsRef<Path>) -> SettlementResult<Self> {
        let path = path.as_ref();
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| SettlementError::Persistence(format!("read {}: {}", path.display(), e)))?;
            let requests: Vec<SettlementRequest> = serde_json::from_str(&content)
                .map_err(|e| SettlementError::Persistence(format!("parse {}: {}", path.display(), e)))?;
            for request in requests {
                store.by_correlation.insert(request.correlation_token.clone(), request.id);
                store.requests.insert(request.id, request);
            }
            tracing::info!(count = store.requests.len(), path = %path.display(), "Loaded settlement requests");
        }
        Ok(store)
    }

    fn snapshot(&self) -> Vec<SettlementRequest> {
        let mut all: Vec<SettlementRequest> = self.requests.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    async fn flush(&self) -> SettlementResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let json = serde_json::to_vec_pretty(&self.snapshot())
            .map_err(|e| SettlementError::Persistence(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| SettlementError::Persistence(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| SettlementError::Persistence(format!("rename to {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl SettlementStore for FileSettlementStore {
    async fn create(&self, request: SettlementRequest) -> SettlementResult<(SettlementRequest, bool)> {
        match self.by_correlation.entry(request.correlation_token.clone()) {
            Entry::Occupied(existing) => {
                let id = *existing.get();
                drop(existing);
                let stored = self
                    .requests
                    .get(&id)
                    .map(|r| r.value().clone())
                    .ok_or(SettlementError::RequestNotFound(id))?;
                return Ok((stored, false));
            }
            Entry::Vacant(slot) => {
                slot.insert(request.id);
                self.requests.insert(request.id, request.clone());
            }
        }

        if let Err(e) = self.flush().await {
            self.requests.remove(&request.id);
            self.by_correlation.remove(&request.correlation_token);
            return Err(e);
        }
        Ok((request, true))
    }

    async fn save(&self, request: &SettlementRequest) -> SettlementResult<()> {
        self.requests.insert(request.id, request.clone());
        self.flush().await
    }

    async fn get(&self, id: Uuid) -> SettlementResult<Option<SettlementRequest>> {
        Ok(self.requests.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_correlation(&self, token: &str) -> SettlementResult<Option<SettlementRequest>> {
        let id = match self.by_correlation.get(token) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get(id).await
    }

    async fn list(&self) -> SettlementResult<Vec<SettlementRequest>> {
        Ok(self.snapshot())
    }
}
