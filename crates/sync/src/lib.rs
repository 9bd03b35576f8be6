//! Sync engine: reconciles the local change log against the remote store.
//!
//! Each cycle drains journaled local mutations, pushes them in sequence
//! order, acknowledges what the remote made durable, then pulls the remote
//! change stream from the persisted cursor and merges it into the local
//! store. Merge batches are all-or-nothing; conflicts are flagged for the
//! user, never auto-resolved. Remote failures retry with exponential
//! backoff and finally surface as a non-fatal [`SyncError::Unavailable`] —
//! local reads and writes never block on the network.

use std::sync::Arc;
use std::time::Duration;

use api_types::{PullRequest, PushRequest, PushResponse, RemoteChange};
use chrono::Utc;
use ledger::{ChangeLog, ChangeRecord, IncomingChange, LocalStore, MergeOutcome};
use uuid::Uuid;

pub use backoff::{Backoff, BackoffConfig};
pub use error::{ResultSync, SyncError};
pub use remote::{HttpRemote, RemoteError, RemoteStore};

mod backoff;
mod error;
mod remote;

/// Explicit startup configuration; nothing is discovered at runtime.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Opaque authenticated user id from the identity provider; namespaces
    /// remote data.
    pub user_id: String,
    /// Stable id of this device; sequence numbers and the cursor are scoped
    /// to it.
    pub device_id: String,
    /// Max change records pushed/pulled per cycle.
    pub batch_limit: u64,
    pub backoff: BackoffConfig,
}

/// Where the engine currently stands in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Draining,
    Merging,
    Error,
}

/// What one sync cycle did.
#[derive(Clone, Debug, Default)]
pub struct CycleReport {
    pub pushed: usize,
    pub acked: usize,
    pub pulled: usize,
    pub merge: MergeOutcome,
}

/// Snapshot of sync health for the status surface.
#[derive(Clone, Debug)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub pending_changes: u64,
    pub cursor: i64,
    pub conflicted: Vec<Uuid>,
}

pub struct SyncEngine {
    store: LocalStore,
    change_log: ChangeLog,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    phase: SyncPhase,
}

impl SyncEngine {
    /// Store, journal and remote client are injected as capabilities.
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        let change_log = store.change_log();
        Self {
            store,
            change_log,
            remote,
            config,
            phase: SyncPhase::Idle,
        }
    }

    /// Runs one full drain + merge cycle.
    ///
    /// Safe to cancel between cycles; a merge batch in flight is a single
    /// database transaction, so dropping the future rolls it back cleanly.
    pub async fn run_cycle(&mut self) -> ResultSync<CycleReport> {
        self.phase = SyncPhase::Idle;
        let result = self.cycle_inner().await;
        self.phase = match &result {
            Ok(_) => SyncPhase::Idle,
            Err(_) => SyncPhase::Error,
        };
        result
    }

    async fn cycle_inner(&mut self) -> ResultSync<CycleReport> {
        self.phase = SyncPhase::Draining;
        let records = self.change_log.drain(self.config.batch_limit).await?;

        let mut pushed = 0;
        let mut acked = 0;
        if !records.is_empty() {
            let request = PushRequest {
                user_id: self.config.user_id.clone(),
                device_id: self.config.device_id.clone(),
                seqs: records.iter().map(|r| r.seq).collect(),
                changes: records
                    .iter()
                    .map(|r| to_remote_change(r, &self.config.device_id))
                    .collect(),
            };
            pushed = records.len();

            let response = self.call_push(request).await?;
            let acked_records: Vec<ChangeRecord> = records
                .into_iter()
                .filter(|r| response.acked_seqs.contains(&r.seq))
                .collect();
            // Only prune what we actually pushed and the remote confirmed.
            let ack_seqs: Vec<i64> = acked_records.iter().map(|r| r.seq).collect();
            acked = self.change_log.acknowledge(&ack_seqs).await? as usize;
            self.store.finalize_acked(&acked_records).await?;
        }

        self.phase = SyncPhase::Merging;
        let cursor = self.store.sync_cursor(&self.config.device_id).await?;
        let pull = self
            .call_pull(PullRequest {
                user_id: self.config.user_id.clone(),
                device_id: self.config.device_id.clone(),
                cursor,
                limit: self.config.batch_limit,
            })
            .await?;

        let incoming: Vec<IncomingChange> = pull.changes.iter().map(to_incoming).collect();
        let merge = self
            .store
            .merge_remote_batch(&incoming, &self.config.device_id, pull.next_cursor, Utc::now())
            .await?;

        for id in &merge.conflicted {
            tracing::warn!(entity_id = %id, "entity flagged conflicted during merge");
        }

        Ok(CycleReport {
            pushed,
            acked,
            pulled: pull.changes.len(),
            merge,
        })
    }

    /// Runs cycles forever on a fixed period, logging outcomes.
    pub async fn run(mut self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.run_cycle().await {
                Ok(report) => tracing::debug!(
                    pushed = report.pushed,
                    acked = report.acked,
                    pulled = report.pulled,
                    applied = report.merge.applied,
                    conflicted = report.merge.conflicted.len(),
                    "sync cycle complete"
                ),
                Err(err) => tracing::warn!(error = %err, "sync cycle failed"),
            }
        }
    }

    pub async fn status(&self) -> ResultSync<SyncStatus> {
        Ok(SyncStatus {
            phase: self.phase,
            pending_changes: self.change_log.pending_count().await?,
            cursor: self.store.sync_cursor(&self.config.device_id).await?,
            conflicted: self.store.conflicted_ids().await?,
        })
    }

    async fn call_push(&self, request: PushRequest) -> ResultSync<PushResponse> {
        let mut backoff = Backoff::new(&self.config.backoff);
        loop {
            match self.remote.push(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() => match backoff.next_delay() {
                    Some(delay) => {
                        tracing::warn!(error = %err, ?delay, "push failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(SyncError::Unavailable(err.to_string())),
                },
                Err(err) => return Err(SyncError::Remote(err.to_string())),
            }
        }
    }

    async fn call_pull(&self, request: PullRequest) -> ResultSync<api_types::PullResponse> {
        let mut backoff = Backoff::new(&self.config.backoff);
        loop {
            match self.remote.pull(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() => match backoff.next_delay() {
                    Some(delay) => {
                        tracing::warn!(error = %err, ?delay, "pull failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(SyncError::Unavailable(err.to_string())),
                },
                Err(err) => return Err(SyncError::Remote(err.to_string())),
            }
        }
    }
}

fn to_remote_change(record: &ChangeRecord, device_id: &str) -> RemoteChange {
    RemoteChange {
        entity_kind: match record.entity_kind {
            ledger::EntityKind::Transaction => api_types::EntityKind::Transaction,
            ledger::EntityKind::Category => api_types::EntityKind::Category,
        },
        entity_id: record.entity_id,
        op: match record.op {
            ledger::ChangeOp::Create => api_types::ChangeOp::Create,
            ledger::ChangeOp::Update => api_types::ChangeOp::Update,
            ledger::ChangeOp::Delete => api_types::ChangeOp::Delete,
        },
        payload: record.payload.clone(),
        base_revision: record.base_revision,
        revision: record.revision,
        updated_at: record.recorded_at,
        device_id: device_id.to_string(),
    }
}

fn to_incoming(change: &RemoteChange) -> IncomingChange {
    IncomingChange {
        op: match change.op {
            api_types::ChangeOp::Create => ledger::ChangeOp::Create,
            api_types::ChangeOp::Update => ledger::ChangeOp::Update,
            api_types::ChangeOp::Delete => ledger::ChangeOp::Delete,
        },
        entity_kind: match change.entity_kind {
            api_types::EntityKind::Transaction => ledger::EntityKind::Transaction,
            api_types::EntityKind::Category => ledger::EntityKind::Category,
        },
        entity_id: change.entity_id,
        payload: change.payload.clone(),
        base_revision: change.base_revision,
        revision: change.revision,
        updated_at: change.updated_at,
        origin_device: change.device_id.clone(),
    }
}
