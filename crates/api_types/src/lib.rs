//! Wire contract between a device and the remote store.
//!
//! The remote store is a keyed document store addressed by user id + entity
//! id. A device pushes its journaled local mutations in sequence order and
//! pulls the remote change stream from a cursor. Everything here is plain
//! serde data; transport concerns live in the `sync` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of entity a change applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Transaction,
    Category,
}

/// Operation carried by a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

/// One mutation in the remote change stream (or being pushed into it).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteChange {
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub op: ChangeOp,
    /// Full entity snapshot after the mutation. Empty object for deletes.
    pub payload: serde_json::Value,
    /// Revision the mutation was built on (0 for creates).
    pub base_revision: i64,
    /// Revision produced by the mutation.
    pub revision: i64,
    /// Wall-clock time of the mutation, used for last-writer-wins.
    pub updated_at: DateTime<Utc>,
    /// Device that originated the change.
    pub device_id: String,
}

/// Push of locally journaled changes, oldest-first.
///
/// `seqs[i]` is the device-local sequence number of `changes[i]`; the server
/// echoes back the sequence numbers it made durable so the device can prune
/// its journal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushRequest {
    pub user_id: String,
    pub device_id: String,
    pub seqs: Vec<i64>,
    pub changes: Vec<RemoteChange>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushResponse {
    /// Sequence numbers durably accepted by the remote store.
    ///
    /// A device must only prune journal entries named here.
    pub acked_seqs: Vec<i64>,
}

/// Pull of the remote change stream from a cursor (exclusive).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PullRequest {
    pub user_id: String,
    pub device_id: String,
    /// High-water mark from the previous merge; 0 on first sync.
    pub cursor: i64,
    pub limit: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PullResponse {
    pub changes: Vec<RemoteChange>,
    /// New high-water mark; persist only after the batch merged cleanly.
    pub next_cursor: i64,
}
