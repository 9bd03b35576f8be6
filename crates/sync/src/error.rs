//! Errors surfaced by the sync engine.
//!
//! `Unavailable` is the non-fatal "remote unreachable" status the UI layer
//! may display; it is produced after retries with backoff are exhausted and
//! never corrupts local state. `Remote` is a non-retryable remote rejection.

use ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Network/remote failure after the backoff ceiling; retry next cycle.
    #[error("sync unavailable: {0}")]
    Unavailable(String),
    /// The remote store rejected the request; retrying will not help.
    #[error("remote rejected request: {0}")]
    Remote(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type ResultSync<T> = Result<T, SyncError>;
