//! Local-first ledger core for budget_zen.
//!
//! Transactions and categories live in a single on-device sqlite database,
//! every mutation is journaled into an append-only change log, and spend
//! vs. budget summaries are derived on demand. The `sync` crate drives the
//! journal against the remote store; this crate never touches the network.

pub use budget::{BudgetSummary, summarize};
pub use categories::{BudgetPeriod, Category};
pub use change_log::{ChangeLog, ChangeOp, ChangeRecord, EntityKind};
pub use currency::Currency;
pub use error::LedgerError;
pub use money::Money;
pub use store::{IncomingChange, LocalStore, MergeOutcome};
pub use sync_state::SyncState;
pub use transactions::Transaction;

pub mod budget;
mod categories;
mod change_log;
mod currency;
mod error;
mod money;
mod store;
mod sync_cursor;
mod sync_state;
mod transactions;

type ResultLedger<T> = Result<T, LedgerError>;
