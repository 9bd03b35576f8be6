//! Errors the ledger can return.
//!
//! Local read/write failures are returned synchronously to the caller.
//! [`DataCorruption`] is fatal and never retried; everything else is a normal
//! caller-visible outcome.
//!
//! [`DataCorruption`]: LedgerError::DataCorruption
use sea_orm::DbErr;
use thiserror::Error;

/// Ledger custom errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("\"{0}\" not found")]
    NotFound(String),
    #[error("revision conflict: expected {expected}, found {found}")]
    Conflict { expected: i64, found: i64 },
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error("data corruption: {0}")]
    DataCorruption(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for LedgerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (
                Self::Conflict {
                    expected: ae,
                    found: af,
                },
                Self::Conflict {
                    expected: be,
                    found: bf,
                },
            ) => ae == be && af == bf,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::CurrencyMismatch(a), Self::CurrencyMismatch(b)) => a == b,
            (Self::DataCorruption(a), Self::DataCorruption(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
