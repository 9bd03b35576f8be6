use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Where an entity stands relative to the remote store.
///
/// - `LocalOnly`: constructed but not yet journaled (never stored).
/// - `Pending`: stored locally, journal entry awaiting remote ack.
/// - `Synced`: remote store confirmed the latest revision.
/// - `Conflicted`: a divergent remote change touched the entity; surfaced to
///   the caller and never auto-resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    LocalOnly,
    Pending,
    Synced,
    Conflicted,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalOnly => "local_only",
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Conflicted => "conflicted",
        }
    }
}

impl TryFrom<&str> for SyncState {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "local_only" => Ok(Self::LocalOnly),
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "conflicted" => Ok(Self::Conflicted),
            other => Err(LedgerError::DataCorruption(format!(
                "invalid sync state: {other}"
            ))),
        }
    }
}
