// Errors raised while scanning, reconciling and looking up addresses.

use chrono::{DateTime, Utc};

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("[{switch}] scan timed out")]
    ScanTimeout { switch: String },

    #[error("[{switch}] scan authentication failed")]
    ScanAuthFailure { switch: String },

    #[error("[{switch}] scan failed: {message}")]
    Scan { switch: String, message: String },

    #[error("inventory error: {0}")]
    Inventory(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store rejected {mac}: {message}")]
    StoreRejected { mac: String, message: String },

    #[error("observation of {mac} at {observed_at} is older than last_seen {last_seen}")]
    StaleObservation {
        mac: String,
        observed_at: DateTime<Utc>,
        last_seen: DateTime<Utc>,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Connectivity-level store failures abort a whole run, everything else is
    /// scoped to one switch or one MAC.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrackerError::StoreUnavailable(_))
    }

    /// Per-switch failures: the switch is skipped and the run continues.
    pub fn is_scan_failure(&self) -> bool {
        matches!(
            self,
            TrackerError::ScanTimeout { .. }
                | TrackerError::ScanAuthFailure { .. }
                | TrackerError::Scan { .. }
        )
    }
}
