//! Session status
//!
//! ```text
//! Inactive
//!   ↓ open
//! Connecting
//!   ↓ first matching connection
//! Active ⇄ OutOfSync / SyncError
//!   ↓ save            ↓ current file change
//! Reloading         Restarting
//! ```
//!
//! Any state returns to Inactive on close.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    Inactive = 0,
    Connecting = 1,
    Active = 2,
    /// A related document has unsaved edits that cannot be pushed live
    OutOfSync = 3,
    /// A live document has syntax errors and stopped pushing
    SyncError = 4,
    Reloading = 5,
    Restarting = 6,
}

impl LiveStatus {
    /// Integer code reported to status listeners
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Connected to a browser showing the primary document
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            LiveStatus::Active | LiveStatus::OutOfSync | LiveStatus::SyncError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LiveStatus::Inactive => "inactive",
            LiveStatus::Connecting => "connecting",
            LiveStatus::Active => "active",
            LiveStatus::OutOfSync => "out_of_sync",
            LiveStatus::SyncError => "sync_error",
            LiveStatus::Reloading => "reloading",
            LiveStatus::Restarting => "restarting",
        }
    }
}

impl std::fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inactive" => Ok(LiveStatus::Inactive),
            "connecting" => Ok(LiveStatus::Connecting),
            "active" => Ok(LiveStatus::Active),
            "out_of_sync" => Ok(LiveStatus::OutOfSync),
            "sync_error" => Ok(LiveStatus::SyncError),
            "reloading" => Ok(LiveStatus::Reloading),
            "restarting" => Ok(LiveStatus::Restarting),
            _ => Err(format!("Unknown live status: {}", s)),
        }
    }
}

/// Why a session went back to Inactive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    ExplicitClose,
    NavigatedAway,
    DetachedTargetClosed,
    DetachedReplacedWithDevtools,
    Unknown,
    /// No browser connected within the configured timeout
    ConnectTimeout,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ExplicitClose => "explicit_close",
            CloseReason::NavigatedAway => "navigated_away",
            CloseReason::DetachedTargetClosed => "detached_target_closed",
            CloseReason::DetachedReplacedWithDevtools => "detached_replaced_with_devtools",
            CloseReason::Unknown => "unknown",
            CloseReason::ConnectTimeout => "connect_timeout",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Published on every status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: LiveStatus,
    /// Only set when the status is Inactive
    pub reason: Option<CloseReason>,
}
