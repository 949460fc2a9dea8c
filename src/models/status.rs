/// Job status definitions for the crawl lifecycle
///
/// A job moves `pending → running → {completed | failed | stopped}`. Terminal
/// states never change again.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the lifecycle state of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job record created, not yet started
    Pending,

    /// Worker pool actively dequeuing and fetching
    Running,

    // ===== Terminal States =====
    /// Frontier exhausted, or the duration limit was reached
    Completed,

    /// Unrecoverable startup or storage error
    Failed,

    /// Explicit stop request processed
    Stopped,
}

impl JobStatus {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    ///
    /// Transitions are one-way: a pending job may start or fail (or be
    /// stopped before it starts); a running job may only end.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Failed | Self::Stopped),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Stopped => false,
        }
    }

    /// Converts the status to its persisted string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Parses a status from its persisted string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
