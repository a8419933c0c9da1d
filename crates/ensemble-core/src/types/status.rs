//! Task and step status state machine.
//!
//! The active path is `pending → running → {success, failed}`. The remaining
//! values are persisted and queryable but only set through explicit field
//! updates (`scheduled`, `cancelled`, `paused`, `timeout`).

use serde::{Deserialize, Serialize};

/// Shared status for tasks and steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Materialized, waiting to be claimed by the scheduler
    Pending,
    /// Reserved: accepted for a future scheduling window
    Scheduled,
    /// Claimed by a scheduler pass; execution in progress
    Running,
    /// Terminal: every step succeeded
    Success,
    /// Terminal: at least one step failed
    Failed,
    /// Reserved: cancelled before completion
    Cancelled,
    /// Reserved: suspended by an operator
    Paused,
    /// Reserved: exceeded an execution deadline
    Timeout,
}

impl TaskStatus {
    /// Stable lowercase label, used for persistence and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Paused => "paused",
            TaskStatus::Timeout => "timeout",
        }
    }

    /// Check if the status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout
        )
    }

    /// Check if the status marks in-flight execution.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "scheduled" => Ok(TaskStatus::Scheduled),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            "paused" => Ok(TaskStatus::Paused),
            "timeout" => Ok(TaskStatus::Timeout),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Error returned when a persisted status label is not recognized.
#[derive(Debug, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);
