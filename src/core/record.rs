//! Execution record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::HookRequest;

/// Lifecycle status of a hook execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookStatus {
    /// Waiting for a worker slot and/or contested locks
    Queued,

    /// Admitted: slot claimed, locks held, about to run
    Admitted,

    /// Payload is executing
    Running,

    /// Payload completed successfully
    Succeeded,

    /// Payload failed terminally (permanent failure or attempts exhausted)
    Failed,

    /// Final attempt exceeded the timeout budget
    TimedOut,

    /// Removed from the queue or force-reclaimed before completion
    Cancelled,
}

impl HookStatus {
    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HookStatus::Succeeded
                | HookStatus::Failed
                | HookStatus::TimedOut
                | HookStatus::Cancelled
        )
    }

    /// Check if the request is consuming a worker slot
    pub fn is_active(&self) -> bool {
        matches!(self, HookStatus::Admitted | HookStatus::Running)
    }
}

impl std::fmt::Display for HookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookStatus::Queued => write!(f, "Queued"),
            HookStatus::Admitted => write!(f, "Admitted"),
            HookStatus::Running => write!(f, "Running"),
            HookStatus::Succeeded => write!(f, "Succeeded"),
            HookStatus::Failed => write!(f, "Failed"),
            HookStatus::TimedOut => write!(f, "TimedOut"),
            HookStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// The engine's record of one submitted request
///
/// Created on submission, mutated only by the scheduler, published to the
/// caller through its handle. Pruned after a retention window once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookExecutionRecord {
    /// The owned, immutable request
    pub request: HookRequest,

    /// Current lifecycle status
    pub status: HookStatus,

    /// Current attempt number (1..=max_attempts); 0 before first dispatch
    pub attempt: u32,

    /// When execution first started
    pub started_at: Option<DateTime<Utc>>,

    /// When a terminal status was reached
    pub finished_at: Option<DateTime<Utc>>,

    /// Slot id the request ran on
    pub worker_id: Option<usize>,

    /// Message of the most recent failure, preserved across retries
    pub last_error: Option<String>,
}

impl HookExecutionRecord {
    /// Create a fresh record for a newly submitted request
    pub fn new(request: HookRequest) -> Self {
        Self {
            request,
            status: HookStatus::Queued,
            attempt: 0,
            started_at: None,
            finished_at: None,
            worker_id: None,
            last_error: None,
        }
    }

    /// Request id shortcut
    pub fn id(&self) -> Uuid {
        self.request.id
    }

    /// Check if the record has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition to a terminal status, stamping `finished_at`
    ///
    /// Every terminal record carries a non-null `finished_at`.
    pub(crate) fn finish(&mut self, status: HookStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.finished_at = Some(Utc::now());
        if error.is_some() {
            self.last_error = error;
        }
    }

    /// Execution duration, measured from dispatch (or submission if the
    /// request never started) to the terminal transition
    pub fn duration(&self) -> Option<std::time::Duration> {
        let finished = self.finished_at?;
        let started = self.started_at.unwrap_or(self.request.submitted_at);
        (finished - started).to_std().ok()
    }
}
