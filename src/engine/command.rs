//! Engine command channel
//!
//! Every mutation of queue/lock/graph state travels through this channel to
//! the scheduler task; callers get answers back on oneshot reply channels.
//! Worker tasks report progress and completion through the same channel, so
//! the scheduler never shares mutable state with anything.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::core::record::HookExecutionRecord;
use crate::core::request::{HookRequest, HookType};
use crate::core::EngineResult;
use crate::metrics::MetricsSnapshot;
use crate::retry::RetryOutcome;

use super::handle::ExecutionHandle;

/// Buffer size for the command channel
pub const COMMAND_CHANNEL_SIZE: usize = 64;

/// Sender half of the command channel (held by facade, handles, workers)
pub type CommandSender = mpsc::Sender<EngineCommand>;

/// Receiver half of the command channel (owned by the scheduler)
pub type CommandReceiver = mpsc::Receiver<EngineCommand>;

/// Create the engine command channel
pub fn create_command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::channel(COMMAND_CHANNEL_SIZE)
}

/// Commands processed by the scheduler's serialized decision loop
#[derive(Debug)]
pub enum EngineCommand {
    /// Submit a new request for admission
    Submit {
        /// The request to admit
        request: HookRequest,
        /// Resolves to a handle once the request is queued
        reply: oneshot::Sender<EngineResult<ExecutionHandle>>,
    },

    /// Fetch the current record for a request
    Status {
        /// Request id
        id: Uuid,
        /// Resolves to the record, if still retained
        reply: oneshot::Sender<Option<HookExecutionRecord>>,
    },

    /// Cancel a queued or running request
    Cancel {
        /// Request id
        id: Uuid,
        /// `true` if the cancellation was accepted
        reply: oneshot::Sender<bool>,
    },

    /// Fetch metrics for one hook type
    Metrics {
        /// The hook type to report on
        hook_type: HookType,
        /// Snapshot, if the type has recorded any outcome
        reply: oneshot::Sender<Option<MetricsSnapshot>>,
    },

    /// Fetch metrics for every hook type
    AllMetrics {
        /// Snapshots in stable order
        reply: oneshot::Sender<Vec<(HookType, MetricsSnapshot)>>,
    },

    /// Drain in-flight work and stop
    Shutdown {
        /// Grace period for running executions
        grace: Duration,
        /// Acked once the engine reaches `Stopped`
        reply: oneshot::Sender<()>,
    },

    /// Skip the grace period: reclaim slots, release locks, stop
    EmergencyReset {
        /// Acked once the reset completed
        reply: oneshot::Sender<()>,
    },

    /// Worker progress: an attempt is starting (internal)
    AttemptStarted {
        /// Request id
        id: Uuid,
        /// Attempt number (1-based)
        attempt: u32,
    },

    /// Worker completion report (internal)
    ExecutionFinished {
        /// Request id
        id: Uuid,
        /// Terminal outcome from the retry controller
        outcome: RetryOutcome,
    },
}
