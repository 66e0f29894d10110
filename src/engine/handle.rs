//! ExecutionHandle - caller-side view of one submitted request
//!
//! The handle is what external code (protocol layer, CLI, tests) uses to
//! follow a request after submission:
//! - Read the latest execution record
//! - Await status changes / the terminal record
//! - Request cancellation
//!
//! It can be cloned and shared across tasks; every clone observes the same
//! record stream.

use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::core::record::{HookExecutionRecord, HookStatus};

use super::command::{CommandSender, EngineCommand};

/// Handle to a submitted hook request
#[derive(Clone)]
pub struct ExecutionHandle {
    /// Request id this handle tracks
    id: Uuid,

    /// Latest record published by the scheduler
    record_rx: watch::Receiver<HookExecutionRecord>,

    /// Channel back into the decision loop (for cancel)
    commands: CommandSender,
}

impl ExecutionHandle {
    /// Create a handle; called by the scheduler on submission, not directly
    pub(crate) fn new(
        id: Uuid,
        record_rx: watch::Receiver<HookExecutionRecord>,
        commands: CommandSender,
    ) -> Self {
        Self {
            id,
            record_rx,
            commands,
        }
    }

    /// The request id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Clone of the latest published record
    pub fn snapshot(&self) -> HookExecutionRecord {
        self.record_rx.borrow().clone()
    }

    /// Latest published status
    pub fn status(&self) -> HookStatus {
        self.record_rx.borrow().status
    }

    /// Check if the request has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.record_rx.borrow().is_terminal()
    }

    /// Wait for the next record update
    ///
    /// Returns `false` if the scheduler dropped the publisher (the record
    /// was pruned); the last snapshot remains readable.
    pub async fn changed(&mut self) -> bool {
        self.record_rx.changed().await.is_ok()
    }

    /// Wait until the request reaches a terminal status
    pub async fn wait(&mut self) -> HookExecutionRecord {
        loop {
            {
                let record = self.record_rx.borrow();
                if record.is_terminal() {
                    return record.clone();
                }
            }
            if self.record_rx.changed().await.is_err() {
                // Publisher gone; whatever we hold is final
                return self.record_rx.borrow().clone();
            }
        }
    }

    /// Request cancellation
    ///
    /// Returns `true` if the engine accepted the cancellation (the request
    /// was still queued or running). The terminal `Cancelled` record arrives
    /// through the normal status stream.
    pub async fn cancel(&self) -> bool {
        let (reply, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(EngineCommand::Cancel {
                id: self.id,
                reply,
            })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("id", &self.id)
            .field("status", &self.record_rx.borrow().status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::HookExecutionRecord;
    use crate::core::request::{HookRequest, HookType};
    use crate::engine::command::create_command_channel;
    use serde_json::json;

    fn test_handle() -> (
        ExecutionHandle,
        watch::Sender<HookExecutionRecord>,
        crate::engine::command::CommandReceiver,
    ) {
        let request = HookRequest::new(HookType::Notify, json!({}));
        let id = request.id;
        let record = HookExecutionRecord::new(request);
        let (record_tx, record_rx) = watch::channel(record);
        let (cmd_tx, cmd_rx) = create_command_channel();
        (ExecutionHandle::new(id, record_rx, cmd_tx), record_tx, cmd_rx)
    }

    #[tokio::test]
    async fn test_snapshot_tracks_published_records() {
        let (handle, record_tx, _cmd_rx) = test_handle();
        assert_eq!(handle.status(), HookStatus::Queued);

        record_tx.send_modify(|r| r.status = HookStatus::Running);
        assert_eq!(handle.status(), HookStatus::Running);
    }

    #[tokio::test]
    async fn test_wait_returns_terminal_record() {
        let (mut handle, record_tx, _cmd_rx) = test_handle();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            record_tx.send_modify(|r| r.status = HookStatus::Running);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            record_tx.send_modify(|r| r.finish(HookStatus::Succeeded, None));
        });

        let record = handle.wait().await;
        assert_eq!(record.status, HookStatus::Succeeded);
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_wait_survives_dropped_publisher() {
        let (mut handle, record_tx, _cmd_rx) = test_handle();
        drop(record_tx);

        // Publisher gone before any terminal state; wait returns the last
        // snapshot instead of hanging
        let record = handle.wait().await;
        assert_eq!(record.status, HookStatus::Queued);
    }

    #[tokio::test]
    async fn test_cancel_sends_command() {
        let (handle, _record_tx, mut cmd_rx) = test_handle();
        let id = handle.id();

        let task = tokio::spawn(async move { handle.cancel().await });

        match cmd_rx.recv().await.unwrap() {
            EngineCommand::Cancel { id: got, reply } => {
                assert_eq!(got, id);
                reply.send(true).unwrap();
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(task.await.unwrap());
    }
}
