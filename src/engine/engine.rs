//! HookEngine - public facade over the scheduler
//!
//! The engine spawns the scheduler task and exposes the caller-facing
//! surface: `submit`, `status`, `cancel`, `metrics`, `shutdown`,
//! `emergency_reset`. It is cheap to clone; every clone talks to the same
//! scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, EngineResult};
use crate::core::record::HookExecutionRecord;
use crate::core::request::{HookRequest, HookType};
use crate::metrics::MetricsSnapshot;
use crate::pool::PayloadExecutor;
use crate::store::KeyValueStore;

use super::command::{create_command_channel, CommandSender, EngineCommand};
use super::handle::ExecutionHandle;
use super::scheduler::Scheduler;

/// Facade over the hook execution engine
///
/// # Example
///
/// ```ignore
/// let engine = HookEngine::start(EngineConfig::default(), executor);
///
/// let request = HookRequest::new(HookType::PreBash, json!({"command": "ls"}));
/// let mut handle = engine.submit(request).await?;
/// let record = handle.wait().await;
/// assert_eq!(record.status, HookStatus::Succeeded);
///
/// engine.shutdown(Duration::from_secs(2)).await;
/// ```
#[derive(Clone)]
pub struct HookEngine {
    commands: CommandSender,
}

impl HookEngine {
    /// Start an engine with in-memory state only
    pub fn start(config: EngineConfig, executor: Arc<dyn PayloadExecutor>) -> Self {
        Self::start_inner(config, executor, None)
    }

    /// Start an engine that mirrors locks and metrics into a store
    ///
    /// The store is a durability aid; the engine never blocks a decision on
    /// it and never reads it back during normal operation.
    pub fn start_with_store(
        config: EngineConfig,
        executor: Arc<dyn PayloadExecutor>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::start_inner(config, executor, Some(store))
    }

    fn start_inner(
        config: EngineConfig,
        executor: Arc<dyn PayloadExecutor>,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        let (commands, command_rx) = create_command_channel();
        let scheduler = Scheduler::new(config, executor, store, command_rx, commands.downgrade());
        tokio::spawn(scheduler.run());
        Self { commands }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> EngineResult<T> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Submit a request; resolves once it is validated and queued
    pub async fn submit(&self, request: HookRequest) -> EngineResult<ExecutionHandle> {
        self.request(move |reply| EngineCommand::Submit { request, reply })
            .await?
    }

    /// Current execution record for a request, if still retained
    pub async fn status(&self, id: Uuid) -> Option<HookExecutionRecord> {
        self.request(move |reply| EngineCommand::Status { id, reply })
            .await
            .ok()
            .flatten()
    }

    /// Cancel a queued or running request by id
    pub async fn cancel(&self, id: Uuid) -> bool {
        self.request(move |reply| EngineCommand::Cancel { id, reply })
            .await
            .unwrap_or(false)
    }

    /// Metrics snapshot for one hook type
    pub async fn metrics(&self, hook_type: HookType) -> Option<MetricsSnapshot> {
        self.request(move |reply| EngineCommand::Metrics { hook_type, reply })
            .await
            .ok()
            .flatten()
    }

    /// Metrics snapshots for every hook type that has recorded an outcome
    pub async fn all_metrics(&self) -> Vec<(HookType, MetricsSnapshot)> {
        self.request(|reply| EngineCommand::AllMetrics { reply })
            .await
            .unwrap_or_default()
    }

    /// Graceful shutdown; resolves once the engine is stopped
    ///
    /// Queued requests are cancelled immediately; running executions get up
    /// to `grace` to finish before being force-reclaimed.
    pub async fn shutdown(&self, grace: Duration) {
        let _ = self
            .request(move |reply| EngineCommand::Shutdown { grace, reply })
            .await;
    }

    /// Emergency reset: like shutdown with a zero grace period
    pub async fn emergency_reset(&self) {
        let _ = self
            .request(|reply| EngineCommand::EmergencyReset { reply })
            .await;
    }
}

impl std::fmt::Debug for HookEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookEngine").finish()
    }
}
