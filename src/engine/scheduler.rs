//! The scheduler task
//!
//! One spawned task owns every piece of coordination state (admission
//! queue, record table, lock table, worker slots, metrics) and mutates it
//! only in response to commands. That single-writer discipline is what
//! keeps the engine's invariants auditable in one place:
//!
//! - running executions never exceed the pool size
//! - at most one live lock owner per resource key
//! - no admission that closes a wait-for cycle
//! - every terminal record has a `finished_at` and an explaining status
//!
//! Payload executions themselves run as parallel tokio tasks; they only
//! talk back through the command channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::coordination::{Acquire, LockManager, WaitForGraph};
use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, EngineResult};
use crate::core::record::{HookExecutionRecord, HookStatus};
use crate::core::request::HookRequest;
use crate::metrics::MetricsRegistry;
use crate::pool::{PayloadExecutor, WorkerPool};
use crate::queue::AdmissionQueue;
use crate::retry::{run_with_retry, RetryOutcome};
use crate::store::KeyValueStore;

use super::command::{CommandReceiver, EngineCommand};
use super::handle::ExecutionHandle;

/// Engine lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting and executing requests
    Running,
    /// Shutdown requested; in-flight work draining, no new admissions
    Draining,
    /// All slots reclaimed, all locks released
    Stopped,
}

struct RunningExecution {
    worker_id: usize,
    cancel: CancellationToken,
}

fn chrono_dur(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365))
}

pub(crate) struct Scheduler {
    config: EngineConfig,
    executor: Arc<dyn PayloadExecutor>,
    store: Option<Arc<dyn KeyValueStore>>,
    commands: CommandReceiver,
    /// Weak so the loop ends once every facade, handle and worker is gone
    command_tx: mpsc::WeakSender<EngineCommand>,
    queue: AdmissionQueue,
    records: HashMap<Uuid, HookExecutionRecord>,
    watchers: HashMap<Uuid, watch::Sender<HookExecutionRecord>>,
    locks: LockManager,
    pool: WorkerPool,
    running: HashMap<Uuid, RunningExecution>,
    metrics: MetricsRegistry,
    lifecycle: Lifecycle,
    /// Shutdown requests that arrived while a drain was already underway
    pending_shutdown_acks: Vec<oneshot::Sender<()>>,
}

impl Scheduler {
    pub(crate) fn new(
        config: EngineConfig,
        executor: Arc<dyn PayloadExecutor>,
        store: Option<Arc<dyn KeyValueStore>>,
        commands: CommandReceiver,
        command_tx: mpsc::WeakSender<EngineCommand>,
    ) -> Self {
        let pool = WorkerPool::new(config.pool_size);
        Self {
            config,
            executor,
            store,
            commands,
            command_tx,
            queue: AdmissionQueue::new(),
            records: HashMap::new(),
            watchers: HashMap::new(),
            locks: LockManager::new(),
            pool,
            running: HashMap::new(),
            metrics: MetricsRegistry::new(),
            lifecycle: Lifecycle::Running,
            pending_shutdown_acks: Vec::new(),
        }
    }

    /// Drive the decision loop until every command sender is gone
    pub(crate) async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe = self.commands.recv() => match maybe {
                    Some(EngineCommand::Shutdown { grace, reply }) => {
                        self.shutdown(grace).await;
                        let _ = reply.send(());
                        for ack in std::mem::take(&mut self.pending_shutdown_acks) {
                            let _ = ack.send(());
                        }
                    }
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                _ = sweep.tick() => self.housekeeping(),
            }
        }

        tracing::debug!("engine scheduler stopped");
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Submit { request, reply } => self.handle_submit(request, reply),
            EngineCommand::Status { id, reply } => {
                let _ = reply.send(self.records.get(&id).cloned());
            }
            EngineCommand::Cancel { id, reply } => {
                let accepted = self.handle_cancel(id);
                let _ = reply.send(accepted);
            }
            EngineCommand::Metrics { hook_type, reply } => {
                let _ = reply.send(self.metrics.snapshot(hook_type));
            }
            EngineCommand::AllMetrics { reply } => {
                let _ = reply.send(self.metrics.all_snapshots());
            }
            EngineCommand::EmergencyReset { reply } => {
                self.emergency_reset("requested out-of-band");
                let _ = reply.send(());
            }
            EngineCommand::AttemptStarted { id, attempt } => {
                self.handle_attempt_started(id, attempt);
            }
            EngineCommand::ExecutionFinished { id, outcome } => {
                self.handle_finished(id, outcome);
            }
            // Only reachable while a drain is already processing commands;
            // ack once that drain completes
            EngineCommand::Shutdown { reply, .. } => {
                if self.lifecycle == Lifecycle::Stopped {
                    let _ = reply.send(());
                } else {
                    self.pending_shutdown_acks.push(reply);
                }
            }
        }
    }

    // =========================================================================
    // Submission & admission
    // =========================================================================

    fn handle_submit(
        &mut self,
        mut request: HookRequest,
        reply: oneshot::Sender<EngineResult<ExecutionHandle>>,
    ) {
        if self.lifecycle != Lifecycle::Running {
            let _ = reply.send(Err(EngineError::ShutdownInProgress));
            return;
        }
        if let Err(e) = request.validate() {
            let _ = reply.send(Err(e));
            return;
        }
        if self.records.contains_key(&request.id) {
            let _ = reply.send(Err(EngineError::invalid("duplicate request id")));
            return;
        }
        let Some(command_tx) = self.command_tx.upgrade() else {
            let _ = reply.send(Err(EngineError::ChannelClosed));
            return;
        };

        // Config-level budget overrides apply to requests that kept their
        // hook type's default
        if request.timeout_budget == request.hook_type.timeout_budget() {
            request.timeout_budget = self.config.timeout_for(request.hook_type);
        }

        let id = request.id;
        let priority = request.priority;
        tracing::info!(
            request_id = %id,
            hook_type = %request.hook_type,
            priority = %priority,
            resources = request.required_resources.len(),
            "request queued"
        );

        let record = HookExecutionRecord::new(request);
        let (record_tx, record_rx) = watch::channel(record.clone());
        self.records.insert(id, record);
        self.watchers.insert(id, record_tx);
        self.queue.push(id, priority);

        let _ = reply.send(Ok(ExecutionHandle::new(id, record_rx, command_tx)));
        self.reevaluate();
    }

    /// Re-run admission over the queue, high tier first, FIFO within a tier
    fn reevaluate(&mut self) {
        if self.lifecycle != Lifecycle::Running {
            return;
        }
        let candidates: Vec<Uuid> = self.queue.iter_in_order().collect();
        for id in candidates {
            if self.lifecycle != Lifecycle::Running || self.pool.idle_count() == 0 {
                break;
            }
            self.try_admit(id);
        }
    }

    fn try_admit(&mut self, id: Uuid) {
        let required: Vec<String> = match self.records.get(&id) {
            Some(record) if record.status == HookStatus::Queued => {
                record.request.required_resources.iter().cloned().collect()
            }
            Some(_) => return,
            None => {
                self.queue.remove(id);
                self.internal_failure(format!("queued request {} has no record", id));
                return;
            }
        };

        let mut contested: Vec<String> = Vec::new();
        let mut to_acquire: Vec<String> = Vec::new();
        for key in &required {
            match self.locks.owner_of(key) {
                Some(owner) if owner == id => {}
                Some(_) => contested.push(key.clone()),
                None => to_acquire.push(key.clone()),
            }
        }

        if contested.is_empty() {
            // Everything needed is free or already ours: acquire and run
            for key in &to_acquire {
                match self.locks.acquire(key, id, self.config.lock_ttl) {
                    Acquire::Acquired => self.mirror_lock_set(key, id),
                    Acquire::AlreadyOwner => {}
                    Acquire::HeldByOther { owner } => {
                        self.internal_failure(format!(
                            "lock {} offered to {} while live owner {} exists",
                            key, id, owner
                        ));
                        return;
                    }
                }
            }
            self.dispatch(id);
        } else if !to_acquire.is_empty() {
            // Taking a partial set creates hold-and-wait; reject now if that
            // would close a cycle in the wait-for graph
            if self.would_create_cycle(id, &to_acquire) {
                self.reject_deadlock(id, &contested);
                return;
            }
            for key in &to_acquire {
                if matches!(
                    self.locks.acquire(key, id, self.config.lock_ttl),
                    Acquire::Acquired
                ) {
                    self.mirror_lock_set(key, id);
                }
            }
            tracing::debug!(
                request_id = %id,
                holding = to_acquire.len(),
                waiting_on = contested.len(),
                "partial acquisition, request stays queued"
            );
        }
        // Nothing free to take: keep waiting on the contested resources
    }

    /// Would granting `would_hold` to `candidate` close a wait-for cycle?
    fn would_create_cycle(&self, candidate: Uuid, would_hold: &[String]) -> bool {
        let mut owners: HashMap<&str, Uuid> = self
            .locks
            .live_locks()
            .map(|lock| (lock.resource_key.as_str(), lock.owner))
            .collect();
        for key in would_hold {
            owners.insert(key.as_str(), candidate);
        }

        let mut graph = WaitForGraph::new();
        for waiter in self.queue.iter_in_order() {
            let Some(record) = self.records.get(&waiter) else {
                continue;
            };
            for key in &record.request.required_resources {
                if let Some(&owner) = owners.get(key.as_str()) {
                    graph.add_wait(waiter, owner);
                }
            }
        }

        graph.has_cycle_through(candidate)
    }

    fn reject_deadlock(&mut self, id: Uuid, contested: &[String]) {
        self.queue.remove(id);
        let released = self.locks.release_all_for(id);
        self.mirror_locks_deleted(&released);

        let error = EngineError::deadlock(contested);
        tracing::warn!(request_id = %id, %error, "admission rejected to avoid deadlock");
        self.finish_record(id, HookStatus::Failed, Some(error.to_string()));
    }

    // =========================================================================
    // Dispatch & execution
    // =========================================================================

    fn dispatch(&mut self, id: Uuid) {
        let (request, mode) = match self.records.get(&id) {
            Some(record) => (
                record.request.clone(),
                self.config.mode_for(record.request.hook_type),
            ),
            None => {
                self.internal_failure(format!("dispatch of unknown request {}", id));
                return;
            }
        };
        let Some(worker_id) = self.pool.claim(id, mode) else {
            self.internal_failure(format!("dispatch of {} with no idle slot", id));
            return;
        };
        let Some(command_tx) = self.command_tx.upgrade() else {
            // Engine dropped mid-decision; the loop is about to exit anyway
            self.pool.free(worker_id);
            return;
        };
        self.queue.remove(id);

        if let Some(record) = self.records.get_mut(&id) {
            record.status = HookStatus::Admitted;
            record.worker_id = Some(worker_id);
            record.started_at = Some(Utc::now());
        }
        self.publish(id);
        if let Some(record) = self.records.get_mut(&id) {
            record.status = HookStatus::Running;
            record.attempt = 1;
        }
        self.publish(id);

        let cancel = CancellationToken::new();
        self.running.insert(
            id,
            RunningExecution {
                worker_id,
                cancel: cancel.clone(),
            },
        );

        let executor = Arc::clone(&self.executor);
        let policy = self.config.retry_for(request.hook_type);
        let budget = request.timeout_budget;
        let max_attempts = request.max_attempts;

        tracing::info!(request_id = %id, worker_id, mode = %mode, "request admitted");

        tokio::spawn(async move {
            let attempts_tx = command_tx.clone();
            let outcome = run_with_retry(policy, max_attempts, budget, &cancel, |attempt| {
                if attempt > 1 {
                    let _ = attempts_tx.try_send(EngineCommand::AttemptStarted { id, attempt });
                }
                let executor = Arc::clone(&executor);
                let request = request.clone();
                async move { executor.run(&request, mode).await }
            })
            .await;

            if command_tx
                .send(EngineCommand::ExecutionFinished { id, outcome })
                .await
                .is_err()
            {
                tracing::warn!(request_id = %id, "scheduler gone before completion report");
            }
        });
    }

    fn handle_attempt_started(&mut self, id: Uuid, attempt: u32) {
        if let Some(record) = self.records.get_mut(&id) {
            if !record.is_terminal() {
                record.attempt = attempt;
                record.status = HookStatus::Running;
            }
        }
        self.publish(id);
    }

    fn handle_finished(&mut self, id: Uuid, outcome: RetryOutcome) {
        let Some(running) = self.running.remove(&id) else {
            // Completion report after a force-reclaim; already accounted for
            tracing::debug!(request_id = %id, "late completion report ignored");
            return;
        };
        self.pool.free(running.worker_id);

        let budget = self
            .records
            .get(&id)
            .map(|r| r.request.timeout_budget)
            .unwrap_or_default();
        let (status, attempts, error) = match outcome {
            RetryOutcome::Succeeded { attempts, output } => {
                tracing::trace!(request_id = %id, %output, "payload output");
                (HookStatus::Succeeded, attempts, None)
            }
            RetryOutcome::Failed { attempts, error } => (HookStatus::Failed, attempts, Some(error)),
            RetryOutcome::TimedOut { attempts } => (
                HookStatus::TimedOut,
                attempts,
                Some(EngineError::TimedOut { budget }.to_string()),
            ),
            RetryOutcome::Cancelled { attempts } => (
                HookStatus::Cancelled,
                attempts,
                Some(EngineError::Cancelled.to_string()),
            ),
        };

        if let Some(record) = self.records.get_mut(&id) {
            record.attempt = attempts;
        }
        match status {
            HookStatus::Succeeded => {
                tracing::info!(request_id = %id, attempts, "execution succeeded");
            }
            _ => tracing::warn!(
                request_id = %id,
                attempts,
                status = %status,
                error = error.as_deref().unwrap_or(""),
                "execution ended"
            ),
        }
        self.finish_record(id, status, error);

        let released = self.locks.release_all_for(id);
        self.mirror_locks_deleted(&released);
        self.reevaluate();
    }

    // =========================================================================
    // Cancellation & lifecycle
    // =========================================================================

    fn handle_cancel(&mut self, id: Uuid) -> bool {
        if let Some(running) = self.running.get(&id) {
            tracing::info!(request_id = %id, "cancelling running execution");
            running.cancel.cancel();
            // Terminal transition arrives via ExecutionFinished
            return true;
        }
        if self.queue.remove(id) {
            let released = self.locks.release_all_for(id);
            self.mirror_locks_deleted(&released);
            tracing::info!(request_id = %id, "cancelled queued request");
            self.finish_record(id, HookStatus::Cancelled, Some(EngineError::Cancelled.to_string()));
            self.reevaluate();
            return true;
        }
        false
    }

    /// Graceful shutdown: cancel the backlog, drain in-flight work for up to
    /// `grace`, then force-reclaim and release everything
    async fn shutdown(&mut self, grace: Duration) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }
        self.lifecycle = Lifecycle::Draining;
        tracing::info!(
            grace_ms = grace.as_millis() as u64,
            running = self.running.len(),
            queued = self.queue.len(),
            "shutdown requested, draining"
        );

        self.cancel_queued_backlog("cancelled by shutdown");

        let deadline = tokio::time::Instant::now() + grace;
        while !self.running.is_empty() {
            match tokio::time::timeout_at(deadline, self.commands.recv()).await {
                Ok(Some(cmd)) => self.handle_command(cmd),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(remaining = self.running.len(), "grace period expired");
                    break;
                }
            }
        }

        self.force_reclaim_running("force-cancelled at shutdown");
        self.release_all_locks();
        self.lifecycle = Lifecycle::Stopped;
        tracing::info!("shutdown complete");
    }

    /// Emergency reset: skip the grace period entirely
    fn emergency_reset(&mut self, reason: &str) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }
        tracing::warn!(reason, "emergency reset");
        self.cancel_queued_backlog("cancelled by emergency reset");
        self.force_reclaim_running("force-cancelled by emergency reset");
        self.release_all_locks();
        self.lifecycle = Lifecycle::Stopped;
    }

    fn cancel_queued_backlog(&mut self, reason: &str) {
        for id in self.queue.drain_all() {
            let released = self.locks.release_all_for(id);
            self.mirror_locks_deleted(&released);
            self.finish_record(id, HookStatus::Cancelled, Some(reason.to_string()));
        }
    }

    fn force_reclaim_running(&mut self, reason: &str) {
        let ids: Vec<Uuid> = self.running.keys().copied().collect();
        for id in ids {
            if let Some(running) = self.running.remove(&id) {
                running.cancel.cancel();
                self.pool.free(running.worker_id);
                self.finish_record(id, HookStatus::Cancelled, Some(reason.to_string()));
            }
        }
    }

    fn release_all_locks(&mut self) {
        let keys: Vec<String> = self
            .locks
            .live_locks()
            .map(|lock| lock.resource_key.clone())
            .collect();
        let released = self.locks.release_everything();
        if released > 0 {
            tracing::warn!(released, "released leftover locks");
        }
        self.mirror_locks_deleted(&keys);
    }

    /// Internal invariant violation: log it and reset rather than crash
    fn internal_failure(&mut self, msg: String) {
        let error = EngineError::internal(msg);
        tracing::error!(%error, "internal invariant violation");
        self.emergency_reset(&error.to_string());
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    fn housekeeping(&mut self) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }

        let swept = self.locks.sweep();
        if swept > 0 {
            tracing::debug!(swept, "swept expired locks");
        }

        // Queued requests whose budget elapsed before admission
        let now = Utc::now();
        let expired: Vec<Uuid> = self
            .queue
            .iter_in_order()
            .filter(|id| {
                self.records
                    .get(id)
                    .map(|r| now > r.request.submitted_at + chrono_dur(r.request.timeout_budget))
                    .unwrap_or(false)
            })
            .collect();
        for id in expired {
            self.queue.remove(id);
            let released = self.locks.release_all_for(id);
            self.mirror_locks_deleted(&released);
            let error = EngineError::LockUnavailable(
                "timeout budget elapsed while waiting for admission".into(),
            );
            tracing::warn!(request_id = %id, "queued request exceeded its budget");
            self.finish_record(id, HookStatus::TimedOut, Some(error.to_string()));
        }

        // Prune terminal records past the retention window
        let retention = chrono_dur(self.config.record_retention);
        let pruned: Vec<Uuid> = self
            .records
            .iter()
            .filter(|(_, r)| {
                r.is_terminal()
                    && r.finished_at.map(|f| now > f + retention).unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in pruned {
            self.records.remove(&id);
            self.watchers.remove(&id);
        }

        // Invariant audit: the concurrency bound must hold at all times
        if self.running.len() > self.pool.size() {
            let msg = format!(
                "{} running executions with pool size {}",
                self.running.len(),
                self.pool.size()
            );
            self.internal_failure(msg);
            return;
        }

        self.reevaluate();
        self.mirror_metrics();
    }

    // =========================================================================
    // Record publication & store mirroring
    // =========================================================================

    fn finish_record(&mut self, id: Uuid, status: HookStatus, error: Option<String>) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        record.finish(status, error);
        let hook_type = record.request.hook_type;
        let duration = record.duration().unwrap_or_default();
        self.metrics.record(hook_type, status, duration);
        self.publish(id);
    }

    fn publish(&self, id: Uuid) {
        if let (Some(record), Some(tx)) = (self.records.get(&id), self.watchers.get(&id)) {
            tx.send_replace(record.clone());
        }
    }

    fn mirror_lock_set(&self, key: &str, owner: Uuid) {
        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let key = format!("hookwork/locks/{}", key);
            let ttl = self.config.lock_ttl;
            tokio::spawn(async move {
                store.set(&key, owner.to_string(), Some(ttl)).await;
            });
        }
    }

    fn mirror_locks_deleted(&self, keys: &[String]) {
        if let Some(store) = &self.store {
            for key in keys {
                let store = Arc::clone(store);
                let key = format!("hookwork/locks/{}", key);
                tokio::spawn(async move {
                    store.delete(&key).await;
                });
            }
        }
    }

    fn mirror_metrics(&self) {
        if let Some(store) = &self.store {
            let snapshots = self.metrics.all_snapshots();
            if snapshots.is_empty() {
                return;
            }
            if let Ok(json) = serde_json::to_string(&snapshots) {
                let store = Arc::clone(store);
                tokio::spawn(async move {
                    store.set("hookwork/metrics", json, None).await;
                });
            }
        }
    }
}
