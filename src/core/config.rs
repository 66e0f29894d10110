//! Engine configuration

use std::collections::HashMap;
use std::time::Duration;

use crate::core::request::{ExecutionMode, HookType};
use crate::retry::RetryPolicy;

/// Default worker pool size (the engine's hard concurrency bound)
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Default coordination lock TTL
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Tuning knobs for the engine
///
/// Everything here is a constant for the lifetime of one engine; per-request
/// variation goes through `HookRequest` builders instead.
///
/// # Example
///
/// ```ignore
/// let config = EngineConfig::default()
///     .with_pool_size(4)
///     .with_lock_ttl(Duration::from_secs(10));
/// let engine = HookEngine::start(config, executor);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker slots; never exceeded by running executions
    pub pool_size: usize,

    /// TTL applied to every coordination lock
    pub lock_ttl: Duration,

    /// How long terminal records are kept before pruning
    pub record_retention: Duration,

    /// Housekeeping tick interval (lock sweep, queue budget checks, pruning)
    pub sweep_interval: Duration,

    /// Fallback retry policy when no per-type override exists
    pub retry: RetryPolicy,

    /// Per-hook-type retry policy overrides
    pub retry_overrides: HashMap<HookType, RetryPolicy>,

    /// Per-hook-type timeout budget overrides
    pub timeout_overrides: HashMap<HookType, Duration>,

    /// Per-hook-type execution mode overrides
    pub mode_overrides: HashMap<HookType, ExecutionMode>,
}

impl EngineConfig {
    /// Override the worker pool size
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Override the lock TTL
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Override the terminal record retention window
    pub fn with_record_retention(mut self, retention: Duration) -> Self {
        self.record_retention = retention;
        self
    }

    /// Override the housekeeping interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the retry policy for one hook type
    pub fn with_retry_override(mut self, hook_type: HookType, policy: RetryPolicy) -> Self {
        self.retry_overrides.insert(hook_type, policy);
        self
    }

    /// Set the execution mode for one hook type
    pub fn with_mode_override(mut self, hook_type: HookType, mode: ExecutionMode) -> Self {
        self.mode_overrides.insert(hook_type, mode);
        self
    }

    /// Set the timeout budget for one hook type
    pub fn with_timeout_override(mut self, hook_type: HookType, budget: Duration) -> Self {
        self.timeout_overrides.insert(hook_type, budget);
        self
    }

    /// Effective retry policy for a hook type
    pub fn retry_for(&self, hook_type: HookType) -> RetryPolicy {
        self.retry_overrides
            .get(&hook_type)
            .copied()
            .unwrap_or(self.retry)
    }

    /// Effective timeout budget for a hook type
    pub fn timeout_for(&self, hook_type: HookType) -> Duration {
        self.timeout_overrides
            .get(&hook_type)
            .copied()
            .unwrap_or_else(|| hook_type.timeout_budget())
    }

    /// Effective execution mode for a hook type
    pub fn mode_for(&self, hook_type: HookType) -> ExecutionMode {
        self.mode_overrides
            .get(&hook_type)
            .copied()
            .unwrap_or_else(|| hook_type.default_mode())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        // Short-budget hook types get a tighter backoff so worst-case retry
        // latency stays inside their end-to-end expectations.
        let fast_retry = RetryPolicy::new(Duration::from_millis(50), Duration::from_millis(500));
        let retry_overrides = [HookType::PreBash, HookType::PreRead, HookType::Notify]
            .into_iter()
            .map(|t| (t, fast_retry))
            .collect();

        Self {
            pool_size: DEFAULT_POOL_SIZE,
            lock_ttl: DEFAULT_LOCK_TTL,
            record_retention: Duration::from_secs(300),
            sweep_interval: Duration::from_millis(250),
            retry: RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(2)),
            retry_overrides,
            timeout_overrides: HashMap::new(),
            mode_overrides: HashMap::new(),
        }
    }
}
