//! Hook request types
//!
//! Core types for what callers submit to the engine:
//! - `HookType` - The kind of hook operation, with its fixed timeout budget
//! - `Priority` - Admission ordering tier
//! - `ExecutionMode` - Pooled (isolated) vs direct (in-process) execution
//! - `HookRequest` - The immutable unit of submission

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::{EngineError, EngineResult};

/// Hook operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookType {
    /// Before a task starts
    PreTask,
    /// After a task completes
    PostTask,
    /// Before a file edit
    PreEdit,
    /// After a file edit
    PostEdit,
    /// Before a shell command runs (safety check)
    PreBash,
    /// Before a file read
    PreRead,
    /// Background notification
    Notify,
    /// Session state restoration
    SessionRestore,
    /// Session teardown
    SessionEnd,
}

impl HookType {
    /// All known hook types
    pub const ALL: [HookType; 9] = [
        HookType::PreTask,
        HookType::PostTask,
        HookType::PreEdit,
        HookType::PostEdit,
        HookType::PreBash,
        HookType::PreRead,
        HookType::Notify,
        HookType::SessionRestore,
        HookType::SessionEnd,
    ];

    /// The fixed per-type timeout budget for one execution attempt
    pub fn timeout_budget(&self) -> Duration {
        match self {
            HookType::PreBash | HookType::PreRead => Duration::from_secs(2),
            HookType::Notify => Duration::from_secs(3),
            HookType::PreTask | HookType::PreEdit | HookType::PostEdit => Duration::from_secs(5),
            HookType::PostTask | HookType::SessionRestore => Duration::from_secs(10),
            HookType::SessionEnd => Duration::from_secs(20),
        }
    }

    /// Default execution mode for this hook type
    ///
    /// External-command-style hooks get process-level isolation; everything
    /// else runs in-process to avoid spawn overhead.
    pub fn default_mode(&self) -> ExecutionMode {
        match self {
            HookType::PreBash => ExecutionMode::Pooled,
            _ => ExecutionMode::Direct,
        }
    }

    /// Default admission priority for this hook type
    pub fn default_priority(&self) -> Priority {
        match self {
            HookType::PreBash => Priority::High,
            HookType::Notify => Priority::Low,
            _ => Priority::Medium,
        }
    }

    /// Wire name of this hook type
    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::PreTask => "preTask",
            HookType::PostTask => "postTask",
            HookType::PreEdit => "preEdit",
            HookType::PostEdit => "postEdit",
            HookType::PreBash => "preBash",
            HookType::PreRead => "preRead",
            HookType::Notify => "notify",
            HookType::SessionRestore => "sessionRestore",
            HookType::SessionEnd => "sessionEnd",
        }
    }
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HookType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| EngineError::invalid(format!("unknown hook type: {}", s)))
    }
}

/// Admission priority tier
///
/// Ordering is `Low < Medium < High`; within a tier, admission is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work, serviced last
    Low,
    /// Default tier
    Medium,
    /// Safety-critical operations, serviced first
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// How a payload executes inside a worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Isolated execution context (e.g. a subprocess) with fault isolation
    Pooled,
    /// In-process execution, no isolation overhead
    Direct,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Pooled => write!(f, "pooled"),
            ExecutionMode::Direct => write!(f, "direct"),
        }
    }
}

/// A single hook operation submitted to the engine
///
/// Immutable once created. Defaults (priority, timeout budget) derive from
/// the hook type; override them through the `with_*` builders before
/// submission.
///
/// # Example
///
/// ```ignore
/// let request = HookRequest::new(HookType::PreEdit, json!({"path": "src/main.rs"}))
///     .with_resource("src/main.rs")
///     .with_max_attempts(2);
/// engine.submit(request).await?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookRequest {
    /// Unique request id
    pub id: Uuid,

    /// The hook operation type
    pub hook_type: HookType,

    /// Admission priority
    pub priority: Priority,

    /// Opaque payload handed to the executor
    pub payload: Value,

    /// Resource keys that must be exclusively locked before execution
    ///
    /// Kept sorted so acquisition order is deterministic across requests.
    pub required_resources: BTreeSet<String>,

    /// Hard timeout for one execution attempt
    pub timeout_budget: Duration,

    /// Maximum execution attempts (>= 1)
    pub max_attempts: u32,

    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,
}

impl HookRequest {
    /// Create a request with per-type defaults for priority and timeout
    pub fn new(hook_type: HookType, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            hook_type,
            priority: hook_type.default_priority(),
            payload,
            required_resources: BTreeSet::new(),
            timeout_budget: hook_type.timeout_budget(),
            max_attempts: 1,
            submitted_at: Utc::now(),
        }
    }

    /// Override the admission priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add one required resource key
    pub fn with_resource(mut self, key: impl Into<String>) -> Self {
        self.required_resources.insert(key.into());
        self
    }

    /// Replace the required resource set
    pub fn with_resources<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_resources = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Override the per-attempt timeout budget
    pub fn with_timeout_budget(mut self, budget: Duration) -> Self {
        self.timeout_budget = budget;
        self
    }

    /// Set the maximum number of execution attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Validate the request before admission
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_attempts == 0 {
            return Err(EngineError::invalid("maxAttempts must be >= 1"));
        }
        if self.timeout_budget.is_zero() {
            return Err(EngineError::invalid("timeoutBudget must be positive"));
        }
        if self.required_resources.iter().any(|k| k.is_empty()) {
            return Err(EngineError::invalid("resource keys must be non-empty"));
        }
        Ok(())
    }
}
