//! The hook engine
//!
//! All queue/lock/graph state is owned by a single scheduler task consuming
//! a command channel (the serialized decision path), while payload
//! executions run in true parallel within the worker pool bound:
//! - `EngineCommand` - the decision path's input alphabet
//! - `Scheduler` - the single-writer decision loop
//! - `HookEngine` - public facade (submit/status/cancel/shutdown/metrics)
//! - `ExecutionHandle` - per-request status stream for callers

pub mod command;
pub mod engine;
pub mod handle;
pub mod scheduler;

pub use command::{CommandSender, EngineCommand};
pub use engine::HookEngine;
pub use handle::ExecutionHandle;
pub use scheduler::Lifecycle;
