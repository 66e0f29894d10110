//! Core types for the hook engine
//!
//! This module provides the fundamental types used throughout the engine:
//! - `HookRequest` / `HookType` / `Priority` - What callers submit
//! - `HookExecutionRecord` / `HookStatus` - What the engine reports back
//! - `EngineConfig` - Tuning knobs (pool size, TTLs, backoff constants)
//! - `EngineError` - Error types

pub mod config;
pub mod error;
pub mod record;
pub mod request;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use record::{HookExecutionRecord, HookStatus};
pub use request::{ExecutionMode, HookRequest, HookType, Priority};
