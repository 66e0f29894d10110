//! Payload executor seam
//!
//! The engine never interprets a hook's payload; it hands the payload to a
//! `PayloadExecutor` together with the resolved execution mode and treats
//! the result as opaque success/failure. Command-safety logic, log writers,
//! notification fan-out and so on all live behind this trait.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::core::request::{ExecutionMode, HookRequest};
use crate::retry::PayloadError;

/// Executes hook payloads
///
/// Implementations must be cheap to call concurrently; one engine shares a
/// single executor across all worker slots. The engine owns the timeout and
/// retry policy, so `run` should simply do the work and report.
#[async_trait]
pub trait PayloadExecutor: Send + Sync {
    /// Execute one payload under the given mode
    async fn run(&self, request: &HookRequest, mode: ExecutionMode) -> Result<Value, PayloadError>;
}

/// Closure adapter for `PayloadExecutor`
///
/// # Example
///
/// ```ignore
/// let executor = ExecutorFn::new(|request, _mode| {
///     Box::pin(async move {
///         if request.hook_type == HookType::PreBash {
///             check_command(&request.payload)
///         } else {
///             Ok(json!({"ok": true}))
///         }
///     })
/// });
/// ```
pub struct ExecutorFn<F> {
    f: F,
}

impl<F> ExecutorFn<F>
where
    F: Fn(HookRequest, ExecutionMode) -> BoxFuture<'static, Result<Value, PayloadError>>
        + Send
        + Sync,
{
    /// Wrap a closure as an executor
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> PayloadExecutor for ExecutorFn<F>
where
    F: Fn(HookRequest, ExecutionMode) -> BoxFuture<'static, Result<Value, PayloadError>>
        + Send
        + Sync,
{
    async fn run(&self, request: &HookRequest, mode: ExecutionMode) -> Result<Value, PayloadError> {
        (self.f)(request.clone(), mode).await
    }
}
