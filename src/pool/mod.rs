//! Worker pool & execution modes
//!
//! - `WorkerPool` / `WorkerSlot` - fixed execution slots, the engine's hard
//!   concurrency bound
//! - `PayloadExecutor` - seam behind which the actual hook business logic
//!   lives; the engine treats it as an opaque unit of work
//! - `CommandExecutor` - subprocess-backed executor for pooled-mode hooks

pub mod command;
pub mod executor;
pub mod slots;

pub use command::CommandExecutor;
pub use executor::{ExecutorFn, PayloadExecutor};
pub use slots::{SlotState, WorkerPool, WorkerSlot};
