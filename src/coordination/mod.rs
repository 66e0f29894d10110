//! Coordination primitives
//!
//! - `LockManager` - TTL-bounded mutual exclusion over named resources
//! - `WaitForGraph` - transient wait-for graph used to reject admissions
//!   that would create a circular wait

pub mod graph;
pub mod locks;

pub use graph::WaitForGraph;
pub use locks::{Acquire, CoordinationLock, LockManager};
