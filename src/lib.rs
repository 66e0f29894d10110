pub mod core;
pub mod coordination;
pub mod queue;
pub mod pool;
pub mod retry;
pub mod metrics;

// The serialized decision loop and its public facade
pub mod engine;

// Durability seam for cross-process state
pub mod store;

// Tracing setup
pub mod logging;
