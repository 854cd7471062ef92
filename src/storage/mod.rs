//! Executor implementations
//!
//! Adapters for real data stores live outside this crate. The in-memory
//! executor is meant for development and tests.

#[cfg(feature = "in-memory")]
pub mod in_memory;

#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryExecutor;
