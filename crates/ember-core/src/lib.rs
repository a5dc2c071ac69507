//! Ember Core
//!
//! Foundation utilities shared by the Ember asset system: generational slot
//! storage, hash collections, the worker task pool, and logging setup.

pub mod alloc;
pub mod logging;
pub mod task_pool;

pub use task_pool::TaskPool;
