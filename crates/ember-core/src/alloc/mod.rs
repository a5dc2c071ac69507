//! Collection types used across Ember.
//!
//! Re-exports AHash-backed maps and provides the generational slot arena
//! that handles, groups, and in-flight jobs are addressed with.

pub mod slot_arena;

pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};
