//! In-memory indices backing the outliner graph.
//!
//! # Responsibility
//! - `item_store`: forward index, item value -> record with memberships.
//! - `context_index`: reverse index, encoded context path -> ordered children.
//!
//! # Invariants
//! - Neither index is mutated independently; `graph::state` updates both in
//!   one compute-then-swap step.

pub mod context_index;
pub mod item_store;
