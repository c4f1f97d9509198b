//! Outliner graph: state value, queries, mutation protocol and view planning.
//!
//! # Responsibility
//! - `state`: the explicit state value and the single write entry point.
//! - `queries`: read-only parent/child/derived-child/leaf questions.
//! - `view`: focus planning and the empty-derived-context redirect policy.
//!
//! # Invariants
//! - Reads flow from the indices through queries; writes flow only through
//!   `GraphState::submit_item`.

pub mod error;
pub mod queries;
pub mod state;
pub mod view;
