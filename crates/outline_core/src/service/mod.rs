//! Use-case services over the graph and its persistence.
//!
//! # Responsibility
//! - Sequence writes against one graph state and hand results to sinks.
//! - Keep callers decoupled from storage details.

pub mod outline_engine;
