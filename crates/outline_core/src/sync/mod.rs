//! Deferred persistence hand-off.
//!
//! # Responsibility
//! - Define the payload contract for the external persistence collaborator.
//! - Hold submitted jobs in a post-commit outbox until they are dispatched.
//! - Route dispatches to one selected sink.
//!
//! # Invariants
//! - State updates never wait on a sink; sink failures never roll back state.

pub mod job;
pub mod sink_registry;
