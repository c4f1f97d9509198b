//! Repository layer for stored graph rows.
//!
//! # Responsibility
//! - Keep SQL details behind a use-case oriented contract.
//! - Return semantic errors (`InvalidData`, `Inconsistent`) alongside
//!   transport errors.

pub mod graph_repo;
