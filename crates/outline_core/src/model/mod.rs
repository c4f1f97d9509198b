//! Outliner domain model.
//!
//! # Responsibility
//! - Define value-keyed items, their context memberships and child descriptors.
//! - Define the context path codec and sibling rank keys.
//!
//! # Invariants
//! - Items are identified by their text value; equal values are one entity.
//! - Items are never hard-deleted by core.

pub mod item;
pub mod path;
pub mod rank;
