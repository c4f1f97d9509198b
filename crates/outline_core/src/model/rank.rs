//! Sibling rank keys and append-to-end allocation.
//!
//! # Responsibility
//! - Define the orderable key that controls sibling order within a context.
//! - Allocate ranks after every existing sibling without renumbering them.
//!
//! # Invariants
//! - Two `allocate` calls for the same context never return the same rank.
//! - An allocated rank sorts after every rank previously stored or allocated
//!   for that context; when no such rank exists allocation fails instead.

use crate::model::path::encode_path;
use crate::store::context_index::ContextIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Orderable sibling key. Serialized as a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rank(pub i64);

impl Rank {
    /// Rank given to the first child of an empty context.
    pub const FIRST: Rank = Rank(0);

    /// Returns the rank immediately after this one, or `None` at the top of
    /// the range.
    pub fn next(self) -> Option<Rank> {
        self.0.checked_add(1).map(Rank)
    }
}

impl Display for Rank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Rank {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Returns the rank after the current maximum of `context`, without reserving it.
///
/// `None` when a sibling already holds `i64::MAX`.
pub fn peek_next_rank<S: AsRef<str>>(context: &[S], index: &ContextIndex) -> Option<Rank> {
    next_after(index.max_rank(context))
}

fn next_after(max: Option<Rank>) -> Option<Rank> {
    match max {
        Some(max) => max.next(),
        None => Some(Rank::FIRST),
    }
}

/// Per-context high-water marks for allocated ranks.
///
/// Lives inside the graph state value, so allocation is part of the same
/// compute-then-swap step as the index update it feeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankAllocator {
    high_water: BTreeMap<String, Rank>,
}

impl RankAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next rank for `context`.
    ///
    /// The result is greater than both the largest stored sibling rank and the
    /// last rank this allocator handed out for the same context. Returns
    /// `None`, reserving nothing, when that bound is already `i64::MAX`.
    pub fn allocate<S: AsRef<str>>(&mut self, context: &[S], index: &ContextIndex) -> Option<Rank> {
        let key = encode_path(context);
        let stored = index.max_rank(context);
        let reserved = self.high_water.get(key.as_str()).copied();
        let rank = next_after(stored.max(reserved))?;
        self.high_water.insert(key, rank);
        Some(rank)
    }

    /// Records a caller-chosen rank so later allocations stay after it.
    pub fn observe<S: AsRef<str>>(&mut self, context: &[S], rank: Rank) {
        let entry = self.high_water.entry(encode_path(context)).or_insert(rank);
        if rank > *entry {
            *entry = rank;
        }
    }

    /// Returns the last rank reserved for `context`, if any.
    pub fn high_water<S: AsRef<str>>(&self, context: &[S]) -> Option<Rank> {
        self.high_water.get(encode_path(context).as_str()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::{peek_next_rank, Rank, RankAllocator};
    use crate::model::item::ContextChild;
    use crate::store::context_index::ContextIndex;

    fn index_with(context: &[&str], ranks: &[i64]) -> ContextIndex {
        let mut index = ContextIndex::new();
        for (position, rank) in ranks.iter().enumerate() {
            index.upsert_child(
                context,
                ContextChild::new(format!("child-{position}"), Rank(*rank), 1),
            );
        }
        index
    }

    #[test]
    fn empty_context_starts_at_first_rank() {
        let index = ContextIndex::new();
        assert_eq!(peek_next_rank(&["Animal"], &index), Some(Rank::FIRST));
    }

    #[test]
    fn peek_appends_after_current_maximum() {
        let index = index_with(&["Animal"], &[3, 0, 7]);
        assert_eq!(peek_next_rank(&["Animal"], &index), Some(Rank(8)));
        assert_eq!(peek_next_rank(&["Plant"], &index), Some(Rank::FIRST));
    }

    #[test]
    fn allocate_never_repeats_for_same_context() {
        let index = index_with(&["Animal"], &[0, 1]);
        let mut allocator = RankAllocator::new();

        let first = allocator.allocate(&["Animal"], &index).unwrap();
        let second = allocator.allocate(&["Animal"], &index).unwrap();
        assert_eq!(first, Rank(2));
        assert_eq!(second, Rank(3));
        assert!(second > first);

        let other = allocator.allocate(&["Plant"], &index).unwrap();
        assert_eq!(other, Rank::FIRST);
    }

    #[test]
    fn observe_keeps_allocation_after_caller_ranks() {
        let index = ContextIndex::new();
        let mut allocator = RankAllocator::new();
        allocator.observe(&["Animal"], Rank(10));
        allocator.observe(&["Animal"], Rank(4));

        assert_eq!(allocator.high_water(&["Animal"]), Some(Rank(10)));
        assert_eq!(allocator.allocate(&["Animal"], &index), Some(Rank(11)));
    }

    #[test]
    fn allocation_fails_instead_of_repeating_top_rank() {
        let index = index_with(&["Animal"], &[0, i64::MAX]);
        let mut allocator = RankAllocator::new();

        assert_eq!(Rank(i64::MAX).next(), None);
        assert_eq!(peek_next_rank(&["Animal"], &index), None);
        assert_eq!(allocator.allocate(&["Animal"], &index), None);
        assert_eq!(allocator.high_water(&["Animal"]), None);

        allocator.observe(&["Plant"], Rank(i64::MAX));
        assert_eq!(allocator.allocate(&["Plant"], &ContextIndex::new()), None);
        assert_eq!(allocator.high_water(&["Plant"]), Some(Rank(i64::MAX)));
    }
}
