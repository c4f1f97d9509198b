//! Context children index keyed by encoded context path.
//!
//! # Responsibility
//! - Answer "what are the ordered children of this path" with one lookup.
//! - Keep each child list sorted by rank.
//!
//! # Invariants
//! - One entry per child key within a context; re-registering a key replaces it.
//! - Lists are ordered by `rank ASC, created ASC, key ASC`.
//! - This index is a derived view of item memberships and is only written by
//!   the mutation protocol.

use crate::model::item::ContextChild;
use crate::model::path::encode_path;
use crate::model::rank::Rank;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Map from encoded context path to its ordered child list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextIndex {
    entries: BTreeMap<String, Vec<ContextChild>>,
}

impl ContextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered children of `path`; empty when none are registered.
    pub fn children_of<S: AsRef<str>>(&self, path: &[S]) -> &[ContextChild] {
        self.children_by_key(&encode_path(path))
    }

    /// Ordered children stored under an already encoded key.
    pub fn children_by_key(&self, key: &str) -> &[ContextChild] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Registers `child` under `path`, replacing any entry with the same key.
    ///
    /// The replaced entry's `created` timestamp is carried over. Returns the
    /// full updated child list for that path.
    pub fn upsert_child<S: AsRef<str>>(&mut self, path: &[S], child: ContextChild) -> Vec<ContextChild> {
        self.upsert_child_by_key(encode_path(path), child)
    }

    fn upsert_child_by_key(&mut self, key: String, mut child: ContextChild) -> Vec<ContextChild> {
        let children = self.entries.entry(key).or_default();
        if let Some(position) = children.iter().position(|existing| existing.key == child.key) {
            let previous = children.remove(position);
            child.created = previous.created;
        }
        children.push(child);
        children.sort_by(compare_children);
        children.clone()
    }

    /// Replaces the whole list stored under an encoded key.
    pub fn put_entry(&mut self, key: String, mut children: Vec<ContextChild>) {
        children.sort_by(compare_children);
        self.entries.insert(key, children);
    }

    /// Largest rank currently stored under `path`.
    pub fn max_rank<S: AsRef<str>>(&self, path: &[S]) -> Option<Rank> {
        self.children_of(path).iter().map(|child| child.rank).max()
    }

    /// Whether any child is registered under `path`.
    pub fn has_children<S: AsRef<str>>(&self, path: &[S]) -> bool {
        !self.children_of(path).is_empty()
    }

    /// Iterates `(encoded_key, children)` pairs in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[ContextChild])> {
        self.entries
            .iter()
            .map(|(key, children)| (key.as_str(), children.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sibling order: rank first, then creation time, then value.
pub fn compare_children(left: &ContextChild, right: &ContextChild) -> Ordering {
    left.rank
        .cmp(&right.rank)
        .then(left.created.cmp(&right.created))
        .then_with(|| left.key.cmp(&right.key))
}
