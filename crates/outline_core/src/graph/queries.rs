//! Read-only graph queries over the item store and context index.
//!
//! # Responsibility
//! - Answer parent, child, derived-child and leaf questions for a path.
//! - Provide the display-text ordering callers layer over query results.
//!
//! # Invariants
//! - Queries never mutate either index.
//! - Path comparison is element-wise and order-sensitive.

use crate::graph::error::{GraphError, GraphResult};
use crate::model::item::{ContextChild, ContextMembership};
use crate::model::path::{
    child_path, has_intersections, intersections, is_root, paths_equal, signifier, Context,
};
use crate::store::context_index::ContextIndex;
use crate::store::item_store::ItemStore;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

static LEADING_DECORATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\p{L}\p{N}]+").expect("valid leading decoration regex"));

/// Borrowed query view over one consistent pair of indices.
#[derive(Debug, Clone, Copy)]
pub struct GraphQueries<'a> {
    items: &'a ItemStore,
    index: &'a ContextIndex,
}

impl<'a> GraphQueries<'a> {
    pub fn new(items: &'a ItemStore, index: &'a ContextIndex) -> Self {
        Self { items, index }
    }

    /// Whether the item denoted by `path` exists.
    pub fn exists<S: AsRef<str>>(&self, path: &[S]) -> bool {
        signifier(path).is_some_and(|value| self.items.exists(value))
    }

    /// Memberships of the item denoted by `path`.
    ///
    /// # Errors
    /// - `GraphError::NotFound` when the path is empty or its signifier is absent.
    pub fn parents_of<S: AsRef<str>>(&self, path: &[S]) -> GraphResult<&'a [ContextMembership]> {
        let value = signifier(path).unwrap_or_default();
        self.items
            .get(value)
            .map(|item| item.member_of.as_slice())
            .ok_or_else(|| GraphError::not_found(value, path))
    }

    /// Values of items holding a membership whose context equals `path`.
    ///
    /// Derived from memberships, so it holds for any path even if the reverse
    /// index were rebuilt with a different strategy.
    pub fn children_of<S: AsRef<str>>(&self, path: &[S]) -> Vec<&'a str> {
        self.items
            .iter()
            .filter(|item| {
                item.member_of
                    .iter()
                    .any(|membership| paths_equal(&membership.context, path))
            })
            .map(|item| item.value.as_str())
            .collect()
    }

    /// Index lookup; agrees with [`Self::children_of`] on a consistent state.
    pub fn has_children<S: AsRef<str>>(&self, path: &[S]) -> bool {
        self.index.has_children(path)
    }

    /// Rank-ordered children of `path` from the context index.
    pub fn ranked_children_of<S: AsRef<str>>(&self, path: &[S]) -> &'a [ContextChild] {
        self.index.children_of(path)
    }

    /// The signifier presented under each of its other non-root parent contexts.
    ///
    /// Each entry is `parent_context + [signifier]`. When `path` is nested, the
    /// parent context it is being viewed from is left out.
    ///
    /// # Errors
    /// - `GraphError::NotFound` when the signifier is absent.
    pub fn derived_children_of<S: AsRef<str>>(&self, path: &[S]) -> GraphResult<Vec<Context>> {
        let parents = self.parents_of(path)?;
        let value = signifier(path).unwrap_or_default();
        let current = has_intersections(path).then(|| intersections(path));
        Ok(parents
            .iter()
            .filter(|membership| !is_root(&membership.context))
            .filter(|membership| {
                current.map_or(true, |current| !paths_equal(&membership.context, current))
            })
            .map(|membership| child_path(&membership.context, value))
            .collect())
    }

    /// The signifier presented under every non-root parent context, including
    /// the one `path` is viewed from.
    ///
    /// # Errors
    /// - `GraphError::NotFound` when the signifier is absent.
    pub fn context_views_of<S: AsRef<str>>(&self, path: &[S]) -> GraphResult<Vec<Context>> {
        let value = signifier(path).unwrap_or_default();
        Ok(self
            .parents_of(path)?
            .iter()
            .filter(|membership| !is_root(&membership.context))
            .map(|membership| child_path(&membership.context, value))
            .collect())
    }

    /// True when a nested `path` has no direct children and its only context
    /// view has no children either, i.e. rendering it would show an empty branch.
    ///
    /// # Errors
    /// - `GraphError::NotFound` when the signifier is absent.
    pub fn is_empty_derived_context<S: AsRef<str>>(&self, path: &[S]) -> GraphResult<bool> {
        if !has_intersections(path) || self.has_children(path) {
            return Ok(false);
        }
        let views = self.context_views_of(path)?;
        Ok(match views.as_slice() {
            [only] => !self.has_children(only),
            _ => false,
        })
    }

    /// Whether the signifier is reachable from more than one context.
    pub fn has_derived_children<S: AsRef<str>>(&self, path: &[S]) -> GraphResult<bool> {
        Ok(self.parents_of(path)?.len() > 1)
    }

    /// True when the item has no direct children, no derived children and no
    /// children when viewed as a bare top-level context.
    ///
    /// # Errors
    /// - `GraphError::NotFound` when the signifier is absent.
    pub fn is_leaf<S: AsRef<str>>(&self, path: &[S]) -> GraphResult<bool> {
        let value = signifier(path).unwrap_or_default();
        Ok(!self.has_children(path)
            && !self.has_derived_children(path)?
            && !self.has_children(&[value]))
    }
}

/// Case-folded display text with leading decorative glyphs removed.
pub fn display_sort_key(value: &str) -> String {
    LEADING_DECORATION_RE
        .replace(value, "")
        .trim()
        .to_lowercase()
}

/// Presentation ordering for query results; does not replace stored rank.
pub fn compare_display(left: &str, right: &str) -> Ordering {
    display_sort_key(left)
        .cmp(&display_sort_key(right))
        .then_with(|| left.cmp(right))
}

/// Sorts values in place by [`compare_display`].
pub fn sort_by_display<S: AsRef<str>>(values: &mut [S]) {
    values.sort_by(|left, right| compare_display(left.as_ref(), right.as_ref()));
}

/// Sorts paths in place by the display text of their signifiers.
pub fn sort_paths_by_display(paths: &mut [Context]) {
    paths.sort_by(|left, right| {
        compare_display(
            signifier(left).unwrap_or_default(),
            signifier(right).unwrap_or_default(),
        )
        .then_with(|| left.cmp(right))
    });
}

#[cfg(test)]
mod tests {
    use super::{compare_display, display_sort_key, sort_by_display, GraphQueries};
    use crate::graph::error::GraphError;
    use crate::model::item::{ContextChild, Item};
    use crate::model::rank::Rank;
    use crate::store::context_index::ContextIndex;
    use crate::store::item_store::ItemStore;
    use std::cmp::Ordering;

    fn path(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn member(value: &str, contexts: Vec<(Vec<String>, i64)>) -> Item {
        let mut item = Item::new(value, 1);
        for (context, rank) in contexts {
            item.upsert_membership(context, Rank(rank));
        }
        item
    }

    fn fixture() -> (ItemStore, ContextIndex) {
        let items: ItemStore = vec![
            member("Animal", vec![(path(&["root"]), 0)]),
            member("Pet", vec![]),
            member("Cat", vec![(path(&["Animal"]), 0), (path(&["Pet"]), 0)]),
            member("Dog", vec![(path(&["Animal"]), 1)]),
            member("Whiskers", vec![(path(&["Pet", "Cat"]), 0)]),
        ]
        .into_iter()
        .collect();
        let mut index = ContextIndex::new();
        for item in items.iter() {
            for membership in &item.member_of {
                index.upsert_child(
                    &membership.context,
                    ContextChild::new(item.value.clone(), membership.rank, 1),
                );
            }
        }
        (items, index)
    }

    #[test]
    fn parents_of_missing_item_is_not_found() {
        let (items, index) = fixture();
        let graph = GraphQueries::new(&items, &index);
        let err = graph.parents_of(&["Animal", "Unicorn"]).unwrap_err();
        assert!(matches!(err, GraphError::NotFound { ref value, .. } if value == "Unicorn"));

        let empty: [&str; 0] = [];
        assert!(graph.parents_of(&empty).is_err());
    }

    #[test]
    fn children_of_uses_order_sensitive_path_equality() {
        let (items, index) = fixture();
        let graph = GraphQueries::new(&items, &index);
        assert_eq!(graph.children_of(&["Animal"]), vec!["Cat", "Dog"]);
        assert_eq!(graph.children_of(&["Pet", "Cat"]), vec!["Whiskers"]);
        assert!(graph.children_of(&["Cat", "Pet"]).is_empty());
    }

    #[test]
    fn has_children_reads_the_context_index() {
        let (items, index) = fixture();
        let graph = GraphQueries::new(&items, &index);
        assert!(graph.has_children(&["Pet", "Cat"]));
        assert!(!graph.has_children(&["Animal", "Dog"]));

        let empty_index = ContextIndex::new();
        let unindexed = GraphQueries::new(&items, &empty_index);
        assert!(!unindexed.has_children(&["Animal"]));
        assert_eq!(unindexed.children_of(&["Animal"]), vec!["Cat", "Dog"]);
    }

    #[test]
    fn derived_children_skip_root_and_current_context() {
        let (items, index) = fixture();
        let graph = GraphQueries::new(&items, &index);

        let derived = graph.derived_children_of(&["Animal", "Cat"]).unwrap();
        assert_eq!(derived, vec![vec!["Pet".to_string(), "Cat".to_string()]]);

        let bare = graph.derived_children_of(&["Cat"]).unwrap();
        assert_eq!(bare.len(), 2);

        assert!(graph.derived_children_of(&["Animal"]).unwrap().is_empty());
    }

    #[test]
    fn context_views_include_current_context() {
        let (items, index) = fixture();
        let graph = GraphQueries::new(&items, &index);

        let views = graph.context_views_of(&["Animal", "Cat"]).unwrap();
        assert_eq!(views, vec![path(&["Animal", "Cat"]), path(&["Pet", "Cat"])]);
        assert!(graph.context_views_of(&["root", "Animal"]).unwrap().is_empty());
    }

    #[test]
    fn empty_derived_context_is_detected_for_single_childless_view() {
        let (items, index) = fixture();
        let graph = GraphQueries::new(&items, &index);

        assert!(graph.is_empty_derived_context(&["Animal", "Dog"]).unwrap());
        assert!(!graph.is_empty_derived_context(&["Dog"]).unwrap());
        assert!(!graph.is_empty_derived_context(&["Animal", "Cat"]).unwrap());
        assert!(!graph.is_empty_derived_context(&["Pet", "Cat"]).unwrap());
    }

    #[test]
    fn leaf_checks_direct_derived_and_bare_children() {
        let (items, index) = fixture();
        let graph = GraphQueries::new(&items, &index);

        assert!(graph.is_leaf(&["Animal", "Dog"]).unwrap());
        assert!(!graph.is_leaf(&["Animal", "Cat"]).unwrap());
        assert!(graph.is_leaf(&["Pet", "Cat", "Whiskers"]).unwrap());
        assert!(!graph.is_leaf(&["root", "Animal"]).unwrap());
    }

    #[test]
    fn display_ordering_ignores_case_and_leading_glyphs() {
        assert_eq!(display_sort_key("🐈 Cat"), "cat");
        assert_eq!(display_sort_key("  - apple "), "apple");
        assert_eq!(compare_display("banana", "🍎 Apple"), Ordering::Greater);

        let mut values = vec!["dog", "★ Bird", "Cat"];
        sort_by_display(&mut values);
        assert_eq!(values, vec!["★ Bird", "Cat", "dog"]);
    }
}
