//! Value-keyed item store.
//!
//! # Responsibility
//! - Map item values to their records, including every context membership.
//!
//! # Invariants
//! - Writes touch only this map; index maintenance belongs to the mutation
//!   protocol in `graph::state`.
//! - Iteration order is deterministic (sorted by value).

use crate::model::item::{Item, Timestamp};
use std::collections::BTreeMap;

/// Map from item value to item record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemStore {
    items: BTreeMap<String, Item>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, value: &str) -> Option<&Item> {
        self.items.get(value)
    }

    pub fn exists(&self, value: &str) -> bool {
        self.items.contains_key(value)
    }

    /// Applies `patch` to the stored item, creating it first when absent.
    ///
    /// New items start with no memberships and `created = now`. Returns a
    /// snapshot of the item after the patch.
    pub fn upsert(&mut self, value: &str, now: Timestamp, patch: impl FnOnce(&mut Item)) -> Item {
        let item = self
            .items
            .entry(value.to_string())
            .or_insert_with(|| Item::new(value, now));
        patch(item);
        item.clone()
    }

    /// Stores a full record, replacing any previous one with the same value.
    pub fn insert(&mut self, item: Item) -> Option<Item> {
        self.items.insert(item.value.clone(), item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }
}

impl FromIterator<Item> for ItemStore {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        let mut store = Self::new();
        for item in iter {
            store.insert(item);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::ItemStore;
    use crate::model::rank::Rank;

    #[test]
    fn upsert_creates_with_defaults_then_merges() {
        let mut store = ItemStore::new();
        assert!(!store.exists("Cat"));

        let created = store.upsert("Cat", 100, |_| {});
        assert_eq!(created.created, 100);
        assert!(created.member_of.is_empty());

        let updated = store.upsert("Cat", 200, |item| {
            item.upsert_membership(vec!["Animal".into()], Rank(0));
            item.touch(200);
        });
        assert_eq!(updated.created, 100);
        assert_eq!(updated.last_updated, 200);
        assert_eq!(store.get("Cat").map(|item| item.member_of.len()), Some(1));
        assert_eq!(store.len(), 1);
    }
}
