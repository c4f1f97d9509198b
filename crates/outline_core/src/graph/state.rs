//! Graph state value and the item submit protocol.
//!
//! # Responsibility
//! - Hold one consistent pair of forward (item) and reverse (context) indices.
//! - Apply every write through `submit_item`, producing a new state value plus
//!   the persistence payloads that describe it.
//!
//! # Invariants
//! - For every membership `{context, rank}` on item `I`, the context index entry
//!   for `encode_path(context)` holds exactly one child `{key: I.value, rank}`,
//!   and every indexed child is backed by such a membership.
//! - `submit_item` never modifies its input state; on error nothing changes.
//! - `revision` increases by exactly one per successful submit.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::queries::GraphQueries;
use crate::model::item::{ContextChild, Item, Timestamp};
use crate::model::path::{decode_path, encode_path, paths_equal, signifier, Context};
use crate::model::rank::{Rank, RankAllocator};
use crate::store::context_index::ContextIndex;
use crate::store::item_store::ItemStore;
use crate::sync::job::SyncPayload;
use log::{debug, info};
use std::collections::{BTreeMap, HashSet};

/// Write request accepted by [`GraphState::submit_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Item text; also the item's identity. Not validated here.
    pub value: String,
    /// Context the item is added under, or whose signifier gains `value` as a
    /// new parent context when `add_as_context` is set.
    pub context: Context,
    pub add_as_context: bool,
    /// Sibling rank under `context`. Ignored when `add_as_context` is set; the
    /// new membership then gets an allocated rank.
    pub rank: Rank,
}

impl SubmitRequest {
    /// Adds `value` as a child of `context` at `rank`.
    pub fn thought(value: impl Into<String>, context: Context, rank: Rank) -> Self {
        Self {
            value: value.into(),
            context,
            add_as_context: false,
            rank,
        }
    }

    /// Adds `value` as a new parent context of the item denoted by `context`.
    pub fn as_context(value: impl Into<String>, context: Context) -> Self {
        Self {
            value: value.into(),
            context,
            add_as_context: true,
            rank: Rank::FIRST,
        }
    }
}

/// Result of one successful submit: the new state and the sync payloads to
/// dispatch after it has been applied.
#[derive(Debug, Clone)]
pub struct Commit {
    pub state: GraphState,
    pub sync_payloads: Vec<SyncPayload>,
}

/// Row counts from [`GraphState::rebuild`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexRebuild {
    /// Stored entries matched by a membership.
    pub restored_rows: usize,
    /// Memberships with no stored entry; registered at the item's timestamps.
    pub missing_rows: usize,
    /// Stored entries with no membership behind them.
    pub orphan_rows: usize,
}

/// Immutable-from-outside snapshot of the outliner graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphState {
    items: ItemStore,
    context_index: ContextIndex,
    ranks: RankAllocator,
    revision: u64,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a state whose context index is derived from item memberships.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        Self::rebuild(items.into_iter().collect(), &ContextIndex::new()).0
    }

    /// Derives the context index from item memberships, reusing the
    /// registration timestamps of matching entries in `stored`.
    ///
    /// Entries of `stored` that no membership backs are left out and counted
    /// in the returned [`IndexRebuild`].
    pub fn rebuild(items: ItemStore, stored: &ContextIndex) -> (Self, IndexRebuild) {
        let mut context_index = ContextIndex::new();
        let mut ranks = RankAllocator::new();
        let mut report = IndexRebuild::default();
        for item in items.iter() {
            for membership in &item.member_of {
                let kept = stored
                    .children_of(&membership.context)
                    .iter()
                    .find(|child| child.key == item.value && child.rank == membership.rank);
                let child = match kept {
                    Some(child) => {
                        report.restored_rows += 1;
                        child.clone()
                    }
                    None => {
                        report.missing_rows += 1;
                        ContextChild {
                            key: item.value.clone(),
                            rank: membership.rank,
                            created: item.created,
                            last_updated: item.last_updated,
                        }
                    }
                };
                context_index.upsert_child(&membership.context, child);
                ranks.observe(&membership.context, membership.rank);
            }
        }
        let stored_rows: usize = stored.entries().map(|(_, children)| children.len()).sum();
        report.orphan_rows = stored_rows.saturating_sub(report.restored_rows);

        let state = Self {
            items,
            context_index,
            ranks,
            revision: 0,
        };
        (state, report)
    }

    /// Builds a state from both persisted maps and verifies they agree.
    ///
    /// # Errors
    /// - `GraphError::InvariantViolation` when the maps disagree.
    pub fn from_parts(items: ItemStore, context_index: ContextIndex) -> GraphResult<Self> {
        let mut ranks = RankAllocator::new();
        for item in items.iter() {
            for membership in &item.member_of {
                ranks.observe(&membership.context, membership.rank);
            }
        }
        let state = Self {
            items,
            context_index,
            ranks,
            revision: 0,
        };
        state.check_consistency()?;
        Ok(state)
    }

    pub fn items(&self) -> &ItemStore {
        &self.items
    }

    pub fn context_index(&self) -> &ContextIndex {
        &self.context_index
    }

    /// Monotonic counter observers compare to detect a needed re-read.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn queries(&self) -> GraphQueries<'_> {
        GraphQueries::new(&self.items, &self.context_index)
    }

    /// Rank the next appended child of `context` would receive.
    ///
    /// # Errors
    /// - `GraphError::RankExhausted` when a sibling already holds the top rank.
    pub fn next_rank<S: AsRef<str>>(&self, context: &[S]) -> GraphResult<Rank> {
        let mut ranks = self.ranks.clone();
        allocate_rank(&mut ranks, context, &self.context_index)
    }

    /// Applies one write and returns the resulting state.
    ///
    /// Plain submits upsert `value`, add `{context, rank}` to its memberships
    /// (unless `context` is empty) and register it under `context` in the
    /// index. Context submits give the item denoted by `context` a new
    /// membership under `[value]` at an allocated rank and register it there.
    ///
    /// # Errors
    /// - `GraphError::NotFound` when `add_as_context` is set and the signifier
    ///   of `context` is missing or `context` is empty.
    /// - `GraphError::RankExhausted` when a context submit finds a sibling
    ///   under `[value]` already at the top rank.
    pub fn submit_item(&self, request: &SubmitRequest, now: Timestamp) -> GraphResult<Commit> {
        let mut items = self.items.clone();
        let mut context_index = self.context_index.clone();
        let mut ranks = self.ranks.clone();
        let value = request.value.as_str();

        let sync_payloads = if request.add_as_context {
            let target = signifier(&request.context)
                .filter(|target| items.exists(target))
                .ok_or_else(|| {
                    GraphError::not_found(
                        signifier(&request.context).unwrap_or_default(),
                        &request.context,
                    )
                })?
                .to_string();

            let new_context = vec![value.to_string()];
            let rank = allocate_rank(&mut ranks, &new_context, &context_index)?;

            touch_or_create(&mut items, value, now);
            items.upsert(&target, now, |item| {
                item.upsert_membership(new_context.clone(), rank);
                item.touch(now);
            });
            let children =
                context_index.upsert_child(&new_context, ContextChild::new(target.as_str(), rank, now));

            let mut context_updates = BTreeMap::new();
            context_updates.insert(encode_path(&new_context), children);
            vec![
                SyncPayload::new(snapshot(&items, &target)?, BTreeMap::new()),
                SyncPayload::new(snapshot(&items, value)?, context_updates),
            ]
        } else {
            touch_or_create(&mut items, value, now);
            let mut context_updates = BTreeMap::new();
            if !request.context.is_empty() {
                items.upsert(value, now, |item| {
                    item.upsert_membership(request.context.clone(), request.rank);
                });
                ranks.observe(&request.context, request.rank);
                let children = context_index
                    .upsert_child(&request.context, ContextChild::new(value, request.rank, now));
                context_updates.insert(encode_path(&request.context), children);
            }
            vec![SyncPayload::new(snapshot(&items, value)?, context_updates)]
        };

        let state = GraphState {
            items,
            context_index,
            ranks,
            revision: self.revision + 1,
        };

        info!(
            "event=item_submit module=graph status=ok revision={} add_as_context={} context_depth={} sync_payloads={}",
            state.revision,
            request.add_as_context,
            request.context.len(),
            sync_payloads.len()
        );
        if cfg!(debug_assertions) {
            if let Err(err) = state.check_consistency() {
                debug!(
                    "event=consistency_check module=graph status=error revision={} error={}",
                    state.revision, err
                );
            }
        }

        Ok(Commit {
            state,
            sync_payloads,
        })
    }

    /// Verifies the forward and reverse indices describe the same memberships.
    ///
    /// # Errors
    /// - `GraphError::InvariantViolation` naming the first mismatch found.
    pub fn check_consistency(&self) -> GraphResult<()> {
        for item in self.items.iter() {
            let mut seen = HashSet::new();
            for membership in &item.member_of {
                let key = encode_path(&membership.context);
                if !seen.insert(key.clone()) {
                    return Err(GraphError::InvariantViolation(format!(
                        "item `{}` has duplicate membership for context key `{key}`",
                        item.value
                    )));
                }
                let matching = self
                    .context_index
                    .children_by_key(&key)
                    .iter()
                    .filter(|child| child.key == item.value && child.rank == membership.rank)
                    .count();
                if matching != 1 {
                    return Err(GraphError::InvariantViolation(format!(
                        "context key `{key}` holds {matching} children for item `{}` at rank {}",
                        item.value, membership.rank
                    )));
                }
            }
        }

        for (key, children) in self.context_index.entries() {
            let context = decode_path(key)
                .map_err(|err| GraphError::InvariantViolation(err.to_string()))?;
            let mut keys = HashSet::new();
            for child in children {
                if !keys.insert(child.key.as_str()) {
                    return Err(GraphError::InvariantViolation(format!(
                        "context key `{key}` lists child `{}` more than once",
                        child.key
                    )));
                }
                let backed = self.items.get(&child.key).is_some_and(|item| {
                    item.member_of.iter().any(|membership| {
                        paths_equal(&membership.context, &context) && membership.rank == child.rank
                    })
                });
                if !backed {
                    return Err(GraphError::InvariantViolation(format!(
                        "context key `{key}` lists child `{}` at rank {} without a membership",
                        child.key, child.rank
                    )));
                }
            }
        }
        Ok(())
    }
}

fn allocate_rank<S: AsRef<str>>(
    ranks: &mut RankAllocator,
    context: &[S],
    index: &ContextIndex,
) -> GraphResult<Rank> {
    ranks.allocate(context, index).ok_or_else(|| {
        GraphError::RankExhausted(
            context
                .iter()
                .map(|value| value.as_ref().to_string())
                .collect(),
        )
    })
}

fn touch_or_create(items: &mut ItemStore, value: &str, now: Timestamp) {
    let existed = items.exists(value);
    items.upsert(value, now, |item| {
        if existed {
            item.touch(now);
        }
    });
}

fn snapshot(items: &ItemStore, value: &str) -> GraphResult<Item> {
    items.get(value).cloned().ok_or_else(|| {
        GraphError::InvariantViolation(format!("item `{value}` missing right after upsert"))
    })
}
