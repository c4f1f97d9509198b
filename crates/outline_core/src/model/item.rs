//! Item, membership and context child records.
//!
//! # Responsibility
//! - Define the value-keyed item record and its context memberships.
//! - Define the child descriptor stored per encoded context path.
//!
//! # Invariants
//! - An item's `value` is its identity.
//! - `member_of` holds at most one membership per context path.
//! - `last_updated` never moves backwards for a stored item.

use crate::model::path::{paths_equal, Context};
use crate::model::rank::Rank;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix epoch milliseconds.
pub type Timestamp = i64;

/// Time source for record timestamps.
pub trait Clock {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> Timestamp;
}

/// Wall clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as Timestamp)
            .unwrap_or_default()
    }
}

/// One context path an item belongs under, plus its sibling rank there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMembership {
    /// Path from root to the parent context, excluding the item itself.
    pub context: Context,
    pub rank: Rank,
}

impl ContextMembership {
    pub fn new(context: Context, rank: Rank) -> Self {
        Self { context, rank }
    }
}

/// Value-keyed outliner entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub value: String,
    pub member_of: Vec<ContextMembership>,
    pub created: Timestamp,
    pub last_updated: Timestamp,
}

impl Item {
    /// Creates an item with no memberships.
    pub fn new(value: impl Into<String>, now: Timestamp) -> Self {
        Self {
            value: value.into(),
            member_of: Vec::new(),
            created: now,
            last_updated: now,
        }
    }

    /// Returns the membership for `context`, if present.
    pub fn membership<S: AsRef<str>>(&self, context: &[S]) -> Option<&ContextMembership> {
        self.member_of
            .iter()
            .find(|membership| paths_equal(&membership.context, context))
    }

    /// Adds a membership or updates the rank of the existing one for the same path.
    ///
    /// Returns the rank previously stored for that path, if any.
    pub fn upsert_membership(&mut self, context: Context, rank: Rank) -> Option<Rank> {
        match self
            .member_of
            .iter_mut()
            .find(|membership| paths_equal(&membership.context, &context))
        {
            Some(existing) => Some(std::mem::replace(&mut existing.rank, rank)),
            None => {
                self.member_of.push(ContextMembership::new(context, rank));
                None
            }
        }
    }

    /// Bumps `last_updated`, strictly advancing it even within one millisecond.
    pub fn touch(&mut self, now: Timestamp) {
        self.last_updated = now.max(self.last_updated.saturating_add(1));
    }
}

/// Child descriptor stored under one encoded context path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextChild {
    /// Value of the child item.
    pub key: String,
    pub rank: Rank,
    pub created: Timestamp,
    pub last_updated: Timestamp,
}

impl ContextChild {
    pub fn new(key: impl Into<String>, rank: Rank, now: Timestamp) -> Self {
        Self {
            key: key.into(),
            rank,
            created: now,
            last_updated: now,
        }
    }
}
