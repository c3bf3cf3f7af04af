//! The persistence contract the sync engine runs against.
//!
//! A store holds one ordered item collection per list and evaluates each
//! [`GuardedMutation`] as a single indivisible step: the guard is checked
//! and the change written with no other mutation on the same list
//! interleaving. Nothing larger than one mutation is transactional.

use chrono::{DateTime, Utc};
use std::future::Future;

use crate::models::{ChangeSet, Item, TodoList};

/// A single-item write that only lands if its guard holds at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedMutation {
    /// Append `item`, guarded by no item already carrying its id.
    Insert(Item),
    /// Set the changed fields and stamp `at`, guarded by `stored < at`.
    Update {
        id: String,
        changes: ChangeSet,
        at: DateTime<Utc>,
    },
    /// Delete the item, guarded by `stored < at`.
    Delete { id: String, at: DateTime<Utc> },
}

impl GuardedMutation {
    /// Evaluates the guard against `items` and applies the change in place.
    ///
    /// Returns whether an item matched. `items` is untouched on a miss.
    pub fn apply_to(&self, items: &mut Vec<Item>) -> bool {
        match self {
            GuardedMutation::Insert(item) => {
                if items.iter().any(|existing| existing.id == item.id) {
                    return false;
                }
                items.push(item.clone());
                true
            }
            GuardedMutation::Update { id, changes, at } => {
                match items
                    .iter_mut()
                    .find(|existing| existing.id == *id && existing.last_modified < *at)
                {
                    Some(existing) => {
                        changes.apply_to(existing, *at);
                        true
                    }
                    None => false,
                }
            }
            GuardedMutation::Delete { id, at } => {
                match items
                    .iter()
                    .position(|existing| existing.id == *id && existing.last_modified < *at)
                {
                    Some(index) => {
                        items.remove(index);
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

/// How the store resolved one guarded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The guard held and the change was written.
    Applied,
    /// No item satisfied the id match and guard; nothing was written.
    NoMatch,
    /// The list itself does not exist.
    ListNotFound,
}

/// Hard store failures. Guard misses are never reported here.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored items for list {list_id} are unreadable: {source}")]
    Corrupt {
        list_id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Keyed list storage with atomic guarded single-item mutations.
pub trait ItemStore: Send + Sync {
    /// Reads a whole list, items in stored order.
    fn get_list(
        &self,
        list_id: &str,
    ) -> impl Future<Output = Result<Option<TodoList>, StoreError>> + Send;

    /// Evaluates and applies one mutation atomically.
    fn execute_guarded_mutation(
        &self,
        list_id: &str,
        mutation: &GuardedMutation,
    ) -> impl Future<Output = Result<MatchOutcome, StoreError>> + Send;
}
