//! Batch execution with the timestamp gatekeeper.
//!
//! Every operation becomes exactly one [`GuardedMutation`], stamped with a
//! single clock reading taken when the operation is translated. Modify and
//! remove only land if the stored `last_modified` is strictly older than
//! that reading, so the outcome of racing writers is decided by the order
//! the store evaluates them in (last-applied-wins), filtered by timestamp.

use super::clock::{Clock, IdGenerator, SystemClock, UuidIds};
use super::error::SyncError;
use super::operation::{Operation, WireOperation};
use super::store::{GuardedMutation, ItemStore, MatchOutcome};
use crate::models::Item;

/// Applies operation batches to lists held by an [`ItemStore`].
pub struct SyncEngine<S, C = SystemClock, G = UuidIds> {
    store: S,
    clock: C,
    ids: G,
}

impl<S: ItemStore> SyncEngine<S> {
    /// Creates an engine using the system clock and UUID item ids.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: SystemClock::new(),
            ids: UuidIds,
        }
    }
}

impl<S, C, G> SyncEngine<S, C, G> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> SyncEngine<S, C2, G> {
        SyncEngine {
            store: self.store,
            clock,
            ids: self.ids,
        }
    }

    pub fn with_ids<G2: IdGenerator>(self, ids: G2) -> SyncEngine<S, C, G2> {
        SyncEngine {
            store: self.store,
            clock: self.clock,
            ids,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: ItemStore, C: Clock, G: IdGenerator> SyncEngine<S, C, G> {
    /// Executes `ops` against the list in order, then re-reads its items.
    ///
    /// Operation k sees the effect of operations 0..k. A guard miss skips
    /// that operation only; a hard failure stops the batch without undoing
    /// what already landed.
    pub async fn apply(&self, list_id: &str, ops: Vec<Operation>) -> Result<Vec<Item>, SyncError> {
        let total = ops.len();
        let mut applied = 0;

        for (index, op) in ops.into_iter().enumerate() {
            if self.execute(list_id, index, op).await? == MatchOutcome::Applied {
                applied += 1;
            }
        }

        tracing::debug!(list_id, total, applied, "batch applied");
        self.read_items(list_id).await
    }

    /// Like [`apply`](Self::apply), but validates each raw operation right
    /// before executing it. A rejected operation stops the batch after the
    /// ones before it have run.
    pub async fn apply_wire(
        &self,
        list_id: &str,
        ops: Vec<WireOperation>,
    ) -> Result<Vec<Item>, SyncError> {
        let total = ops.len();
        let mut applied = 0;

        for (index, wire) in ops.into_iter().enumerate() {
            let op = Operation::try_from(wire)
                .map_err(|source| SyncError::Validation { index, source })?;
            if self.execute(list_id, index, op).await? == MatchOutcome::Applied {
                applied += 1;
            }
        }

        tracing::debug!(list_id, total, applied, "batch applied");
        self.read_items(list_id).await
    }

    /// Reads the list's current items.
    pub async fn read_items(&self, list_id: &str) -> Result<Vec<Item>, SyncError> {
        match self.store.get_list(list_id).await {
            Ok(Some(list)) => Ok(list.items),
            Ok(None) => Err(SyncError::NotFound {
                list_id: list_id.to_string(),
            }),
            Err(source) => {
                tracing::warn!(list_id, error = %source, "failed to read list");
                Err(SyncError::ReadFailed {
                    list_id: list_id.to_string(),
                    source,
                })
            }
        }
    }

    /// Stamps an operation with one clock reading and builds its mutation.
    fn translate(&self, op: Operation) -> GuardedMutation {
        let at = self.clock.now();
        match op {
            Operation::Append(new_item) => {
                GuardedMutation::Insert(new_item.into_item(self.ids.new_id(), at))
            }
            Operation::Modify { id, changes } => GuardedMutation::Update { id, changes, at },
            Operation::Remove { id } => GuardedMutation::Delete { id, at },
        }
    }

    async fn execute(
        &self,
        list_id: &str,
        index: usize,
        op: Operation,
    ) -> Result<MatchOutcome, SyncError> {
        let mutation = self.translate(op);

        let outcome = self
            .store
            .execute_guarded_mutation(list_id, &mutation)
            .await
            .map_err(|source| {
                tracing::warn!(list_id, index, error = %source, "store failure, aborting batch");
                SyncError::StoreUnavailable { index, source }
            })?;

        if outcome == MatchOutcome::ListNotFound {
            return Err(SyncError::NotFound {
                list_id: list_id.to_string(),
            });
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, ListRepository};
    use crate::models::{ChangeSet, TodoList, ValidationError};
    use crate::sync::clock::{ManualClock, SequentialIds};
    use crate::sync::StoreError;
    use chrono::TimeDelta;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct TestContext {
        repo: ListRepository,
        list_id: String,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(temp_dir.path().join("test.db")).await.unwrap();
        let repo = ListRepository::new(pool);
        let list = repo.create("Groceries", "you").await.unwrap();
        TestContext {
            repo,
            list_id: list.id,
            _temp_dir: temp_dir,
        }
    }

    fn engine_at(
        repo: &ListRepository,
        clock: Arc<ManualClock>,
    ) -> SyncEngine<ListRepository, Arc<ManualClock>, SequentialIds> {
        SyncEngine::new(repo.clone())
            .with_clock(clock)
            .with_ids(SequentialIds::new("item-"))
    }

    #[tokio::test]
    async fn test_appends_produce_distinct_ids() {
        let ctx = setup().await;
        let engine = SyncEngine::new(ctx.repo.clone());

        engine
            .apply(&ctx.list_id, vec![Operation::append("a"), Operation::append("b")])
            .await
            .unwrap();
        let items = engine
            .apply(
                &ctx.list_id,
                vec![
                    Operation::append("c"),
                    Operation::append("d"),
                    Operation::append("e"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(items.len(), 5);
        let ids: HashSet<_> = items.iter().map(|item| item.id.clone()).collect();
        assert_eq!(ids.len(), 5);
        let texts: Vec<_> = items.iter().map(|item| item.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_late_older_modify_is_discarded() {
        let ctx = setup().await;
        let clock = Arc::new(ManualClock::at_millis(100));
        let engine = engine_at(&ctx.repo, clock.clone());

        let items = engine
            .apply(&ctx.list_id, vec![Operation::append("milk")])
            .await
            .unwrap();
        let id = items[0].id.clone();
        assert_eq!(items[0].last_modified.timestamp_millis(), 100);

        clock.set_millis(150);
        let items = engine
            .apply(
                &ctx.list_id,
                vec![Operation::modify(&id, ChangeSet::new().with_checked(true))],
            )
            .await
            .unwrap();
        assert!(items[0].checked);
        assert_eq!(items[0].last_modified.timestamp_millis(), 150);

        clock.set_millis(120);
        let items = engine
            .apply(
                &ctx.list_id,
                vec![Operation::modify(&id, ChangeSet::new().with_checked(false))],
            )
            .await
            .unwrap();
        assert!(items[0].checked);
        assert_eq!(items[0].last_modified.timestamp_millis(), 150);
    }

    #[tokio::test]
    async fn test_racing_engines_resolve_by_timestamp() {
        let ctx = setup().await;
        let fast = Arc::new(ManualClock::at_millis(100));
        let slow = Arc::new(ManualClock::at_millis(100));
        let first = engine_at(&ctx.repo, fast.clone());
        let second = engine_at(&ctx.repo, slow.clone());

        let items = first
            .apply(&ctx.list_id, vec![Operation::append("milk")])
            .await
            .unwrap();
        let id = items[0].id.clone();

        // Issued at 120 but lands after the one issued at 150.
        fast.set_millis(150);
        slow.set_millis(120);
        first
            .apply(
                &ctx.list_id,
                vec![Operation::modify(&id, ChangeSet::new().with_text("oat milk"))],
            )
            .await
            .unwrap();
        let items = second
            .apply(
                &ctx.list_id,
                vec![Operation::modify(&id, ChangeSet::new().with_text("soy milk"))],
            )
            .await
            .unwrap();

        assert_eq!(items[0].text, "oat milk");
        assert_eq!(items[0].last_modified.timestamp_millis(), 150);
    }

    #[tokio::test]
    async fn test_remove_deferred_by_newer_modify() {
        let ctx = setup().await;
        let clock = Arc::new(ManualClock::at_millis(200));
        let engine = engine_at(&ctx.repo, clock.clone());

        let items = engine
            .apply(&ctx.list_id, vec![Operation::append("milk")])
            .await
            .unwrap();
        let id = items[0].id.clone();

        clock.set_millis(190);
        let items = engine
            .apply(&ctx.list_id, vec![Operation::remove(&id)])
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
    }

    #[tokio::test]
    async fn test_remove_accepted_and_id_not_reused() {
        let ctx = setup().await;
        let engine = SyncEngine::new(ctx.repo.clone());

        let items = engine
            .apply(&ctx.list_id, vec![Operation::append("milk")])
            .await
            .unwrap();
        let removed = items[0].id.clone();

        let items = engine
            .apply(&ctx.list_id, vec![Operation::remove(&removed)])
            .await
            .unwrap();
        assert!(items.is_empty());

        let items = engine
            .apply(&ctx.list_id, (0..10).map(|n| Operation::append(n.to_string())).collect())
            .await
            .unwrap();
        assert_eq!(items.len(), 10);
        assert!(items.iter().all(|item| item.id != removed));
    }

    #[tokio::test]
    async fn test_batch_sees_earlier_operations() {
        let ctx = setup().await;
        let clock = Arc::new(ManualClock::at_millis(100).ticking(TimeDelta::milliseconds(1)));
        let engine = SyncEngine::new(ctx.repo.clone())
            .with_clock(clock)
            .with_ids(SequentialIds::new("x"));

        let items = engine
            .apply(
                &ctx.list_id,
                vec![
                    Operation::append("milk"),
                    Operation::modify("x1", ChangeSet::new().with_checked(true)),
                ],
            )
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "x1");
        assert!(items[0].checked);
        assert_eq!(items[0].last_modified.timestamp_millis(), 101);
    }

    #[tokio::test]
    async fn test_same_instant_in_batch_is_a_guard_miss() {
        let ctx = setup().await;
        let clock = Arc::new(ManualClock::at_millis(100));
        let engine = SyncEngine::new(ctx.repo.clone())
            .with_clock(clock)
            .with_ids(SequentialIds::new("x"));

        let items = engine
            .apply(
                &ctx.list_id,
                vec![
                    Operation::append("milk"),
                    Operation::modify("x1", ChangeSet::new().with_checked(true)),
                ],
            )
            .await
            .unwrap();

        assert!(!items[0].checked);
    }

    #[tokio::test]
    async fn test_double_remove_is_noop() {
        let ctx = setup().await;
        let engine = SyncEngine::new(ctx.repo.clone());

        let items = engine
            .apply(&ctx.list_id, vec![Operation::append("milk"), Operation::append("eggs")])
            .await
            .unwrap();
        let id = items[0].id.clone();

        let items = engine
            .apply(&ctx.list_id, vec![Operation::remove(&id), Operation::remove(&id)])
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "eggs");
    }

    #[tokio::test]
    async fn test_modify_missing_item_is_noop() {
        let ctx = setup().await;
        let engine = SyncEngine::new(ctx.repo.clone());

        let items = engine
            .apply(
                &ctx.list_id,
                vec![Operation::modify("ghost", ChangeSet::new().with_done(true))],
            )
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_missing_list_is_not_found() {
        let ctx = setup().await;
        let engine = SyncEngine::new(ctx.repo.clone());

        let err = engine
            .apply("no-such-list", vec![Operation::append("milk")])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound { ref list_id } if list_id == "no-such-list"));

        let err = engine.apply("no-such-list", vec![]).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_validation_error_keeps_earlier_operations() {
        let ctx = setup().await;
        let engine = SyncEngine::new(ctx.repo.clone());

        let ops: Vec<WireOperation> = serde_json::from_value(json!([
            { "type": "append", "payload": { "text": "milk" } },
            { "type": "modify", "payload": { "id": "a", "owner": "mallory" } },
            { "type": "append", "payload": { "text": "eggs" } }
        ]))
        .unwrap();

        let err = engine.apply_wire(&ctx.list_id, ops).await.unwrap_err();
        match err {
            SyncError::Validation { index, source } => {
                assert_eq!(index, 1);
                assert_eq!(source, ValidationError::UnknownField("owner".into()));
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let items = engine.read_items(&ctx.list_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "milk");
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let ctx = setup().await;
        let engine = SyncEngine::new(ctx.repo.clone());
        ctx.repo.close().await;

        let err = engine
            .apply(&ctx.list_id, vec![Operation::append("milk")])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::StoreUnavailable { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_concurrent_batches_keep_every_append() {
        let ctx = setup().await;
        let engine = Arc::new(SyncEngine::new(ctx.repo.clone()));

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let engine = engine.clone();
            let list_id = ctx.list_id.clone();
            tasks.push(tokio::spawn(async move {
                for n in 0..5 {
                    engine
                        .apply(&list_id, vec![Operation::append(format!("{worker}-{n}"))])
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let items = engine.read_items(&ctx.list_id).await.unwrap();
        assert_eq!(items.len(), 40);
        let ids: HashSet<_> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids.len(), 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_many_writers_on_one_list_all_land() {
        let ctx = setup().await;
        let engine = Arc::new(SyncEngine::new(ctx.repo.clone()));

        let tasks: Vec<_> = (0..200)
            .map(|n| {
                let engine = engine.clone();
                let list_id = ctx.list_id.clone();
                tokio::spawn(async move {
                    engine
                        .apply(&list_id, vec![Operation::append(n.to_string())])
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let items = engine.read_items(&ctx.list_id).await.unwrap();
        assert_eq!(items.len(), 200);
        let texts: HashSet<_> = items.iter().map(|item| item.text.as_str()).collect();
        assert_eq!(texts.len(), 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_modifies_keep_newest_timestamp() {
        let ctx = setup().await;
        let seed = engine_at(&ctx.repo, Arc::new(ManualClock::at_millis(100)));
        let items = seed
            .apply(&ctx.list_id, vec![Operation::append("milk")])
            .await
            .unwrap();
        let id = items[0].id.clone();

        let tasks: Vec<_> = (1..=16i64)
            .map(|n| {
                let engine = engine_at(&ctx.repo, Arc::new(ManualClock::at_millis(100 + n)));
                let list_id = ctx.list_id.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    let changes = ChangeSet::new().with_text(format!("v{n}"));
                    engine
                        .apply(&list_id, vec![Operation::modify(id, changes)])
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let items = seed.read_items(&ctx.list_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "v16");
        assert_eq!(items[0].last_modified.timestamp_millis(), 116);
    }

    /// Accepts every mutation but cannot read lists back.
    struct UnreadableStore;

    impl ItemStore for UnreadableStore {
        async fn get_list(&self, _list_id: &str) -> Result<Option<TodoList>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }

        async fn execute_guarded_mutation(
            &self,
            _list_id: &str,
            _mutation: &GuardedMutation,
        ) -> Result<MatchOutcome, StoreError> {
            Ok(MatchOutcome::Applied)
        }
    }

    #[tokio::test]
    async fn test_failed_read_back_is_not_tied_to_an_operation() {
        let engine = SyncEngine::new(UnreadableStore);

        let err = engine
            .apply(
                "l1",
                vec![
                    Operation::append("milk"),
                    Operation::append("eggs"),
                    Operation::append("bread"),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::ReadFailed { ref list_id, .. } if list_id == "l1"));
        assert_eq!(err.index(), None);
        assert_eq!(err.kind(), "store_unavailable");
    }
}
