use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Item, ListSummary, TodoList};
use crate::sync::{GuardedMutation, ItemStore, MatchOutcome, StoreError};

/// SQLite-backed list storage.
///
/// Each list is one row; its items are an ordered JSON array in the `items`
/// column. Guarded mutations are compare-and-swap writes on the row's
/// `revision`, so a mutation lands only on the exact item state its guard
/// was evaluated against, even with other processes writing the same file.
/// A write that loses the race re-reads and re-evaluates; every lost race
/// means another mutation on the list landed.
#[derive(Debug, Clone)]
pub struct ListRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: String,
    name: String,
    owner: String,
    items: String,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    name: String,
    owner: String,
}

/// Errors from list-level operations.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("a list named '{0}' already exists")]
    DuplicateName(String),

    #[error("list name cannot be empty")]
    EmptyName,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for ListError {
    fn from(e: sqlx::Error) -> Self {
        ListError::Store(StoreError::Database(e))
    }
}

impl ListRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Closes the underlying pool. Later calls fail with a database error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn create(&self, name: &str, owner: &str) -> Result<TodoList, ListError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ListError::EmptyName);
        }

        let list = TodoList::new(Uuid::new_v4().to_string(), name, owner);

        let result = sqlx::query(
            "INSERT INTO lists (id, name, owner, items, revision, created_at) VALUES (?, ?, ?, '[]', 0, ?)",
        )
        .bind(&list.id)
        .bind(&list.name)
        .bind(&list.owner)
        .bind(list.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::info!(list_id = %list.id, name = %list.name, "Created list");
                Ok(list)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(ListError::DuplicateName(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Renames a list. Returns false if it does not exist.
    pub async fn rename(&self, id: &str, name: &str) -> Result<bool, ListError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ListError::EmptyName);
        }

        let result = sqlx::query("UPDATE lists SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(ListError::DuplicateName(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<TodoList>, StoreError> {
        let row: Option<ListRow> =
            sqlx::query_as("SELECT id, name, owner, items, created_at FROM lists WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Self::hydrate(row).map(Some),
            None => Ok(None),
        }
    }

    /// Lists owned by `owner`, newest first.
    pub async fn list_for_owner(&self, owner: &str) -> Result<Vec<ListSummary>, StoreError> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT id, name, owner FROM lists WHERE owner = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ListSummary {
                id: row.id,
                name: row.name,
                owner: row.owner,
            })
            .collect())
    }

    fn hydrate(row: ListRow) -> Result<TodoList, StoreError> {
        let items = decode_items(&row.id, &row.items)?;
        Ok(TodoList {
            items,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            id: row.id,
            name: row.name,
            owner: row.owner,
        })
    }

    async fn compare_and_swap(
        &self,
        list_id: &str,
        mutation: &GuardedMutation,
    ) -> Result<MatchOutcome, StoreError> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            let row: Option<(String, i64)> =
                sqlx::query_as("SELECT items, revision FROM lists WHERE id = ?")
                    .bind(list_id)
                    .fetch_optional(&self.pool)
                    .await?;

            let Some((raw, revision)) = row else {
                return Ok(MatchOutcome::ListNotFound);
            };

            let mut items = decode_items(list_id, &raw)?;
            if !mutation.apply_to(&mut items) {
                return Ok(MatchOutcome::NoMatch);
            }

            let encoded = serde_json::to_string(&items).map_err(|source| StoreError::Corrupt {
                list_id: list_id.to_string(),
                source,
            })?;

            let result = sqlx::query(
                "UPDATE lists SET items = ?, revision = revision + 1 WHERE id = ? AND revision = ?",
            )
            .bind(&encoded)
            .bind(list_id)
            .bind(revision)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                return Ok(MatchOutcome::Applied);
            }

            tracing::trace!(list_id, attempt, "list revision moved, re-reading");
            tokio::task::yield_now().await;
        }
    }
}

fn decode_items(list_id: &str, raw: &str) -> Result<Vec<Item>, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Corrupt {
        list_id: list_id.to_string(),
        source,
    })
}

impl ItemStore for ListRepository {
    async fn get_list(&self, list_id: &str) -> Result<Option<TodoList>, StoreError> {
        self.get(list_id).await
    }

    async fn execute_guarded_mutation(
        &self,
        list_id: &str,
        mutation: &GuardedMutation,
    ) -> Result<MatchOutcome, StoreError> {
        self.compare_and_swap(list_id, mutation).await
    }
}
