use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::pin::Pin;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Params};
use tokio::sync::watch;

use super::record::{select_columns, Record};
use super::sqlite::SqliteStorage;
use crate::error::{KismetError, Result};
use crate::files::remove_best_effort;

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> KismetError + '_ {
    move |e| KismetError::Storage(format!("{context}: {e}"))
}

/// Saved records of one type, keyed by their natural key.
///
/// Cheap to clone; all clones share the same connection and change feed.
pub struct Repository<R> {
    storage: SqliteStorage,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            _record: PhantomData,
        }
    }
}

impl<R> std::fmt::Debug for Repository<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("storage", &self.storage)
            .field("record", &std::any::type_name::<R>())
            .finish()
    }
}

impl<R: Record> Repository<R> {
    pub fn new(storage: SqliteStorage) -> Self {
        Self {
            storage,
            _record: PhantomData,
        }
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Insert or replace by natural key. Returns the row id.
    ///
    /// The row keeps its id across replacements. Files owned by the replaced
    /// row that the new record no longer references are removed afterwards.
    pub async fn save(&self, record: &R) -> Result<i64> {
        if !R::STORED {
            return Err(KismetError::InvalidInput(format!(
                "{} records cannot be saved",
                R::TABLE
            )));
        }
        let record = record.clone();
        let (id, stale) = self
            .storage
            .with_conn(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(storage_err("failed to begin transaction"))?;
                let previous = select_by_key::<R>(&tx, record.natural_key())?;
                let id: i64 = tx
                    .query_row(&upsert_sql::<R>(), params_from_iter(record.to_params()?), |row| {
                        row.get(0)
                    })
                    .map_err(storage_err("failed to save record"))?;
                tx.commit()
                    .map_err(storage_err("failed to commit record"))?;

                let kept: HashSet<PathBuf> = record.asset_paths().into_iter().collect();
                let stale: Vec<PathBuf> = previous
                    .map(|p| p.asset_paths())
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|p| !kept.contains(p))
                    .collect();
                Ok((id, stale))
            })
            .await?;

        for path in &stale {
            remove_best_effort(path).await;
        }
        tracing::info!(table = R::TABLE, id, "record saved");
        self.storage.notify_changed();
        Ok(id)
    }

    /// Remove the row stored under `record`'s natural key and every file it
    /// owns. Files go first; a file that cannot be removed is logged and does
    /// not stop the row from being deleted.
    pub async fn delete(&self, record: &R) -> Result<()> {
        if !R::STORED {
            return Ok(());
        }
        let key = record.natural_key().to_string();
        let stored = self.get_by_key(&key).await?;

        let mut paths: Vec<PathBuf> = record.asset_paths();
        for path in stored.iter().flat_map(|r| r.asset_paths()) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        for path in &paths {
            remove_best_effort(path).await;
        }

        let removed = self
            .storage
            .with_conn(move |conn| {
                conn.execute(
                    &format!("DELETE FROM {} WHERE {} = ?1", R::TABLE, R::KEY_COLUMN),
                    params![key],
                )
                .map_err(storage_err("failed to delete record"))
            })
            .await?;

        tracing::info!(table = R::TABLE, removed, "record deleted");
        self.storage.notify_changed();
        Ok(())
    }

    pub async fn get_latest(&self) -> Result<Option<R>> {
        if !R::STORED {
            return Ok(None);
        }
        self.storage
            .with_conn(|conn| {
                let sql = format!(
                    "SELECT {} FROM {} ORDER BY created_at DESC, id DESC LIMIT 1",
                    select_columns::<R>(),
                    R::TABLE
                );
                query_one::<R>(conn, &sql, [])
            })
            .await
    }

    pub async fn get_by_key(&self, key: &str) -> Result<Option<R>> {
        if !R::STORED {
            return Ok(None);
        }
        let key = key.to_string();
        self.storage
            .with_conn(move |conn| select_by_key::<R>(conn, &key))
            .await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<R>> {
        if !R::STORED {
            return Ok(None);
        }
        self.storage
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT {} FROM {} WHERE id = ?1",
                    select_columns::<R>(),
                    R::TABLE
                );
                query_one::<R>(conn, &sql, params![id])
            })
            .await
    }

    /// Case-insensitive substring match on the natural key, newest first.
    pub async fn search(&self, query: &str) -> Result<Vec<R>> {
        if !R::STORED {
            return Ok(Vec::new());
        }
        let pattern = escape_like(query);
        self.storage
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT {} FROM {} WHERE LOWER({}) LIKE '%' || LOWER(?1) || '%' ESCAPE '\\' \
                     ORDER BY created_at DESC, id DESC",
                    select_columns::<R>(),
                    R::TABLE,
                    R::KEY_COLUMN
                );
                query_many::<R>(conn, &sql, params![pattern])
            })
            .await
    }

    /// Every record, newest first.
    pub async fn list_all(&self) -> Result<Vec<R>> {
        if !R::STORED {
            return Ok(Vec::new());
        }
        self.storage
            .with_conn(|conn| {
                let sql = format!(
                    "SELECT {} FROM {} ORDER BY created_at DESC, id DESC",
                    select_columns::<R>(),
                    R::TABLE
                );
                query_many::<R>(conn, &sql, [])
            })
            .await
    }

    // ── live queries ──────────────────────────────────────────────────

    pub fn watch_all(&self) -> LiveQuery<Vec<R>> {
        let repo = self.clone();
        LiveQuery::new(self.storage.subscribe(), move || {
            let repo = repo.clone();
            async move { repo.list_all().await }
        })
    }

    pub fn watch_latest(&self) -> LiveQuery<Option<R>> {
        let repo = self.clone();
        LiveQuery::new(self.storage.subscribe(), move || {
            let repo = repo.clone();
            async move { repo.get_latest().await }
        })
    }

    pub fn watch_search(&self, query: &str) -> LiveQuery<Vec<R>> {
        let repo = self.clone();
        let query = query.to_string();
        LiveQuery::new(self.storage.subscribe(), move || {
            let repo = repo.clone();
            let query = query.clone();
            async move { repo.search(&query).await }
        })
    }
}

type Fetch<T> = Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<T>> + Send>> + Send + Sync>;

/// A query that re-runs whenever the store changes.
///
/// The first [`next`](Self::next) yields the current snapshot immediately;
/// each later call waits for at least one committed write and yields a fresh
/// snapshot. Writes that land while a snapshot is being read are not lost.
pub struct LiveQuery<T> {
    fetch: Fetch<T>,
    changes: watch::Receiver<u64>,
    primed: bool,
}

impl<T> std::fmt::Debug for LiveQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("primed", &self.primed)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> LiveQuery<T> {
    pub fn new<F, Fut>(changes: watch::Receiver<u64>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            fetch: Box::new(move || -> Pin<Box<dyn Future<Output = Result<T>> + Send>> {
                Box::pin(fetch())
            }),
            changes,
            primed: false,
        }
    }

    /// Next snapshot, or `None` once the store has been dropped.
    pub async fn next(&mut self) -> Option<Result<T>> {
        if self.primed {
            self.changes.changed().await.ok()?;
        } else {
            self.primed = true;
        }
        let _ = self.changes.borrow_and_update();
        Some((self.fetch)().await)
    }

    /// Point-in-time read that does not consume a change notification.
    pub async fn current(&self) -> Result<T> {
        (self.fetch)().await
    }
}

// ── SQL helpers ───────────────────────────────────────────────────────

fn upsert_sql<R: Record>() -> String {
    let placeholders: Vec<String> = (1..=R::COLUMNS.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = R::COLUMNS
        .iter()
        .filter(|c| **c != R::KEY_COLUMN)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "INSERT INTO {table} ({cols}) VALUES ({placeholders}) \
         ON CONFLICT({key}) DO UPDATE SET {updates} RETURNING id",
        table = R::TABLE,
        cols = R::COLUMNS.join(", "),
        placeholders = placeholders.join(", "),
        key = R::KEY_COLUMN,
        updates = updates.join(", "),
    )
}

fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn select_by_key<R: Record>(conn: &Connection, key: &str) -> Result<Option<R>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        select_columns::<R>(),
        R::TABLE,
        R::KEY_COLUMN
    );
    query_one::<R>(conn, &sql, params![key])
}

fn query_one<R: Record>(conn: &Connection, sql: &str, params: impl Params) -> Result<Option<R>> {
    conn.query_row(sql, params, |row| R::from_row(row))
        .optional()
        .map_err(storage_err("failed to read record"))
}

fn query_many<R: Record>(conn: &Connection, sql: &str, params: impl Params) -> Result<Vec<R>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(storage_err("failed to prepare query"))?;
    let rows = stmt
        .query_map(params, |row| R::from_row(row))
        .map_err(storage_err("failed to query records"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage_err("failed to read records"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SavedProblem, SavedStory};

    #[test]
    fn test_upsert_sql_skips_key_in_update() {
        let sql = upsert_sql::<SavedStory>();
        assert!(sql.starts_with("INSERT INTO stories (title, segments, created_at) VALUES (?1, ?2, ?3)"));
        assert!(sql.contains("ON CONFLICT(title) DO UPDATE SET segments = excluded.segments, created_at = excluded.created_at"));
        assert!(!sql.contains("title = excluded.title"));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let repo = Repository::<SavedProblem>::new(SqliteStorage::open_in_memory().unwrap());
        repo.save(&SavedProblem::new("100% Coverage", "x")).await.unwrap();
        repo.save(&SavedProblem::new("Two Sum", "y")).await.unwrap();

        let hits = repo.search("%").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "100% Coverage");
        assert_eq!(repo.search("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_by_id_and_latest() {
        let repo = Repository::<SavedProblem>::new(SqliteStorage::open_in_memory().unwrap());
        assert!(repo.get_latest().await.unwrap().is_none());

        let id = repo.save(&SavedProblem::new("A", "a")).await.unwrap();
        let fetched = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "A");
        assert_eq!(fetched.id, Some(id));
        assert!(repo.get_by_id(id + 100).await.unwrap().is_none());
    }
}
