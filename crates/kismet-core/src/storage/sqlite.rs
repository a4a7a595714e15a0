use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::sync::watch;

use crate::error::{KismetError, Result};

/// SQLite-backed store for saved results.
///
/// Uses a single `Connection` behind `Arc<Mutex<>>` so it can be shared
/// across screens. All blocking SQLite calls go through
/// [`with_conn`](Self::with_conn) which runs them on the Tokio blocking
/// thread-pool. Every committed write bumps a change counter that live
/// queries subscribe to.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    changes: Arc<watch::Sender<u64>>,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("path", &self.path)
            .field("version", &*self.changes.borrow())
            .finish()
    }
}

impl SqliteStorage {
    /// Open (or create) a file-backed SQLite database at `path`.
    ///
    /// Creates the parent directory when missing, sets WAL journal mode,
    /// then creates all tables and indexes if they don't already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                KismetError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(&path)
            .map_err(|e| KismetError::Storage(format!("failed to open SQLite database: {e}")))?;

        Self::configure_and_init(conn, path)
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            KismetError::Storage(format!("failed to open in-memory SQLite database: {e}"))
        })?;

        Self::configure_and_init(conn, PathBuf::from(":memory:"))
    }

    /// Return the path this database was opened with (`:memory:` for in-memory).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Receiver that observes a new value after every committed write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub(crate) fn notify_changed(&self) {
        self.changes.send_modify(|v| *v = v.wrapping_add(1));
    }

    // ── helpers ────────────────────────────────────────────────────────

    fn configure_and_init(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| KismetError::Storage(format!("failed to set WAL mode: {e}")))?;

        let (changes, _) = watch::channel(0);
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            changes: Arc::new(changes),
        };

        storage.create_tables()?;
        Ok(storage)
    }

    /// Create all tables and indexes (idempotent).
    fn create_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| KismetError::Storage(format!("failed to acquire database lock: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS recipes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipe_name TEXT NOT NULL UNIQUE,
                image_path TEXT,
                image_prompt TEXT,
                yield_amount TEXT,
                prep_time TEXT,
                cook_time TEXT,
                description TEXT,
                ingredients TEXT NOT NULL DEFAULT '[]',
                instructions TEXT NOT NULL DEFAULT '[]',
                region_filter TEXT,
                ingredients_filter TEXT,
                other_considerations_filter TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                image_prompt TEXT NOT NULL UNIQUE,
                image_path TEXT NOT NULL,
                model TEXT,
                tag TEXT NOT NULL DEFAULT 'keyword',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL UNIQUE,
                segments TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS problems (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL UNIQUE,
                statement TEXT NOT NULL,
                data_structure TEXT,
                algorithm TEXT,
                language TEXT,
                complexity TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_recipes_created_at ON recipes(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_images_created_at ON images(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_stories_created_at ON stories(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_problems_created_at ON problems(created_at DESC);
            ",
        )
        .map_err(|e| KismetError::Storage(format!("failed to create tables: {e}")))?;

        Ok(())
    }

    /// Run a blocking closure against the SQLite connection on the Tokio
    /// blocking thread-pool.
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                KismetError::Storage(format!("failed to acquire database lock: {e}"))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| KismetError::Storage(format!("task join error: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_creates_tables() {
        let storage = SqliteStorage::open_in_memory().expect("should open in-memory DB");
        assert_eq!(storage.path().to_str().unwrap(), ":memory:");

        let conn = storage.conn.lock().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in ["recipes", "images", "stories", "problems"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn create_tables_is_idempotent() {
        let storage = SqliteStorage::open_in_memory().expect("should open in-memory DB");
        storage.create_tables().expect("idempotent create_tables");
    }

    #[test]
    fn natural_keys_are_unique() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let conn = storage.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO stories (title, created_at) VALUES ('A', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO stories (title, created_at) VALUES ('A', '2024-01-02T00:00:00Z')",
            [],
        );
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn with_conn_runs_on_blocking_pool() {
        let storage = SqliteStorage::open_in_memory().expect("should open in-memory DB");
        let count: i64 = storage
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table'",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| KismetError::Storage(e.to_string()))
            })
            .await
            .unwrap();
        assert!(count >= 4);
    }

    #[tokio::test]
    async fn notify_bumps_subscribers() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut rx = storage.subscribe();
        storage.clone().notify_changed();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}
