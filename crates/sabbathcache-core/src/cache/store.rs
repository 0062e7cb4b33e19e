use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::models::SabbathTimesEntity;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sabbath_times (
        id       TEXT PRIMARY KEY NOT NULL,
        friday   TEXT NOT NULL,
        saturday TEXT NOT NULL
    );
";

/// SQLite-backed cache of resolved Sabbath times, one row per week-key.
/// Clone is cheap and shares the underlying connection.
#[derive(Clone)]
pub struct SabbathCache {
    conn: Arc<Mutex<Connection>>,
}

impl SabbathCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cache database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory cache")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create sabbath_times table")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a query on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("Cache connection lock poisoned"))?;
            f(&guard).map_err(anyhow::Error::from)
        })
        .await
        .context("Cache task failed")?
    }

    pub async fn get(&self, key: &str) -> Result<Option<SabbathTimesEntity>> {
        let key = key.to_string();
        let entity = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, friday, saturday FROM sabbath_times WHERE id = ?1",
                    params![key],
                    map_row,
                )
                .optional()
            })
            .await
            .context("Failed to read cached Sabbath times")?;
        Ok(entity)
    }

    /// Insert or overwrite the row for `entity.id`. Last writer wins.
    pub async fn upsert(&self, entity: SabbathTimesEntity) -> Result<()> {
        debug!(key = %entity.id, "Caching Sabbath times");
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sabbath_times (id, friday, saturday) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET friday = excluded.friday, saturday = excluded.saturday",
                params![entity.id, entity.friday, entity.saturday],
            )
            .map(|_| ())
        })
        .await
        .context("Failed to write cached Sabbath times")
    }

    /// Row with the greatest week-key. Keys are ISO dates, so this is the newest week.
    pub async fn latest(&self) -> Result<Option<SabbathTimesEntity>> {
        let entity = self
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT id, friday, saturday FROM sabbath_times ORDER BY id DESC LIMIT 1",
                    [],
                    map_row,
                )
                .optional()
            })
            .await
            .context("Failed to read latest cached Sabbath times")?;
        Ok(entity)
    }

    /// All rows, newest first.
    pub async fn all(&self) -> Result<Vec<SabbathTimesEntity>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, friday, saturday FROM sabbath_times ORDER BY id DESC")?;
            let rows = stmt.query_map([], map_row)?;
            let entities = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entities)
        })
        .await
        .context("Failed to list cached Sabbath times")
    }

    pub async fn count(&self) -> Result<usize> {
        let count: i64 = self
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM sabbath_times", [], |row| row.get(0))
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn map_row(row: &Row) -> rusqlite::Result<SabbathTimesEntity> {
    Ok(SabbathTimesEntity {
        id: row.get("id")?,
        friday: row.get("friday")?,
        saturday: row.get("saturday")?,
    })
}

// ============================================================================
// Tests
// ============================================================================
