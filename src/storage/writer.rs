use super::schema::{self, SCHEMA_VERSION};
use crate::buffer::Snapshot;
use crate::error::Result;
use crate::event::VisitKey;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// How long a flush waits on a locked database before failing
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const UPSERT_SQL: &str = "INSERT INTO pagevisits (date, page, hits) VALUES (?1, ?2, ?3)
     ON CONFLICT(date, page) DO UPDATE SET hits = hits + excluded.hits";

/// Durable destination for flushed snapshots
pub trait VisitStore: Send {
    /// Add every count in `snapshot` to the stored totals as one atomic unit.
    /// An empty snapshot must not touch the store.
    fn apply(&mut self, snapshot: &Snapshot) -> Result<()>;
}

/// SQLite-backed visit store.
///
/// Holds only the database location; each flush opens its own connection
/// and releases it before returning, success or not.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = SqliteStore {
            path: path.as_ref().to_path_buf(),
        };

        let conn = store.connect()?;

        // Enable WAL mode so report reads don't block flushes
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::create_tables(&conn)?;
        schema::set_meta(&conn, "version", &SCHEMA_VERSION.to_string())?;
        if schema::get_meta(&conn, "created_at")?.is_none() {
            schema::set_meta(&conn, "created_at", &chrono::Utc::now().to_rfc3339())?;
        }

        debug!(path = %store.path.display(), "Visit store ready");
        Ok(store)
    }

    /// Fresh connection with the flush busy timeout applied
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Cumulative hits for one (date, page)
    pub fn hits(&self, key: &VisitKey) -> Result<u64> {
        Ok(query_hits(&self.connect()?, key)?)
    }

    /// Most visited pages on `date`
    pub fn top_pages(&self, date: NaiveDate, limit: usize) -> Result<Vec<PageHits>> {
        Ok(query_top_pages(&self.connect()?, date, limit)?)
    }

    /// Hits per day, newest first
    pub fn daily_totals(&self, limit: usize) -> Result<Vec<DailyTotal>> {
        Ok(query_daily_totals(&self.connect()?, limit)?)
    }

    /// Hits across every day and page
    pub fn total_hits(&self) -> Result<u64> {
        Ok(query_total_hits(&self.connect()?)?)
    }
}

impl VisitStore for SqliteStore {
    fn apply(&mut self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.is_empty() {
            return Ok(());
        }

        let mut conn = self.connect()?;
        apply_snapshot(&mut conn, snapshot)?;
        Ok(())
    }
}

/// Increment-upsert every key of `snapshot` inside a single transaction.
///
/// The transaction rolls back when dropped uncommitted, so an error on any
/// row leaves the table untouched.
pub fn apply_snapshot(conn: &mut Connection, snapshot: &Snapshot) -> rusqlite::Result<()> {
    if snapshot.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
        for (key, hits) in snapshot {
            stmt.execute(rusqlite::params![key.date_string(), &key.page, *hits as i64])?;
        }
    }
    tx.commit()
}

/// Hits for one page on one day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHits {
    pub page: String,
    pub hits: u64,
}

/// Aggregate for one day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyTotal {
    pub date: String,
    pub pages: u64,
    pub hits: u64,
}

pub fn query_hits(conn: &Connection, key: &VisitKey) -> rusqlite::Result<u64> {
    let hits: i64 = conn.query_row(
        "SELECT COALESCE(SUM(hits), 0) FROM pagevisits WHERE date = ?1 AND page = ?2",
        rusqlite::params![key.date_string(), &key.page],
        |row| row.get(0),
    )?;
    Ok(hits as u64)
}

pub fn query_top_pages(
    conn: &Connection,
    date: NaiveDate,
    limit: usize,
) -> rusqlite::Result<Vec<PageHits>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT page, hits
        FROM pagevisits
        WHERE date = ?1
        ORDER BY hits DESC, page ASC
        LIMIT ?2
        "#,
    )?;

    let date = date.format("%Y-%m-%d").to_string();
    let rows = stmt.query_map(rusqlite::params![date, limit as i64], |row| {
        Ok(PageHits {
            page: row.get(0)?,
            hits: row.get::<_, i64>(1)? as u64,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn query_daily_totals(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<DailyTotal>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT date, COUNT(*) as pages, SUM(hits) as hits
        FROM pagevisits
        GROUP BY date
        ORDER BY date DESC
        LIMIT ?
        "#,
    )?;

    let rows = stmt.query_map([limit as i64], |row| {
        Ok(DailyTotal {
            date: row.get(0)?,
            pages: row.get::<_, i64>(1)? as u64,
            hits: row.get::<_, i64>(2)? as u64,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn query_total_hits(conn: &Connection) -> rusqlite::Result<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(hits), 0) FROM pagevisits",
        [],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn snapshot(entries: &[(&str, u64)]) -> Snapshot {
        entries
            .iter()
            .map(|(page, hits)| (VisitKey::new(day(), *page), *hits))
            .collect()
    }

    fn temp_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("visits.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_successive_flushes_are_additive() {
        let (_dir, mut store) = temp_store();
        store.apply(&snapshot(&[("/", 3)])).unwrap();
        store.apply(&snapshot(&[("/", 5)])).unwrap();

        assert_eq!(store.hits(&VisitKey::new(day(), "/")).unwrap(), 8);
    }

    #[test]
    fn test_flush_increments_existing_row() {
        let (_dir, mut store) = temp_store();
        store
            .connect()
            .unwrap()
            .execute(
                "INSERT INTO pagevisits (date, page, hits) VALUES ('2024-06-01', '/blog', 10)",
                [],
            )
            .unwrap();

        store.apply(&snapshot(&[("/blog", 4)])).unwrap();
        assert_eq!(store.hits(&VisitKey::new(day(), "/blog")).unwrap(), 14);
    }

    #[test]
    fn test_empty_snapshot_is_noop() {
        let dir = TempDir::new().unwrap();
        // Never opened, so any connection attempt would create the file
        let mut store = SqliteStore {
            path: dir.path().join("missing").join("visits.db"),
        };
        assert!(store.apply(&Snapshot::default()).is_ok());
    }

    #[test]
    fn test_failed_flush_is_all_or_nothing() {
        let (_dir, mut store) = temp_store();
        store.apply(&snapshot(&[("/a", 1)])).unwrap();

        // Reject any write to '/b' so the batch fails midway
        store
            .connect()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_b BEFORE INSERT ON pagevisits
                 WHEN NEW.page = '/b'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = store.apply(&snapshot(&[("/a", 2), ("/b", 2), ("/c", 2)]));
        assert!(result.is_err());

        assert_eq!(store.hits(&VisitKey::new(day(), "/a")).unwrap(), 1);
        assert_eq!(store.hits(&VisitKey::new(day(), "/c")).unwrap(), 0);
        assert_eq!(store.total_hits().unwrap(), 1);
    }

    #[test]
    fn test_reopen_keeps_totals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("visits.db");

        let mut store = SqliteStore::open(&path).unwrap();
        store.apply(&snapshot(&[("/", 2)])).unwrap();
        drop(store);

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.total_hits().unwrap(), 2);
    }

    #[test]
    fn test_top_pages_and_daily_totals() {
        let (_dir, mut store) = temp_store();
        store
            .apply(&snapshot(&[("/", 5), ("/blog", 9), ("/contact", 1)]))
            .unwrap();
        let other_day = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        store
            .apply(&[(VisitKey::new(other_day, "/"), 4)].into_iter().collect())
            .unwrap();

        let top = store.top_pages(day(), 2).unwrap();
        assert_eq!(
            top,
            vec![
                PageHits {
                    page: "/blog".to_string(),
                    hits: 9
                },
                PageHits {
                    page: "/".to_string(),
                    hits: 5
                },
            ]
        );

        let days = store.daily_totals(10).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, "2024-06-02");
        assert_eq!(days[0].hits, 4);
        assert_eq!(days[1].pages, 3);
        assert_eq!(days[1].hits, 15);
    }
}
