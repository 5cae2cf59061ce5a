use rusqlite::Connection;

pub const SCHEMA_VERSION: i32 = 1;

/// Create the visit table and its report index if missing.
///
/// Never drops anything: `hits` is cumulative across process restarts.
pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Metadata table
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Cumulative hits per (day, page)
        CREATE TABLE IF NOT EXISTS pagevisits (
            date TEXT DEFAULT CURRENT_DATE,
            page TEXT,
            hits INTEGER DEFAULT 1,
            UNIQUE(date, page)
        );

        -- Serves "top pages today" style reads
        CREATE INDEX IF NOT EXISTS idx_pagevisits_report_today
            ON pagevisits (date, hits DESC);
        "#,
    )
}

/// Set a metadata key
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
        [key, value],
    )?;
    Ok(())
}

/// Get a metadata key
pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
        row.get(0)
    })
    .optional()
}

pub(crate) trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
