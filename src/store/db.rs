//! SQLite-backed trace store.
//!
//! One connection, opened and validated up front: pragmas applied, schema
//! created, and the statement-size ceiling read once. A handle that fails
//! construction is never handed out — every later operation borrows a
//! known-good [`Store`].

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::limits::Limit;
use rusqlite::Connection;

/// Default destination table for parsed trace records.
pub const DEFAULT_TABLE: &str = "trace_specs";

/// Validated storage handle. Owns the connection and the cached
/// statement-size ceiling (the `max_allowed_packet` analog).
pub struct Store {
    conn: Connection,
    max_allowed_packet: usize,
}

impl Store {
    /// Open (or create) the trace database.
    ///
    /// Applies WAL pragmas, creates the trace table and its index, and
    /// reads `SQLITE_LIMIT_SQL_LENGTH` — the ceiling on a single
    /// statement's serialized size — once for the handle's lifetime.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating DB directory: {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening SQLite DB: {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {DEFAULT_TABLE} (
                pub_ts TEXT NOT NULL,
                sub_ts TEXT NOT NULL,
                pub_us INTEGER NOT NULL,
                sub_us INTEGER NOT NULL,
                payload_size INTEGER NOT NULL,
                comment TEXT NOT NULL,
                pub_host TEXT NOT NULL,
                sub_host TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{DEFAULT_TABLE}_sub_us
            ON {DEFAULT_TABLE}(sub_us);"
        ))?;

        let max_allowed_packet = conn.limit(Limit::SQLITE_LIMIT_SQL_LENGTH) as usize;

        let store = Self {
            conn,
            max_allowed_packet,
        };
        let tables = store.tables()?;
        tracing::debug!(
            "Opened trace DB: {} (statement ceiling {} bytes, tables: {})",
            path.display(),
            max_allowed_packet,
            tables.join(", "),
        );
        Ok(store)
    }

    /// Ceiling on a single statement's serialized size, cached at open.
    pub fn max_allowed_packet(&self) -> usize {
        self.max_allowed_packet
    }

    /// True iff the connection answers a trivial query.
    pub fn health_check(&self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    /// Open an explicit transaction if one isn't already open.
    pub fn begin(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Commit the open transaction; no-op when nothing is open.
    pub fn commit(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// User tables present in the database.
    pub fn tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_schema() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        assert!(store.tables().unwrap().contains(&DEFAULT_TABLE.to_string()));
    }

    #[test]
    fn test_statement_ceiling_positive() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        assert!(store.max_allowed_packet() > 0);
    }

    #[test]
    fn test_health_check() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        assert!(store.health_check());
    }

    #[test]
    fn test_begin_commit_idempotent() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();

        // Commit with no open transaction is a no-op
        store.commit().unwrap();

        store.begin().unwrap();
        store.begin().unwrap(); // already open — no-op
        store.commit().unwrap();
        store.commit().unwrap();
    }
}
