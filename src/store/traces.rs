//! Typed trace queries over the shared connection.
//!
//! Latency is computed server-side (`sub_us - pub_us`, microseconds) so
//! the aggregator never re-derives it client-side.

use anyhow::Result;
use rusqlite::types::Value;

use crate::pipeline::parser::TraceRecord;
use crate::store::Store;

/// Trace-table operations borrowing a validated [`Store`].
pub struct TraceStore<'a> {
    store: &'a Store,
}

impl<'a> TraceStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert a chunk of records as one multi-row statement.
    ///
    /// All records share one column list, so one statement covers the
    /// whole chunk — the serialized form of this statement is what the
    /// packet ceiling bounds. Returns the number of rows inserted.
    pub fn insert_rows(&self, table: &str, records: &[TraceRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let cols = TraceRecord::columns();
        let row = format!("({})", vec!["?"; cols.len()].join(","));
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            cols.join(","),
            vec![row; records.len()].join(","),
        );

        let mut values: Vec<Value> = Vec::with_capacity(records.len() * cols.len());
        for r in records {
            values.push(Value::Text(r.pub_ts.to_rfc3339()));
            values.push(Value::Text(r.sub_ts.to_rfc3339()));
            values.push(Value::Integer(r.pub_ts.timestamp_micros()));
            values.push(Value::Integer(r.sub_ts.timestamp_micros()));
            values.push(Value::Integer(r.payload_size as i64));
            values.push(Value::Text(r.comment.clone()));
            values.push(Value::Text(r.pub_host.clone()));
            values.push(Value::Text(r.sub_host.clone()));
        }

        let inserted = self
            .store
            .conn()
            .execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(inserted)
    }

    /// Latency samples (microseconds) for records whose subscribe time
    /// falls in `[start_us, end_us)`.
    pub fn latencies_between(&self, table: &str, start_us: i64, end_us: i64) -> Result<Vec<i64>> {
        let mut stmt = self.store.conn().prepare(&format!(
            "SELECT sub_us - pub_us AS latency FROM {table}
             WHERE sub_us >= ?1 AND sub_us < ?2"
        ))?;
        let samples = stmt
            .query_map([start_us, end_us], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(samples)
    }

    /// `(payload_size, comment)` for every record whose subscribe time
    /// falls in the *inclusive* range `[start_us, end_us]` — the
    /// uniqueness check scans one second past the last bucket on purpose.
    pub fn payload_and_comments(
        &self,
        table: &str,
        start_us: i64,
        end_us: i64,
    ) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.store.conn().prepare(&format!(
            "SELECT payload_size, comment FROM {table}
             WHERE sub_us >= ?1 AND sub_us <= ?2"
        ))?;
        let rows = stmt
            .query_map([start_us, end_us], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<(i64, String)>, _>>()?;
        Ok(rows)
    }

    /// Total rows in the table.
    pub fn count(&self, table: &str) -> Result<usize> {
        let count: i64 =
            self.store
                .conn()
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }
}
