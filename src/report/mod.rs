//! Window aggregation and CSV reporting.
//!
//! Walks an operator-chosen time range second by second, queries the
//! store for each bucket's latency samples, and writes one CSV row per
//! retained bucket. A strictly leading run of all-empty buckets is
//! dropped; once anything has been recorded, every later bucket —
//! including empty ones — is kept. A uniqueness sanity check runs once
//! over the full range before the walk and warns without blocking.

pub mod percentile;

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Duration, Utc};

use crate::store::{Store, TraceStore};
use self::percentile::{bucket_stat, Stat};

/// One retained report row: the bucket's start instant and its stats.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRow {
    pub bucket: DateTime<Utc>,
    pub stat: Stat,
}

/// Outcome of the pre-aggregation uniqueness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniquenessReport {
    pub records: usize,
    /// All payload sizes identical across the range.
    pub payload_stable: bool,
    /// All comments distinct across the range.
    pub comments_unique: bool,
}

impl UniquenessReport {
    pub fn passed(&self) -> bool {
        self.payload_stable && self.comments_unique
    }
}

// ---------------------------------------------------------------------------
// Uniqueness check
// ---------------------------------------------------------------------------

/// Check the *inclusive* range `[start, end]`: payload size must be
/// constant (test traffic uses one payload) and every comment distinct
/// (each record traceable to a unique message). Violations warn only.
pub fn check_unique(
    store: &Store,
    table: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<UniquenessReport> {
    let traces = TraceStore::new(store);
    let rows = traces.payload_and_comments(table, start.timestamp_micros(), end.timestamp_micros())?;

    let sizes: HashSet<i64> = rows.iter().map(|(size, _)| *size).collect();
    let comments: HashSet<&str> = rows.iter().map(|(_, c)| c.as_str()).collect();

    let report = UniquenessReport {
        records: rows.len(),
        payload_stable: sizes.len() <= 1,
        comments_unique: comments.len() == rows.len(),
    };

    if !report.payload_stable {
        tracing::warn!("Payload size not stable: {} distinct values", sizes.len());
    } else if !report.comments_unique {
        tracing::warn!(
            "Comments not unique: {} distinct over {} records",
            comments.len(),
            report.records,
        );
    } else {
        tracing::info!("Checked {} records, uniqueness holds", report.records);
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// Bucket walk
// ---------------------------------------------------------------------------

/// Aggregate `[start, end)` into one-second buckets.
///
/// Buckets are half-open `[t, t+1s)` for `t = start, start+1s, ...`;
/// the final bucket covers `[end-1s, end)` and any sub-second remainder
/// of the range is silently dropped. `start == end` yields an empty
/// report. One storage round-trip per bucket, sequential by design.
pub fn aggregate(
    store: &Store,
    table: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<BucketRow>> {
    ensure!(start <= end, "window start is after end");

    let traces = TraceStore::new(store);
    let step = Duration::seconds(1);
    let mut rows = Vec::new();
    let mut ignore_leading = true;

    let mut cursor = start;
    while cursor + step <= end {
        let bucket_end = cursor + step;
        let samples: Vec<f64> = traces
            .latencies_between(
                table,
                cursor.timestamp_micros(),
                bucket_end.timestamp_micros(),
            )?
            .into_iter()
            .map(|us| us as f64)
            .collect();

        let stat = bucket_stat(&samples);

        // Leading-edge trim only: the flag never resets once tripped
        if stat.is_empty() && ignore_leading {
            cursor = bucket_end;
            continue;
        }
        ignore_leading = false;
        rows.push(BucketRow {
            bucket: cursor,
            stat,
        });
        cursor = bucket_end;
    }

    tracing::info!(
        "Aggregated [{}, {}): {} retained buckets",
        start,
        end,
        rows.len(),
    );
    Ok(rows)
}

// ---------------------------------------------------------------------------
// CSV output
// ---------------------------------------------------------------------------

/// Write retained buckets as `TIMESTAMP,TPS,P50(ms),P99(ms)`.
///
/// Percentiles are converted µs → ms; the `-1` empty-bucket sentinel
/// passes through the division like any other value (an empty bucket
/// reads `-0.001`) and must not be treated as a real latency downstream.
pub fn write_report(path: &Path, rows: &[BucketRow]) -> Result<()> {
    let mut out = std::fs::File::create(path)
        .with_context(|| format!("creating report: {}", path.display()))?;

    writeln!(out, "TIMESTAMP,TPS,P50(ms),P99(ms)")?;
    for row in rows {
        writeln!(
            out,
            "{},{},{},{}",
            row.bucket.format("%Y-%m-%d %H:%M:%S"),
            row.stat.count,
            row.stat.p50 / 1000.0,
            row.stat.p99 / 1000.0,
        )?;
    }
    out.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
