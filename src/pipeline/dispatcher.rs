//! Size-aware batch dispatch.
//!
//! A whole file's records go to one table, but a single multi-row insert
//! can exceed the store's statement-size ceiling. The split is computed
//! once, globally: estimate the serialized size of the entire set, derive
//! a chunk count from the ceiling, and cut the set into equal chunks with
//! the remainder folded into the last one. Size is assumed roughly
//! uniform across records.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{ensure, Result};

use crate::pipeline::parser::TraceRecord;
use crate::store::{Store, TraceStore};

/// Fraction of the statement ceiling a chunk may fill.
const PACKET_FILL_RATIO: f64 = 0.9;

/// Rendered width budgeted for each integer column in the statement.
const INT_RENDER_WIDTH: usize = 16;

/// Per-record statement overhead: parentheses, commas, quoting.
const RECORD_OVERHEAD: usize = 32;

/// What happened to one chunk.
///
/// A chunk that was never attempted is `Skipped`, never a silent zero —
/// callers can tell "no rows" apart from "storage was unavailable".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Inserted { rows: usize },
    Skipped { reason: String },
}

/// Submit `records` to `table` in ceiling-respecting chunks.
///
/// `max_packet_bytes` is the store's statement ceiling; with `commit`
/// set, each chunk is committed immediately after its insert, so an
/// interrupt mid-batch leaves earlier chunks durable. A chunk whose
/// health check fails is skipped — not retried and not fatal; later
/// chunks still run. Returns one outcome per chunk, in order.
pub fn dispatch(
    store: &Store,
    table: &str,
    records: &[TraceRecord],
    max_packet_bytes: usize,
    commit: bool,
    stop: &AtomicBool,
) -> Result<Vec<ChunkOutcome>> {
    dispatch_with_probe(store, table, records, max_packet_bytes, commit, stop, || {
        store.health_check()
    })
}

/// Same as [`dispatch`], with the health probe injected so the skip
/// path can be exercised without an actually-dead connection.
fn dispatch_with_probe(
    store: &Store,
    table: &str,
    records: &[TraceRecord],
    max_packet_bytes: usize,
    commit: bool,
    stop: &AtomicBool,
    healthy: impl Fn() -> bool,
) -> Result<Vec<ChunkOutcome>> {
    ensure!(!records.is_empty(), "dispatch of empty record set");
    ensure!(max_packet_bytes > 0, "statement ceiling must be positive");

    let estimated = estimate_wire_size(records);
    let num_chunks = chunk_count(estimated, max_packet_bytes, records.len());
    if num_chunks > 1 {
        tracing::info!(
            "Statement size ({} bytes est.) exceeds allowed packet, dispatching {} jobs",
            estimated,
            num_chunks,
        );
    }

    let traces = TraceStore::new(store);
    let mut outcomes = Vec::with_capacity(num_chunks);

    for (i, range) in chunk_bounds(records.len(), num_chunks).into_iter().enumerate() {
        if stop.load(Ordering::Relaxed) {
            tracing::warn!("Interrupted, abandoning chunk {}/{}", i, num_chunks);
            outcomes.push(ChunkOutcome::Skipped {
                reason: "interrupted".to_string(),
            });
            continue;
        }
        if !healthy() {
            tracing::warn!("Storage unhealthy, skipping chunk {}/{}", i, num_chunks);
            outcomes.push(ChunkOutcome::Skipped {
                reason: "storage unhealthy".to_string(),
            });
            continue;
        }

        let timer = Instant::now();
        store.begin()?;
        let rows = traces.insert_rows(table, &records[range])?;
        if commit {
            store.commit()?;
        }
        tracing::info!(
            "Submitted job {}/{}: {} rows in {:.3}s",
            i,
            num_chunks,
            rows,
            timer.elapsed().as_secs_f64(),
        );
        outcomes.push(ChunkOutcome::Inserted { rows });
    }

    Ok(outcomes)
}

/// Rows actually inserted across all chunk outcomes.
pub fn inserted_rows(outcomes: &[ChunkOutcome]) -> usize {
    outcomes
        .iter()
        .map(|o| match o {
            ChunkOutcome::Inserted { rows } => *rows,
            ChunkOutcome::Skipped { .. } => 0,
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Sizing
// ---------------------------------------------------------------------------

/// Approximate serialized size of the full multi-row insert statement.
///
/// Counts the rendered text of every bound field plus fixed per-record
/// statement overhead. An estimate, not a guarantee — the 0.9 fill ratio
/// absorbs the slack.
pub fn estimate_wire_size(records: &[TraceRecord]) -> usize {
    records
        .iter()
        .map(|r| {
            r.pub_ts.to_rfc3339().len()
                + r.sub_ts.to_rfc3339().len()
                + 2 * INT_RENDER_WIDTH
                + decimal_width(r.payload_size)
                + r.comment.len()
                + r.pub_host.len()
                + r.sub_host.len()
                + RECORD_OVERHEAD
        })
        .sum()
}

/// Global chunk count: `ceil(estimated / (0.9 × ceiling))`, at least 1.
///
/// Additionally capped at one chunk per record; past that point the
/// bare formula would only produce empty no-op chunks.
fn chunk_count(estimated: usize, max_packet_bytes: usize, n_records: usize) -> usize {
    let budget = (max_packet_bytes as f64 * PACKET_FILL_RATIO).max(1.0);
    let chunks = (estimated as f64 / budget).ceil() as usize;
    chunks.clamp(1, n_records)
}

/// Cut `0..n` into `num_chunks` contiguous ranges.
///
/// Every chunk gets exactly `floor(n / num_chunks)` records except the
/// last, which absorbs the remainder. The partition is exact: every
/// index appears in exactly one range, order preserved.
pub fn chunk_bounds(n: usize, num_chunks: usize) -> Vec<Range<usize>> {
    let chunk_size = n / num_chunks;
    (0..num_chunks)
        .map(|i| {
            let start = i * chunk_size;
            let end = if i == num_chunks - 1 {
                n
            } else {
                (i + 1) * chunk_size
            };
            start..end
        })
        .collect()
}

fn decimal_width(v: u64) -> usize {
    if v == 0 {
        1
    } else {
        (v.ilog10() + 1) as usize
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
