//! Pure percentile math for bucket statistics.
//!
//! Linear interpolation between closest ranks (the numpy default):
//! for quantile `q` over `n` sorted samples, the rank is
//! `q/100 × (n-1)` and the value is interpolated between the two
//! surrounding samples. No storage, no I/O — unit-testable in isolation.

/// Sentinel emitted for p50/p99 of an empty bucket.
pub const EMPTY_SENTINEL: f64 = -1.0;

/// Summary statistics for one bucket. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stat {
    pub count: usize,
    /// Microseconds, or [`EMPTY_SENTINEL`] when `count == 0`.
    pub p50: f64,
    pub p99: f64,
}

impl Stat {
    pub fn is_empty(&self) -> bool {
        self.count == 0 && self.p50 == EMPTY_SENTINEL && self.p99 == EMPTY_SENTINEL
    }
}

/// Compute `(count, p50, p99)` for a bucket's latency samples.
pub fn bucket_stat(samples: &[f64]) -> Stat {
    match (percentile(samples, 50.0), percentile(samples, 99.0)) {
        (Some(p50), Some(p99)) => Stat {
            count: samples.len(),
            p50,
            p99,
        },
        _ => Stat {
            count: 0,
            p50: EMPTY_SENTINEL,
            p99: EMPTY_SENTINEL,
        },
    }
}

/// Linear-interpolation percentile of an unordered sample set.
///
/// Returns `None` for an empty input. `q` is in percent, `0.0..=100.0`.
pub fn percentile(samples: &[f64], q: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}
