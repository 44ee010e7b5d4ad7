//! Outcome aggregation.
//!
//! Every request that reaches a terminal outcome contributes exactly one
//! record to the [`ResultAggregator`]. Totals, per-code counts and the latency
//! histogram live behind one `parking_lot` mutex so a snapshot is always
//! internally consistent; per-attempt activity counters are plain atomics.

use hardhat_types::ResponseCode;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Significant figures kept by the latency histogram.
const LATENCY_SIGFIG: u8 = 3;

struct Totals {
    success: u64,
    failure: u64,
    no_response: u64,
    codes: BTreeMap<ResponseCode, u64>,
    /// Request latency in microseconds.
    latency: Histogram<u64>,
}

impl Totals {
    /// Grows the histogram's range as needed.
    fn record_latency(&mut self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        if let Err(e) = self.latency.record(micros) {
            warn!(latency_us = micros, error = ?e, "Failed to record latency");
        }
    }
}

/// Thread-safe outcome counters.
pub struct ResultAggregator {
    totals: Mutex<Totals>,
    attempts: AtomicU64,
    retries: AtomicU64,
    corrections: AtomicU64,
    duplicates: AtomicU64,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            totals: Mutex::new(Totals {
                success: 0,
                failure: 0,
                no_response: 0,
                codes: BTreeMap::new(),
                latency: Histogram::new(LATENCY_SIGFIG)
                    .expect("histogram with 3 significant figures is valid"),
            }),
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            corrections: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    /// Record a request that ended in acceptance.
    pub fn record_success(&self, code: ResponseCode, elapsed: Duration) {
        let mut totals = self.totals.lock();
        totals.success += 1;
        *totals.codes.entry(code).or_insert(0) += 1;
        totals.record_latency(elapsed);
    }

    /// Record a request that ended in failure. `code` is `None` when no node
    /// response was ever obtained.
    pub fn record_failure(&self, code: Option<ResponseCode>, elapsed: Duration) {
        let mut totals = self.totals.lock();
        totals.failure += 1;
        match code {
            Some(code) => *totals.codes.entry(code).or_insert(0) += 1,
            None => totals.no_response += 1,
        }
        totals.record_latency(elapsed);
    }

    /// Count one broadcast attempt.
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one transient retry.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one sequence correction.
    pub fn record_correction(&self) {
        self.corrections.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one duplicate submission.
    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let totals = self.totals.lock();
        StatsSnapshot {
            success: totals.success,
            failure: totals.failure,
            no_response: totals.no_response,
            codes: totals.codes.clone(),
            latency: LatencySummary::from_histogram(&totals.latency),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            corrections: self.corrections.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }
}

/// Latency percentiles of terminal outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub samples: u64,
    pub min: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub max: Duration,
    pub mean: Duration,
}

impl LatencySummary {
    fn from_histogram(histogram: &Histogram<u64>) -> Self {
        if histogram.is_empty() {
            return Self::default();
        }
        Self {
            samples: histogram.len(),
            min: Duration::from_micros(histogram.min()),
            p50: Duration::from_micros(histogram.value_at_quantile(0.50)),
            p90: Duration::from_micros(histogram.value_at_quantile(0.90)),
            p99: Duration::from_micros(histogram.value_at_quantile(0.99)),
            max: Duration::from_micros(histogram.max()),
            mean: Duration::from_micros(histogram.mean() as u64),
        }
    }
}

/// Snapshot of a [`ResultAggregator`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests that ended accepted.
    pub success: u64,
    /// Requests that ended failed.
    pub failure: u64,
    /// Failures that never obtained a response code.
    pub no_response: u64,
    /// Terminal response code counts.
    pub codes: BTreeMap<ResponseCode, u64>,
    pub latency: LatencySummary,
    /// Broadcasts made, retries and resubmissions included.
    pub attempts: u64,
    pub retries: u64,
    pub corrections: u64,
    pub duplicates: u64,
}

impl StatsSnapshot {
    /// Requests that reached a terminal outcome.
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }

    /// Share of terminal outcomes that carried `count`, in percent.
    pub fn percentage(&self, count: u64) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64 * 100.0
        }
    }

    /// Render the end-of-run summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Successful transactions: {}\n", self.success));
        out.push_str(&format!("Failed transactions: {}\n", self.failure));
        out.push_str("Response code breakdown:\n");
        for (code, count) in &self.codes {
            out.push_str(&format!(
                "Code {}: {} ({:.2}%)\n",
                code,
                count,
                self.percentage(*count)
            ));
        }
        if self.no_response > 0 {
            out.push_str(&format!(
                "No response: {} ({:.2}%)\n",
                self.no_response,
                self.percentage(self.no_response)
            ));
        }
        out
    }

    /// Print the end-of-run summary to stdout, latency included.
    pub fn print(&self) {
        print!("{}", self.render());
        println!(
            "Attempts: {} | retries: {} | corrections: {} | duplicates: {}",
            self.attempts, self.retries, self.corrections, self.duplicates
        );
        if self.latency.samples > 0 {
            println!();
            println!("Latency:");
            println!("  P50:  {:?}", self.latency.p50);
            println!("  P90:  {:?}", self.latency.p90);
            println!("  P99:  {:?}", self.latency.p99);
            println!("  Max:  {:?}", self.latency.max);
            println!("  Avg:  {:?}", self.latency.mean);
            println!("  Min:  {:?}", self.latency.min);
        }
    }
}
