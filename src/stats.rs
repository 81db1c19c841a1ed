use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub elapsed_s: f64,
    pub rows_accepted: u64,
    pub rows_written: u64,
    pub rows_rejected: u64,
    pub flushes: u64,
    pub rows_per_sec: f64,
}

/// Counters shared between callers and whoever drives the encoder.
#[derive(Debug, Clone)]
pub struct WriterStats {
    inner: Arc<StatsInner>,
    start_time: Instant,
}

#[derive(Debug, Default)]
struct StatsInner {
    rows_accepted: AtomicU64,
    rows_written: AtomicU64,
    rows_rejected: AtomicU64,
    flushes: AtomicU64,
}

impl WriterStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatsInner::default()),
            start_time: Instant::now(),
        }
    }

    pub fn row_accepted(&self) {
        self.inner.rows_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn row_written(&self) {
        self.inner.rows_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn row_rejected(&self) {
        self.inner.rows_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flushed(&self) {
        self.inner.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let rows_written = self.inner.rows_written.load(Ordering::Relaxed);

        let rows_per_sec = if elapsed_s > 0.0 {
            rows_written as f64 / elapsed_s
        } else {
            0.0
        };

        StatsSnapshot {
            elapsed_s,
            rows_accepted: self.inner.rows_accepted.load(Ordering::Relaxed),
            rows_written,
            rows_rejected: self.inner.rows_rejected.load(Ordering::Relaxed),
            flushes: self.inner.flushes.load(Ordering::Relaxed),
            rows_per_sec,
        }
    }
}

impl Default for WriterStats {
    fn default() -> Self {
        Self::new()
    }
}
