//! Shared, concurrently-updated download progress: an atomic byte counter
//! incremented by chunk workers and sampled by a periodic ticker task.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// `total == -1` means unknown size (e.g. chunked transfer without
/// Content-Length) — `Progress` is then left out of the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub downloaded: u64,
    pub total: i64,
    pub done: bool,
    pub error: Option<String>,
    pub elapsed_secs: f64,
    pub bytes_per_sec: f64,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> Option<f64> {
        if self.total > 0 {
            Some(100.0 * self.downloaded as f64 / self.total as f64)
        } else {
            None
        }
    }
}

pub struct ProgressState {
    downloaded: AtomicU64,
    total: AtomicI64,
    done: std::sync::atomic::AtomicBool,
    error: RwLock<Option<String>>,
    start_time: Instant,
    end_time: RwLock<Option<Instant>>,
    last_sample: RwLock<(Instant, u64)>,
}

impl ProgressState {
    pub fn new(total: i64) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            downloaded: AtomicU64::new(0),
            total: AtomicI64::new(total),
            done: std::sync::atomic::AtomicBool::new(false),
            error: RwLock::new(None),
            start_time: now,
            end_time: RwLock::new(None),
            last_sample: RwLock::new((now, 0)),
        })
    }

    /// Totally ordered fetch-add; callers never lose or double count bytes.
    pub fn add_bytes(&self, n: u64) {
        self.downloaded.fetch_add(n, Ordering::SeqCst);
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn set_total(&self, total: i64) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub async fn finish(&self, error: Option<String>) {
        self.done.store(true, Ordering::SeqCst);
        *self.error.write().await = error;
        *self.end_time.write().await = Some(Instant::now());
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Snapshot including an instantaneous rate computed against the last
    /// sample (no smoothing — it's a plain since-last-tick rate).
    pub async fn snapshot(&self) -> ProgressSnapshot {
        let downloaded = self.downloaded();
        let now = Instant::now();
        let mut last = self.last_sample.write().await;
        let elapsed_since_last = now.duration_since(last.0).as_secs_f64();
        let bytes_per_sec = if elapsed_since_last > 0.0 {
            (downloaded.saturating_sub(last.1)) as f64 / elapsed_since_last
        } else {
            0.0
        };
        *last = (now, downloaded);

        let end = *self.end_time.read().await;
        let elapsed_secs = end.unwrap_or(now).duration_since(self.start_time).as_secs_f64();

        ProgressSnapshot {
            downloaded,
            total: self.total(),
            done: self.is_done(),
            error: self.error.read().await.clone(),
            elapsed_secs,
            bytes_per_sec,
        }
    }
}

/// Spawns a task sampling `state` every `interval` and invoking `observer`
/// with each snapshot, stopping once `state.is_done()`.
pub fn spawn_ticker<F>(
    state: Arc<ProgressState>,
    interval: Duration,
    mut observer: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut(ProgressSnapshot) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let snap = state.snapshot().await;
            let done = snap.done;
            observer(snap);
            if done {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn downloaded_never_exceeds_total_invariant_is_caller_responsibility() {
        let state = ProgressState::new(100);
        state.add_bytes(40);
        state.add_bytes(60);
        assert_eq!(state.downloaded(), 100);
        let snap = state.snapshot().await;
        assert_eq!(snap.percent(), Some(100.0));
    }

    #[tokio::test]
    async fn unknown_total_reports_no_percent() {
        let state = ProgressState::new(-1);
        state.add_bytes(10);
        let snap = state.snapshot().await;
        assert_eq!(snap.percent(), None);
    }
}
