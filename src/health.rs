//! Read-only per-job health snapshot for diagnostics: bytes downloaded,
//! throughput, retry count, and the last error seen, keyed by job id.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub job_id: String,
    pub bytes_downloaded: u64,
    pub bytes_per_sec: f64,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Entry {
    bytes_downloaded: u64,
    bytes_per_sec: f64,
    retry_count: u32,
    last_error: Option<String>,
    #[allow(dead_code)]
    last_updated: Option<Instant>,
}

/// Shared registry, one entry per active or recently-finished job. The
/// queue constructs and owns one; there is no global singleton.
pub struct HealthRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl HealthRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { entries: RwLock::new(HashMap::new()) })
    }

    pub async fn record_progress(&self, job_id: &str, bytes_downloaded: u64, bytes_per_sec: f64) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(job_id.to_string()).or_default();
        entry.bytes_downloaded = bytes_downloaded;
        entry.bytes_per_sec = bytes_per_sec;
        entry.last_updated = Some(Instant::now());
    }

    pub async fn record_retry(&self, job_id: &str) {
        let mut entries = self.entries.write().await;
        entries.entry(job_id.to_string()).or_default().retry_count += 1;
    }

    pub async fn record_error(&self, job_id: &str, message: String) {
        let mut entries = self.entries.write().await;
        entries.entry(job_id.to_string()).or_default().last_error = Some(message);
    }

    pub async fn unregister(&self, job_id: &str) {
        self.entries.write().await.remove(job_id);
    }

    pub async fn get(&self, job_id: &str) -> Option<HealthSnapshot> {
        self.entries.read().await.get(job_id).map(|e| HealthSnapshot {
            job_id: job_id.to_string(),
            bytes_downloaded: e.bytes_downloaded,
            bytes_per_sec: e.bytes_per_sec,
            retry_count: e.retry_count,
            last_error: e.last_error.clone(),
        })
    }

    pub async fn all(&self) -> Vec<HealthSnapshot> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(id, e)| HealthSnapshot {
                job_id: id.clone(),
                bytes_downloaded: e.bytes_downloaded,
                bytes_per_sec: e.bytes_per_sec,
                retry_count: e.retry_count,
                last_error: e.last_error.clone(),
            })
            .collect()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_and_fetch_roundtrip() {
        let registry = HealthRegistry::new();
        registry.record_progress("job1", 1024, 512.0).await;
        registry.record_retry("job1").await;
        let snap = registry.get("job1").await.unwrap();
        assert_eq!(snap.bytes_downloaded, 1024);
        assert_eq!(snap.retry_count, 1);
    }

    #[tokio::test]
    async fn unregister_removes_entry() {
        let registry = HealthRegistry::new();
        registry.record_progress("job1", 1, 1.0).await;
        registry.unregister("job1").await;
        assert!(registry.get("job1").await.is_none());
    }
}
