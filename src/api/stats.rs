//! Request Statistics
//!
//! Counters fed by the request logging middleware and reported by `/stats`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::RwLock;

/// Shared request statistics
pub type SharedRequestStats = Arc<RequestStats>;

#[derive(Debug, Default)]
struct Counters {
    requests: u64,
    total_duration_ms: u64,
    max_duration_ms: u64,
    statuses: BTreeMap<u16, u64>,
}

/// Process-lifetime request counters
#[derive(Debug)]
pub struct RequestStats {
    started: Instant,
    counters: RwLock<Counters>,
}

/// Snapshot served by `/stats`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub uptime_secs: u64,
    pub requests: u64,
    /// Response count per HTTP status code
    pub statuses: BTreeMap<u16, u64>,
    pub avg_duration_ms: f64,
    pub max_duration_ms: u64,
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: RwLock::new(Counters::default()),
        }
    }

    pub async fn record(&self, status: u16, duration_ms: u64) {
        let mut counters = self.counters.write().await;
        counters.requests += 1;
        counters.total_duration_ms += duration_ms;
        counters.max_duration_ms = counters.max_duration_ms.max(duration_ms);
        *counters.statuses.entry(status).or_insert(0) += 1;
    }

    pub async fn report(&self) -> StatsReport {
        let counters = self.counters.read().await;
        let avg_duration_ms = if counters.requests == 0 {
            0.0
        } else {
            counters.total_duration_ms as f64 / counters.requests as f64
        };

        StatsReport {
            uptime_secs: self.started.elapsed().as_secs(),
            requests: counters.requests,
            statuses: counters.statuses.clone(),
            avg_duration_ms,
            max_duration_ms: counters.max_duration_ms,
        }
    }
}
