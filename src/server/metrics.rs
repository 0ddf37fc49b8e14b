use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

/// Server-wide counters, shared by every connection handler.
///
/// Only a request that decodes far enough to be answered counts as a request;
/// connections closed without any response are counted as dropped.
#[derive(Debug, Default)]
pub struct Metrics {
    requests: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
    busy_us: AtomicU64,
    slowest_us: AtomicU64,
    kinds: Mutex<BTreeMap<&'static str, KindStats>>,
}

/// Outcome counts for one message kind label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub ok: u64,
    pub error: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, label: &'static str, succeeded: bool, elapsed: Duration) {
        let micros = as_micros(elapsed);
        // fetch_add would wrap
        let _ = self
            .busy_us
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |busy| {
                Some(busy.saturating_add(micros))
            });
        self.slowest_us.fetch_max(micros, Ordering::Relaxed);

        let counter = if succeeded { &self.successes } else { &self.errors };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut kinds = self.kinds.lock().unwrap_or_else(PoisonError::into_inner);
        let stats = kinds.entry(label).or_default();
        if succeeded {
            stats.ok += 1;
        } else {
            stats.error += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_success = self.successes.load(Ordering::Relaxed);
        let total_errors = self.errors.load(Ordering::Relaxed);
        let finished = total_success + total_errors;

        MetricsSnapshot {
            total_requests: self.requests.load(Ordering::Relaxed),
            total_success,
            total_errors,
            dropped_connections: self.dropped.load(Ordering::Relaxed),
            avg_duration_us: self
                .busy_us
                .load(Ordering::Relaxed)
                .checked_div(finished)
                .unwrap_or(0),
            max_duration_us: self.slowest_us.load(Ordering::Relaxed),
            kinds: self
                .kinds
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

fn as_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Point-in-time copy of [`Metrics`], logged as one JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_success: u64,
    pub total_errors: u64,
    pub dropped_connections: u64,
    pub avg_duration_us: u64,
    pub max_duration_us: u64,
    pub kinds: BTreeMap<&'static str, KindStats>,
}

impl MetricsSnapshot {
    pub fn report(&self) {
        match serde_json::to_string(self) {
            Ok(json) => info!(metrics = %json, "Metrics report"),
            Err(e) => warn!("Failed to serialize metrics: {}", e),
        }
    }
}

/// Times one request from decode to response and records the outcome.
pub struct RequestTracer {
    label: &'static str,
    start: Instant,
    metrics: Arc<Metrics>,
}

impl RequestTracer {
    pub fn new(label: &'static str, metrics: Arc<Metrics>) -> Self {
        debug!(kind = label, "Handling request");
        metrics.requests.fetch_add(1, Ordering::Relaxed);

        Self {
            label,
            start: Instant::now(),
            metrics,
        }
    }

    pub fn success(self) {
        let elapsed = self.start.elapsed();
        info!(kind = self.label, elapsed_us = as_micros(elapsed), "Request completed");
        self.metrics.record(self.label, true, elapsed);
    }

    pub fn error(self, message: &str) {
        let elapsed = self.start.elapsed();
        warn!(
            kind = self.label,
            elapsed_us = as_micros(elapsed),
            "Request failed: {}",
            message
        );
        self.metrics.record(self.label, false, elapsed);
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sockwrite=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn log_startup(socket_path: &Path, file_path: &Path, max_connections: usize) {
    info!(
        socket = %socket_path.display(),
        file = %file_path.display(),
        max_connections,
        "Server listening"
    );
}

pub fn log_shutdown() {
    info!("Server stopped");
}
