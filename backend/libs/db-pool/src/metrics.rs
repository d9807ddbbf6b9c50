//! Prometheus metrics for the feed store's connection pool
//!
//! Every acquisition is labelled with the store read that asked for it, so a
//! feed request shows up as its individual reads rather than one opaque wait.

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};
use sqlx::{pool::PoolConnection, PgPool, Postgres};
use std::time::Instant;

lazy_static::lazy_static! {
    static ref FEED_POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "feed_store_pool_connections",
        "Feed store pool connections by state",
        &["service", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref FEED_POOL_ACQUIRE_DURATION: HistogramVec = register_histogram_vec!(
        "feed_store_acquire_duration_seconds",
        "Time a store read waited for a pooled connection",
        &["service", "read"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 2.0]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref FEED_POOL_ACQUIRE_FAILURES: IntCounterVec = register_int_counter_vec!(
        "feed_store_acquire_failures_total",
        "Store reads that never got a connection",
        &["service", "read", "reason"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub size: u32,
    pub idle: u32,
    pub max: u32,
}

impl PoolSnapshot {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle() as u32,
            max: pool.options().get_max_connections(),
        }
    }

    pub fn active(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }

    /// How many full feed requests could start right now without queueing.
    pub fn free_request_slots(&self, reads_per_request: u32) -> u32 {
        let free = self.max.saturating_sub(self.active());
        free / reads_per_request.max(1)
    }
}

pub(crate) fn record_snapshot(service: &str, snapshot: PoolSnapshot) {
    for (state, value) in [
        ("idle", snapshot.idle),
        ("active", snapshot.active()),
        ("max", snapshot.max),
    ] {
        FEED_POOL_CONNECTIONS
            .with_label_values(&[service, state])
            .set(i64::from(value));
    }
}

fn failure_reason(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::PoolTimedOut => "timeout",
        sqlx::Error::PoolClosed => "closed",
        _ => "other",
    }
}

/// Acquire a connection for one store read and record the wait under `read`.
pub async fn acquire_with_metrics(
    pool: &PgPool,
    service: &str,
    read: &str,
) -> Result<PoolConnection<Postgres>, sqlx::Error> {
    let start = Instant::now();
    let result = pool.acquire().await;

    FEED_POOL_ACQUIRE_DURATION
        .with_label_values(&[service, read])
        .observe(start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        FEED_POOL_ACQUIRE_FAILURES
            .with_label_values(&[service, read, failure_reason(e)])
            .inc();
    }

    result
}
