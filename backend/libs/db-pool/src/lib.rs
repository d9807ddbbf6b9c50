//! Database connection pool management
//!
//! Builds the read-only PostgreSQL pool the feed engine queries through.

mod metrics;

use metrics::record_snapshot;
pub use metrics::{acquire_with_metrics, PoolSnapshot};

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Concurrent store reads issued by one feed request: four candidate
/// generators plus the preference load.
pub const READS_PER_FEED_REQUEST: u32 = 5;

const MIN_POOL_SIZE: u32 = 5;
const MAX_POOL_SIZE: u32 = 100;
const MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Database connection pool configuration
#[derive(Clone)]
pub struct DbConfig {
    /// Service name for metrics labeling
    pub service_name: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Timeout for the verification query run right after connecting
    pub connect_timeout_secs: u64,
    /// Timeout for getting a connection out of the pool
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("service_name", &self.service_name)
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("max_lifetime_secs", &self.max_lifetime_secs)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 20,
            min_connections: 5,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl DbConfig {
    pub fn new(service_name: &str, database_url: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            database_url: database_url.to_string(),
            ..Self::default()
        }
    }

    /// Size the pool for an expected number of in-flight feed requests.
    ///
    /// Every request fans out into [`READS_PER_FEED_REQUEST`] concurrent
    /// queries, so the pool grows linearly with request volume, clamped to
    /// `[5, 100]`.
    pub fn with_expected_concurrency(mut self, concurrent_requests: u32) -> Self {
        let max = concurrent_requests
            .saturating_mul(READS_PER_FEED_REQUEST)
            .clamp(MIN_POOL_SIZE, MAX_POOL_SIZE);
        self.max_connections = max;
        self.min_connections = self.min_connections.min(max);
        self
    }
}

/// Connection options for the feed store: tagged with the service name and
/// pinned to read-only transactions.
pub fn connect_options(config: &DbConfig) -> Result<PgConnectOptions, sqlx::Error> {
    let options = config
        .database_url
        .parse::<PgConnectOptions>()?
        .application_name(&config.service_name)
        .options([("default_transaction_read_only", "on")]);
    Ok(options)
}

pub fn pool_options(config: &DbConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
}

/// Open the feed store pool, check it answers, and start publishing
/// occupancy metrics.
pub async fn create_pool(config: DbConfig) -> Result<PgPool, sqlx::Error> {
    debug!(?config, "Creating feed store pool");

    let pool = pool_options(&config)
        .connect_with(connect_options(&config)?)
        .await?;

    verify_pool(&pool, &config).await?;

    let snapshot = PoolSnapshot::of(&pool);
    record_snapshot(&config.service_name, snapshot);
    info!(
        service = %config.service_name,
        max_connections = snapshot.max,
        request_slots = snapshot.free_request_slots(READS_PER_FEED_REQUEST),
        "Feed store pool ready"
    );

    spawn_pool_monitor(pool.clone(), config.service_name.clone());
    Ok(pool)
}

async fn verify_pool(pool: &PgPool, config: &DbConfig) -> Result<(), sqlx::Error> {
    let timeout = Duration::from_secs(config.connect_timeout_secs);
    match tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => {
            error!(service = %config.service_name, error = %e, "Feed store verification failed");
            Err(e)
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Feed store verification timed out"
            );
            Err(sqlx::Error::PoolTimedOut)
        }
    }
}

fn spawn_pool_monitor(pool: PgPool, service: String) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MONITOR_INTERVAL);
        loop {
            interval.tick().await;
            let snapshot = PoolSnapshot::of(&pool);
            record_snapshot(&service, snapshot);
            if snapshot.free_request_slots(READS_PER_FEED_REQUEST) == 0 {
                warn!(
                    service = %service,
                    active = snapshot.active(),
                    max = snapshot.max,
                    "Feed store pool saturated, new feed requests will queue"
                );
            }
        }
    });
}
