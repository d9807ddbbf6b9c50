use anyhow::{anyhow, Context};
use db_pool::{create_pool, DbConfig};
use feed_engine::config::LogFormat;
use feed_engine::{Config, FeedEngine, FeedRequest, GeoPoint, PgFeedStore};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

const USAGE: &str = "usage: feed-engine <user-id> [limit] [latitude longitude] [--metadata]";
const DEFAULT_LIMIT: usize = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    config.validate().context("Invalid configuration")?;

    let args = CliArgs::parse(std::env::args().skip(1))?;

    info!(
        service = %config.app.service_name,
        env = %config.app.env,
        "Starting {} v{}",
        config.app.service_name,
        env!("CARGO_PKG_VERSION")
    );

    let mut db_config = DbConfig::new(&config.app.service_name, &config.database.url);
    db_config.max_connections = config.database.max_connections;
    db_config.min_connections = config.database.min_connections;
    db_config.acquire_timeout_secs = config.database.acquire_timeout_secs;
    if let Some(expected) = config.database.expected_concurrent_requests {
        db_config = db_config.with_expected_concurrency(expected);
    }

    let pool = create_pool(db_config)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgFeedStore::new(pool, config.app.service_name.clone()));
    let engine = FeedEngine::new(store, config.feed.clone());

    let mut request = FeedRequest::new(args.user_id, args.limit).with_metadata(args.metadata);
    if let Some(location) = args.location {
        request = request.with_location(location);
    }

    let page = engine.get_feed_page(&request).await;

    info!(
        user_id = %args.user_id,
        returned = page.total_count,
        has_more = page.has_more,
        processing_time_ms = page.processing_time_ms,
        "Feed page generated"
    );

    println!("{}", serde_json::to_string_pretty(&page)?);

    Ok(())
}

/// Logs go to stderr; stdout carries the feed JSON.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.app.log_level.as_str()));

    match config.app.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[derive(Debug, PartialEq)]
struct CliArgs {
    user_id: Uuid,
    limit: usize,
    location: Option<GeoPoint>,
    metadata: bool,
}

impl CliArgs {
    fn parse(args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut metadata = false;
        let mut positional = Vec::new();
        for arg in args {
            if arg == "--metadata" {
                metadata = true;
            } else {
                positional.push(arg);
            }
        }

        let user_id = positional
            .first()
            .ok_or_else(|| anyhow!(USAGE))?
            .parse::<Uuid>()
            .context("user id must be a UUID")?;

        let limit = match positional.get(1) {
            Some(raw) => raw.parse::<usize>().context("limit must be a positive integer")?,
            None => DEFAULT_LIMIT,
        };

        let location = match (positional.get(2), positional.get(3)) {
            (Some(lat), Some(lon)) => {
                let lat: f64 = lat.parse().context("latitude must be a number")?;
                let lon: f64 = lon.parse().context("longitude must be a number")?;
                Some(GeoPoint::new(lat, lon)?)
            }
            (None, None) => None,
            _ => return Err(anyhow!("latitude and longitude must be given together")),
        };

        if positional.len() > 4 {
            return Err(anyhow!(USAGE));
        }

        Ok(Self {
            user_id,
            limit,
            location,
            metadata,
        })
    }
}
