use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub feed: FeedSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub env: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "feed-engine".to_string(),
            env: "development".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// When set, overrides `max_connections` with a size derived from the
    /// expected number of in-flight feed requests.
    #[serde(default)]
    pub expected_concurrent_requests: Option<u32>,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

/// Ranking weights for the linear feed score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub affinity: f64,
    pub engagement: f64,
    pub recency: f64,
    pub social: f64,
    pub locality: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            affinity: 0.30,
            engagement: 0.20,
            recency: 0.20,
            social: 0.20,
            locality: 0.10,
        }
    }
}

impl RankingWeights {
    fn values(&self) -> [(&'static str, f64); 5] {
        [
            ("affinity", self.affinity),
            ("engagement", self.engagement),
            ("recency", self.recency),
            ("social", self.social),
            ("locality", self.locality),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityConfig {
    pub max_per_author: usize,
    pub max_per_topic: usize,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            max_per_author: 3,
            max_per_topic: 8,
        }
    }
}

/// Per-source enable flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceToggles {
    pub social: bool,
    pub trending: bool,
    pub locality: bool,
    pub recency: bool,
}

impl Default for SourceToggles {
    fn default() -> Self {
        Self {
            social: true,
            trending: true,
            locality: true,
            recency: true,
        }
    }
}

/// How duplicate candidates coming from several sources are collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Keep the first occurrence untouched, drop the rest.
    FirstSeen,
    /// Keep the first occurrence's position, fold later occurrences into it.
    Merge,
}

/// Which part of the selected feed gets shuffled by the exploration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleMode {
    /// Ordered exploitation slice followed by the sampled exploration slice.
    ExplorationOnly,
    /// Shuffle exploitation and exploration slices together.
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub enabled: bool,
    pub weights: RankingWeights,
    pub diversity: DiversityConfig,
    pub sources: SourceToggles,
    pub exploration_rate: f64,
    pub exploration_shuffle: ShuffleMode,
    /// Fixed seed for the exploration sampler; entropy-seeded when absent.
    pub exploration_seed: Option<u64>,
    pub dedup_strategy: DedupStrategy,
    pub max_locality_radius_meters: f64,
    /// Authors above this affinity feed the social source even when unfollowed.
    pub social_min_affinity: f64,
    pub generator_timeout_ms: u64,
    /// 0 disables the preference cache.
    pub preference_cache_ttl_seconds: u64,
    pub impression_sample_rate: f64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            weights: RankingWeights::default(),
            diversity: DiversityConfig::default(),
            sources: SourceToggles::default(),
            exploration_rate: 0.1,
            exploration_shuffle: ShuffleMode::ExplorationOnly,
            exploration_seed: None,
            dedup_strategy: DedupStrategy::Merge,
            max_locality_radius_meters: 50_000.0,
            social_min_affinity: 0.5,
            generator_timeout_ms: 2_000,
            preference_cache_ttl_seconds: 300,
            impression_sample_rate: 0.2,
        }
    }
}

impl FeedSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in self.weights.values() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(anyhow!(
                    "Ranking weight '{}' must be a finite, non-negative number",
                    name
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(anyhow!("Exploration rate must be between 0 and 1"));
        }

        if !(0.0..=1.0).contains(&self.impression_sample_rate) {
            return Err(anyhow!("Impression sample rate must be between 0 and 1"));
        }

        if !self.max_locality_radius_meters.is_finite() || self.max_locality_radius_meters <= 0.0
        {
            return Err(anyhow!("Max locality radius must be greater than 0"));
        }

        if !self.social_min_affinity.is_finite() {
            return Err(anyhow!("Social affinity threshold must be finite"));
        }

        if self.generator_timeout_ms == 0 {
            return Err(anyhow!("Generator timeout must be greater than 0"));
        }

        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_default("database.url", url)?;
        }

        builder
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(anyhow!("Database URL is required"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("Database max connections must be greater than 0"));
        }

        self.feed.validate()
    }
}
