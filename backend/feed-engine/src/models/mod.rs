pub mod events;

use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

pub use events::{DeviceClass, EventType, ImpressionSampler, InteractionEvent};

pub const DEFAULT_SURFACE: &str = "main_feed";

/// Topic bucket used by the diversity filter for posts without a location.
pub const GENERAL_TOPIC: &str = "general";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Social,
    Trending,
    Locality,
    Recency,
}

impl CandidateSource {
    /// Merge order used when collapsing generator output.
    pub const ALL: [CandidateSource; 4] = [
        CandidateSource::Social,
        CandidateSource::Trending,
        CandidateSource::Locality,
        CandidateSource::Recency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::Social => "social",
            CandidateSource::Trending => "trending",
            CandidateSource::Locality => "locality",
            CandidateSource::Recency => "recency",
        }
    }
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::Validation(format!(
                "latitude {} is outside [-90, 90]",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::Validation(format!(
                "longitude {} is outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Ranking features attached to a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateFeatures {
    pub quality_score: f64,
    pub engagement_rate: f64,
    pub recency_decay: f64,
    pub personal_affinity: f64,
    pub social_proximity: f64,
    pub locality_match: f64,
}

impl Default for CandidateFeatures {
    fn default() -> Self {
        Self {
            quality_score: 0.0,
            engagement_rate: 0.0,
            recency_decay: 1.0,
            personal_affinity: 0.0,
            social_proximity: 0.0,
            locality_match: 0.0,
        }
    }
}

impl CandidateFeatures {
    /// Replace every non-finite value with its default.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            quality_score: finite_or(self.quality_score, defaults.quality_score),
            engagement_rate: finite_or(self.engagement_rate, defaults.engagement_rate),
            recency_decay: finite_or(self.recency_decay, defaults.recency_decay),
            personal_affinity: finite_or(self.personal_affinity, defaults.personal_affinity),
            social_proximity: finite_or(self.social_proximity, defaults.social_proximity),
            locality_match: finite_or(self.locality_match, defaults.locality_match),
        }
    }

    /// Element-wise maximum with another bundle.
    pub fn merge_max(&mut self, other: &CandidateFeatures) {
        self.quality_score = self.quality_score.max(other.quality_score);
        self.engagement_rate = self.engagement_rate.max(other.engagement_rate);
        self.recency_decay = self.recency_decay.max(other.recency_decay);
        self.personal_affinity = self.personal_affinity.max(other.personal_affinity);
        self.social_proximity = self.social_proximity.max(other.social_proximity);
        self.locality_match = self.locality_match.max(other.locality_match);
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("personal_affinity".to_string(), self.personal_affinity),
            ("engagement_rate".to_string(), self.engagement_rate),
            ("recency_decay".to_string(), self.recency_decay),
            ("social_proximity".to_string(), self.social_proximity),
            ("locality_match".to_string(), self.locality_match),
            ("quality_score".to_string(), self.quality_score),
        ])
    }
}

fn finite_or(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

/// One post as returned by the store, joined with author and quality signals.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PostRow {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub author_username: String,
    pub created_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
    pub tags: Option<Vec<String>>,
    pub quality_score: f64,
    pub engagement_rate: f64,
    pub recency_decay: f64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SocialPostRow {
    #[sqlx(flatten)]
    pub post: PostRow,
    pub author_affinity: f64,
    pub is_following: bool,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct NearbyPostRow {
    #[sqlx(flatten)]
    pub post: PostRow,
    pub distance_meters: f64,
}

/// Request-scoped candidate produced by one of the generators.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePost {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub author_username: String,
    pub created_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub features: CandidateFeatures,
    pub candidate_source: CandidateSource,
    /// Every source that produced this candidate, first one first.
    pub sources: Vec<CandidateSource>,
    pub ranking_reasons: Vec<String>,
}

impl CandidatePost {
    pub fn from_row(row: PostRow, source: CandidateSource, reason: impl Into<String>) -> Self {
        let features = CandidateFeatures {
            quality_score: row.quality_score,
            engagement_rate: row.engagement_rate,
            recency_decay: row.recency_decay,
            ..CandidateFeatures::default()
        }
        .sanitized();

        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            author_id: row.author_id,
            author_username: row.author_username,
            created_at: row.created_at,
            latitude: row.latitude,
            longitude: row.longitude,
            location: row.location,
            tags: row.tags.unwrap_or_default(),
            features,
            candidate_source: source,
            sources: vec![source],
            ranking_reasons: vec![reason.into()],
        }
    }

    /// Topic bucket for diversity capping.
    pub fn topic_key(&self) -> &str {
        match self.location.as_deref() {
            Some(location) if !location.is_empty() => location,
            _ => GENERAL_TOPIC,
        }
    }
}

/// Weighted contribution of every feature to the final score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub affinity: f64,
    pub engagement: f64,
    pub recency: f64,
    pub social: f64,
    pub locality: f64,
    pub quality: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.affinity + self.engagement + self.recency + self.social + self.locality + self.quality
    }
}

/// A candidate after scoring. The source features stay untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub candidate: CandidatePost,
    pub final_score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserTopicAffinity {
    pub topic_name: String,
    pub score: f64,
    pub interaction_count: i32,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserAuthorAffinity {
    pub author_id: Uuid,
    pub score: f64,
    pub interaction_count: i32,
    pub is_following: bool,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthorPreference {
    pub score: f64,
    pub is_following: bool,
}

/// A user's personalization signals, keyed for ranking lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPreferences {
    pub topic_affinities: HashMap<String, f64>,
    pub author_affinities: HashMap<Uuid, AuthorPreference>,
}

impl UserPreferences {
    pub fn from_rows(topics: Vec<UserTopicAffinity>, authors: Vec<UserAuthorAffinity>) -> Self {
        let topic_affinities = topics
            .into_iter()
            .map(|row| (row.topic_name, finite_or(row.score, 0.0)))
            .collect();
        let author_affinities = authors
            .into_iter()
            .map(|row| {
                (
                    row.author_id,
                    AuthorPreference {
                        score: finite_or(row.score, 0.0),
                        is_following: row.is_following,
                    },
                )
            })
            .collect();

        Self {
            topic_affinities,
            author_affinities,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.topic_affinities.is_empty() && self.author_affinities.is_empty()
    }

    pub fn author_score(&self, author_id: &Uuid) -> Option<f64> {
        self.author_affinities.get(author_id).map(|a| a.score)
    }

    /// Highest topic affinity whose name appears (case-insensitively) in the
    /// location label or in any tag. 0.0 when nothing matches.
    pub fn best_topic_match(&self, location: Option<&str>, tags: &[String]) -> f64 {
        let haystacks: Vec<String> = location
            .into_iter()
            .chain(tags.iter().map(String::as_str))
            .map(str::to_lowercase)
            .collect();

        self.topic_affinities
            .iter()
            .filter(|(topic, _)| {
                let needle = topic.to_lowercase();
                haystacks.iter().any(|hay| hay.contains(&needle))
            })
            .map(|(_, score)| *score)
            .fold(0.0, f64::max)
    }
}

/// Parameters of one feed request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRequest {
    pub user_id: Uuid,
    pub limit: usize,
    pub location: Option<GeoPoint>,
    pub surface: String,
    pub include_metadata: bool,
}

impl FeedRequest {
    pub fn new(user_id: Uuid, limit: usize) -> Self {
        Self {
            user_id,
            limit,
            location: None,
            surface: DEFAULT_SURFACE.to_string(),
            include_metadata: false,
        }
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_surface(mut self, surface: impl Into<String>) -> Self {
        self.surface = surface.into();
        self
    }

    pub fn with_metadata(mut self, include_metadata: bool) -> Self {
        self.include_metadata = include_metadata;
        self
    }
}

/// Why a post was recommended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationMetadata {
    pub score: f64,
    pub reasons: Vec<String>,
    pub candidate_source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    pub ranking_features: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<ScoreBreakdown>,
}

/// A post as delivered to the feed consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecommendation {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub author_id: Uuid,
    pub author_username: String,
    pub created_at: DateTime<Utc>,
    pub quality_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecommendationMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedResponse {
    pub posts: Vec<PostRecommendation>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub total_count: usize,
    pub processing_time_ms: u64,
    pub surface: String,
}

/// Per-stage counters of the retrieval step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecallStats {
    pub social_count: usize,
    pub trending_count: usize,
    pub locality_count: usize,
    pub recency_count: usize,
    pub failed_sources: Vec<CandidateSource>,
    pub total_candidates: usize,
    pub unique_candidates: usize,
}

impl RecallStats {
    pub fn record(&mut self, source: CandidateSource, count: usize) {
        match source {
            CandidateSource::Social => self.social_count = count,
            CandidateSource::Trending => self.trending_count = count,
            CandidateSource::Locality => self.locality_count = count,
            CandidateSource::Recency => self.recency_count = count,
        }
        self.total_candidates += count;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TopicScore {
    pub topic: String,
    pub score: f64,
}

/// Raw counters read from the store for the stats view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub interactions_24h: i64,
    pub posts_with_quality_24h: i64,
    pub topic_affinity_count: i64,
    pub author_affinity_count: i64,
    pub top_topics: Vec<TopicScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    pub enabled: bool,
    pub exploration_rate: f64,
    pub preference_cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationStats {
    pub user_id: Uuid,
    pub total_interactions_24h: i64,
    pub total_posts_with_quality: i64,
    pub user_topic_affinities: i64,
    pub user_author_affinities: i64,
    pub top_topics: Vec<TopicScore>,
    pub config: StatsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> PostRow {
        PostRow {
            id: Uuid::new_v4(),
            title: "Road repair on Elm".to_string(),
            content: "Potholes fixed".to_string(),
            author_id: Uuid::new_v4(),
            author_username: "ward7".to_string(),
            created_at: Utc::now(),
            latitude: None,
            longitude: None,
            location: Some("Downtown Infrastructure".to_string()),
            tags: Some(vec!["Roads".to_string(), "budget".to_string()]),
            quality_score: 0.4,
            engagement_rate: f64::NAN,
            recency_decay: 0.9,
        }
    }

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint::new(40.7, -74.0).is_ok());
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(90.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_from_row_sanitizes_features() {
        let candidate = CandidatePost::from_row(row(), CandidateSource::Recency, "recent");
        assert_eq!(candidate.features.engagement_rate, 0.0);
        assert_eq!(candidate.features.quality_score, 0.4);
        assert_eq!(candidate.sources, vec![CandidateSource::Recency]);
        assert_eq!(candidate.ranking_reasons, vec!["recent".to_string()]);
    }

    #[test]
    fn test_topic_key_defaults_to_general() {
        let mut candidate = CandidatePost::from_row(row(), CandidateSource::Recency, "recent");
        assert_eq!(candidate.topic_key(), "Downtown Infrastructure");

        candidate.location = None;
        assert_eq!(candidate.topic_key(), GENERAL_TOPIC);

        candidate.location = Some(String::new());
        assert_eq!(candidate.topic_key(), GENERAL_TOPIC);
    }

    #[test]
    fn test_best_topic_match_is_case_insensitive() {
        let prefs = UserPreferences {
            topic_affinities: HashMap::from([
                ("infrastructure".to_string(), 0.6),
                ("ROADS".to_string(), 0.9),
                ("parks".to_string(), 1.0),
            ]),
            author_affinities: HashMap::new(),
        };

        let tags = vec!["Roads".to_string()];
        assert_eq!(prefs.best_topic_match(Some("Downtown Infrastructure"), &tags), 0.9);
        assert_eq!(prefs.best_topic_match(Some("Downtown Infrastructure"), &[]), 0.6);
        assert_eq!(prefs.best_topic_match(None, &[]), 0.0);
    }

    #[test]
    fn test_merge_max() {
        let mut a = CandidateFeatures {
            social_proximity: 0.7,
            quality_score: 0.2,
            ..CandidateFeatures::default()
        };
        let b = CandidateFeatures {
            locality_match: 0.5,
            quality_score: 0.6,
            ..CandidateFeatures::default()
        };
        a.merge_max(&b);
        assert_eq!(a.social_proximity, 0.7);
        assert_eq!(a.locality_match, 0.5);
        assert_eq!(a.quality_score, 0.6);
    }
}
