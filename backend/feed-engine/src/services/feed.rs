//! Feed engine: preferences, recall, ranking, diversity and exploration
//! composed into one request, with a recency fallback on any failure.

use crate::config::FeedSettings;
use crate::db::FeedStore;
use crate::error::Result;
use crate::models::{
    FeedRequest, FeedResponse, ImpressionSampler, PostRecommendation, RecommendationStats,
    StatsConfig,
};
use crate::services::assembler::FeedAssembler;
use crate::services::diversity::DiversityLayer;
use crate::services::exploration::ExplorationSelector;
use crate::services::preferences::{PreferenceCache, PreferenceLoader};
use crate::services::ranking::RankingLayer;
use crate::services::recall::{RecallLayer, RecallRequest};
use chrono::Utc;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const MIN_PAGE_LIMIT: usize = 1;
pub const MAX_PAGE_LIMIT: usize = 100;
/// Extra items generated per page to detect whether another page exists.
pub const PAGE_LOOKAHEAD: usize = 5;

const FALLBACK_WINDOW_DAYS: i64 = 30;

pub struct FeedEngine {
    store: Arc<dyn FeedStore>,
    settings: FeedSettings,
    preferences: PreferenceLoader,
    recall: RecallLayer,
    ranking: RankingLayer,
    diversity: DiversityLayer,
    exploration: ExplorationSelector,
}

impl FeedEngine {
    pub fn new(store: Arc<dyn FeedStore>, settings: FeedSettings) -> Self {
        let mut preferences = PreferenceLoader::new(Arc::clone(&store));
        if settings.preference_cache_ttl_seconds > 0 {
            preferences = preferences.with_cache(PreferenceCache::new(Duration::from_secs(
                settings.preference_cache_ttl_seconds,
            )));
        }

        Self {
            recall: RecallLayer::new(Arc::clone(&store), &settings),
            ranking: RankingLayer::new(settings.weights),
            diversity: DiversityLayer::from_config(&settings.diversity),
            exploration: ExplorationSelector::new(
                settings.exploration_rate,
                settings.exploration_shuffle,
            ),
            preferences,
            store,
            settings,
        }
    }

    /// Replace the generator set, e.g. with custom sources.
    pub fn with_recall_layer(mut self, recall: RecallLayer) -> Self {
        self.recall = recall;
        self
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn preference_loader(&self) -> &PreferenceLoader {
        &self.preferences
    }

    pub fn impression_sampler(&self) -> ImpressionSampler {
        ImpressionSampler::new(self.settings.impression_sample_rate)
    }

    /// Ordered feed for one user. Never fails: any error or panic in the
    /// personalized path degrades to the recency feed.
    pub async fn generate_feed(&self, request: &FeedRequest) -> Vec<PostRecommendation> {
        if request.limit == 0 {
            return Vec::new();
        }

        if !self.settings.enabled {
            debug!(user_id = %request.user_id, "Personalization disabled, serving recency feed");
            return self.recency_fallback(request).await;
        }

        let outcome = AssertUnwindSafe(self.personalized_feed(request))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(posts)) => posts,
            Ok(Err(e)) => {
                warn!(
                    user_id = %request.user_id,
                    error = %e,
                    "Personalized feed failed, falling back to recency feed"
                );
                self.recency_fallback(request).await
            }
            Err(panic) => {
                error!(
                    user_id = %request.user_id,
                    panic = panic_message(panic.as_ref()),
                    "Personalized feed panicked, falling back to recency feed"
                );
                self.recency_fallback(request).await
            }
        }
    }

    async fn personalized_feed(&self, request: &FeedRequest) -> Result<Vec<PostRecommendation>> {
        let started = Instant::now();

        let preferences = self.preferences.load(request.user_id).await?;

        let recall_request = RecallRequest {
            user_id: request.user_id,
            limit: request.limit,
            location: request.location,
        };
        let (candidates, recall_stats) = self.recall.recall_candidates(&recall_request).await;
        let unique_count = candidates.len();

        let ranked = self.ranking.rank(candidates, &preferences);
        let diversified = self.diversity.filter(ranked);
        let diversified_count = diversified.len();

        let mut rng = self.request_rng();
        let selected = self.exploration.select(diversified, request.limit, &mut rng);
        let posts = FeedAssembler::assemble(selected, request.limit, request.include_metadata);

        info!(
            user_id = %request.user_id,
            surface = %request.surface,
            limit = request.limit,
            has_location = request.location.is_some(),
            candidates = recall_stats.total_candidates,
            unique = unique_count,
            failed_sources = recall_stats.failed_sources.len(),
            diversified = diversified_count,
            returned = posts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated personalized feed"
        );

        Ok(posts)
    }

    fn request_rng(&self) -> StdRng {
        match self.settings.exploration_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Newest posts of the last month. Returns an empty list when even this
    /// query fails.
    async fn recency_fallback(&self, request: &FeedRequest) -> Vec<PostRecommendation> {
        let since = Utc::now() - chrono::Duration::days(FALLBACK_WINDOW_DAYS);
        let limit = i64::try_from(request.limit).unwrap_or(i64::MAX);
        let fetch = AssertUnwindSafe(async { self.store.recent_posts(since, limit).await })
            .catch_unwind()
            .await;

        match fetch {
            Ok(Ok(rows)) => {
                let posts: Vec<PostRecommendation> = rows
                    .into_iter()
                    .take(request.limit)
                    .map(|row| FeedAssembler::fallback_item(row, request.include_metadata))
                    .collect();
                info!(
                    user_id = %request.user_id,
                    surface = %request.surface,
                    returned = posts.len(),
                    "Served recency fallback feed"
                );
                posts
            }
            Ok(Err(e)) => {
                error!(
                    user_id = %request.user_id,
                    error = %e,
                    "Recency fallback failed, returning empty feed"
                );
                Vec::new()
            }
            Err(panic) => {
                error!(
                    user_id = %request.user_id,
                    panic = panic_message(panic.as_ref()),
                    "Recency fallback panicked, returning empty feed"
                );
                Vec::new()
            }
        }
    }

    /// One page of the feed with a look-ahead to compute `has_more`.
    pub async fn get_feed_page(&self, request: &FeedRequest) -> FeedResponse {
        let started = Instant::now();
        let limit = request.limit.clamp(MIN_PAGE_LIMIT, MAX_PAGE_LIMIT);

        let lookahead = FeedRequest {
            limit: limit + PAGE_LOOKAHEAD,
            ..request.clone()
        };
        let mut posts = self.generate_feed(&lookahead).await;

        let has_more = posts.len() > limit;
        posts.truncate(limit);

        let next_cursor = if has_more {
            posts.last().map(|p| p.created_at.to_rfc3339())
        } else {
            None
        };

        FeedResponse {
            total_count: posts.len(),
            posts,
            next_cursor,
            has_more,
            processing_time_ms: started.elapsed().as_millis() as u64,
            surface: request.surface.clone(),
        }
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<RecommendationStats> {
        let stats = self.store.stats(user_id).await?;

        Ok(RecommendationStats {
            user_id,
            total_interactions_24h: stats.interactions_24h,
            total_posts_with_quality: stats.posts_with_quality_24h,
            user_topic_affinities: stats.topic_affinity_count,
            user_author_affinities: stats.author_affinity_count,
            top_topics: stats.top_topics,
            config: StatsConfig {
                enabled: self.settings.enabled,
                exploration_rate: self.settings.exploration_rate,
                preference_cache_ttl_seconds: self.settings.preference_cache_ttl_seconds,
            },
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
