mod locality_recall;
mod merge;
mod recency_recall;
mod social_recall;
mod trending_recall;

use crate::config::{DedupStrategy, FeedSettings};
use crate::db::FeedStore;
use crate::error::Result;
use crate::models::{CandidatePost, CandidateSource, GeoPoint, RecallStats};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use locality_recall::LocalityRecallStrategy;
pub use merge::deduplicate;
pub use recency_recall::RecencyRecallStrategy;
pub use social_recall::SocialRecallStrategy;
pub use trending_recall::TrendingRecallStrategy;

/// Each source over-fetches so diversity capping still leaves enough posts.
pub const CANDIDATE_MULTIPLIER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecallRequest {
    pub user_id: Uuid,
    pub limit: usize,
    pub location: Option<GeoPoint>,
}

impl RecallRequest {
    /// Rows each source asks the store for, saturating at `i64::MAX`.
    pub fn fetch_limit(&self) -> i64 {
        i64::try_from(self.limit.saturating_mul(CANDIDATE_MULTIPLIER)).unwrap_or(i64::MAX)
    }
}

/// A candidate generator: one slice of the store under a fixed policy.
#[async_trait]
pub trait RecallStrategy: Send + Sync {
    async fn recall(&self, request: &RecallRequest) -> Result<Vec<CandidatePost>>;
    fn source(&self) -> CandidateSource;
}

/// Recall layer: runs every enabled source concurrently and merges the
/// results in fixed source order.
pub struct RecallLayer {
    strategies: Vec<Arc<dyn RecallStrategy>>,
    timeout: Duration,
    dedup: DedupStrategy,
}

impl RecallLayer {
    pub fn new(store: Arc<dyn FeedStore>, settings: &FeedSettings) -> Self {
        let mut strategies: Vec<Arc<dyn RecallStrategy>> = Vec::new();

        if settings.sources.social {
            strategies.push(Arc::new(SocialRecallStrategy::new(
                Arc::clone(&store),
                settings.social_min_affinity,
            )));
        }
        if settings.sources.trending {
            strategies.push(Arc::new(TrendingRecallStrategy::new(Arc::clone(&store))));
        }
        if settings.sources.locality {
            strategies.push(Arc::new(LocalityRecallStrategy::new(
                Arc::clone(&store),
                settings.max_locality_radius_meters,
            )));
        }
        if settings.sources.recency {
            strategies.push(Arc::new(RecencyRecallStrategy::new(store)));
        }

        Self::from_strategies(
            strategies,
            Duration::from_millis(settings.generator_timeout_ms),
            settings.dedup_strategy,
        )
    }

    /// Strategies are reordered into merge order (social, trending,
    /// locality, recency) whatever order they are given in.
    pub fn from_strategies(
        mut strategies: Vec<Arc<dyn RecallStrategy>>,
        timeout: Duration,
        dedup: DedupStrategy,
    ) -> Self {
        strategies.sort_by_key(|s| s.source());
        Self {
            strategies,
            timeout,
            dedup,
        }
    }

    pub fn sources(&self) -> Vec<CandidateSource> {
        self.strategies.iter().map(|s| s.source()).collect()
    }

    /// Never fails: a source that errors or exceeds its deadline contributes
    /// nothing and is reported in `RecallStats::failed_sources`.
    pub async fn recall_candidates(
        &self,
        request: &RecallRequest,
    ) -> (Vec<CandidatePost>, RecallStats) {
        let fetches = self.strategies.iter().map(|strategy| async move {
            let outcome = tokio::time::timeout(self.timeout, strategy.recall(request)).await;
            (strategy.source(), outcome)
        });

        // join_all yields results in input order, not completion order
        let outcomes = join_all(fetches).await;

        let mut stats = RecallStats::default();
        let mut batches = Vec::with_capacity(outcomes.len());

        for (source, outcome) in outcomes {
            match outcome {
                Ok(Ok(candidates)) => {
                    debug!(
                        source = %source,
                        count = candidates.len(),
                        "Candidate source returned"
                    );
                    stats.record(source, candidates.len());
                    batches.push(candidates);
                }
                Ok(Err(e)) => {
                    warn!(
                        source = %source,
                        user_id = %request.user_id,
                        error = %e,
                        "Candidate source failed, skipping"
                    );
                    stats.failed_sources.push(source);
                }
                Err(_) => {
                    warn!(
                        source = %source,
                        user_id = %request.user_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Candidate source timed out, skipping"
                    );
                    stats.failed_sources.push(source);
                }
            }
        }

        let unique = deduplicate(batches.into_iter().flatten(), self.dedup);
        stats.unique_candidates = unique.len();

        info!(
            user_id = %request.user_id,
            social = stats.social_count,
            trending = stats.trending_count,
            locality = stats.locality_count,
            recency = stats.recency_count,
            failed = stats.failed_sources.len(),
            total = stats.total_candidates,
            unique = stats.unique_candidates,
            "Recall completed"
        );

        (unique, stats)
    }
}
