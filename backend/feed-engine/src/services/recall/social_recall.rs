use super::{RecallRequest, RecallStrategy};
use crate::db::{FeedStore, SocialQuery};
use crate::error::Result;
use crate::models::{CandidateFeatures, CandidatePost, CandidateSource};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;

const SOCIAL_WINDOW_DAYS: i64 = 7;

/// Social recall: recent posts from followed or high-affinity authors
pub struct SocialRecallStrategy {
    store: Arc<dyn FeedStore>,
    min_affinity: f64,
}

impl SocialRecallStrategy {
    pub fn new(store: Arc<dyn FeedStore>, min_affinity: f64) -> Self {
        Self {
            store,
            min_affinity,
        }
    }
}

#[async_trait]
impl RecallStrategy for SocialRecallStrategy {
    async fn recall(&self, request: &RecallRequest) -> Result<Vec<CandidatePost>> {
        let rows = self
            .store
            .social_posts(SocialQuery {
                user_id: request.user_id,
                since: Utc::now() - Duration::days(SOCIAL_WINDOW_DAYS),
                min_affinity: self.min_affinity,
                limit: request.fetch_limit(),
            })
            .await?;

        debug!(
            user_id = %request.user_id,
            count = rows.len(),
            "Social recall fetched"
        );

        Ok(rows
            .into_iter()
            .map(|row| {
                let reason = if row.is_following {
                    "followed_author"
                } else {
                    "high_affinity_author"
                };
                let mut candidate =
                    CandidatePost::from_row(row.post, CandidateSource::Social, reason);
                candidate.features = CandidateFeatures {
                    social_proximity: row.author_affinity,
                    ..candidate.features
                }
                .sanitized();
                candidate
            })
            .collect())
    }

    fn source(&self) -> CandidateSource {
        CandidateSource::Social
    }
}
