use super::{RecallRequest, RecallStrategy};
use crate::db::FeedStore;
use crate::error::Result;
use crate::models::{CandidatePost, CandidateSource};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;

const RECENCY_WINDOW_DAYS: i64 = 30;

/// Recency recall: newest posts of the last month
pub struct RecencyRecallStrategy {
    store: Arc<dyn FeedStore>,
}

impl RecencyRecallStrategy {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecallStrategy for RecencyRecallStrategy {
    async fn recall(&self, request: &RecallRequest) -> Result<Vec<CandidatePost>> {
        let since = Utc::now() - Duration::days(RECENCY_WINDOW_DAYS);
        let rows = self.store.recent_posts(since, request.fetch_limit()).await?;

        debug!(count = rows.len(), "Recency recall fetched");

        Ok(rows
            .into_iter()
            .map(|row| CandidatePost::from_row(row, CandidateSource::Recency, "recent"))
            .collect())
    }

    fn source(&self) -> CandidateSource {
        CandidateSource::Recency
    }
}
