use super::{RecallRequest, RecallStrategy};
use crate::db::FeedStore;
use crate::error::Result;
use crate::models::{CandidatePost, CandidateSource};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Trending recall: reads the pre-aggregated trending view
pub struct TrendingRecallStrategy {
    store: Arc<dyn FeedStore>,
}

impl TrendingRecallStrategy {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecallStrategy for TrendingRecallStrategy {
    async fn recall(&self, request: &RecallRequest) -> Result<Vec<CandidatePost>> {
        let rows = self.store.trending_posts(request.fetch_limit()).await?;

        debug!(count = rows.len(), "Trending recall fetched");

        Ok(rows
            .into_iter()
            .map(|row| CandidatePost::from_row(row, CandidateSource::Trending, "trending"))
            .collect())
    }

    fn source(&self) -> CandidateSource {
        CandidateSource::Trending
    }
}
