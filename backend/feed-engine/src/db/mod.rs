//! Read-only access to posts and the pre-aggregated signal tables.

mod postgres;

pub use postgres::PgFeedStore;

use crate::error::Result;
use crate::models::{
    GeoPoint, NearbyPostRow, PostRow, SocialPostRow, StoreStats, UserAuthorAffinity,
    UserTopicAffinity,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SocialQuery {
    pub user_id: Uuid,
    pub since: DateTime<Utc>,
    /// Unfollowed authors qualify above this affinity score.
    pub min_affinity: f64,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub origin: GeoPoint,
    pub radius_meters: f64,
    pub since: DateTime<Utc>,
    pub limit: i64,
}

/// Data store consumed by the feed pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn topic_affinities(&self, user_id: Uuid) -> Result<Vec<UserTopicAffinity>>;

    async fn author_affinities(&self, user_id: Uuid) -> Result<Vec<UserAuthorAffinity>>;

    /// Posts by followed or high-affinity authors, affinity desc then newest first.
    async fn social_posts(&self, query: SocialQuery) -> Result<Vec<SocialPostRow>>;

    /// Rows of the trending aggregate, quality desc.
    async fn trending_posts(&self, limit: i64) -> Result<Vec<PostRow>>;

    /// Geotagged posts inside the radius, nearest first.
    async fn nearby_posts(&self, query: NearbyQuery) -> Result<Vec<NearbyPostRow>>;

    /// Posts created since `since`, newest first.
    async fn recent_posts(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<PostRow>>;

    async fn stats(&self, user_id: Uuid) -> Result<StoreStats>;
}
