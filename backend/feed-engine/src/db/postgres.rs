use super::{FeedStore, NearbyQuery, SocialQuery};
use crate::error::{AppError, Result};
use crate::models::{
    NearbyPostRow, PostRow, SocialPostRow, StoreStats, TopicScore, UserAuthorAffinity,
    UserTopicAffinity,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db_pool::acquire_with_metrics;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::error;
use uuid::Uuid;

/// PostgreSQL (+ PostGIS) implementation of [`FeedStore`].
pub struct PgFeedStore {
    pool: PgPool,
    service_name: String,
}

impl PgFeedStore {
    pub fn new(pool: PgPool, service_name: impl Into<String>) -> Self {
        Self {
            pool,
            service_name: service_name.into(),
        }
    }

    async fn acquire(&self, read: &'static str) -> Result<PoolConnection<Postgres>> {
        acquire_with_metrics(&self.pool, &self.service_name, read)
            .await
            .map_err(|e| {
                error!(read, "Failed to acquire connection: {}", e);
                AppError::from(e)
            })
    }
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        error!("Failed to {}: {}", context, e);
        AppError::from(e)
    }
}

#[async_trait]
impl FeedStore for PgFeedStore {
    async fn topic_affinities(&self, user_id: Uuid) -> Result<Vec<UserTopicAffinity>> {
        let mut conn = self.acquire("topic_affinities").await?;

        sqlx::query_as::<_, UserTopicAffinity>(
            r#"
            SELECT
                t.name AS topic_name,
                COALESCE(uta.score, 0.0)::FLOAT8 AS score,
                COALESCE(uta.interaction_count, 0)::INT4 AS interaction_count,
                uta.last_interaction_at
            FROM user_topic_affinity uta
            JOIN topics t ON uta.topic_id = t.id
            WHERE uta.user_id = $1
            ORDER BY uta.score DESC NULLS LAST
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("load topic affinities"))
    }

    async fn author_affinities(&self, user_id: Uuid) -> Result<Vec<UserAuthorAffinity>> {
        let mut conn = self.acquire("author_affinities").await?;

        sqlx::query_as::<_, UserAuthorAffinity>(
            r#"
            SELECT
                author_id,
                COALESCE(score, 0.0)::FLOAT8 AS score,
                COALESCE(interaction_count, 0)::INT4 AS interaction_count,
                COALESCE(is_following, false) AS is_following,
                last_interaction_at
            FROM user_author_affinity
            WHERE user_id = $1
            ORDER BY score DESC NULLS LAST
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("load author affinities"))
    }

    async fn social_posts(&self, query: SocialQuery) -> Result<Vec<SocialPostRow>> {
        let mut conn = self.acquire("social_posts").await?;

        sqlx::query_as::<_, SocialPostRow>(
            r#"
            SELECT
                p.id, p.title, p.content, p.user_id AS author_id,
                u.username AS author_username, p.created_at,
                p.latitude::FLOAT8 AS latitude, p.longitude::FLOAT8 AS longitude,
                p.location, p.tags,
                COALESCE(pq.quality_score, 0.1)::FLOAT8 AS quality_score,
                COALESCE(pq.engagement_rate, 0.0)::FLOAT8 AS engagement_rate,
                COALESCE(pq.recency_decay, 1.0)::FLOAT8 AS recency_decay,
                COALESCE(uaa.score, 0.0)::FLOAT8 AS author_affinity,
                COALESCE(uaa.is_following, false) AS is_following
            FROM posts p
            JOIN users u ON p.user_id = u.id
            LEFT JOIN post_quality pq ON p.id = pq.post_id
            JOIN user_author_affinity uaa ON p.user_id = uaa.author_id
            WHERE uaa.user_id = $1
                AND p.created_at >= $2
                AND (uaa.is_following = true OR uaa.score > $3)
            ORDER BY uaa.score DESC NULLS LAST, p.created_at DESC
            LIMIT $4
            "#,
        )
        .bind(query.user_id)
        .bind(query.since)
        .bind(query.min_affinity)
        .bind(query.limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("fetch social candidates"))
    }

    async fn trending_posts(&self, limit: i64) -> Result<Vec<PostRow>> {
        let mut conn = self.acquire("trending_posts").await?;

        sqlx::query_as::<_, PostRow>(
            r#"
            SELECT
                tp.post_id AS id, tp.title, tp.content, tp.author_id,
                u.username AS author_username, tp.post_created_at AS created_at,
                NULL::FLOAT8 AS latitude, NULL::FLOAT8 AS longitude,
                NULL::TEXT AS location, NULL::TEXT[] AS tags,
                COALESCE(tp.quality_score, 0.1)::FLOAT8 AS quality_score,
                COALESCE(tp.engagement_rate, 0.0)::FLOAT8 AS engagement_rate,
                COALESCE(tp.recency_decay, 1.0)::FLOAT8 AS recency_decay
            FROM trending_posts tp
            JOIN users u ON tp.author_id = u.id
            ORDER BY tp.quality_score DESC NULLS LAST
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("fetch trending candidates"))
    }

    async fn nearby_posts(&self, query: NearbyQuery) -> Result<Vec<NearbyPostRow>> {
        let mut conn = self.acquire("nearby_posts").await?;

        sqlx::query_as::<_, NearbyPostRow>(
            r#"
            SELECT
                p.id, p.title, p.content, p.user_id AS author_id,
                u.username AS author_username, p.created_at,
                p.latitude::FLOAT8 AS latitude, p.longitude::FLOAT8 AS longitude,
                p.location, p.tags,
                COALESCE(pq.quality_score, 0.1)::FLOAT8 AS quality_score,
                COALESCE(pq.engagement_rate, 0.0)::FLOAT8 AS engagement_rate,
                COALESCE(pq.recency_decay, 1.0)::FLOAT8 AS recency_decay,
                ST_Distance(
                    ST_SetSRID(ST_MakePoint($2, $1), 4326)::geography,
                    ST_SetSRID(ST_MakePoint(p.longitude, p.latitude), 4326)::geography
                )::FLOAT8 AS distance_meters
            FROM posts p
            JOIN users u ON p.user_id = u.id
            LEFT JOIN post_quality pq ON p.id = pq.post_id
            WHERE p.latitude IS NOT NULL AND p.longitude IS NOT NULL
                AND p.created_at >= $3
                AND ST_DWithin(
                    ST_SetSRID(ST_MakePoint($2, $1), 4326)::geography,
                    ST_SetSRID(ST_MakePoint(p.longitude, p.latitude), 4326)::geography,
                    $4
                )
            ORDER BY distance_meters ASC, pq.quality_score DESC NULLS LAST
            LIMIT $5
            "#,
        )
        .bind(query.origin.latitude)
        .bind(query.origin.longitude)
        .bind(query.since)
        .bind(query.radius_meters)
        .bind(query.limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("fetch locality candidates"))
    }

    async fn recent_posts(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<PostRow>> {
        let mut conn = self.acquire("recent_posts").await?;

        sqlx::query_as::<_, PostRow>(
            r#"
            SELECT
                p.id, p.title, p.content, p.user_id AS author_id,
                u.username AS author_username, p.created_at,
                p.latitude::FLOAT8 AS latitude, p.longitude::FLOAT8 AS longitude,
                p.location, p.tags,
                COALESCE(pq.quality_score, 0.1)::FLOAT8 AS quality_score,
                COALESCE(pq.engagement_rate, 0.0)::FLOAT8 AS engagement_rate,
                COALESCE(pq.recency_decay, 1.0)::FLOAT8 AS recency_decay
            FROM posts p
            JOIN users u ON p.user_id = u.id
            LEFT JOIN post_quality pq ON p.id = pq.post_id
            WHERE p.created_at >= $1
            ORDER BY p.created_at DESC, pq.quality_score DESC NULLS LAST
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("fetch recent posts"))
    }

    async fn stats(&self, user_id: Uuid) -> Result<StoreStats> {
        let mut conn = self.acquire("stats").await?;

        let (
            interactions_24h,
            posts_with_quality_24h,
            topic_affinity_count,
            author_affinity_count,
        ) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM interactions
                    WHERE created_at >= NOW() - INTERVAL '24 hours'),
                (SELECT COUNT(*) FROM post_quality
                    WHERE updated_at >= NOW() - INTERVAL '24 hours'),
                (SELECT COUNT(*) FROM user_topic_affinity WHERE user_id = $1),
                (SELECT COUNT(*) FROM user_author_affinity WHERE user_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error("count recommendation stats"))?;

        let top_topics = sqlx::query_as::<_, TopicScore>(
            r#"
            SELECT t.name AS topic, COALESCE(uta.score, 0.0)::FLOAT8 AS score
            FROM user_topic_affinity uta
            JOIN topics t ON uta.topic_id = t.id
            WHERE uta.user_id = $1
            ORDER BY uta.score DESC NULLS LAST
            LIMIT 5
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("load top topics"))?;

        Ok(StoreStats {
            interactions_24h,
            posts_with_quality_24h,
            topic_affinity_count,
            author_affinity_count,
            top_topics,
        })
    }
}
