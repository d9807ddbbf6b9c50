//! `PgFeedStore` against a live PostgreSQL.
//!
//! Tables are created as temporaries on a single-connection pool, so they
//! shadow any real schema and vanish with the connection.

use chrono::{Duration, Utc};
use feed_engine::db::{FeedStore, SocialQuery};
use feed_engine::PgFeedStore;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TEMP TABLE users (id UUID PRIMARY KEY, username TEXT NOT NULL)",
    "CREATE TEMP TABLE topics (id UUID PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TEMP TABLE posts (
        id UUID PRIMARY KEY, title TEXT NOT NULL, content TEXT NOT NULL,
        user_id UUID NOT NULL, created_at TIMESTAMPTZ NOT NULL,
        latitude DOUBLE PRECISION, longitude DOUBLE PRECISION,
        location TEXT, tags TEXT[])",
    "CREATE TEMP TABLE post_quality (
        post_id UUID PRIMARY KEY, quality_score DOUBLE PRECISION,
        engagement_rate DOUBLE PRECISION, recency_decay DOUBLE PRECISION)",
    "CREATE TEMP TABLE user_topic_affinity (
        user_id UUID NOT NULL, topic_id UUID NOT NULL, score DOUBLE PRECISION,
        interaction_count INT, last_interaction_at TIMESTAMPTZ)",
    "CREATE TEMP TABLE user_author_affinity (
        user_id UUID NOT NULL, author_id UUID NOT NULL, score DOUBLE PRECISION,
        interaction_count INT, is_following BOOLEAN, last_interaction_at TIMESTAMPTZ)",
];

async fn scratch_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(&url)
        .await
        .expect("connect to test database");
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_null_affinity_scores_read_as_zero() {
    let pool = scratch_pool().await;
    let user = Uuid::new_v4();
    let author = Uuid::new_v4();
    let topic = Uuid::new_v4();
    let post = Uuid::new_v4();

    sqlx::query("INSERT INTO users (id, username) VALUES ($1, 'river')")
        .bind(author)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO topics (id, name) VALUES ($1, 'Parks')")
        .bind(topic)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO posts (id, title, content, user_id, created_at)
         VALUES ($1, 'Clean-up day', 'Bring gloves', $2, $3)",
    )
    .bind(post)
    .bind(author)
    .bind(Utc::now() - Duration::hours(2))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO user_topic_affinity (user_id, topic_id, score) VALUES ($1, $2, NULL)")
        .bind(user)
        .bind(topic)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO user_author_affinity (user_id, author_id, score, is_following)
         VALUES ($1, $2, NULL, true)",
    )
    .bind(user)
    .bind(author)
    .execute(&pool)
    .await
    .unwrap();

    let store = PgFeedStore::new(pool, "feed-engine-test");

    let topics = store.topic_affinities(user).await.unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].score, 0.0);

    let authors = store.author_affinities(user).await.unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].score, 0.0);

    let social = store
        .social_posts(SocialQuery {
            user_id: user,
            since: Utc::now() - Duration::days(7),
            min_affinity: 0.5,
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(social.len(), 1);
    assert_eq!(social[0].post.id, post);
    assert_eq!(social[0].author_affinity, 0.0);
    assert_eq!(social[0].post.quality_score, 0.1);
}
