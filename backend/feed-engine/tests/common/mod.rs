//! In-memory `FeedStore` used to drive the whole engine in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use feed_engine::db::{FeedStore, NearbyQuery, SocialQuery};
use feed_engine::models::{
    GeoPoint, NearbyPostRow, PostRow, SocialPostRow, StoreStats, TopicScore, UserAuthorAffinity,
    UserTopicAffinity,
};
use feed_engine::{AppError, Result};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    pub posts: Vec<PostRow>,
    pub trending: HashSet<Uuid>,
    pub topic_affinities: HashMap<Uuid, Vec<UserTopicAffinity>>,
    pub author_affinities: HashMap<Uuid, Vec<UserAuthorAffinity>>,
    pub fail_preferences: bool,
    pub fail_social: bool,
    pub fail_trending: bool,
    pub fail_nearby: bool,
    pub fail_recent: bool,
}

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Great-circle distance, standing in for PostGIS `ST_Distance`.
pub fn haversine_distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

fn injected(operation: &str) -> AppError {
    AppError::Database(format!("injected failure: {}", operation))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_post(&mut self, post: PostRow) -> Uuid {
        let id = post.id;
        self.posts.push(post);
        id
    }

    pub fn follow(&mut self, user_id: Uuid, author_id: Uuid, score: f64) {
        self.author_affinities
            .entry(user_id)
            .or_default()
            .push(UserAuthorAffinity {
                author_id,
                score,
                interaction_count: 5,
                is_following: true,
                last_interaction_at: Some(Utc::now()),
            });
    }

    pub fn add_topic(&mut self, user_id: Uuid, topic: &str, score: f64) {
        self.topic_affinities
            .entry(user_id)
            .or_default()
            .push(UserTopicAffinity {
                topic_name: topic.to_string(),
                score,
                interaction_count: 3,
                last_interaction_at: Some(Utc::now()),
            });
    }

    pub fn fail_all_sources(&mut self) {
        self.fail_social = true;
        self.fail_trending = true;
        self.fail_nearby = true;
        self.fail_recent = true;
    }

    fn recent_since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &PostRow> {
        self.posts.iter().filter(move |p| p.created_at >= since)
    }
}

fn by_quality_desc(a: &PostRow, b: &PostRow) -> std::cmp::Ordering {
    b.quality_score.total_cmp(&a.quality_score)
}

#[async_trait]
impl FeedStore for InMemoryStore {
    async fn topic_affinities(&self, user_id: Uuid) -> Result<Vec<UserTopicAffinity>> {
        if self.fail_preferences {
            return Err(injected("topic_affinities"));
        }
        Ok(self
            .topic_affinities
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn author_affinities(&self, user_id: Uuid) -> Result<Vec<UserAuthorAffinity>> {
        if self.fail_preferences {
            return Err(injected("author_affinities"));
        }
        Ok(self
            .author_affinities
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn social_posts(&self, query: SocialQuery) -> Result<Vec<SocialPostRow>> {
        if self.fail_social {
            return Err(injected("social_posts"));
        }
        let affinities = self
            .author_affinities
            .get(&query.user_id)
            .cloned()
            .unwrap_or_default();

        let mut rows: Vec<SocialPostRow> = self
            .recent_since(query.since)
            .filter_map(|post| {
                affinities
                    .iter()
                    .find(|a| {
                        a.author_id == post.author_id
                            && (a.is_following || a.score > query.min_affinity)
                    })
                    .map(|a| SocialPostRow {
                        post: post.clone(),
                        author_affinity: a.score,
                        is_following: a.is_following,
                    })
            })
            .collect();

        rows.sort_by(|a, b| {
            b.author_affinity
                .total_cmp(&a.author_affinity)
                .then(b.post.created_at.cmp(&a.post.created_at))
        });
        rows.truncate(query.limit as usize);
        Ok(rows)
    }

    async fn trending_posts(&self, limit: i64) -> Result<Vec<PostRow>> {
        if self.fail_trending {
            return Err(injected("trending_posts"));
        }
        let mut rows: Vec<PostRow> = self
            .posts
            .iter()
            .filter(|p| self.trending.contains(&p.id))
            .map(|p| PostRow {
                latitude: None,
                longitude: None,
                location: None,
                tags: None,
                ..p.clone()
            })
            .collect();
        rows.sort_by(by_quality_desc);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn nearby_posts(&self, query: NearbyQuery) -> Result<Vec<NearbyPostRow>> {
        if self.fail_nearby {
            return Err(injected("nearby_posts"));
        }
        let mut rows: Vec<NearbyPostRow> = self
            .recent_since(query.since)
            .filter_map(|post| {
                let point = GeoPoint::new(post.latitude?, post.longitude?).ok()?;
                let distance = haversine_distance_meters(query.origin, point);
                (distance <= query.radius_meters).then(|| NearbyPostRow {
                    post: post.clone(),
                    distance_meters: distance,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then(by_quality_desc(&a.post, &b.post))
        });
        rows.truncate(query.limit as usize);
        Ok(rows)
    }

    async fn recent_posts(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<PostRow>> {
        if self.fail_recent {
            return Err(injected("recent_posts"));
        }
        let mut rows: Vec<PostRow> = self.recent_since(since).cloned().collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(by_quality_desc(a, b))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn stats(&self, user_id: Uuid) -> Result<StoreStats> {
        let topics = self.topic_affinities.get(&user_id).cloned().unwrap_or_default();
        let mut top_topics: Vec<TopicScore> = topics
            .iter()
            .map(|t| TopicScore {
                topic: t.topic_name.clone(),
                score: t.score,
            })
            .collect();
        top_topics.sort_by(|a, b| b.score.total_cmp(&a.score));
        top_topics.truncate(5);

        Ok(StoreStats {
            interactions_24h: 0,
            posts_with_quality_24h: self.posts.len() as i64,
            topic_affinity_count: topics.len() as i64,
            author_affinity_count: self
                .author_affinities
                .get(&user_id)
                .map_or(0, |a| a.len() as i64),
            top_topics,
        })
    }
}

/// A post by `author_id`, `hours_ago` hours old.
pub fn post(author_id: Uuid, hours_ago: i64, quality: f64) -> PostRow {
    let id = Uuid::new_v4();
    PostRow {
        id,
        title: format!("post {}", id),
        content: "Community update".to_string(),
        author_id,
        author_username: format!("user-{}", &author_id.to_string()[..8]),
        created_at: Utc::now() - Duration::hours(hours_ago),
        latitude: None,
        longitude: None,
        location: None,
        tags: None,
        quality_score: quality,
        engagement_rate: 0.05,
        recency_decay: 0.9,
    }
}

pub fn post_at(author_id: Uuid, hours_ago: i64, quality: f64, location: &str) -> PostRow {
    PostRow {
        location: Some(location.to_string()),
        ..post(author_id, hours_ago, quality)
    }
}

/// A store with `authors` authors each writing `per_author` posts spread over
/// a few topics and a few trending picks.
pub fn busy_store(authors: usize, per_author: usize) -> InMemoryStore {
    let topics = ["Downtown", "Harbor", "Parks", "Transit", "Schools"];
    let mut store = InMemoryStore::new();
    for a in 0..authors {
        let author = Uuid::new_v4();
        for p in 0..per_author {
            let quality = 0.2 + ((a * 7 + p * 3) % 10) as f64 / 20.0;
            let topic = topics[(a + p) % topics.len()];
            let id = store.add_post(post_at(author, (a + p) as i64 + 1, quality, topic));
            if (a + p) % 4 == 0 {
                store.trending.insert(id);
            }
        }
    }
    store
}
