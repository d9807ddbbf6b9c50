//! Preference loading with an optional per-process TTL cache.

use crate::db::FeedStore;
use crate::error::Result;
use crate::models::UserPreferences;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

struct CachedPreferences {
    loaded_at: Instant,
    preferences: Arc<UserPreferences>,
}

/// User preferences cached for a fixed TTL. Owned by whoever builds the
/// engine; there is no process-global instance.
pub struct PreferenceCache {
    entries: DashMap<Uuid, CachedPreferences>,
    ttl: Duration,
}

impl PreferenceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, user_id: &Uuid) -> Option<Arc<UserPreferences>> {
        let hit = self
            .entries
            .get(user_id)
            .map(|entry| (entry.loaded_at, Arc::clone(&entry.preferences)));

        match hit {
            Some((loaded_at, preferences)) if loaded_at.elapsed() < self.ttl => Some(preferences),
            Some(_) => {
                self.entries.remove(user_id);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, user_id: Uuid, preferences: Arc<UserPreferences>) {
        self.entries.insert(
            user_id,
            CachedPreferences {
                loaded_at: Instant::now(),
                preferences,
            },
        );
    }

    pub fn invalidate(&self, user_id: &Uuid) {
        self.entries.remove(user_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads a user's topic and author affinities.
pub struct PreferenceLoader {
    store: Arc<dyn FeedStore>,
    cache: Option<PreferenceCache>,
}

impl PreferenceLoader {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store, cache: None }
    }

    pub fn with_cache(mut self, cache: PreferenceCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&PreferenceCache> {
        self.cache.as_ref()
    }

    /// Store errors propagate; they are never cached.
    pub async fn load(&self, user_id: Uuid) -> Result<Arc<UserPreferences>> {
        if let Some(preferences) = self.cache.as_ref().and_then(|c| c.get(&user_id)) {
            debug!(user_id = %user_id, "Preference cache hit");
            return Ok(preferences);
        }

        let (topics, authors) = tokio::try_join!(
            self.store.topic_affinities(user_id),
            self.store.author_affinities(user_id)
        )?;

        let preferences = Arc::new(UserPreferences::from_rows(topics, authors));
        debug!(
            user_id = %user_id,
            topics = preferences.topic_affinities.len(),
            authors = preferences.author_affinities.len(),
            "Loaded user preferences"
        );

        if let Some(cache) = &self.cache {
            cache.insert(user_id, Arc::clone(&preferences));
        }

        Ok(preferences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockFeedStore;
    use crate::error::AppError;
    use crate::models::{UserAuthorAffinity, UserTopicAffinity};

    fn topic(name: &str, score: f64) -> UserTopicAffinity {
        UserTopicAffinity {
            topic_name: name.to_string(),
            score,
            interaction_count: 3,
            last_interaction_at: None,
        }
    }

    #[tokio::test]
    async fn test_load_builds_maps() {
        let author = Uuid::new_v4();
        let mut store = MockFeedStore::new();
        store
            .expect_topic_affinities()
            .returning(|_| Ok(vec![topic("transit", 0.7)]));
        store.expect_author_affinities().returning(move |_| {
            Ok(vec![UserAuthorAffinity {
                author_id: author,
                score: 0.9,
                interaction_count: 12,
                is_following: true,
                last_interaction_at: None,
            }])
        });

        let loader = PreferenceLoader::new(Arc::new(store));
        let prefs = loader.load(Uuid::new_v4()).await.unwrap();

        assert_eq!(prefs.topic_affinities.get("transit"), Some(&0.7));
        assert_eq!(prefs.author_score(&author), Some(0.9));
        assert!(prefs.author_affinities[&author].is_following);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut store = MockFeedStore::new();
        store
            .expect_topic_affinities()
            .returning(|_| Err(AppError::Database("connection refused".to_string())));
        store.expect_author_affinities().returning(|_| Ok(vec![]));

        let loader = PreferenceLoader::new(Arc::new(store));
        let result = loader.load(Uuid::new_v4()).await;

        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let mut store = MockFeedStore::new();
        store
            .expect_topic_affinities()
            .times(1)
            .returning(|_| Ok(vec![topic("parks", 0.4)]));
        store
            .expect_author_affinities()
            .times(1)
            .returning(|_| Ok(vec![]));

        let loader = PreferenceLoader::new(Arc::new(store))
            .with_cache(PreferenceCache::new(Duration::from_secs(60)));
        let user = Uuid::new_v4();

        let first = loader.load(user).await.unwrap();
        let second = loader.load(user).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.cache().map(PreferenceCache::len), Some(1));
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let mut store = MockFeedStore::new();
        store
            .expect_topic_affinities()
            .times(2)
            .returning(|_| Ok(vec![]));
        store
            .expect_author_affinities()
            .times(2)
            .returning(|_| Ok(vec![]));

        let loader = PreferenceLoader::new(Arc::new(store))
            .with_cache(PreferenceCache::new(Duration::from_secs(60)));
        let user = Uuid::new_v4();

        loader.load(user).await.unwrap();
        loader.cache().unwrap().invalidate(&user);
        loader.load(user).await.unwrap();
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let cache = PreferenceCache::new(Duration::ZERO);
        let user = Uuid::new_v4();
        cache.insert(user, Arc::new(UserPreferences::default()));

        assert!(cache.get(&user).is_none());
        assert!(cache.is_empty());
    }
}
