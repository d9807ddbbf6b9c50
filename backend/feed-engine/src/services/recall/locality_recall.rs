use super::{RecallRequest, RecallStrategy};
use crate::db::{FeedStore, NearbyQuery};
use crate::error::Result;
use crate::models::{CandidateFeatures, CandidatePost, CandidateSource};
use crate::utils::locality_match;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;

const LOCALITY_WINDOW_DAYS: i64 = 14;

/// Locality recall: geotagged posts within the radius of the request point.
///
/// Produces nothing when the request carries no location.
pub struct LocalityRecallStrategy {
    store: Arc<dyn FeedStore>,
    radius_meters: f64,
}

impl LocalityRecallStrategy {
    pub fn new(store: Arc<dyn FeedStore>, radius_meters: f64) -> Self {
        Self {
            store,
            radius_meters,
        }
    }
}

#[async_trait]
impl RecallStrategy for LocalityRecallStrategy {
    async fn recall(&self, request: &RecallRequest) -> Result<Vec<CandidatePost>> {
        let Some(origin) = request.location else {
            debug!(user_id = %request.user_id, "No location supplied, skipping locality recall");
            return Ok(Vec::new());
        };

        let rows = self
            .store
            .nearby_posts(NearbyQuery {
                origin,
                radius_meters: self.radius_meters,
                since: Utc::now() - Duration::days(LOCALITY_WINDOW_DAYS),
                limit: request.fetch_limit(),
            })
            .await?;

        debug!(
            user_id = %request.user_id,
            count = rows.len(),
            radius_m = self.radius_meters,
            "Locality recall fetched"
        );

        Ok(rows
            .into_iter()
            .map(|row| {
                let reason = format!("nearby_{:.1}km", row.distance_meters / 1000.0);
                let mut candidate =
                    CandidatePost::from_row(row.post, CandidateSource::Locality, reason);
                candidate.features = CandidateFeatures {
                    locality_match: locality_match(row.distance_meters, self.radius_meters),
                    ..candidate.features
                };
                candidate
            })
            .collect())
    }

    fn source(&self) -> CandidateSource {
        CandidateSource::Locality
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockFeedStore;
    use crate::models::{GeoPoint, NearbyPostRow};
    use crate::services::recall::test_support::post_row;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_no_location_skips_store() {
        let mut store = MockFeedStore::new();
        store.expect_nearby_posts().times(0);

        let strategy = LocalityRecallStrategy::new(Arc::new(store), 50_000.0);
        let candidates = strategy
            .recall(&RecallRequest {
                user_id: Uuid::new_v4(),
                limit: 10,
                location: None,
            })
            .await
            .unwrap();

        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_locality_match_and_reason() {
        let origin = GeoPoint::new(40.7, -74.0).unwrap();
        let mut store = MockFeedStore::new();
        store
            .expect_nearby_posts()
            .withf(move |q| q.origin == origin && q.radius_meters == 50_000.0)
            .returning(|_| {
                Ok(vec![NearbyPostRow {
                    post: post_row(Uuid::new_v4(), Uuid::new_v4()),
                    distance_meters: 10_000.0,
                }])
            });

        let strategy = LocalityRecallStrategy::new(Arc::new(store), 50_000.0);
        let candidates = strategy
            .recall(&RecallRequest {
                user_id: Uuid::new_v4(),
                limit: 10,
                location: Some(origin),
            })
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].features.locality_match - 0.8).abs() < 1e-12);
        assert_eq!(candidates[0].ranking_reasons, vec!["nearby_10.0km"]);
        assert_eq!(candidates[0].candidate_source, CandidateSource::Locality);
    }
}
