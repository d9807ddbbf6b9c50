//! Projection of ranked candidates into the delivered feed items.

use crate::models::{PostRecommendation, PostRow, RankedCandidate, RecommendationMetadata};
use std::collections::BTreeMap;

pub const FALLBACK_SOURCE: &str = "recency_fallback";
pub const FALLBACK_REASON: &str = "recency";

pub struct FeedAssembler;

impl FeedAssembler {
    /// Truncate to `limit` and project. The item's `quality_score` carries
    /// the final ranking score.
    pub fn assemble(
        ranked: Vec<RankedCandidate>,
        limit: usize,
        include_metadata: bool,
    ) -> Vec<PostRecommendation> {
        ranked
            .into_iter()
            .take(limit)
            .map(|item| Self::personalized_item(item, include_metadata))
            .collect()
    }

    fn personalized_item(item: RankedCandidate, include_metadata: bool) -> PostRecommendation {
        let RankedCandidate {
            candidate,
            final_score,
            breakdown,
        } = item;

        let metadata = include_metadata.then(|| RecommendationMetadata {
            score: final_score,
            reasons: candidate.ranking_reasons.clone(),
            candidate_source: candidate.candidate_source.as_str().to_string(),
            sources: candidate
                .sources
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            ranking_features: candidate.features.to_map(),
            score_breakdown: Some(breakdown),
        });

        PostRecommendation {
            id: candidate.id,
            title: candidate.title,
            content: Some(candidate.content),
            author_id: candidate.author_id,
            author_username: candidate.author_username,
            created_at: candidate.created_at,
            quality_score: final_score,
            metadata,
        }
    }

    /// Item of the recency fallback feed; scored by stored quality only.
    pub fn fallback_item(row: PostRow, include_metadata: bool) -> PostRecommendation {
        let quality_score = if row.quality_score.is_finite() {
            row.quality_score
        } else {
            0.1
        };

        let metadata = include_metadata.then(|| RecommendationMetadata {
            score: quality_score,
            reasons: vec![FALLBACK_REASON.to_string()],
            candidate_source: FALLBACK_SOURCE.to_string(),
            sources: Vec::new(),
            ranking_features: BTreeMap::from([("recency_decay".to_string(), 1.0)]),
            score_breakdown: None,
        });

        PostRecommendation {
            id: row.id,
            title: row.title,
            content: Some(row.content),
            author_id: row.author_id,
            author_username: row.author_username,
            created_at: row.created_at,
            quality_score,
            metadata,
        }
    }
}
