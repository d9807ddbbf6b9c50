use super::{QUALITY_WEIGHT, TOPIC_AFFINITY_DISCOUNT};
use crate::config::RankingWeights;
use crate::models::{
    CandidateFeatures, CandidatePost, RankedCandidate, ScoreBreakdown, UserPreferences,
};

/// Ranking Layer - weighted linear score
pub struct RankingLayer {
    weights: RankingWeights,
}

impl Default for RankingLayer {
    fn default() -> Self {
        Self::new(RankingWeights::default())
    }
}

impl RankingLayer {
    pub fn new(weights: RankingWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    /// Score and order candidates. Ties keep their incoming order.
    pub fn rank(
        &self,
        candidates: Vec<CandidatePost>,
        preferences: &UserPreferences,
    ) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .map(|mut candidate| {
                candidate.features.personal_affinity =
                    self.personal_affinity(&candidate, preferences);
                let breakdown = self.breakdown(&candidate.features);
                RankedCandidate {
                    final_score: breakdown.total(),
                    breakdown,
                    candidate,
                }
            })
            .collect();

        // sort_by is stable; total_cmp keeps the ordering total
        ranked.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

        ranked
    }

    /// max(author affinity, discounted best topic match), never negative
    fn personal_affinity(&self, candidate: &CandidatePost, preferences: &UserPreferences) -> f64 {
        let author = preferences
            .author_score(&candidate.author_id)
            .unwrap_or(0.0);
        let topic = TOPIC_AFFINITY_DISCOUNT
            * preferences.best_topic_match(candidate.location.as_deref(), &candidate.tags);

        let affinity = author.max(topic).max(0.0);
        if affinity.is_finite() {
            affinity
        } else {
            0.0
        }
    }

    fn breakdown(&self, features: &CandidateFeatures) -> ScoreBreakdown {
        let w = &self.weights;
        ScoreBreakdown {
            affinity: w.affinity * features.personal_affinity,
            engagement: w.engagement * features.engagement_rate,
            recency: w.recency * features.recency_decay,
            social: w.social * features.social_proximity,
            locality: w.locality * features.locality_match,
            quality: QUALITY_WEIGHT * features.quality_score,
        }
    }
}
