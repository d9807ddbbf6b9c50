/// Ranking Module
///
/// Linear, weighted scoring of recalled candidates against the user's
/// preferences. Weights come from configuration; the quality term has a
/// fixed weight.
///
/// # Workflow
/// 1. Derive `personal_affinity` from author and topic affinities
/// 2. Compute the weighted score and its per-feature breakdown
/// 3. Stable sort, highest score first
pub mod weighted;

pub use weighted::RankingLayer;

/// Weight of the stored post quality score in the final score.
pub const QUALITY_WEIGHT: f64 = 0.1;

/// Topic matches count for less than a direct author affinity.
pub const TOPIC_AFFINITY_DISCOUNT: f64 = 0.8;
