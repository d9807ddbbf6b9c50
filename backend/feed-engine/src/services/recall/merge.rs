use crate::config::DedupStrategy;
use crate::models::CandidatePost;
use std::collections::HashMap;
use uuid::Uuid;

/// Collapse candidates sharing a post id, preserving first-seen order.
///
/// With [`DedupStrategy::FirstSeen`] later duplicates are dropped. With
/// [`DedupStrategy::Merge`] they are folded into the first occurrence:
/// features take the element-wise max, sources and reasons are unioned in
/// arrival order, and location data missing on the first row is filled in.
pub fn deduplicate(
    candidates: impl IntoIterator<Item = CandidatePost>,
    strategy: DedupStrategy,
) -> Vec<CandidatePost> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut unique: Vec<CandidatePost> = Vec::new();

    for candidate in candidates {
        match index.get(&candidate.id) {
            Some(&pos) => {
                if strategy == DedupStrategy::Merge {
                    merge_into(&mut unique[pos], candidate);
                }
            }
            None => {
                index.insert(candidate.id, unique.len());
                unique.push(candidate);
            }
        }
    }

    unique
}

fn merge_into(target: &mut CandidatePost, other: CandidatePost) {
    target.features.merge_max(&other.features);

    for source in other.sources {
        if !target.sources.contains(&source) {
            target.sources.push(source);
        }
    }
    for reason in other.ranking_reasons {
        if !target.ranking_reasons.contains(&reason) {
            target.ranking_reasons.push(reason);
        }
    }

    // Trending rows carry no geo columns
    if target.location.is_none() {
        target.location = other.location;
    }
    if target.tags.is_empty() {
        target.tags = other.tags;
    }
    if target.latitude.is_none() && target.longitude.is_none() {
        target.latitude = other.latitude;
        target.longitude = other.longitude;
    }
}
