use crate::config::DiversityConfig;
use crate::models::RankedCandidate;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Diversity Layer - per-author and per-topic caps
///
/// Single greedy pass over the ranked list: a candidate is kept only if its
/// author and its topic bucket are both still under their caps. Kept
/// candidates stay in ranked order.
pub struct DiversityLayer {
    max_per_author: usize,
    max_per_topic: usize,
}

impl DiversityLayer {
    pub fn new(max_per_author: usize, max_per_topic: usize) -> Self {
        Self {
            max_per_author,
            max_per_topic,
        }
    }

    pub fn from_config(config: &DiversityConfig) -> Self {
        Self::new(config.max_per_author, config.max_per_topic)
    }

    pub fn filter(&self, ranked: Vec<RankedCandidate>) -> Vec<RankedCandidate> {
        let input_len = ranked.len();
        let mut author_counts: HashMap<Uuid, usize> = HashMap::new();
        let mut topic_counts: HashMap<String, usize> = HashMap::new();
        let mut kept = Vec::with_capacity(input_len);

        for item in ranked {
            let author = item.candidate.author_id;
            let author_count = author_counts.get(&author).copied().unwrap_or(0);
            let topic_count = topic_counts
                .get(item.candidate.topic_key())
                .copied()
                .unwrap_or(0);

            if author_count >= self.max_per_author || topic_count >= self.max_per_topic {
                continue;
            }

            author_counts.insert(author, author_count + 1);
            topic_counts.insert(item.candidate.topic_key().to_string(), topic_count + 1);
            kept.push(item);
        }

        debug!(
            input = input_len,
            kept = kept.len(),
            "Diversity filter applied"
        );

        kept
    }
}
