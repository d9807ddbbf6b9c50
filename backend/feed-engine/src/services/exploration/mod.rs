// ============================================
// Exploration Module
// ============================================
//
// Explore-exploit split of the final feed:
//   exploration_slots  = floor(limit * rate)
//   exploitation_slots = limit - exploration_slots
//
// The top `exploitation_slots` items are kept as ranked. The exploration
// slice is a uniform sample, without replacement, from the remaining tail.
// Randomness is injected so callers can seed it.

use crate::config::ShuffleMode;
use rand::seq::{index, SliceRandom};
use rand::Rng;
use tracing::debug;

pub struct ExplorationSelector {
    rate: f64,
    mode: ShuffleMode,
}

impl ExplorationSelector {
    pub fn new(rate: f64, mode: ShuffleMode) -> Self {
        let rate = if rate.is_finite() {
            rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { rate, mode }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn exploration_slots(&self, limit: usize) -> usize {
        ((limit as f64) * self.rate).floor() as usize
    }

    /// Pick at most `limit` items. With a zero rate this is a plain truncate
    /// and the RNG is never touched.
    pub fn select<T, R>(&self, mut items: Vec<T>, limit: usize, rng: &mut R) -> Vec<T>
    where
        R: Rng + ?Sized,
    {
        if limit == 0 {
            return Vec::new();
        }
        if self.rate <= 0.0 {
            items.truncate(limit);
            return items;
        }

        let exploration_slots = self.exploration_slots(limit);
        let exploitation_slots = limit - exploration_slots;

        if items.len() <= exploitation_slots {
            // No tail to explore
            if self.mode == ShuffleMode::Full {
                items.shuffle(rng);
            }
            return items;
        }

        let tail = items.split_off(exploitation_slots);
        let mut selected = items;

        let sample_size = exploration_slots.min(tail.len());
        let picks = index::sample(rng, tail.len(), sample_size).into_vec();
        let explored = take_indices(tail, &picks);

        debug!(
            exploitation = selected.len(),
            exploration = explored.len(),
            mode = ?self.mode,
            "Exploration applied"
        );

        selected.extend(explored);
        if self.mode == ShuffleMode::Full {
            selected.shuffle(rng);
        }

        selected
    }
}

/// Move the items at `picks` out of `items`, in the order given by `picks`.
fn take_indices<T>(items: Vec<T>, picks: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    picks.iter().filter_map(|&i| slots[i].take()).collect()
}
