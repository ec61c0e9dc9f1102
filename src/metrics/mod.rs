use hashbrown::HashSet;

use crate::io::ItemId;

pub mod evaluation_reporter;
pub mod hitrate;
pub mod ndcg;
pub mod precision;
pub mod recall;

/// Quality of ranked suggestions against the items a user was later seen with.
pub trait RecommendationMetric {
    /// `recommended` is best first; `held_out` holds no duplicates and is never
    /// empty.
    fn add(&mut self, recommended: &[ItemId], held_out: &HashSet<ItemId>);
    fn result(&self) -> f64;
    fn get_name(&self) -> String;
}

/// Running mean of per-user scores.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct MeanScore {
    sum_of_scores: f64,
    qty: usize,
}

impl MeanScore {
    pub(crate) fn push(&mut self, score: f64) {
        self.sum_of_scores += score;
        self.qty += 1;
    }

    pub(crate) fn mean(&self) -> f64 {
        if self.qty > 0 {
            self.sum_of_scores / self.qty as f64
        } else {
            0.0
        }
    }
}

/// Number of the first `length` recommendations found in `held_out`.
pub(crate) fn hits_at(recommended: &[ItemId], held_out: &HashSet<ItemId>, length: usize) -> usize {
    recommended
        .iter()
        .take(length)
        .filter(|item| held_out.contains(*item))
        .count()
}
