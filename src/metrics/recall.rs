use hashbrown::HashSet;

use crate::io::ItemId;
use crate::metrics::{hits_at, MeanScore, RecommendationMetric};

/// Fraction of a user's held-out items found among the first `length`
/// suggestions.
pub struct Recall {
    score: MeanScore,
    length: usize,
}

impl Recall {
    pub fn new(length: usize) -> Recall {
        Recall {
            score: MeanScore::default(),
            length,
        }
    }
}

impl RecommendationMetric for Recall {
    fn add(&mut self, recommended: &[ItemId], held_out: &HashSet<ItemId>) {
        if held_out.is_empty() {
            return;
        }
        let hits = hits_at(recommended, held_out, self.length);
        self.score.push(hits as f64 / held_out.len() as f64);
    }

    fn result(&self) -> f64 {
        self.score.mean()
    }

    fn get_name(&self) -> String {
        format!("Recall@{}", self.length)
    }
}
