use hashbrown::HashSet;

use crate::io::ItemId;
use crate::metrics::{MeanScore, RecommendationMetric};

/// Binary-relevance NDCG with the `1 / log2(rank + 1)` discount.
pub struct Ndcg {
    score: MeanScore,
    length: usize,
}

fn discount(index: usize) -> f64 {
    1.0 / ((index + 2) as f64).log2()
}

impl Ndcg {
    pub fn new(length: usize) -> Ndcg {
        Ndcg {
            score: MeanScore::default(),
            length,
        }
    }
}

impl RecommendationMetric for Ndcg {
    fn add(&mut self, recommended: &[ItemId], held_out: &HashSet<ItemId>) {
        let dcg: f64 = recommended
            .iter()
            .take(self.length)
            .enumerate()
            .filter(|(_, item)| held_out.contains(*item))
            .map(|(index, _)| discount(index))
            .sum();
        let ideal: f64 = (0..held_out.len().min(self.length)).map(discount).sum();
        self.score.push(if ideal > 0.0 { dcg / ideal } else { 0.0 });
    }

    fn result(&self) -> f64 {
        self.score.mean()
    }

    fn get_name(&self) -> String {
        format!("Ndcg@{}", self.length)
    }
}
