use hashbrown::HashSet;

use crate::io::ItemId;
use crate::metrics::{hits_at, MeanScore, RecommendationMetric};

pub struct Precision {
    score: MeanScore,
    length: usize,
}

impl Precision {
    /// Fraction of the `length` suggestion slots filled with a held-out item.
    /// Short lists are not rewarded: the denominator is always `length`.
    pub fn new(length: usize) -> Precision {
        Precision {
            score: MeanScore::default(),
            length,
        }
    }
}

impl RecommendationMetric for Precision {
    fn add(&mut self, recommended: &[ItemId], held_out: &HashSet<ItemId>) {
        let hits = hits_at(recommended, held_out, self.length);
        self.score.push(hits as f64 / self.length.max(1) as f64);
    }

    fn result(&self) -> f64 {
        self.score.mean()
    }

    fn get_name(&self) -> String {
        format!("Precision@{}", self.length)
    }
}

#[cfg(test)]
mod precision_test {
    use super::*;

    #[test]
    fn should_calculate_precision() {
        let mut metric = Precision::new(10);
        let held_out: HashSet<ItemId> = vec![3, 55, 4].into_iter().collect();
        metric.add(&[1, 2, 3, 4, 5], &held_out);
        assert!((0.2 - metric.result()).abs() < 1e-12);
        assert_eq!("Precision@10", metric.get_name());
    }
}
