use hashbrown::HashSet;

use crate::io::ItemId;
use crate::metrics::{hits_at, MeanScore, RecommendationMetric};

pub struct HitRate {
    score: MeanScore,
    length: usize,
}

impl HitRate {
    pub fn new(length: usize) -> HitRate {
        HitRate {
            score: MeanScore::default(),
            length,
        }
    }
}

impl RecommendationMetric for HitRate {
    fn add(&mut self, recommended: &[ItemId], held_out: &HashSet<ItemId>) {
        let hit = hits_at(recommended, held_out, self.length) > 0;
        self.score.push(if hit { 1.0 } else { 0.0 });
    }

    fn result(&self) -> f64 {
        self.score.mean()
    }

    fn get_name(&self) -> String {
        format!("HitRate@{}", self.length)
    }
}
