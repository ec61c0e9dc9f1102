use hashbrown::{HashMap, HashSet};
use tracing::info;

use crate::io::{ItemId, Membership, SuggestionLine, UserId};
use crate::metrics::hitrate::HitRate;
use crate::metrics::ndcg::Ndcg;
use crate::metrics::precision::Precision;
use crate::metrics::recall::Recall;
use crate::metrics::RecommendationMetric;

pub struct EvaluationReporter {
    precision: Precision,
    recall: Recall,
    hitrate: HitRate,
    ndcg: Ndcg,
    qty_evaluated: usize,
    qty_skipped: usize,
}

impl EvaluationReporter {
    pub fn new(length: usize) -> EvaluationReporter {
        EvaluationReporter {
            precision: Precision::new(length),
            recall: Recall::new(length),
            hitrate: HitRate::new(length),
            ndcg: Ndcg::new(length),
            qty_evaluated: 0,
            qty_skipped: 0,
        }
    }

    /// Users with nothing held out are counted as skipped, not scored.
    pub fn add(&mut self, recommended: &[ItemId], held_out: &HashSet<ItemId>) {
        if held_out.is_empty() {
            self.qty_skipped += 1;
            return;
        }
        self.precision.add(recommended, held_out);
        self.recall.add(recommended, held_out);
        self.hitrate.add(recommended, held_out);
        self.ndcg.add(recommended, held_out);
        self.qty_evaluated += 1;
    }

    /// Score every suggestion line against the held-out memberships.
    pub fn evaluate(&mut self, suggestions: &[SuggestionLine], holdout: &[Membership]) {
        let mut held_out: HashMap<UserId, HashSet<ItemId>> = HashMap::new();
        for (user, item) in holdout {
            held_out.entry(*user).or_default().insert(*item);
        }
        let empty = HashSet::new();
        for (user, entries) in suggestions {
            let recommended: Vec<ItemId> = entries.iter().map(|(item, _)| *item).collect();
            self.add(&recommended, held_out.get(user).unwrap_or(&empty));
        }
        info!(
            "evaluated {} users, skipped {} without held-out items",
            self.qty_evaluated, self.qty_skipped
        );
    }

    pub fn qty_evaluated(&self) -> usize {
        self.qty_evaluated
    }

    pub fn result(&self) -> String {
        format!(
            "{:.4},{:.4},{:.4},{:.4}",
            self.precision.result(),
            self.recall.result(),
            self.hitrate.result(),
            self.ndcg.result()
        )
    }

    pub fn get_name(&self) -> String {
        format!(
            "{},{},{},{}",
            self.precision.get_name(),
            self.recall.get_name(),
            self.hitrate.get_name(),
            self.ndcg.get_name()
        )
    }
}
