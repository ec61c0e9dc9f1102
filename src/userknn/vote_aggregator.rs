use std::time::Instant;

use hashbrown::{HashMap, HashSet};
use tracing::info;

use crate::io::{ItemId, Membership, UserId};
use crate::userknn::NeighborSource;

pub type ScoreMap = HashMap<ItemId, f64>;
pub type UserScores = HashMap<UserId, ScoreMap>;

/// What a neighbor's membership is worth to one of the users who picked it.
#[derive(Debug, Clone, Copy)]
struct Vote {
    helper: UserId,
    amount: f64,
}

/// Propagates neighbors' items onto the score maps of the users that chose
/// them as neighbors, in a single pass over the membership stream.
///
/// A vote from neighbor `n` to helper `h` is worth
/// `1 / (neighbor_count(h) * effective_distance(h, n))`. Votes are strictly
/// positive, so scores only grow as records arrive. Items the helper already
/// knows are not filtered here.
pub struct VoteAggregator {
    voters: HashMap<UserId, Vec<Vote>>,
    seen: HashSet<Membership>,
    scores: UserScores,
    qty_votes: usize,
}

impl VoteAggregator {
    /// Invert the neighbor lists: for every user appearing as somebody's
    /// neighbor, record who considers it a neighbor and with which vote.
    pub fn new<N: NeighborSource + ?Sized>(index: &N) -> Self {
        let mut voters: HashMap<UserId, Vec<Vote>> = HashMap::new();
        let mut scores: UserScores = HashMap::new();

        for helper in index.query_users() {
            scores.insert(helper, HashMap::new());
            let neighbors = index.neighbors_of(helper);
            let qty_neighbors = index.neighbor_count(helper) as f64;
            for neighbor in neighbors {
                let amount = 1.0 / (qty_neighbors * neighbor.effective_distance());
                voters
                    .entry(neighbor.id)
                    .or_default()
                    .push(Vote { helper, amount });
            }
        }

        VoteAggregator {
            voters,
            seen: HashSet::new(),
            scores,
            qty_votes: 0,
        }
    }

    /// Account for `neighbor` watching `item`. Repeated records are ignored.
    pub fn observe(&mut self, neighbor: UserId, item: ItemId) {
        let votes = match self.voters.get(&neighbor) {
            Some(votes) => votes,
            None => return,
        };
        if !self.seen.insert((neighbor, item)) {
            return;
        }
        for vote in votes {
            let helper_scores = self.scores.entry(vote.helper).or_default();
            *helper_scores.entry(item).or_insert(0.0) += vote.amount;
            self.qty_votes += 1;
        }
    }

    /// Score maps of all queried users; users without votes map to an empty
    /// score map.
    pub fn finish(self) -> UserScores {
        info!(
            "propagated {} votes into {} score maps",
            self.qty_votes,
            self.scores.len()
        );
        self.scores
    }
}

impl Extend<Membership> for VoteAggregator {
    fn extend<T: IntoIterator<Item = Membership>>(&mut self, iter: T) {
        for (neighbor, item) in iter {
            self.observe(neighbor, item);
        }
    }
}

/// Candidate item scores for every queried user of `index`.
pub fn suggestions<N, I>(memberships: I, index: &N) -> UserScores
where
    N: NeighborSource + ?Sized,
    I: IntoIterator<Item = Membership>,
{
    let start_time = Instant::now();
    let mut aggregator = VoteAggregator::new(index);
    aggregator.extend(memberships);
    let scores = aggregator.finish();
    info!("vote aggregation: {} ms", start_time.elapsed().as_millis());
    scores
}
