use std::time::Instant;

use hashbrown::HashMap;
use itertools::Itertools;
use num_format::{Locale, ToFormattedString};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::io::{ItemId, Membership, UserId};

/// Item lists above this many users get a warning: their pair count alone
/// dominates the build.
const SKEWED_ITEM_WARNING_THRESHOLD: usize = 10_000;

/// Undirected weighted edge between two users, stored with `source < target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: UserId,
    pub target: UserId,
    pub weight: u32,
}

impl Edge {
    /// Canonical edge between `a` and `b`. Self-edges and zero weights have no
    /// meaning in the co-occurrence graph and yield `None`.
    pub fn new(a: UserId, b: UserId, weight: u32) -> Option<Self> {
        if a == b || weight == 0 {
            return None;
        }
        let (source, target) = canonical_pair(a, b);
        Some(Edge {
            source,
            target,
            weight,
        })
    }

    /// The endpoint opposite to `user`, if `user` is an endpoint.
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if user == self.source {
            Some(self.target)
        } else if user == self.target {
            Some(self.source)
        } else {
            None
        }
    }
}

#[inline]
fn canonical_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Number of distinct items per user.
pub type DegreeCounts = HashMap<UserId, u32>;

/// User-user co-occurrence graph: weight(u, v) is the number of distinct items
/// both u and v watch.
#[derive(Debug, Default)]
pub struct CoOccurrenceGraph {
    edge_weights: HashMap<(UserId, UserId), u32>,
    degree_counts: DegreeCounts,
}

impl CoOccurrenceGraph {
    /// Symmetric lookup; `None` when the users share no item.
    pub fn weight(&self, a: UserId, b: UserId) -> Option<u32> {
        if a == b {
            return None;
        }
        self.edge_weights.get(&canonical_pair(a, b)).copied()
    }

    pub fn num_edges(&self) -> usize {
        self.edge_weights.len()
    }

    /// Edges in no particular order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edge_weights
            .iter()
            .map(|(&(source, target), &weight)| Edge {
                source,
                target,
                weight,
            })
    }

    /// Edges ordered by `(source, target)`, for reproducible edge files.
    pub fn sorted_edges(&self) -> Vec<Edge> {
        let mut edges = self.edges().collect_vec();
        edges.sort_unstable_by_key(|edge| (edge.source, edge.target));
        edges
    }

    pub fn degree_counts(&self) -> &DegreeCounts {
        &self.degree_counts
    }

    /// Distinct items watched by `user`, zero for unknown users.
    pub fn item_count(&self, user: UserId) -> u32 {
        self.degree_counts.get(&user).copied().unwrap_or(0)
    }

    /// Drop edges lighter than `min_weight`.
    pub fn retain_min_weight(&mut self, min_weight: u32) {
        if min_weight > 1 {
            self.edge_weights.retain(|_, weight| *weight >= min_weight);
        }
    }
}

/// Accumulates watchers per item, then expands every item's watcher list into
/// pairwise weight increments.
#[derive(Debug, Default)]
pub struct CoOccurrenceBuilder {
    item_to_users: HashMap<ItemId, Vec<UserId>>,
    qty_records: usize,
}

impl CoOccurrenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, user: UserId, item: ItemId) {
        self.item_to_users.entry(item).or_default().push(user);
        self.qty_records += 1;
    }

    pub fn num_items(&self) -> usize {
        self.item_to_users.len()
    }

    /// Consume the accumulated records. Repeated (user, item) records count
    /// once. Cost is quadratic in each item's number of watchers.
    pub fn build(mut self) -> CoOccurrenceGraph {
        let start_time = Instant::now();

        self.item_to_users.par_values_mut().for_each(|users| {
            users.sort_unstable();
            users.dedup();
        });

        let mut degree_counts: DegreeCounts = HashMap::new();
        for users in self.item_to_users.values() {
            for user in users {
                *degree_counts.entry(*user).or_insert(0) += 1;
            }
        }

        let qty_pair_increments: u64 = self
            .item_to_users
            .values()
            .map(|users| {
                let m = users.len() as u64;
                m * m.saturating_sub(1) / 2
            })
            .sum();
        let largest_item = self.item_to_users.values().map(Vec::len).max().unwrap_or(0);
        info!(
            "expanding {} items ({} records) into {} pair increments, largest item has {} watchers",
            self.item_to_users.len().to_formatted_string(&Locale::en),
            self.qty_records.to_formatted_string(&Locale::en),
            qty_pair_increments.to_formatted_string(&Locale::en),
            largest_item.to_formatted_string(&Locale::en),
        );
        if largest_item > SKEWED_ITEM_WARNING_THRESHOLD {
            warn!(
                "item with {} watchers contributes {} pairs on its own",
                largest_item,
                (largest_item as u64 * (largest_item as u64 - 1) / 2)
                    .to_formatted_string(&Locale::en),
            );
        }

        let edge_weights = self
            .item_to_users
            .par_values()
            .filter(|users| users.len() >= 2)
            .fold(HashMap::new, |mut edge_weights, users| {
                // users are sorted, so (users[i], users[j]) with i < j is canonical
                for (i, source) in users.iter().enumerate() {
                    for target in &users[i + 1..] {
                        *edge_weights.entry((*source, *target)).or_insert(0_u32) += 1;
                    }
                }
                edge_weights
            })
            .reduce(HashMap::new, merge_edge_weights);

        info!(
            "built co-occurrence graph with {} edges over {} users in {} ms",
            edge_weights.len().to_formatted_string(&Locale::en),
            degree_counts.len().to_formatted_string(&Locale::en),
            start_time.elapsed().as_millis()
        );

        CoOccurrenceGraph {
            edge_weights,
            degree_counts,
        }
    }
}

impl Extend<Membership> for CoOccurrenceBuilder {
    fn extend<T: IntoIterator<Item = Membership>>(&mut self, iter: T) {
        for (user, item) in iter {
            self.add(user, item);
        }
    }
}

fn merge_edge_weights(
    mut left: HashMap<(UserId, UserId), u32>,
    mut right: HashMap<(UserId, UserId), u32>,
) -> HashMap<(UserId, UserId), u32> {
    if left.len() < right.len() {
        std::mem::swap(&mut left, &mut right);
    }
    for (pair, weight) in right {
        *left.entry(pair).or_insert(0) += weight;
    }
    left
}

/// Build the graph from a membership stream in one call.
pub fn build_graph<I>(memberships: I) -> CoOccurrenceGraph
where
    I: IntoIterator<Item = Membership>,
{
    let mut builder = CoOccurrenceBuilder::new();
    builder.extend(memberships);
    builder.build()
}

#[cfg(test)]
mod cooccurrence_test {
    use super::*;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn should_count_shared_items_per_user_pair() {
        // item A = 100 watched by 1,2,3 and item B = 200 watched by 2,3
        let graph = build_graph(vec![(1, 100), (2, 100), (3, 100), (2, 200), (3, 200)]);

        assert_eq!(3, graph.num_edges());
        assert_eq!(Some(1), graph.weight(1, 2));
        assert_eq!(Some(1), graph.weight(1, 3));
        assert_eq!(Some(2), graph.weight(2, 3));
        assert_eq!(None, graph.weight(2, 2));
    }

    #[test]
    fn should_not_double_count_repeated_records() {
        let graph = build_graph(vec![(1, 100), (2, 100), (1, 100), (2, 100), (2, 100)]);
        assert_eq!(Some(1), graph.weight(1, 2));
        assert_eq!(1, graph.item_count(1));
        assert_eq!(1, graph.item_count(2));
    }

    #[test]
    fn should_ignore_items_with_single_watcher() {
        let graph = build_graph(vec![(1, 100), (2, 200), (3, 300)]);
        assert_eq!(0, graph.num_edges());
        assert_eq!(1, graph.item_count(3));
        assert_eq!(0, graph.item_count(42));
    }

    #[test]
    fn should_produce_choose_two_increments_per_item() {
        let watchers: Vec<Membership> = (0..6).map(|user| (user, 7)).collect();
        let graph = build_graph(watchers);
        assert_eq!(15, graph.num_edges());
        assert!(graph.edges().all(|edge| edge.weight == 1 && edge.source < edge.target));
    }

    #[test]
    fn should_be_symmetric_and_match_brute_force_on_random_data() {
        let mut rng = Pcg64::seed_from_u64(7);
        let memberships: Vec<Membership> = (0..400)
            .map(|_| (rng.gen_range(0..30), rng.gen_range(0..25)))
            .collect();
        let graph = build_graph(memberships.clone());

        for a in 0..30 {
            for b in 0..30 {
                assert_eq!(graph.weight(a, b), graph.weight(b, a));
                if a == b {
                    continue;
                }
                let shared = (0..25)
                    .filter(|item| {
                        memberships.contains(&(a, *item)) && memberships.contains(&(b, *item))
                    })
                    .count() as u32;
                let expected = if shared > 0 { Some(shared) } else { None };
                assert_eq!(expected, graph.weight(a, b));
            }
        }
    }

    #[test]
    fn should_drop_light_edges() {
        let mut graph = build_graph(vec![(1, 100), (2, 100), (3, 100), (2, 200), (3, 200)]);
        graph.retain_min_weight(2);
        assert_eq!(1, graph.num_edges());
        assert_eq!(Some(2), graph.weight(3, 2));
    }

    #[test]
    fn should_sort_edges_canonically() {
        let graph = build_graph(vec![(5, 1), (3, 1), (4, 1)]);
        let pairs: Vec<(UserId, UserId)> = graph
            .sorted_edges()
            .iter()
            .map(|edge| (edge.source, edge.target))
            .collect();
        assert_eq!(vec![(3, 4), (3, 5), (4, 5)], pairs);
    }

    #[test]
    fn edge_should_know_its_other_endpoint() {
        let edge = Edge::new(9, 4, 1).unwrap();
        assert_eq!(Some(9), edge.other(4));
        assert_eq!(Some(4), edge.other(9));
        assert_eq!(None, edge.other(1));
        assert!(Edge::new(3, 3, 1).is_none());
    }
}
