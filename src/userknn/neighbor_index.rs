use std::cmp::Ordering;
use std::str::FromStr;
use std::time::Instant;

use hashbrown::HashMap;
use tracing::info;

use crate::error::UnknownVariant;
use crate::io::UserId;
use crate::rank::BoundedTopK;
use crate::userknn::cooccurrence::{CoOccurrenceGraph, DegreeCounts, Edge};
use crate::userknn::NeighborSource;

/// Stand-in for `sqrt(-distance)` when the distance is (numerically) zero, so
/// that vote dampening never divides by zero.
pub const ZERO_DISTANCE_DAMPENING: f64 = 1e-3;

/// How a raw co-occurrence count is turned into a ranking weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightNormalization {
    /// The shared-item count itself.
    Raw,
    /// Shared items divided by `sqrt(items(u) * items(v))`.
    Cosine,
}

impl Default for WeightNormalization {
    fn default() -> Self {
        WeightNormalization::Raw
    }
}

impl FromStr for WeightNormalization {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(WeightNormalization::Raw),
            "cosine" => Ok(WeightNormalization::Cosine),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A neighbor of some user, with the ranking weight of the connecting edge.
///
/// Ordered like [`crate::rank::ItemScore`]: a closer neighbor (higher weight,
/// or equal weight and smaller id) compares as `Less`.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Neighbor {
    pub id: UserId,
    pub weight: f64,
}

impl Neighbor {
    pub fn new(id: UserId, weight: f64) -> Self {
        Neighbor { id, weight }
    }

    /// Smaller is closer.
    pub fn distance(&self) -> f64 {
        -self.weight
    }

    pub fn effective_distance(&self) -> f64 {
        effective_distance(self.distance())
    }
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.weight.partial_cmp(&self.weight) {
            Some(Ordering::Equal) | None => self.id.cmp(&other.id),
            Some(ordering) => ordering,
        }
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `sqrt(-distance)`, or [`ZERO_DISTANCE_DAMPENING`] when that is zero,
/// negative or not finite.
pub fn effective_distance(distance: f64) -> f64 {
    let magnitude = -distance;
    if magnitude.is_finite() && magnitude > f64::EPSILON {
        magnitude.sqrt()
    } else {
        ZERO_DISTANCE_DAMPENING
    }
}

fn ranking_weight(edge: &Edge, degree_counts: &DegreeCounts, normalization: WeightNormalization) -> f64 {
    match normalization {
        WeightNormalization::Raw => edge.weight as f64,
        WeightNormalization::Cosine => {
            let source_items = degree_counts.get(&edge.source).copied().unwrap_or(1).max(1);
            let target_items = degree_counts.get(&edge.target).copied().unwrap_or(1).max(1);
            edge.weight as f64 / ((source_items as f64) * (target_items as f64)).sqrt()
        }
    }
}

/// Streams edges into one bounded heap per queried user. Edges touching no
/// queried user are dropped on arrival.
pub struct NeighborIndexBuilder {
    k: usize,
    normalization: WeightNormalization,
    heaps: HashMap<UserId, BoundedTopK<Neighbor>>,
    qty_edges_seen: usize,
}

impl NeighborIndexBuilder {
    pub fn new<I>(query_users: I, k: usize, normalization: WeightNormalization) -> Self
    where
        I: IntoIterator<Item = UserId>,
    {
        let heaps = query_users
            .into_iter()
            .map(|user| (user, BoundedTopK::new(k)))
            .collect();
        NeighborIndexBuilder {
            k,
            normalization,
            heaps,
            qty_edges_seen: 0,
        }
    }

    pub fn offer(&mut self, edge: Edge, degree_counts: &DegreeCounts) {
        self.qty_edges_seen += 1;
        let weight = ranking_weight(&edge, degree_counts, self.normalization);
        if let Some(heap) = self.heaps.get_mut(&edge.source) {
            heap.offer(Neighbor::new(edge.target, weight));
        }
        if let Some(heap) = self.heaps.get_mut(&edge.target) {
            heap.offer(Neighbor::new(edge.source, weight));
        }
    }

    pub fn finish(self) -> NeighborIndex {
        let neighbors: HashMap<UserId, Vec<Neighbor>> = self
            .heaps
            .into_iter()
            .map(|(user, heap)| (user, heap.into_sorted_vec()))
            .collect();
        info!(
            "selected up to {} neighbors for {} users from {} edges",
            self.k,
            neighbors.len(),
            self.qty_edges_seen
        );
        NeighborIndex { neighbors }
    }
}

/// Top-k neighbor lists of the queried users, closest first.
#[derive(Debug, Default)]
pub struct NeighborIndex {
    neighbors: HashMap<UserId, Vec<Neighbor>>,
}

impl NeighborIndex {
    pub fn from_graph<I>(
        graph: &CoOccurrenceGraph,
        query_users: I,
        k: usize,
        normalization: WeightNormalization,
    ) -> Self
    where
        I: IntoIterator<Item = UserId>,
    {
        Self::from_edges(graph.edges(), graph.degree_counts(), query_users, k, normalization)
    }

    /// Build from an edge stream, e.g. an edge file produced by an earlier run.
    pub fn from_edges<E, I>(
        edges: E,
        degree_counts: &DegreeCounts,
        query_users: I,
        k: usize,
        normalization: WeightNormalization,
    ) -> Self
    where
        E: IntoIterator<Item = Edge>,
        I: IntoIterator<Item = UserId>,
    {
        let start_time = Instant::now();
        let mut builder = NeighborIndexBuilder::new(query_users, k, normalization);
        for edge in edges {
            builder.offer(edge, degree_counts);
        }
        let index = builder.finish();
        info!("neighbor index: {} ms", start_time.elapsed().as_millis());
        index
    }

    /// Closest first; empty for users without edges or outside the query set.
    pub fn neighbors(&self, user: UserId) -> &[Neighbor] {
        self.neighbors.get(&user).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

impl NeighborSource for NeighborIndex {
    fn query_users(&self) -> Vec<UserId> {
        self.neighbors.keys().copied().collect()
    }

    fn neighbors_of(&self, user: UserId) -> &[Neighbor] {
        self.neighbors(user)
    }
}
