use hashbrown::HashMap;

use crate::io::UserId;
use crate::userknn::neighbor_index::Neighbor;

pub mod cooccurrence;
pub mod friend_volume;
pub mod neighbor_index;
pub mod vote_aggregator;

/// Read access to materialised neighbor lists, closest neighbor first.
pub trait NeighborSource {
    /// Users whose neighbor lists were computed, including those left with an
    /// empty list.
    fn query_users(&self) -> Vec<UserId>;

    fn neighbors_of(&self, user: UserId) -> &[Neighbor];

    /// Number of neighbors `user` actually has (at most k).
    fn neighbor_count(&self, user: UserId) -> usize {
        self.neighbors_of(user).len()
    }
}

impl NeighborSource for HashMap<UserId, Vec<Neighbor>> {
    fn query_users(&self) -> Vec<UserId> {
        self.keys().copied().collect()
    }

    fn neighbors_of(&self, user: UserId) -> &[Neighbor] {
        self.get(&user).map(Vec::as_slice).unwrap_or(&[])
    }
}
