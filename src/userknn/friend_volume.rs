use hashbrown::{HashMap, HashSet};
use tracing::info;

use crate::io::{ItemId, UserId};
use crate::membership::UserItems;
use crate::rank::{top_n, ItemScore};
use crate::userknn::cooccurrence::Edge;

/// Every edge incident to a queried user, not just the k closest.
#[derive(Debug, Default)]
pub struct FriendVolume {
    friends: HashMap<UserId, Vec<(UserId, u32)>>,
}

impl FriendVolume {
    pub fn from_edges<E, I>(edges: E, query_users: I) -> Self
    where
        E: IntoIterator<Item = Edge>,
        I: IntoIterator<Item = UserId>,
    {
        let query_users: HashSet<UserId> = query_users.into_iter().collect();
        let mut friends: HashMap<UserId, Vec<(UserId, u32)>> = HashMap::new();
        let mut qty_edges = 0_usize;
        for edge in edges {
            for user in [edge.source, edge.target] {
                if !query_users.contains(&user) {
                    continue;
                }
                if let Some(friend) = edge.other(user) {
                    friends.entry(user).or_default().push((friend, edge.weight));
                    qty_edges += 1;
                }
            }
        }
        info!(
            "collected {} friend links for {} of {} queried users",
            qty_edges,
            friends.len(),
            query_users.len()
        );
        FriendVolume { friends }
    }

    pub fn friends_of(&self, user: UserId) -> &[(UserId, u32)] {
        self.friends.get(&user).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Each friend `v` votes `w / (|R_u| + |R_v| - 2w)^2` for each of its items;
    /// friends whose item sets coincide with the user's contribute nothing.
    pub fn scores(&self, user: UserId, user_items: &UserItems) -> HashMap<ItemId, f64> {
        let mut scores: HashMap<ItemId, f64> = HashMap::new();
        let own_count = user_items.item_count(user) as i64;

        for &(friend, weight) in self.friends_of(user) {
            let friend_items = user_items.items_of(friend);
            if friend_items.is_empty() {
                continue;
            }
            let divisor = friend_items.len() as i64 + own_count - 2 * weight as i64;
            if divisor == 0 {
                continue;
            }
            let vote = weight as f64 / (divisor as f64).powi(2);
            for item in friend_items {
                if user_items.contains(user, *item) {
                    continue;
                }
                *scores.entry(*item).or_insert(0.0) += vote;
            }
        }
        scores
    }

    pub fn recommend(&self, user: UserId, user_items: &UserItems, how_many: usize) -> Vec<ItemScore> {
        top_n(self.scores(user, user_items), how_many)
    }
}
