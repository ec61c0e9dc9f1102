use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use crate::io::{ItemId, Membership, UserId};

/// Distinct items per user, sorted ascending. Serves as the "already seen"
/// filter and as the source of per-user item counts.
#[derive(Debug, Default, Clone)]
pub struct UserItems {
    user_to_items: HashMap<UserId, Vec<ItemId>>,
}

impl UserItems {
    pub fn from_memberships<'a, I>(memberships: I) -> Self
    where
        I: IntoIterator<Item = &'a Membership>,
    {
        let mut user_to_items: HashMap<UserId, Vec<ItemId>> = HashMap::new();
        for (user, item) in memberships {
            user_to_items.entry(*user).or_default().push(*item);
        }
        user_to_items.par_values_mut().for_each(|items| {
            items.sort_unstable();
            items.dedup();
        });
        UserItems { user_to_items }
    }

    /// Sorted distinct items of `user`; empty for unknown users.
    pub fn items_of(&self, user: UserId) -> &[ItemId] {
        self.user_to_items
            .get(&user)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn item_set(&self, user: UserId) -> HashSet<ItemId> {
        self.items_of(user).iter().copied().collect()
    }

    pub fn contains(&self, user: UserId, item: ItemId) -> bool {
        self.items_of(user).binary_search(&item).is_ok()
    }

    pub fn item_count(&self, user: UserId) -> usize {
        self.items_of(user).len()
    }

    pub fn num_users(&self) -> usize {
        self.user_to_items.len()
    }

    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.user_to_items.keys().copied()
    }

    /// One past the largest item id seen, i.e. the dense item range.
    pub fn item_range(&self) -> usize {
        self.user_to_items
            .values()
            .filter_map(|items| items.last())
            .max()
            .map(|max_item| *max_item as usize + 1)
            .unwrap_or(0)
    }
}
