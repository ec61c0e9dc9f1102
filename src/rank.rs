use std::cmp::Ordering;
use std::hash::Hash;

use dary_heap::OctonaryHeap;
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;

use crate::io::{ItemId, Membership};

/// A scored candidate item.
///
/// The ordering is reversed: a *better* item (higher score, or equal score and
/// smaller id) compares as `Less`. A max-heap of `ItemScore` therefore keeps the
/// worst retained item on top, and `into_sorted_vec` yields best-first.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ItemScore {
    pub id: ItemId,
    pub score: f64,
}

impl ItemScore {
    pub fn new(id: ItemId, score: f64) -> Self {
        ItemScore { id, score }
    }
}

impl Eq for ItemScore {}

impl Ord for ItemScore {
    fn cmp(&self, other: &Self) -> Ordering {
        // reverse order by score, then ascending by id
        match other.score.partial_cmp(&self.score) {
            Some(Ordering::Equal) | None => self.id.cmp(&other.id),
            Some(ordering) => ordering,
        }
    }
}

impl PartialOrd for ItemScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fixed-capacity heap retaining the `capacity` best elements offered to it.
///
/// `T`'s ordering must put worse elements *above* better ones (see
/// [`ItemScore`]); the heap top is then the eviction candidate. The invariant
/// `len() <= capacity()` holds after every call.
pub struct BoundedTopK<T: Ord> {
    heap: OctonaryHeap<T>,
    capacity: usize,
}

impl<T: Ord> BoundedTopK<T> {
    pub fn new(capacity: usize) -> Self {
        BoundedTopK {
            heap: OctonaryHeap::with_capacity(capacity),
            capacity,
        }
    }

    /// Offer a candidate. Below capacity it is always kept; at capacity it
    /// replaces the current worst element only when it is strictly better.
    /// Returns whether the candidate was retained.
    pub fn offer(&mut self, candidate: T) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(candidate);
            return true;
        }
        match self.heap.peek_mut() {
            Some(mut bottom) if candidate < *bottom => {
                *bottom = candidate;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained elements, best first.
    pub fn into_sorted_vec(self) -> Vec<T> {
        self.heap.into_sorted_vec()
    }
}

/// Divide every score by the maximum score. Empty maps and maps whose maximum
/// is not positive are left untouched.
pub fn normalize<K: Eq + Hash>(scores: &mut HashMap<K, f64>) {
    let max_score = scores.values().cloned().fold(0.0_f64, f64::max);
    if max_score <= 0.0 {
        return;
    }
    for score in scores.values_mut() {
        *score /= max_score;
    }
}

/// The `how_many` best items by descending score, ties by ascending item id.
pub fn top_n<I>(scores: I, how_many: usize) -> Vec<ItemScore>
where
    I: IntoIterator<Item = (ItemId, f64)>,
{
    let mut top_items = BoundedTopK::new(how_many);
    for (item_id, score) in scores {
        top_items.offer(ItemScore::new(item_id, score));
    }
    top_items.into_sorted_vec()
}

/// Items ordered by number of distinct watchers, most popular first.
pub fn item_popularity(memberships: &[Membership]) -> Vec<ItemId> {
    let mut watchers: HashMap<ItemId, usize> = HashMap::new();
    for (_user, item) in memberships.iter().unique() {
        *watchers.entry(*item).or_insert(0) += 1;
    }

    watchers
        .into_iter()
        .sorted_by(|(item_a, count_a), (item_b, count_b)| {
            count_b.cmp(count_a).then(item_a.cmp(item_b))
        })
        .map(|(item, _count)| item)
        .collect()
}

/// Top up `ranked` with popular items until it holds `how_many` entries.
/// Items already in the list or in `known` are skipped. Backfilled entries get
/// a score of zero so they always rank below scored suggestions.
pub fn backfill(
    ranked: &mut Vec<ItemScore>,
    popular: &[ItemId],
    how_many: usize,
    known: &HashSet<ItemId>,
) {
    if ranked.len() >= how_many {
        return;
    }
    let mut present: HashSet<ItemId> = ranked.iter().map(|scored| scored.id).collect();
    for item_id in popular {
        if ranked.len() >= how_many {
            break;
        }
        if known.contains(item_id) || !present.insert(*item_id) {
            continue;
        }
        ranked.push(ItemScore::new(*item_id, 0.0));
    }
}
