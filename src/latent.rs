use std::str::FromStr;

use hashbrown::HashMap;
use tracing::info;

use crate::error::UnknownVariant;
use crate::io::{ItemId, UserId};
use crate::membership::UserItems;
use crate::rank::{BoundedTopK, ItemScore};

/// Sparse item -> weight vector describing one user.
pub type SparseVector = HashMap<ItemId, f64>;

/// A low-rank (or Gram) model that maps a sparse user vector to a dense score
/// per item id in `0..num_items()`.
pub trait FactorModel {
    fn num_items(&self) -> usize;

    fn project(&self, user_vector: &SparseVector) -> Vec<f64>;
}

/// Dense item factor matrix `V` (one row of length `rank` per item id).
/// Projection computes `V (V^T u)`.
#[derive(Debug, Clone, Default)]
pub struct ItemFactors {
    rank: usize,
    num_items: usize,
    values: Vec<f64>,
}

impl ItemFactors {
    /// Rows with a length other than `rank`, or an item id at or beyond
    /// `item_range`, are ignored; item ids without a row get a zero row.
    pub fn from_rows<I>(rank: usize, item_range: usize, rows: I) -> Self
    where
        I: IntoIterator<Item = (ItemId, Vec<f64>)>,
    {
        let rows: Vec<(ItemId, Vec<f64>)> = rows
            .into_iter()
            .filter(|(item, row)| row.len() == rank && (*item as usize) < item_range)
            .collect();
        let num_items = rows
            .iter()
            .map(|(item, _)| *item as usize + 1)
            .max()
            .unwrap_or(0);
        let mut values = vec![0.0; num_items * rank];
        for (item, row) in rows {
            let offset = item as usize * rank;
            values[offset..offset + rank].copy_from_slice(&row);
        }
        ItemFactors {
            rank,
            num_items,
            values,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    fn row(&self, item: usize) -> &[f64] {
        &self.values[item * self.rank..(item + 1) * self.rank]
    }
}

impl FactorModel for ItemFactors {
    fn num_items(&self) -> usize {
        self.num_items
    }

    fn project(&self, user_vector: &SparseVector) -> Vec<f64> {
        let mut latent = vec![0.0; self.rank];
        for (item, weight) in user_vector {
            let item = *item as usize;
            if item >= self.num_items {
                continue;
            }
            for (acc, factor) in latent.iter_mut().zip(self.row(item)) {
                *acc += weight * factor;
            }
        }
        (0..self.num_items)
            .map(|item| {
                self.row(item)
                    .iter()
                    .zip(&latent)
                    .map(|(factor, z)| factor * z)
                    .sum()
            })
            .collect()
    }
}

/// Item-item Gram model `A^T A u`, where row `w` of `A` puts `1 / sqrt(|R_w|)`
/// on every item of user `w`. Used when no factor file is available.
pub struct CoOccurrenceGram<'a> {
    user_items: &'a UserItems,
    item_users: HashMap<ItemId, Vec<UserId>>,
    num_items: usize,
}

impl<'a> CoOccurrenceGram<'a> {
    pub fn new(user_items: &'a UserItems) -> Self {
        let mut item_users: HashMap<ItemId, Vec<UserId>> = HashMap::new();
        for user in user_items.users() {
            for item in user_items.items_of(user) {
                item_users.entry(*item).or_default().push(user);
            }
        }
        info!(
            "gram model over {} users and {} items",
            user_items.num_users(),
            item_users.len()
        );
        CoOccurrenceGram {
            user_items,
            item_users,
            num_items: user_items.item_range(),
        }
    }

    fn row_weight(&self, user: UserId) -> f64 {
        let count = self.user_items.item_count(user);
        if count == 0 {
            0.0
        } else {
            1.0 / (count as f64).sqrt()
        }
    }
}

impl FactorModel for CoOccurrenceGram<'_> {
    fn num_items(&self) -> usize {
        self.num_items
    }

    fn project(&self, user_vector: &SparseVector) -> Vec<f64> {
        // A u, restricted to users touching the vector's items
        let mut row_scores: HashMap<UserId, f64> = HashMap::new();
        for (item, weight) in user_vector {
            if let Some(users) = self.item_users.get(item) {
                for user in users {
                    *row_scores.entry(*user).or_insert(0.0) += self.row_weight(*user) * weight;
                }
            }
        }

        let mut projected = vec![0.0; self.num_items];
        for (user, row_score) in row_scores {
            let row_weight = self.row_weight(user);
            for item in self.user_items.items_of(user) {
                projected[*item as usize] += row_weight * row_score;
            }
        }
        projected
    }
}

/// Weight given to each of a user's items in the user vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserWeighting {
    InverseCount,
    InverseSqrtCount,
}

impl Default for UserWeighting {
    fn default() -> Self {
        UserWeighting::InverseCount
    }
}

impl FromStr for UserWeighting {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inverse" | "inverse_count" => Ok(UserWeighting::InverseCount),
            "inverse_sqrt" | "inverse_sqrt_count" => Ok(UserWeighting::InverseSqrtCount),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatentConfig {
    /// Expected factor rank; zero accepts whatever the factor file holds.
    pub rank: usize,
    pub user_weighting: UserWeighting,
    /// Scores at or below this are never suggested.
    pub min_score: f64,
    pub num_items_to_recommend: usize,
}

impl Default for LatentConfig {
    fn default() -> Self {
        LatentConfig {
            rank: 0,
            user_weighting: UserWeighting::default(),
            min_score: 0.0,
            num_items_to_recommend: 10,
        }
    }
}

pub struct LatentFactorScorer<'a, M: FactorModel + ?Sized> {
    model: &'a M,
    user_items: &'a UserItems,
    config: &'a LatentConfig,
}

impl<'a, M: FactorModel + ?Sized> LatentFactorScorer<'a, M> {
    pub fn new(model: &'a M, user_items: &'a UserItems, config: &'a LatentConfig) -> Self {
        LatentFactorScorer {
            model,
            user_items,
            config,
        }
    }

    pub fn user_vector(&self, user: UserId) -> SparseVector {
        let items = self.user_items.items_of(user);
        if items.is_empty() {
            return HashMap::new();
        }
        let count = items.len() as f64;
        let weight = match self.config.user_weighting {
            UserWeighting::InverseCount => 1.0 / count,
            UserWeighting::InverseSqrtCount => 1.0 / count.sqrt(),
        };
        items.iter().map(|item| (*item, weight)).collect()
    }

    /// Best unseen items for `user`; empty when the user has no known items.
    pub fn recommend(&self, user: UserId) -> Vec<ItemScore> {
        let user_vector = self.user_vector(user);
        if user_vector.is_empty() {
            return Vec::new();
        }
        let projected = self.model.project(&user_vector);

        let mut top_items = BoundedTopK::new(self.config.num_items_to_recommend);
        for (item, score) in projected.into_iter().enumerate() {
            let item = item as ItemId;
            if score <= self.config.min_score || user_vector.contains_key(&item) {
                continue;
            }
            top_items.offer(ItemScore::new(item, score));
        }
        top_items.into_sorted_vec()
    }
}
