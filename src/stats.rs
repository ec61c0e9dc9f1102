use hashbrown::HashMap;
use itertools::Itertools;
use num_format::{Locale, ToFormattedString};
use rayon::prelude::*;
use tdigest::TDigest;
use tracing::info;

use crate::io::{ItemId, Membership, UserId};

const PERCENTILES: [f64; 6] = [0.25, 0.5, 0.75, 0.9, 0.99, 1.0];

/// Descriptive statistics of a membership data set.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipStats {
    pub descriptive_name: String,
    pub qty_records: usize,
    pub qty_duplicate_records: usize,
    pub qty_unique_users: usize,
    pub qty_unique_items: usize,
    /// `(quantile, watchers per item)` for each of [`PERCENTILES`].
    pub users_per_item: Vec<(f64, f64)>,
    /// `(quantile, items per user)` for each of [`PERCENTILES`].
    pub items_per_user: Vec<(f64, f64)>,
}

fn percentiles(counts: Vec<f64>) -> Vec<(f64, f64)> {
    let digest = TDigest::new_with_size(100).merge_unsorted(counts);
    PERCENTILES
        .iter()
        .map(|q| (*q, digest.estimate_quantile(*q)))
        .collect()
}

impl MembershipStats {
    pub fn from_memberships(descriptive_name: &str, memberships: &[Membership]) -> Self {
        let mut unique: Vec<Membership> = memberships.to_vec();
        unique.par_sort_unstable();
        unique.dedup();

        let mut users_per_item: HashMap<ItemId, usize> = HashMap::new();
        let mut items_per_user: HashMap<UserId, usize> = HashMap::new();
        for (user, item) in &unique {
            *users_per_item.entry(*item).or_insert(0) += 1;
            *items_per_user.entry(*user).or_insert(0) += 1;
        }

        MembershipStats {
            descriptive_name: descriptive_name.to_string(),
            qty_records: memberships.len(),
            qty_duplicate_records: memberships.len() - unique.len(),
            qty_unique_users: items_per_user.len(),
            qty_unique_items: users_per_item.len(),
            users_per_item: percentiles(users_per_item.values().map(|c| *c as f64).collect()),
            items_per_user: percentiles(items_per_user.values().map(|c| *c as f64).collect()),
        }
    }

    pub fn log(&self) {
        let render = |quantiles: &[(f64, f64)]| {
            quantiles
                .iter()
                .map(|(q, value)| format!("p{}={}", q * 100.0, value.round()))
                .join(" ")
        };
        info!(
            "loaded {}: {} records ({} duplicates), {} users, {} items",
            self.descriptive_name,
            self.qty_records.to_formatted_string(&Locale::en),
            self.qty_duplicate_records.to_formatted_string(&Locale::en),
            self.qty_unique_users.to_formatted_string(&Locale::en),
            self.qty_unique_items.to_formatted_string(&Locale::en),
        );
        info!("watchers per item: {}", render(&self.users_per_item));
        info!("items per user: {}", render(&self.items_per_user));
    }
}
