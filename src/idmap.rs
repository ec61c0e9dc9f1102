use std::fs::File;
use std::io::Read;
use std::path::Path;

use hashbrown::HashMap;
use tracing::{info, warn};

use crate::error::Result;
use crate::io::{colon_separated, record_with_fields, PriorScores, QueryInput, UserId};
use crate::pipeline::Suggestion;
use crate::rank::ItemScore;

/// Bidirectional mapping between original ids and dense ids `0..N-1`.
#[derive(Debug, Default, Clone)]
pub struct IdentityMap {
    to_dense: HashMap<u32, u32>,
    to_original: HashMap<u32, u32>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dense id of `original`, assigning the next free id on first sight.
    pub fn get_or_insert(&mut self, original: u32) -> u32 {
        if let Some(dense) = self.to_dense.get(&original) {
            return *dense;
        }
        let dense = self.to_dense.len() as u32;
        self.to_dense.insert(original, dense);
        self.to_original.insert(dense, original);
        dense
    }

    pub fn dense(&self, original: u32) -> Option<u32> {
        self.to_dense.get(&original).copied()
    }

    pub fn original(&self, dense: u32) -> Option<u32> {
        self.to_original.get(&dense).copied()
    }

    pub fn len(&self) -> usize {
        self.to_dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_dense.is_empty()
    }

    /// Parse `original:dense` lines; malformed lines are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Self {
        let mut map = IdentityMap::new();
        let mut qty_skipped = 0_usize;
        for result in colon_separated(reader).into_records() {
            let parsed = record_with_fields("id mapping", 2, result)
                .and_then(|record| record.deserialize::<(u32, u32)>(None).ok());
            match parsed {
                Some((original, dense)) => {
                    map.to_dense.insert(original, dense);
                    map.to_original.insert(dense, original);
                }
                None => qty_skipped += 1,
            }
        }
        if qty_skipped > 0 {
            warn!("skipped {} malformed id mapping lines", qty_skipped);
        }
        map
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let map = IdentityMap::from_reader(File::open(path.as_ref())?);
        info!("loaded {} id mappings from {}", map.len(), path.as_ref().display());
        Ok(map)
    }
}

/// Optional user and item maps applied at the edges of a run. Without a map,
/// ids pass through unchanged.
#[derive(Debug, Default)]
pub struct IdMaps {
    pub users: Option<IdentityMap>,
    pub items: Option<IdentityMap>,
}

fn to_dense(map: &Option<IdentityMap>, id: u32) -> Option<u32> {
    match map {
        Some(map) => map.dense(id),
        None => Some(id),
    }
}

fn to_original(map: &Option<IdentityMap>, id: u32) -> Option<u32> {
    match map {
        Some(map) => map.original(id),
        None => Some(id),
    }
}

impl IdMaps {
    pub fn load(user_map_path: Option<&str>, item_map_path: Option<&str>) -> Result<Self> {
        Ok(IdMaps {
            users: user_map_path.map(IdentityMap::read).transpose()?,
            items: item_map_path.map(IdentityMap::read).transpose()?,
        })
    }

    /// Translate query users and prior items to dense ids, leaving out unknown
    /// ids.
    pub fn to_dense_query(&self, query: QueryInput) -> QueryInput {
        if self.users.is_none() && self.items.is_none() {
            return query;
        }
        let users: Vec<u32> = query
            .users
            .iter()
            .filter_map(|user| to_dense(&self.users, *user))
            .collect();
        if users.len() < query.users.len() {
            warn!(
                "{} query users have no dense id and get empty suggestions",
                query.users.len() - users.len()
            );
        }
        let mut priors = PriorScores::new();
        for (user, scores) in query.priors {
            if let Some(user) = to_dense(&self.users, user) {
                let scores = scores
                    .into_iter()
                    .filter_map(|(item, score)| to_dense(&self.items, item).map(|item| (item, score)))
                    .collect();
                priors.insert(user, scores);
            }
        }
        QueryInput { users, priors }
    }

    /// Translate suggestions back to original ids, one per original query
    /// user in input order. A user without a dense id gets an empty list.
    /// Unmappable items are dropped.
    pub fn to_original_suggestions(
        &self,
        query_users: &[UserId],
        suggestions: Vec<Suggestion>,
    ) -> Vec<Suggestion> {
        if self.users.is_none() && self.items.is_none() {
            return suggestions;
        }
        let mut by_user: HashMap<UserId, Vec<ItemScore>> = suggestions
            .into_iter()
            .filter_map(|suggestion| {
                let user = to_original(&self.users, suggestion.user)?;
                let items = suggestion
                    .items
                    .into_iter()
                    .filter_map(|mut scored| {
                        scored.id = to_original(&self.items, scored.id)?;
                        Some(scored)
                    })
                    .collect();
                Some((user, items))
            })
            .collect();
        query_users
            .iter()
            .map(|user| Suggestion {
                user: *user,
                items: by_user.remove(user).unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod idmap_test {
    use super::*;
    use crate::io::format_suggestion;

    #[test]
    fn should_assign_dense_ids_in_first_seen_order() {
        let mut map = IdentityMap::new();
        assert_eq!(0, map.get_or_insert(500));
        assert_eq!(1, map.get_or_insert(42));
        assert_eq!(0, map.get_or_insert(500));
        assert_eq!(Some(42), map.original(1));
        assert_eq!(None, map.dense(7));
        assert_eq!(2, map.len());
    }

    #[test]
    fn should_read_mapping_lines_and_skip_garbage() {
        let map = IdentityMap::from_reader("900:0\n901:1\nbroken\n902:2:7\n".as_bytes());
        assert_eq!(2, map.len());
        assert_eq!(Some(1), map.dense(901));
        assert_eq!(Some(900), map.original(0));
    }

    #[test]
    fn should_map_query_and_suggestions_round_trip() {
        let maps = IdMaps {
            users: Some(IdentityMap::from_reader("900:0\n901:1\n".as_bytes())),
            items: Some(IdentityMap::from_reader("70:0\n71:1\n".as_bytes())),
        };
        let mut priors = PriorScores::new();
        let mut scores = HashMap::new();
        scores.insert(71, 0.5);
        scores.insert(99, 0.5);
        priors.insert(901, scores);
        let query = maps.to_dense_query(QueryInput {
            users: vec![901, 555],
            priors,
        });
        assert_eq!(vec![1], query.users);
        assert_eq!(1, query.priors[&1].len());
        assert!(query.priors[&1].contains_key(&1));

        let suggestions = vec![Suggestion {
            user: 1,
            items: vec![ItemScore::new(0, 1.0), ItemScore::new(5, 0.5)],
        }];
        let mapped = maps.to_original_suggestions(&[901, 555], suggestions);
        assert_eq!(2, mapped.len());
        assert_eq!(901, mapped[0].user);
        assert_eq!(1, mapped[0].items.len());
        assert_eq!(70, mapped[0].items[0].id);
        assert_eq!("555:", format_suggestion(mapped[1].user, &mapped[1].items, true));
    }

    #[test]
    fn should_answer_unmapped_query_users_with_empty_lines_in_order() {
        let maps = IdMaps {
            users: Some(IdentityMap::from_reader("900:0\n".as_bytes())),
            items: None,
        };
        let query = maps.to_dense_query(QueryInput {
            users: vec![555, 900],
            priors: PriorScores::new(),
        });
        assert_eq!(vec![0], query.users);

        let suggestions = vec![Suggestion {
            user: 0,
            items: vec![ItemScore::new(10, 1.0)],
        }];
        let lines: Vec<String> = maps
            .to_original_suggestions(&[555, 900], suggestions)
            .iter()
            .map(|suggestion| format_suggestion(suggestion.user, &suggestion.items, false))
            .collect();
        assert_eq!(vec!["555:".to_string(), "900:10".to_string()], lines);
    }

    #[test]
    fn should_pass_ids_through_without_maps() {
        let maps = IdMaps::default();
        let query = maps.to_dense_query(QueryInput {
            users: vec![3, 4],
            priors: PriorScores::new(),
        });
        assert_eq!(vec![3, 4], query.users);
    }
}
