use std::time::{Duration, Instant};

use hashbrown::HashMap;
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::info;

use crate::config::ModelConfig;
use crate::content::{ContentConfig, ContentIndex, ContentSimilarityScorer};
use crate::io::{ItemId, Membership, QueryInput, UserId};
use crate::latency::LatencyReport;
use crate::latent::{FactorModel, LatentConfig, LatentFactorScorer};
use crate::membership::UserItems;
use crate::rank::{backfill, item_popularity, normalize, top_n, ItemScore};
use crate::userknn::cooccurrence::{build_graph, DegreeCounts, Edge};
use crate::userknn::friend_volume::FriendVolume;
use crate::userknn::neighbor_index::NeighborIndex;
use crate::userknn::vote_aggregator::{self, ScoreMap, UserScores};

/// Ranked items for one queried user. An empty list is a valid answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub user: UserId,
    pub items: Vec<ItemScore>,
}

pub struct QueryResults {
    pub suggestions: Vec<Suggestion>,
    pub latency: LatencyReport,
}

/// Immutable membership state shared by all queries of a run.
pub struct ModelData {
    pub memberships: Vec<Membership>,
    pub user_items: UserItems,
    pub popular: Vec<ItemId>,
}

impl ModelData {
    pub fn new(memberships: Vec<Membership>) -> Self {
        let start_time = Instant::now();
        let user_items = UserItems::from_memberships(&memberships);
        let popular = item_popularity(&memberships);
        info!(
            "prepared {} users and {} items in {} ms",
            user_items.num_users(),
            popular.len(),
            start_time.elapsed().as_millis()
        );
        ModelData {
            memberships,
            user_items,
            popular,
        }
    }

    pub fn degree_counts(&self) -> DegreeCounts {
        self.user_items
            .users()
            .map(|user| (user, self.user_items.item_count(user) as u32))
            .collect()
    }

    /// Apply the list options: optionally drop known items, cut to size and
    /// top up with popular items.
    fn finish_scores(&self, user: UserId, mut scores: ScoreMap, options: &ListOptions) -> Vec<ItemScore> {
        if options.exclude_known {
            scores.retain(|item, _| !self.user_items.contains(user, *item));
        }
        let ranked = top_n(scores, options.how_many);
        self.backfill(user, ranked, options)
    }

    fn backfill(&self, user: UserId, mut ranked: Vec<ItemScore>, options: &ListOptions) -> Vec<ItemScore> {
        if options.backfill {
            let known = self.user_items.item_set(user);
            backfill(&mut ranked, &self.popular, options.how_many, &known);
        }
        ranked
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub how_many: usize,
    pub exclude_known: bool,
    pub backfill: bool,
}

impl From<&ModelConfig> for ListOptions {
    fn from(model: &ModelConfig) -> Self {
        ListOptions {
            how_many: model.num_items_to_recommend,
            exclude_known: model.exclude_known,
            backfill: model.backfill,
        }
    }
}

fn run_queries<F>(query_users: &[UserId], progress: &ProgressBar, score: F) -> QueryResults
where
    F: Fn(UserId) -> Vec<ItemScore> + Sync,
{
    let timed: Vec<(Suggestion, Duration)> = query_users
        .par_iter()
        .map(|user| {
            let start_time = Instant::now();
            let items = score(*user);
            progress.inc(1);
            (Suggestion { user: *user, items }, start_time.elapsed())
        })
        .collect();
    progress.finish_and_clear();

    let mut latency = LatencyReport::new();
    let suggestions = timed
        .into_iter()
        .map(|(suggestion, duration)| {
            latency.record(duration);
            suggestion
        })
        .collect();
    QueryResults {
        suggestions,
        latency,
    }
}

/// Neighbor index for `query_users`, from a precomputed edge stream when one
/// is given and from the membership data otherwise.
pub fn build_neighbor_index(
    data: &ModelData,
    edges: Option<Vec<Edge>>,
    query_users: &[UserId],
    model: &ModelConfig,
) -> NeighborIndex {
    let query_users = query_users.iter().copied();
    match edges {
        Some(edges) => NeighborIndex::from_edges(
            edges
                .into_iter()
                .filter(|edge| edge.weight >= model.min_edge_weight),
            &data.degree_counts(),
            query_users,
            model.neighborhood_size_k,
            model.weight_normalization,
        ),
        None => {
            let mut graph = build_graph(data.memberships.iter().copied());
            graph.retain_min_weight(model.min_edge_weight);
            NeighborIndex::from_graph(
                &graph,
                query_users,
                model.neighborhood_size_k,
                model.weight_normalization,
            )
        }
    }
}

/// Raw vote scores of every user in `index`.
pub fn neighbor_votes(data: &ModelData, index: &NeighborIndex) -> UserScores {
    vote_aggregator::suggestions(data.memberships.iter().copied(), index)
}

pub fn neighbor_suggestions(
    data: &ModelData,
    index: &NeighborIndex,
    query_users: &[UserId],
    options: &ListOptions,
    progress: &ProgressBar,
) -> QueryResults {
    let votes = neighbor_votes(data, index);
    run_queries(query_users, progress, |user| {
        let scores = votes.get(&user).cloned().unwrap_or_default();
        data.finish_scores(user, scores, options)
    })
}

/// Normalized neighbor votes, usable as priors for the content blend.
pub fn vote_priors(data: &ModelData, index: &NeighborIndex) -> HashMap<UserId, ScoreMap> {
    let mut votes = neighbor_votes(data, index);
    votes.par_values_mut().for_each(|scores| normalize(scores));
    votes
}

/// Content suggestions; a user's prior comes from `query.priors`, falling
/// back to `fallback_priors` when the query carries none for that user.
pub fn content_suggestions(
    data: &ModelData,
    content_index: &ContentIndex,
    config: &ContentConfig,
    query: &QueryInput,
    fallback_priors: Option<&HashMap<UserId, ScoreMap>>,
    options: &ListOptions,
    progress: &ProgressBar,
) -> QueryResults {
    let scorer = ContentSimilarityScorer::new(content_index, config);
    run_queries(&query.users, progress, |user| {
        let prior = query
            .priors
            .get(&user)
            .or_else(|| fallback_priors.and_then(|priors| priors.get(&user)));
        let ranked = scorer.recommend(data.user_items.items_of(user), prior);
        data.backfill(user, ranked, options)
    })
}

pub fn latent_suggestions<M>(
    data: &ModelData,
    factor_model: &M,
    config: &LatentConfig,
    query_users: &[UserId],
    options: &ListOptions,
    progress: &ProgressBar,
) -> QueryResults
where
    M: FactorModel + Sync + ?Sized,
{
    let scorer = LatentFactorScorer::new(factor_model, &data.user_items, config);
    run_queries(query_users, progress, |user| {
        data.backfill(user, scorer.recommend(user), options)
    })
}

pub fn friend_volume_suggestions<E>(
    data: &ModelData,
    edges: E,
    query_users: &[UserId],
    options: &ListOptions,
    progress: &ProgressBar,
) -> QueryResults
where
    E: IntoIterator<Item = Edge>,
{
    let volume = FriendVolume::from_edges(edges, query_users.iter().copied());
    run_queries(query_users, progress, |user| {
        let ranked = volume.recommend(user, &data.user_items, options.how_many);
        data.backfill(user, ranked, options)
    })
}

#[cfg(test)]
mod pipeline_test {
    use super::*;
    use crate::content::ContentConfig;
    use crate::io::{content_records, format_suggestion, PriorScores};
    use crate::latent::CoOccurrenceGram;

    fn options() -> ListOptions {
        ListOptions::from(&ModelConfig::default())
    }

    fn tiny_model() -> (ModelData, ModelConfig) {
        let data = ModelData::new(vec![(1, 10), (2, 10), (2, 20), (3, 20)]);
        let model = ModelConfig {
            neighborhood_size_k: 1,
            ..ModelConfig::default()
        };
        (data, model)
    }

    #[test]
    fn should_suggest_neighbor_items_end_to_end() {
        let (data, model) = tiny_model();
        let index = build_neighbor_index(&data, None, &[2], &model);
        let results = neighbor_suggestions(&data, &index, &[2], &options(), &ProgressBar::hidden());

        let suggestion = &results.suggestions[0];
        assert_eq!(2, suggestion.user);
        assert_eq!(10, suggestion.items[0].id);
        assert!(suggestion.items[0].score > 0.0);
        assert_eq!(
            "2:10;1.0000",
            format_suggestion(suggestion.user, &suggestion.items, true)
        );
        assert_eq!(1, results.latency.len());
    }

    #[test]
    fn should_answer_cold_start_user_with_empty_line() {
        let (data, model) = tiny_model();
        let index = build_neighbor_index(&data, None, &[42, 2], &model);
        let results =
            neighbor_suggestions(&data, &index, &[42, 2], &options(), &ProgressBar::hidden());
        assert_eq!(42, results.suggestions[0].user);
        assert_eq!(
            "42:",
            format_suggestion(42, &results.suggestions[0].items, true)
        );
        assert_eq!(2, results.suggestions[1].user);
    }

    #[test]
    fn should_exclude_known_items_and_backfill_when_asked() {
        let (data, model) = tiny_model();
        let index = build_neighbor_index(&data, None, &[2], &model);

        let excluding = ListOptions {
            exclude_known: true,
            ..options()
        };
        let results = neighbor_suggestions(&data, &index, &[2], &excluding, &ProgressBar::hidden());
        assert!(results.suggestions[0].items.is_empty());

        let data = ModelData::new(vec![(1, 10), (1, 30), (2, 10), (3, 30), (4, 40)]);
        let index = build_neighbor_index(&data, None, &[4], &model);
        let backfilling = ListOptions {
            how_many: 2,
            exclude_known: true,
            backfill: true,
        };
        let results = neighbor_suggestions(&data, &index, &[4], &backfilling, &ProgressBar::hidden());
        let ids: Vec<ItemId> = results.suggestions[0].items.iter().map(|s| s.id).collect();
        assert_eq!(vec![10, 30], ids);
    }

    #[test]
    fn should_build_same_index_from_edge_stream() {
        let (data, model) = tiny_model();
        let graph = build_graph(data.memberships.iter().copied());
        let from_edges = build_neighbor_index(&data, Some(graph.sorted_edges()), &[2, 3], &model);
        let from_graph = build_neighbor_index(&data, None, &[2, 3], &model);
        assert_eq!(from_graph.neighbors(2), from_edges.neighbors(2));
        assert_eq!(from_graph.neighbors(3), from_edges.neighbors(3));
    }

    #[test]
    fn should_blend_content_with_vote_priors() {
        let data = ModelData::new(vec![(1, 1), (2, 1), (2, 4)]);
        let content = "1:Ruby;100\n2:Ruby;100,C;100\n4:Ruby;100,C;10\n";
        let config = ContentConfig::default();
        let content_index = ContentIndex::from_records(content_records(content.as_bytes()), &config);
        let model = ModelConfig::default();
        let index = build_neighbor_index(&data, None, &[1], &model);
        let priors = vote_priors(&data, &index);

        let query = QueryInput {
            users: vec![1],
            priors: PriorScores::new(),
        };
        let results = content_suggestions(
            &data,
            &content_index,
            &config,
            &query,
            Some(&priors),
            &options(),
            &ProgressBar::hidden(),
        );
        let items = &results.suggestions[0].items;
        assert_eq!(4, items[0].id);
        assert!((items[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn should_suggest_latent_and_friend_volume_items() {
        let data = ModelData::new(vec![(1, 10), (1, 20), (2, 10), (2, 30)]);
        let gram = CoOccurrenceGram::new(&data.user_items);
        let results = latent_suggestions(
            &data,
            &gram,
            &LatentConfig::default(),
            &[1, 9],
            &options(),
            &ProgressBar::hidden(),
        );
        assert_eq!(30, results.suggestions[0].items[0].id);
        assert!(results.suggestions[1].items.is_empty());

        let graph = build_graph(data.memberships.iter().copied());
        let results =
            friend_volume_suggestions(&data, graph.edges(), &[1], &options(), &ProgressBar::hidden());
        let ids: Vec<ItemId> = results.suggestions[0].items.iter().map(|s| s.id).collect();
        assert_eq!(vec![30], ids);
    }
}
