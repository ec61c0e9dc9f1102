use std::str::FromStr;
use std::time::Instant;

use hashbrown::{HashMap, HashSet};
use tracing::{debug, info};

use crate::error::UnknownVariant;
use crate::io::{ContentRecord, ItemId};
use crate::rank::{normalize, top_n, ItemScore};
use crate::userknn::neighbor_index::ZERO_DISTANCE_DAMPENING;

pub type Dimension = u32;

/// How a candidate item is compared against the stack of a user's item vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityMeasure {
    /// `1 / ||U - 1 c^T||_F`
    InverseDistance,
    /// Mean of `u_i . c` over the user's items.
    MeanDot,
}

impl Default for SimilarityMeasure {
    fn default() -> Self {
        SimilarityMeasure::InverseDistance
    }
}

impl FromStr for SimilarityMeasure {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inverse_distance" => Ok(SimilarityMeasure::InverseDistance),
            "mean_dot" => Ok(SimilarityMeasure::MeanDot),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// What a candidate without a prior score gets when blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPrior {
    /// Keep the similarity score unchanged.
    UseSimilarity,
    /// Treat the prior as zero, which zeroes the blended score.
    Zero,
}

impl Default for MissingPrior {
    fn default() -> Self {
        MissingPrior::UseSimilarity
    }
}

impl FromStr for MissingPrior {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "similarity" | "use_similarity" => Ok(MissingPrior::UseSimilarity),
            "zero" => Ok(MissingPrior::Zero),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentConfig {
    /// Weight of the similarity score in `s^alpha * prior^(1 - alpha)`.
    pub alpha: f64,
    pub loc_exponent: f64,
    /// Vectors with a smaller L2 norm are left unnormalized.
    pub min_norm: f64,
    pub max_results: usize,
    pub similarity: SimilarityMeasure,
    pub missing_prior: MissingPrior,
}

impl Default for ContentConfig {
    fn default() -> Self {
        ContentConfig {
            alpha: 0.24,
            loc_exponent: 1.5,
            min_norm: 0.01,
            max_results: 100,
            similarity: SimilarityMeasure::default(),
            missing_prior: MissingPrior::default(),
        }
    }
}

/// Dense dimension ids for language names, in first-seen order.
#[derive(Debug, Default)]
pub struct LanguageVocabulary {
    ids: HashMap<String, Dimension>,
}

impl LanguageVocabulary {
    pub fn get_or_insert(&mut self, name: &str) -> Dimension {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.ids.len() as Dimension;
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<Dimension> {
        self.ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Sparse language profile of one item, sorted by dimension.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentVector {
    entries: Vec<(Dimension, f64)>,
    norm_sq: f64,
}

impl ContentVector {
    /// Raise every line count to `exponent`, then scale to unit length unless
    /// the norm is below `min_norm`.
    pub fn from_line_counts(counts: &[(Dimension, u64)], exponent: f64, min_norm: f64) -> Self {
        let mut entries: Vec<(Dimension, f64)> = counts
            .iter()
            .map(|(dimension, loc)| (*dimension, (*loc as f64).powf(exponent)))
            .collect();
        entries.sort_unstable_by_key(|(dimension, _)| *dimension);

        let norm = entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm >= min_norm {
            for (_, weight) in entries.iter_mut() {
                *weight /= norm;
            }
        }
        let norm_sq = entries.iter().map(|(_, w)| w * w).sum();
        ContentVector { entries, norm_sq }
    }

    pub fn entries(&self) -> &[(Dimension, f64)] {
        &self.entries
    }

    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.entries.iter().map(|(dimension, _)| *dimension)
    }

    pub fn norm_sq(&self) -> f64 {
        self.norm_sq
    }

    pub fn dot(&self, other: &ContentVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (dim_a, weight_a) = self.entries[i];
            let (dim_b, weight_b) = other.entries[j];
            if dim_a == dim_b {
                sum += weight_a * weight_b;
                i += 1;
                j += 1;
            } else if dim_a < dim_b {
                i += 1;
            } else {
                j += 1;
            }
        }
        sum
    }

    /// `||self - other||^2`, clamped at zero against rounding.
    pub fn squared_distance(&self, other: &ContentVector) -> f64 {
        (self.norm_sq + other.norm_sq - 2.0 * self.dot(other)).max(0.0)
    }
}

/// Item content vectors plus the inverted `dimension -> items` lists used to
/// prune candidates. Built once, then shared read-only by all queries.
#[derive(Debug, Default)]
pub struct ContentIndex {
    vocabulary: LanguageVocabulary,
    vectors: HashMap<ItemId, ContentVector>,
    dimension_items: HashMap<Dimension, Vec<ItemId>>,
    loc_exponent: f64,
    min_norm: f64,
}

impl ContentIndex {
    pub fn new(config: &ContentConfig) -> Self {
        ContentIndex {
            loc_exponent: config.loc_exponent,
            min_norm: config.min_norm,
            ..Default::default()
        }
    }

    pub fn from_records<I>(records: I, config: &ContentConfig) -> Self
    where
        I: IntoIterator<Item = ContentRecord>,
    {
        let start_time = Instant::now();
        let mut index = ContentIndex::new(config);
        for record in records {
            index.insert(record);
        }
        info!(
            "indexed {} items over {} languages in {} ms",
            index.vectors.len(),
            index.vocabulary.len(),
            start_time.elapsed().as_millis()
        );
        index
    }

    /// Add an item. A second record for the same item is ignored.
    pub fn insert(&mut self, record: ContentRecord) {
        if self.vectors.contains_key(&record.item) {
            debug!("ignoring repeated content record for item {}", record.item);
            return;
        }
        let mut counts: Vec<(Dimension, u64)> = Vec::with_capacity(record.languages.len());
        for (language, loc) in &record.languages {
            let dimension = self.vocabulary.get_or_insert(language);
            if counts.iter().any(|(seen, _)| *seen == dimension) {
                continue;
            }
            counts.push((dimension, *loc));
            self.dimension_items
                .entry(dimension)
                .or_default()
                .push(record.item);
        }
        let vector = ContentVector::from_line_counts(&counts, self.loc_exponent, self.min_norm);
        self.vectors.insert(record.item, vector);
    }

    pub fn vector(&self, item: ItemId) -> Option<&ContentVector> {
        self.vectors.get(&item)
    }

    pub fn vocabulary(&self) -> &LanguageVocabulary {
        &self.vocabulary
    }

    pub fn num_items(&self) -> usize {
        self.vectors.len()
    }

    /// Items sharing at least one language with any of `known`, minus `known`.
    pub fn candidates(&self, known: &[ItemId]) -> HashSet<ItemId> {
        let known_set: HashSet<ItemId> = known.iter().copied().collect();
        let mut seen_dimensions: HashSet<Dimension> = HashSet::new();
        let mut candidates = HashSet::new();
        for item in known {
            let vector = match self.vectors.get(item) {
                Some(vector) => vector,
                None => continue,
            };
            for dimension in vector.dimensions() {
                if !seen_dimensions.insert(dimension) {
                    continue;
                }
                if let Some(items) = self.dimension_items.get(&dimension) {
                    candidates.extend(items.iter().filter(|item| !known_set.contains(*item)));
                }
            }
        }
        candidates
    }
}

/// Scores candidate items by language similarity to a user's items, optionally
/// blended with a prior score per item.
pub struct ContentSimilarityScorer<'a> {
    index: &'a ContentIndex,
    config: &'a ContentConfig,
}

impl<'a> ContentSimilarityScorer<'a> {
    pub fn new(index: &'a ContentIndex, config: &'a ContentConfig) -> Self {
        ContentSimilarityScorer { index, config }
    }

    fn similarity(&self, user_vectors: &[&ContentVector], candidate: &ContentVector) -> f64 {
        match self.config.similarity {
            SimilarityMeasure::InverseDistance => {
                let distance = user_vectors
                    .iter()
                    .map(|row| row.squared_distance(candidate))
                    .sum::<f64>()
                    .sqrt();
                if distance > f64::EPSILON {
                    1.0 / distance
                } else {
                    1.0 / ZERO_DISTANCE_DAMPENING
                }
            }
            SimilarityMeasure::MeanDot => {
                let total: f64 = user_vectors.iter().map(|row| row.dot(candidate)).sum();
                total / user_vectors.len() as f64
            }
        }
    }

    /// Unnormalized similarity of every candidate for a user owning `known`.
    pub fn raw_scores(&self, known: &[ItemId]) -> HashMap<ItemId, f64> {
        let user_vectors: Vec<&ContentVector> = known
            .iter()
            .filter_map(|item| self.index.vector(*item))
            .collect();
        if user_vectors.is_empty() {
            return HashMap::new();
        }
        self.index
            .candidates(known)
            .into_iter()
            .filter_map(|item| {
                self.index
                    .vector(item)
                    .map(|candidate| (item, self.similarity(&user_vectors, candidate)))
            })
            .collect()
    }

    /// Normalized similarity, blended with `prior` when one is given and
    /// normalized again. Non-finite priors count as missing.
    pub fn score(
        &self,
        known: &[ItemId],
        prior: Option<&HashMap<ItemId, f64>>,
    ) -> HashMap<ItemId, f64> {
        let mut scores = self.raw_scores(known);
        normalize(&mut scores);

        if let Some(prior) = prior {
            let alpha = self.config.alpha;
            for (item, score) in scores.iter_mut() {
                let prior_score = prior.get(item).filter(|prior_score| prior_score.is_finite());
                *score = match (prior_score, self.config.missing_prior) {
                    (Some(prior_score), _) => {
                        score.powf(alpha) * prior_score.max(0.0).powf(1.0 - alpha)
                    }
                    (None, MissingPrior::UseSimilarity) => *score,
                    (None, MissingPrior::Zero) => 0.0,
                };
            }
            normalize(&mut scores);
        }
        scores
    }

    pub fn recommend(
        &self,
        known: &[ItemId],
        prior: Option<&HashMap<ItemId, f64>>,
    ) -> Vec<ItemScore> {
        top_n(self.score(known, prior), self.config.max_results)
    }
}

#[cfg(test)]
mod content_test {
    use super::*;
    use float_cmp::approx_eq;

    fn record(item: ItemId, languages: &[(&str, u64)]) -> ContentRecord {
        ContentRecord {
            item,
            languages: languages
                .iter()
                .map(|(name, loc)| (name.to_string(), *loc))
                .collect(),
        }
    }

    fn corpus() -> Vec<ContentRecord> {
        vec![
            record(1, &[("Ruby", 100)]),
            record(2, &[("Ruby", 100), ("C", 100)]),
            record(3, &[("C", 50)]),
            record(4, &[("Ruby", 100), ("C", 10)]),
        ]
    }

    #[test]
    fn should_power_and_unit_normalize_vectors() {
        let vector = ContentVector::from_line_counts(&[(1, 4), (0, 4)], 1.5, 0.01);
        let dims: Vec<Dimension> = vector.dimensions().collect();
        assert_eq!(vec![0, 1], dims);
        assert!(approx_eq!(f64, 1.0, vector.norm_sq(), epsilon = 1e-12));
        assert!(approx_eq!(f64, 1.0 / 2.0_f64.sqrt(), vector.entries()[0].1, epsilon = 1e-12));
    }

    #[test]
    fn should_leave_tiny_vectors_unnormalized() {
        let vector = ContentVector::from_line_counts(&[(0, 0)], 1.5, 0.01);
        assert!(approx_eq!(f64, 0.0, vector.norm_sq(), ulps = 2));
    }

    #[test]
    fn should_assign_dimensions_in_first_seen_order() {
        let index = ContentIndex::from_records(corpus(), &ContentConfig::default());
        assert_eq!(Some(0), index.vocabulary().get("Ruby"));
        assert_eq!(Some(1), index.vocabulary().get("C"));
        assert_eq!(2, index.vocabulary().len());
        assert_eq!(4, index.num_items());
    }

    #[test]
    fn should_only_consider_items_sharing_a_language() {
        let index = ContentIndex::from_records(corpus(), &ContentConfig::default());
        let mut candidates: Vec<ItemId> = index.candidates(&[1]).into_iter().collect();
        candidates.sort_unstable();
        assert_eq!(vec![2, 4], candidates);
        assert!(index.candidates(&[99]).is_empty());
    }

    #[test]
    fn should_prefer_closer_language_mix() {
        let config = ContentConfig::default();
        let index = ContentIndex::from_records(corpus(), &config);
        let scorer = ContentSimilarityScorer::new(&index, &config);

        let scores = scorer.score(&[1], None);
        assert!(approx_eq!(f64, 1.0, scores[&4], ulps = 2));
        assert!(scores[&2] < scores[&4]);
        assert!(scores.values().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn should_rank_by_mean_dot_product() {
        let config = ContentConfig {
            similarity: SimilarityMeasure::MeanDot,
            ..ContentConfig::default()
        };
        let index = ContentIndex::from_records(corpus(), &config);
        let scorer = ContentSimilarityScorer::new(&index, &config);

        let raw = scorer.raw_scores(&[1, 3]);
        // item 2 is (1/sqrt 2, 1/sqrt 2); rows are (1, 0) and (0, 1)
        assert!(approx_eq!(f64, 1.0 / 2.0_f64.sqrt(), raw[&2], epsilon = 1e-12));
        assert!(!raw.contains_key(&1));
    }

    #[test]
    fn should_dampen_identical_candidate() {
        let config = ContentConfig::default();
        let index = ContentIndex::from_records(
            vec![record(1, &[("Go", 10)]), record(2, &[("Go", 99)])],
            &config,
        );
        let scorer = ContentSimilarityScorer::new(&index, &config);
        let raw = scorer.raw_scores(&[1]);
        assert!(approx_eq!(f64, 1.0 / ZERO_DISTANCE_DAMPENING, raw[&2], ulps = 2));
    }

    #[test]
    fn should_keep_similarity_for_items_without_prior() {
        let config = ContentConfig::default();
        let index = ContentIndex::from_records(corpus(), &config);
        let scorer = ContentSimilarityScorer::new(&index, &config);

        let unblended = scorer.score(&[1], None);
        let mut prior = HashMap::new();
        prior.insert(2, 1.0);
        let blended = scorer.score(&[1], Some(&prior));

        assert!(approx_eq!(f64, 1.0, blended[&4], ulps = 2));
        let expected = unblended[&2].powf(config.alpha);
        assert!(approx_eq!(f64, expected, blended[&2], epsilon = 1e-12));
    }

    #[test]
    fn should_treat_non_finite_prior_as_missing() {
        let config = ContentConfig::default();
        let index = ContentIndex::from_records(corpus(), &config);
        let scorer = ContentSimilarityScorer::new(&index, &config);

        let unblended = scorer.score(&[1], None);
        let mut prior = HashMap::new();
        prior.insert(2, f64::INFINITY);
        prior.insert(4, 1.0);
        let blended = scorer.score(&[1], Some(&prior));

        assert!(blended.values().all(|score| score.is_finite()));
        assert!(approx_eq!(f64, 1.0, blended[&4], ulps = 2));
        assert!(approx_eq!(f64, unblended[&2], blended[&2], epsilon = 1e-12));
    }

    #[test]
    fn should_zero_items_without_prior_when_configured() {
        let config = ContentConfig {
            missing_prior: MissingPrior::Zero,
            ..ContentConfig::default()
        };
        let index = ContentIndex::from_records(corpus(), &config);
        let scorer = ContentSimilarityScorer::new(&index, &config);

        let mut prior = HashMap::new();
        prior.insert(2, 1.0);
        let blended = scorer.score(&[1], Some(&prior));

        assert!(approx_eq!(f64, 0.0, blended[&4], ulps = 2));
        assert!(approx_eq!(f64, 1.0, blended[&2], ulps = 2));
    }

    #[test]
    fn should_return_nothing_without_content_vectors() {
        let config = ContentConfig::default();
        let index = ContentIndex::from_records(corpus(), &config);
        let scorer = ContentSimilarityScorer::new(&index, &config);
        assert!(scorer.recommend(&[], None).is_empty());
        assert!(scorer.recommend(&[77, 78], None).is_empty());
    }

    #[test]
    fn should_truncate_to_max_results() {
        let config = ContentConfig {
            max_results: 1,
            ..ContentConfig::default()
        };
        let index = ContentIndex::from_records(corpus(), &config);
        let scorer = ContentSimilarityScorer::new(&index, &config);
        let ranked = scorer.recommend(&[1], None);
        assert_eq!(1, ranked.len());
        assert_eq!(4, ranked[0].id);
    }

    #[test]
    fn should_parse_setting_names() {
        assert_eq!(Ok(SimilarityMeasure::MeanDot), "mean_dot".parse());
        assert_eq!(Ok(MissingPrior::Zero), "Zero".parse());
        assert_eq!(Ok(MissingPrior::UseSimilarity), "similarity".parse());
        assert!("cosine".parse::<SimilarityMeasure>().is_err());
    }
}
