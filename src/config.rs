use std::ffi::OsStr;
use std::fmt::Display;
use std::fs::File;
use std::io::Read;
use std::str::FromStr;

use justconfig::error::ConfigError;
use justconfig::item::{MapAction, StringItem, ValueExtractor};
use justconfig::sources::env::Env;
use justconfig::sources::text::ConfigText;
use justconfig::ConfPath;
use justconfig::Config;

use crate::content::ContentConfig;
use crate::error::{RecoError, Result};
use crate::latent::LatentConfig;
use crate::userknn::neighbor_index::WeightNormalization;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_NEIGHBORHOOD_SIZE_K: usize = 8;
const DEFAULT_NUM_ITEMS_TO_RECOMMEND: usize = 10;
const DEFAULT_MIN_EDGE_WEIGHT: u32 = 1;

pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub log: LogConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
    pub content: ContentConfig,
    pub latent: LatentConfig,
}

pub struct RuntimeConfig {
    pub num_workers: usize,
}

pub struct LogConfig {
    pub level: String,
}

pub struct DataConfig {
    pub membership_path: String,
    pub edges_path: Option<String>,
    pub content_path: Option<String>,
    pub query_path: Option<String>,
    pub output_path: Option<String>,
    pub holdout_path: Option<String>,
    pub factors_path: Option<String>,
    pub user_map_path: Option<String>,
    pub item_map_path: Option<String>,
}

pub struct ModelConfig {
    pub neighborhood_size_k: usize,
    pub num_items_to_recommend: usize,
    pub min_edge_weight: u32,
    pub weight_normalization: WeightNormalization,
    pub exclude_known: bool,
    pub backfill: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            neighborhood_size_k: DEFAULT_NEIGHBORHOOD_SIZE_K,
            num_items_to_recommend: DEFAULT_NUM_ITEMS_TO_RECOMMEND,
            min_edge_weight: DEFAULT_MIN_EDGE_WEIGHT,
            weight_normalization: WeightNormalization::default(),
            exclude_known: false,
            backfill: false,
        }
    }
}

/// Strips one pair of surrounding quotes, if present, after trimming.
trait StripQuotes {
    fn strip_quotes(self) -> std::result::Result<StringItem, ConfigError>;
}

impl StripQuotes for std::result::Result<StringItem, ConfigError> {
    fn strip_quotes(self) -> std::result::Result<StringItem, ConfigError> {
        self?.map(|v| {
            let v = v.trim();
            let quoted = v.len() >= 2
                && ((v.starts_with('"') && v.ends_with('"'))
                    || (v.starts_with('\'') && v.ends_with('\'')));
            if quoted {
                MapAction::Replace(vec![v[1..v.len() - 1].to_owned()])
            } else {
                MapAction::Replace(vec![v.to_owned()])
            }
        })
    }
}

fn raw_value(conf: &Config, section: &str, key: &str) -> Option<String> {
    conf.get(ConfPath::from(&[section, key]))
        .strip_quotes()
        .value()
        .ok()
}

/// The configured value, or `default` when the key is absent. A value that
/// does not parse is an error rather than a silent fallback.
fn setting<T>(conf: &Config, section: &str, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw_value(conf, section, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| RecoError::Config(format!("{}.{} = '{}': {}", section, key, raw, e))),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Layered configuration: the text file at `config_path` (if it exists),
    /// then environment overrides, then defaults.
    pub fn new(config_path: &str) -> Result<AppConfig> {
        match File::open(config_path) {
            Ok(config_file) => AppConfig::from_reader(config_file, config_path),
            Err(_) => AppConfig::from_sources(Config::default()),
        }
    }

    pub fn from_reader<R: Read>(reader: R, source_name: &str) -> Result<AppConfig> {
        let mut conf = Config::default();
        let config_text = ConfigText::new(reader, source_name).map_err(|e| {
            RecoError::Config(format!("loading configuration {} failed: {}", source_name, e))
        })?;
        conf.add_source(config_text);
        AppConfig::from_sources(conf)
    }

    fn from_sources(mut conf: Config) -> Result<AppConfig> {
        let config_env = Env::new(&[
            (
                ConfPath::from(&["data", "membership_path"]),
                OsStr::new("MEMBERSHIP_DATA"),
            ),
            (
                ConfPath::from(&["runtime", "num_workers"]),
                OsStr::new("NUM_WORKERS"),
            ),
            (ConfPath::from(&["log", "level"]), OsStr::new("LOG_LEVEL")),
        ]);
        conf.add_source(config_env);

        Ok(AppConfig {
            runtime: RuntimeConfig::parse(&conf)?,
            log: LogConfig::parse(&conf)?,
            data: DataConfig::parse(&conf)?,
            model: ModelConfig::parse(&conf)?,
            content: parse_content(&conf)?,
            latent: parse_latent(&conf)?,
        })
    }
}

impl RuntimeConfig {
    fn parse(conf: &Config) -> Result<RuntimeConfig> {
        // Detect number of CPUs
        let cpu_count: usize = sys_info::cpu_num()
            .ok()
            .and_then(|count| count.try_into().ok())
            .unwrap_or(1);
        Ok(RuntimeConfig {
            num_workers: setting(conf, "runtime", "num_workers", cpu_count)?.max(1),
        })
    }
}

impl LogConfig {
    fn parse(conf: &Config) -> Result<LogConfig> {
        Ok(LogConfig {
            level: setting(conf, "log", "level", DEFAULT_LOG_LEVEL.to_string())?,
        })
    }
}

impl DataConfig {
    fn parse(conf: &Config) -> Result<DataConfig> {
        let path = |key: &str| raw_value(conf, "data", key).filter(|value| !value.is_empty());
        Ok(DataConfig {
            membership_path: path("membership_path")
                .ok_or_else(|| RecoError::Config("data.membership_path is required".into()))?,
            edges_path: path("edges_path"),
            content_path: path("content_path"),
            query_path: path("query_path"),
            output_path: path("output_path"),
            holdout_path: path("holdout_path"),
            factors_path: path("factors_path"),
            user_map_path: path("user_map_path"),
            item_map_path: path("item_map_path"),
        })
    }
}

impl ModelConfig {
    fn parse(conf: &Config) -> Result<ModelConfig> {
        let defaults = ModelConfig::default();
        Ok(ModelConfig {
            neighborhood_size_k: setting(
                conf,
                "model",
                "neighborhood_size_k",
                defaults.neighborhood_size_k,
            )?,
            num_items_to_recommend: setting(
                conf,
                "model",
                "num_items_to_recommend",
                defaults.num_items_to_recommend,
            )?,
            min_edge_weight: setting(conf, "model", "min_edge_weight", defaults.min_edge_weight)?,
            weight_normalization: setting(
                conf,
                "model",
                "weight_normalization",
                defaults.weight_normalization,
            )?,
            exclude_known: setting(conf, "model", "exclude_known", defaults.exclude_known)?,
            backfill: setting(conf, "model", "backfill", defaults.backfill)?,
        })
    }
}

fn parse_content(conf: &Config) -> Result<ContentConfig> {
    let defaults = ContentConfig::default();
    Ok(ContentConfig {
        alpha: setting(conf, "content", "alpha", defaults.alpha)?,
        loc_exponent: setting(conf, "content", "loc_exponent", defaults.loc_exponent)?,
        min_norm: setting(conf, "content", "min_norm", defaults.min_norm)?,
        max_results: setting(conf, "content", "max_results", defaults.max_results)?,
        similarity: setting(conf, "content", "similarity", defaults.similarity)?,
        missing_prior: setting(conf, "content", "missing_prior", defaults.missing_prior)?,
    })
}

fn parse_latent(conf: &Config) -> Result<LatentConfig> {
    let defaults = LatentConfig::default();
    Ok(LatentConfig {
        rank: setting(conf, "latent", "rank", defaults.rank)?,
        user_weighting: setting(conf, "latent", "user_weighting", defaults.user_weighting)?,
        min_score: setting(conf, "latent", "min_score", defaults.min_score)?,
        num_items_to_recommend: setting(
            conf,
            "latent",
            "num_items_to_recommend",
            defaults.num_items_to_recommend,
        )?,
    })
}

#[cfg(test)]
mod config_test {
    use super::*;
    use crate::content::{MissingPrior, SimilarityMeasure};
    use crate::latent::UserWeighting;

    #[test]
    fn should_apply_defaults_for_missing_settings() {
        let config = AppConfig::from_reader(
            "data.membership_path = \"data/data.txt\"\n".as_bytes(),
            "test",
        )
        .unwrap();
        assert_eq!("data/data.txt", config.data.membership_path);
        assert_eq!(None, config.data.edges_path);
        assert_eq!(8, config.model.neighborhood_size_k);
        assert_eq!(10, config.model.num_items_to_recommend);
        assert_eq!(WeightNormalization::Raw, config.model.weight_normalization);
        assert!(!config.model.exclude_known);
        assert_eq!(100, config.content.max_results);
        assert_eq!(MissingPrior::UseSimilarity, config.content.missing_prior);
        assert_eq!(10, config.latent.num_items_to_recommend);
        assert!(config.runtime.num_workers >= 1);
    }

    #[test]
    fn should_read_configured_settings() {
        let text = "data.membership_path = data.txt\n\
                    data.edges_path = 'edges.dat'\n\
                    model.neighborhood_size_k = 3\n\
                    model.weight_normalization = cosine\n\
                    model.exclude_known = true\n\
                    content.similarity = mean_dot\n\
                    content.missing_prior = zero\n\
                    latent.user_weighting = inverse_sqrt\n\
                    latent.min_score = 0.05\n";
        let config = AppConfig::from_reader(text.as_bytes(), "test").unwrap();
        assert_eq!(Some("edges.dat".to_string()), config.data.edges_path);
        assert_eq!(3, config.model.neighborhood_size_k);
        assert_eq!(WeightNormalization::Cosine, config.model.weight_normalization);
        assert!(config.model.exclude_known);
        assert_eq!(SimilarityMeasure::MeanDot, config.content.similarity);
        assert_eq!(MissingPrior::Zero, config.content.missing_prior);
        assert_eq!(UserWeighting::InverseSqrtCount, config.latent.user_weighting);
        assert!((config.latent.min_score - 0.05).abs() < 1e-12);
    }

    #[test]
    fn should_reject_unknown_variant() {
        let text = "data.membership_path = data.txt\nmodel.weight_normalization = jaccard\n";
        assert!(AppConfig::from_reader(text.as_bytes(), "test").is_err());
    }
}
