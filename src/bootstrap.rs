use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::AppConfig;
use crate::error::{RecoError, Result};
use crate::logging;

/// Shared start-up of the binaries: configuration from the path given as first
/// argument, logging, and the global rayon pool.
pub fn init() -> Result<AppConfig> {
    let config_path = std::env::args().nth(1).unwrap_or_default();
    let config = AppConfig::new(&config_path)?;
    logging::init(&config.log.level)?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.runtime.num_workers)
        .build_global()
        .map_err(|e| RecoError::Config(format!("unable to start worker pool: {}", e)))?;
    info!(
        "configured from '{}' with {} workers",
        config_path, config.runtime.num_workers
    );
    Ok(config)
}

pub fn progress_bar(len: usize) -> ProgressBar {
    let progress = ProgressBar::new(len as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{elapsed_precise} [{bar:40}] {pos}/{len} users ({eta})")
            .progress_chars("=> "),
    );
    progress
}
