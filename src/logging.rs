use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{RecoError, Result};

/// Install the global fmt subscriber. Log lines go to stderr so that suggestion
/// output on stdout stays machine readable.
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| RecoError::Config(format!("invalid log level '{}': {}", level, e)))?;
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|_| RecoError::Config("logging already initialized".into()))
}
