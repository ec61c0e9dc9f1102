use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecoError>;

/// Errors surfaced by the readers, the configuration layer and the binaries.
///
/// The scoring core itself recovers locally from malformed records, cold-start
/// users and degenerate score maps; only the I/O wrappers return these.
#[derive(Debug, Error)]
pub enum RecoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed record at line {line}: {reason}")]
    Parse { line: u64, reason: String },
    #[error("no data for {0}")]
    MissingKey(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl RecoError {
    pub(crate) fn parse(line: u64, reason: impl Into<String>) -> Self {
        RecoError::Parse {
            line,
            reason: reason.into(),
        }
    }
}

/// A configuration string that names no known variant of a setting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);
