//! Integration config errors

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("cannot read integration config {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for the expected layout
    #[error("invalid integration config {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A setting is out of its allowed range
    #[error("setting '{key}' {reason}")]
    InvalidValue { key: String, reason: String },
}
