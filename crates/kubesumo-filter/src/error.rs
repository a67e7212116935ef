use std::path::PathBuf;

/// Errors raised while configuring the filter or loading exclusion rules
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid {field} pattern {pattern:?}: {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FilterError>;
