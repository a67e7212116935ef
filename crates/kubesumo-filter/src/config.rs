use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FilterError, Result};
use crate::rules::ExclusionConfig;

/// Default poll interval for the external exclusion config file
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Static filter configuration, supplied once at configure time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Keep the `kubernetes` and `docker` blocks on forwarded records
    pub kubernetes_meta: bool,

    pub source_category: String,

    /// Every `-` in the final category is replaced with this
    pub source_category_replace_dash: String,

    pub source_category_prefix: String,
    pub source_name: String,
    pub log_format: String,
    pub source_host: String,

    #[serde(flatten)]
    pub exclude: ExclusionConfig,

    /// YAML file with exclusion patterns, watched for changes
    pub exclude_config_path: Option<PathBuf>,

    pub exclude_config_poll_interval_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kubernetes_meta: true,
            source_category: "%{namespace}/%{pod_name}".to_string(),
            source_category_replace_dash: "/".to_string(),
            source_category_prefix: "kubernetes/".to_string(),
            source_name: "%{namespace}.%{pod}.%{container}".to_string(),
            log_format: "json".to_string(),
            source_host: String::new(),
            exclude: ExclusionConfig::default(),
            exclude_config_path: None,
            exclude_config_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl FilterConfig {
    /// Path of the external exclusion config, if one is configured
    pub fn exclude_config_path(&self) -> Option<&Path> {
        self.exclude_config_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.exclude_config_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exclude_config_poll_interval_ms == 0 {
            return Err(FilterError::Config(
                "exclude_config_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
