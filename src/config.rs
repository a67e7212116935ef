//! Config file loading for the kubesumo binary

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kubesumo_filter::FilterConfig;

/// Contents of the TOML config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Settings for the record filter
    pub filter: FilterConfig,
}

impl AppConfig {
    /// Load the config file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply command line overrides on top of the file
    pub fn apply_overrides(
        &mut self,
        exclude_config: Option<PathBuf>,
        poll_interval_ms: Option<u64>,
        no_kubernetes_meta: bool,
    ) {
        if let Some(path) = exclude_config {
            self.filter.exclude_config_path = Some(path);
        }
        if let Some(ms) = poll_interval_ms {
            self.filter.exclude_config_poll_interval_ms = ms;
        }
        if no_kubernetes_meta {
            self.filter.kubernetes_meta = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kubesumo.toml");
        fs::write(
            &path,
            r#"
[filter]
source_category = "%{namespace}/%{container}"
source_category_prefix = "k8s/prod/"
exclude_namespace_regex = "kube-system|monitoring"
exclude_config_path = "/etc/kubesumo/exclude.yaml"
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.filter.source_category, "%{namespace}/%{container}");
        assert_eq!(config.filter.source_category_prefix, "k8s/prod/");
        assert_eq!(
            config.filter.exclude.exclude_namespace_regex,
            "kube-system|monitoring"
        );
        assert_eq!(config.filter.log_format, "json");
        assert!(config.filter.exclude_config_path().is_some());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = AppConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config file"));
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(Some("/tmp/exclude.yaml".into()), Some(250), true);
        assert!(!config.filter.kubernetes_meta);
        assert_eq!(config.filter.exclude_config_poll_interval_ms, 250);
        assert_eq!(
            config.filter.exclude_config_path(),
            Some(Path::new("/tmp/exclude.yaml"))
        );
    }
}
