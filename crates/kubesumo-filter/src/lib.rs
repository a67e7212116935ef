//! Record enrichment and exclusion for kubesumo
//!
//! This crate attaches Sumo Logic routing metadata to Kubernetes log records,
//! drops records matching the configured exclusion rules, and keeps those
//! rules in sync with an optional hot-reloaded config file.

mod config;
mod engine;
mod error;
pub mod pod_name;
mod plugin;
mod rules;
mod store;
pub mod template;
mod watcher;

pub use config::{DEFAULT_POLL_INTERVAL_MS, FilterConfig};
pub use engine::{Enricher, FilterStats, StatsSnapshot, Verdict};
pub use error::{FilterError, Result};
pub use plugin::{PluginState, SumoFilter};
pub use rules::{DropReason, ExclusionConfig, ExclusionPattern, ExclusionRules};
pub use store::{RuleSnapshot, RuleSource, RuleStore};
pub use watcher::{ConfigWatcher, ExcludeFile, ReloadOutcome, WatchState, reload_exclude_config};

// Re-export types used in our public API
pub use kubesumo_types::{Record, SumoMetadata, WorkloadMetadata};
