use std::sync::Arc;

use tracing::info;

use kubesumo_types::Record;

use crate::config::FilterConfig;
use crate::engine::{Enricher, StatsSnapshot, Verdict};
use crate::error::Result;
use crate::rules::ExclusionRules;
use crate::store::RuleStore;
use crate::watcher::{ConfigWatcher, WatchState, reload_exclude_config};

/// Where the filter is in its host-driven lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginState {
    Configured,
    Running,
    Stopped,
}

/// The filter as seen by a host pipeline: configure, start, filter records,
/// shut down.
pub struct SumoFilter {
    enricher: Enricher,
    store: Arc<RuleStore>,
    watcher: Option<ConfigWatcher>,
    state: PluginState,
}

impl SumoFilter {
    /// Compile the static rules and, if configured, load the external
    /// exclusion file once.
    ///
    /// Fails only on invalid static configuration; problems with the external
    /// file are logged and leave the static rules in place.
    pub fn configure(config: FilterConfig) -> Result<Self> {
        config.validate()?;

        let rules = ExclusionRules::compile(&config.exclude)?;
        let store = Arc::new(RuleStore::new(rules));

        // polling begins before the first load so no edit in between is missed
        let watcher = config.exclude_config_path().map(|path| {
            let watcher = ConfigWatcher::new(
                path,
                config.poll_interval(),
                config.exclude.clone(),
                Arc::clone(&store),
            );
            reload_exclude_config(path, &config.exclude, &store);
            watcher
        });

        info!(
            kubernetes_meta = config.kubernetes_meta,
            source_category = %config.source_category,
            watching = watcher.is_some(),
            "configured kubernetes sumologic filter"
        );

        Ok(Self {
            enricher: Enricher::new(Arc::new(config), Arc::clone(&store)),
            store,
            watcher,
            state: PluginState::Configured,
        })
    }

    /// Begin watching the external exclusion file, if there is one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.state != PluginState::Configured {
            return;
        }
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.start();
        }
        self.state = PluginState::Running;
    }

    /// Stop the watcher. Filtering keeps working with the last published
    /// rules.
    pub async fn shutdown(&mut self) {
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.stop().await;
        }
        self.state = PluginState::Stopped;
        info!(stats = ?self.stats(), "kubernetes sumologic filter stopped");
    }

    pub fn filter(&self, record: &mut Record) -> Verdict {
        self.enricher.filter(record)
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn watch_state(&self) -> WatchState {
        self.watcher
            .as_ref()
            .map_or(WatchState::Unloaded, ConfigWatcher::state)
    }

    pub fn rule_store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn config(&self) -> &FilterConfig {
        self.enricher.config()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.enricher.stats()
    }
}
