//! Hot reload of exclusion rules from an external YAML file.
//!
//! A [`notify::PollWatcher`] scans the file's directory on a fixed interval.
//! When the file appears, disappears or its modification time or contents
//! change, it is re-read and a freshly compiled rule set is published to the
//! [`RuleStore`]. Any failure keeps the previously published rules.

use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventHandler, EventKind, PollWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{FilterError, Result};
use crate::rules::{ExclusionConfig, ExclusionRules};
use crate::store::{RuleSource, RuleStore};

/// Recognized keys of the external exclusion config file
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExcludeFile {
    pub exclude_namespace_regex: Option<String>,
    pub exclude_pod_regex: Option<String>,
    pub exclude_container_regex: Option<String>,
    pub exclude_host_regex: Option<String>,
}

impl ExcludeFile {
    /// Parse file contents. Empty or null documents yield `None`.
    pub fn parse(path: &Path, contents: &str) -> Result<Option<Self>> {
        let yaml_err = |source| FilterError::Yaml {
            path: path.to_path_buf(),
            source,
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }
        let value: serde_yaml::Value = serde_yaml::from_str(contents).map_err(yaml_err)?;
        if value.is_null() {
            return Ok(None);
        }
        serde_yaml::from_value(value).map(Some).map_err(yaml_err)
    }

    /// Overlay onto `base`. Keys absent from the file clear that rule; the
    /// journald rules always come from `base`.
    pub fn merge(self, base: &ExclusionConfig) -> ExclusionConfig {
        ExclusionConfig {
            exclude_namespace_regex: self.exclude_namespace_regex.unwrap_or_default(),
            exclude_pod_regex: self.exclude_pod_regex.unwrap_or_default(),
            exclude_container_regex: self.exclude_container_regex.unwrap_or_default(),
            exclude_host_regex: self.exclude_host_regex.unwrap_or_default(),
            ..base.clone()
        }
    }
}

/// Result of one reload attempt
#[derive(Debug)]
pub enum ReloadOutcome {
    /// New rules were published with this generation
    Applied { generation: u64 },
    /// The file does not exist
    Missing,
    /// The file holds no document
    Empty,
    /// The file could not be read, parsed or compiled
    Rejected(FilterError),
}

impl ReloadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Load the exclusion config at `path` and publish it into `store`.
///
/// Never fails: anything short of a valid file leaves `store` untouched.
pub fn reload_exclude_config(
    path: &Path,
    base: &ExclusionConfig,
    store: &RuleStore,
) -> ReloadOutcome {
    info!(path = %path.display(), "attempting to load exclude config");

    if !path.is_file() {
        info!(path = %path.display(), "could not load exclude config, file does not exist");
        return ReloadOutcome::Missing;
    }

    let loaded = fs::read_to_string(path)
        .map_err(|source| FilterError::Io {
            path: path.to_path_buf(),
            source,
        })
        .and_then(|contents| ExcludeFile::parse(path, &contents));

    let file = match loaded {
        Ok(Some(file)) => file,
        Ok(None) => {
            info!(path = %path.display(), "exclude config is empty, keeping current rules");
            return ReloadOutcome::Empty;
        }
        Err(e) => {
            warn!(error = %e, "failed to load exclude config, keeping current rules");
            return ReloadOutcome::Rejected(e);
        }
    };
    debug!(?file, "parsed exclude config");

    match ExclusionRules::compile(&file.merge(base)) {
        Ok(rules) => {
            let snapshot = store.publish(rules, RuleSource::File(path.to_path_buf()));
            ReloadOutcome::Applied {
                generation: snapshot.generation,
            }
        }
        Err(e) => {
            warn!(error = %e, "invalid pattern in exclude config, keeping current rules");
            ReloadOutcome::Rejected(e)
        }
    }
}

/// Lifecycle of the watched exclusion config
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchState {
    /// No active watcher; rules stay at their last published values
    Unloaded,
    /// Watching for changes
    Loaded,
    /// A change was detected and the file is being applied
    Reloading,
    /// Shut down; no further reloads
    Stopped,
}

/// Turns poll events for the config directory into reload requests for one
/// file.
struct ChangeForwarder {
    file_name: OsString,
    changes: mpsc::Sender<()>,

    /// Last poll error reported, so a persistent failure is logged once
    last_error: Option<String>,
}

impl ChangeForwarder {
    fn touches_file(&self, event: &Event) -> bool {
        !matches!(event.kind, EventKind::Access(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(self.file_name.as_os_str()))
    }

    /// Whether `e` differs from the last reported error
    fn note_error(&mut self, e: &notify::Error) -> bool {
        let message = e.to_string();
        if self.last_error.as_deref() == Some(message.as_str()) {
            return false;
        }
        self.last_error = Some(message);
        true
    }
}

impl EventHandler for ChangeForwarder {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        match event {
            Ok(event) if self.touches_file(&event) => {
                self.last_error = None;
                // a full channel already holds a pending reload
                let _ = self.changes.try_send(());
            }
            Ok(_) => {}
            Err(e) => {
                if self.note_error(&e) {
                    error!(error = %e, "unexpected error while checking exclude config");
                }
            }
        }
    }
}

/// Poll the directory holding `path`, so the file may be created, removed or
/// replaced by rename.
fn poll_file(
    path: &Path,
    interval: Duration,
    changes: mpsc::Sender<()>,
) -> notify::Result<PollWatcher> {
    let file_name = path
        .file_name()
        .ok_or_else(|| notify::Error::generic("exclude config path has no file name"))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    // the poller accepts a missing root and then never reports on it
    if !dir.is_dir() {
        return Err(notify::Error::path_not_found().add_path(dir.to_path_buf()));
    }

    let forwarder = ChangeForwarder {
        file_name: file_name.to_os_string(),
        changes,
        last_error: None,
    };
    let config = notify::Config::default()
        .with_poll_interval(interval)
        .with_compare_contents(true);

    let mut poller = PollWatcher::new(forwarder, config)?;
    poller.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(poller)
}

/// Background task that keeps the [`RuleStore`] in sync with a config file
pub struct ConfigWatcher {
    path: PathBuf,

    /// Static rules the file is overlaid onto
    base: ExclusionConfig,

    store: Arc<RuleStore>,
    state: Arc<Mutex<WatchState>>,

    /// Polls the config directory; dropping it stops polling
    poller: Option<PollWatcher>,

    /// Change notifications from the poller, handed to the task on start
    changes: Option<mpsc::Receiver<()>>,

    /// Cancellation token for stopping the reload loop
    cancel: CancellationToken,

    task: Option<tokio::task::JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Begin polling `path` right away. Changes seen before [`start`] are
    /// applied as soon as it runs.
    ///
    /// [`start`]: ConfigWatcher::start
    pub fn new(
        path: impl Into<PathBuf>,
        interval: Duration,
        base: ExclusionConfig,
        store: Arc<RuleStore>,
    ) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::channel(1);

        let poller = match poll_file(&path, interval, tx) {
            Ok(poller) => {
                info!(path = %path.display(), interval_ms = interval.as_millis() as u64, "watching exclude config");
                Some(poller)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to watch exclude config, hot reload disabled");
                None
            }
        };

        Self {
            path,
            base,
            store,
            state: Arc::new(Mutex::new(WatchState::Unloaded)),
            poller,
            changes: Some(rx),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Spawn the reload loop on the current tokio runtime.
    ///
    /// Does nothing on a running or stopped watcher, or when polling could
    /// not be set up.
    pub fn start(&mut self) {
        if self.task.is_some() || self.cancel.is_cancelled() || self.poller.is_none() {
            return;
        }
        let Some(mut changes) = self.changes.take() else {
            return;
        };

        let path = self.path.clone();
        let base = self.base.clone();
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();

        *state.lock() = WatchState::Loaded;

        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,

                    change = changes.recv() => {
                        if change.is_none() {
                            // poller dropped
                            break;
                        }

                        info!(path = %path.display(), "config file change detected");
                        *state.lock() = WatchState::Reloading;

                        let reload_path = path.clone();
                        let reload_base = base.clone();
                        let reload_store = Arc::clone(&store);
                        let result = tokio::task::spawn_blocking(move || {
                            reload_exclude_config(&reload_path, &reload_base, &reload_store)
                        })
                        .await;

                        match result {
                            Ok(outcome) => debug!(applied = outcome.is_applied(), ?outcome, "exclude config reload finished"),
                            Err(e) => error!(error = %e, "exclude config reload task failed"),
                        }
                        *state.lock() = WatchState::Loaded;
                    }
                }
            }

            *state.lock() = WatchState::Stopped;
            debug!(path = %path.display(), "exclude config watcher stopped");
        }));
    }

    /// Stop polling and wait for the reload loop to exit
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.poller = None;
        self.changes = None;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "exclude config watcher exited abnormally");
            }
        }
        *self.state.lock() = WatchState::Stopped;
    }

    pub fn state(&self) -> WatchState {
        *self.state.lock()
    }

    /// Check if the reload loop is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
