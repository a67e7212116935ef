use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::rules::ExclusionRules;

/// Where a published rule set came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleSource {
    /// Static plugin configuration
    Static,
    /// External exclusion config file
    File(PathBuf),
}

/// An immutable, published rule set
#[derive(Debug)]
pub struct RuleSnapshot {
    pub rules: ExclusionRules,

    /// Increases by one on every publish
    pub generation: u64,

    pub loaded_at: DateTime<Utc>,

    pub source: RuleSource,
}

/// Holder of the current exclusion rules.
///
/// Readers take an `Arc` snapshot without locking. Writers build a complete
/// rule set and swap it in whole; publishes are serialized so generations
/// stay ordered.
pub struct RuleStore {
    current: ArcSwap<RuleSnapshot>,

    /// Serializes publishers
    publish_lock: Mutex<()>,
}

impl RuleStore {
    /// Create a store holding `rules` as generation 0
    pub fn new(rules: ExclusionRules) -> Self {
        Self {
            current: ArcSwap::from_pointee(RuleSnapshot {
                rules,
                generation: 0,
                loaded_at: Utc::now(),
                source: RuleSource::Static,
            }),
            publish_lock: Mutex::new(()),
        }
    }

    /// The current rule set
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.current.load_full()
    }

    /// Replace the current rule set, returning the new snapshot
    pub fn publish(&self, rules: ExclusionRules, source: RuleSource) -> Arc<RuleSnapshot> {
        let _guard = self.publish_lock.lock();
        let generation = self.current.load().generation + 1;
        let snapshot = Arc::new(RuleSnapshot {
            rules,
            generation,
            loaded_at: Utc::now(),
            source,
        });
        self.current.store(Arc::clone(&snapshot));

        info!(
            generation,
            source = ?snapshot.source,
            rules = ?snapshot.rules.config(),
            "published exclusion rules"
        );
        snapshot
    }

    /// Generation of the current rule set
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(ExclusionRules::empty())
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("generation", &self.generation())
            .finish()
    }
}
