use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use kubesumo_types::{Record, SumoMetadata, WorkloadMetadata, annotations, field_text, keys};

use crate::config::FilterConfig;
use crate::pod_name;
use crate::rules::DropReason;
use crate::store::RuleStore;
use crate::template::render;

/// Outcome of filtering one record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the (now enriched) record
    Keep,
    Drop(DropReason),
}

/// Annotation values read off a pod before the record is mutated
#[derive(Debug, Default)]
struct Overrides {
    exclude: bool,
    format: Option<String>,
    source_host: Option<String>,
    source_name: Option<String>,
    source_category: Option<String>,
    strip_kubernetes_meta: bool,
}

impl Overrides {
    fn from_kubernetes(block: &Map<String, Value>) -> Self {
        let Some(pod_annotations) = block.get(keys::ANNOTATIONS).and_then(Value::as_object) else {
            return Self::default();
        };
        let get = |key: &str| field_text(pod_annotations, key).map(Cow::into_owned);

        Self {
            exclude: get(annotations::EXCLUDE).is_some_and(|v| v == "true"),
            format: get(annotations::FORMAT),
            source_host: get(annotations::SOURCE_HOST),
            source_name: get(annotations::SOURCE_NAME),
            source_category: get(annotations::SOURCE_CATEGORY),
            strip_kubernetes_meta: get(annotations::KUBERNETES_META).is_some_and(|v| v == "false"),
        }
    }
}

/// Enriches records with Sumo Logic metadata and drops excluded ones.
///
/// Holds no per-record state; one instance serves any number of threads.
pub struct Enricher {
    config: Arc<FilterConfig>,
    store: Arc<RuleStore>,
    stats: FilterStats,
}

impl Enricher {
    pub fn new(config: Arc<FilterConfig>, store: Arc<RuleStore>) -> Self {
        Self {
            config,
            store,
            stats: FilterStats::default(),
        }
    }

    /// Enrich `record` in place, or decide to drop it.
    ///
    /// A dropped record may already carry `_sumo_metadata`.
    pub fn filter(&self, record: &mut Record) -> Verdict {
        let verdict = self.process(record);
        match verdict {
            Verdict::Keep => self.stats.record_keep(),
            Verdict::Drop(reason) => {
                debug!(%reason, "dropping record");
                self.stats.record_drop(reason);
            }
        }
        verdict
    }

    fn process(&self, record: &mut Record) -> Verdict {
        let config = &self.config;

        let mut sumo = SumoMetadata {
            log_format: config.log_format.clone(),
            host: config.source_host.clone(),
            source: config.source_name.clone(),
            category: format!("{}{}", config.source_category_prefix, config.source_category),
        };
        sumo.attach(record);

        // one snapshot for the whole record
        let snapshot = self.store.snapshot();
        let rules = &snapshot.rules;

        if let Some(reason) = rules.check_journal(record) {
            return Verdict::Drop(reason);
        }

        let Some(Value::Object(kubernetes)) = record.get(keys::KUBERNETES) else {
            return Verdict::Keep;
        };

        let mut meta = WorkloadMetadata::from_kubernetes(kubernetes);
        if let Some(reason) = rules.check_workload(&meta) {
            return Verdict::Drop(reason);
        }
        meta.pod_name = meta.pod.as_deref().map(pod_name::normalize);

        let overrides = Overrides::from_kubernetes(kubernetes);
        if overrides.exclude {
            return Verdict::Drop(DropReason::Annotation);
        }

        if let Some(format) = overrides.format {
            sumo.log_format = format;
        }
        sumo.host = render(overrides.source_host.as_deref().unwrap_or(&sumo.host), &meta);
        sumo.source = render(overrides.source_name.as_deref().unwrap_or(&sumo.source), &meta);

        let category = match overrides.source_category.as_deref() {
            Some(template) => format!("{}{}", config.source_category_prefix, render(template, &meta)),
            None => render(&sumo.category, &meta),
        };
        sumo.category = category.replace('-', &config.source_category_replace_dash);
        sumo.attach(record);

        if overrides.strip_kubernetes_meta || !config.kubernetes_meta {
            record.remove(keys::DOCKER);
            record.remove(keys::KUBERNETES);
        } else if let Some(Value::Object(kubernetes)) = record.get_mut(keys::KUBERNETES) {
            kubernetes.remove(keys::ANNOTATIONS);
        }

        Verdict::Keep
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Lock-free record counters
#[derive(Debug, Default)]
pub struct FilterStats {
    kept: AtomicU64,
    dropped: [AtomicU64; DropReason::ALL.len()],
}

impl FilterStats {
    fn record_keep(&self) {
        self.kept.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drop(&self, reason: DropReason) {
        self.dropped[reason as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let dropped = DropReason::ALL
            .iter()
            .map(|&reason| (reason, self.dropped[reason as usize].load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();

        StatsSnapshot {
            kept: self.kept.load(Ordering::Relaxed),
            dropped,
        }
    }
}

/// Point-in-time record counts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub kept: u64,

    /// Drops per reason; reasons with no drops are absent
    pub dropped: HashMap<DropReason, u64>,
}

impl StatsSnapshot {
    pub fn dropped_total(&self) -> u64 {
        self.dropped.values().sum()
    }

    pub fn total(&self) -> u64 {
        self.kept + self.dropped_total()
    }
}
