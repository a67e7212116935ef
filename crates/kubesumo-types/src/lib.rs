//! Shared types for kubesumo
//!
//! This crate contains the record vocabulary used by the filter crate and the
//! host binary: reserved record keys, annotation names, and the per-record
//! metadata views.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// A single log record as delivered by the host pipeline
pub type Record = Map<String, Value>;

// ============================================================================
// Reserved Keys
// ============================================================================

/// Top-level and nested record keys the filter reads or writes
pub mod keys {
    /// Orchestrator metadata block
    pub const KUBERNETES: &str = "kubernetes";
    /// Container runtime metadata block
    pub const DOCKER: &str = "docker";
    /// Output side-channel consumed by the Sumo Logic output
    pub const SUMO_METADATA: &str = "_sumo_metadata";

    pub const NAMESPACE_NAME: &str = "namespace_name";
    pub const POD_NAME: &str = "pod_name";
    pub const CONTAINER_NAME: &str = "container_name";
    pub const HOST: &str = "host";
    pub const ANNOTATIONS: &str = "annotations";

    // journald fields
    pub const SYSTEMD_UNIT: &str = "_SYSTEMD_UNIT";
    pub const SYSLOG_FACILITY: &str = "SYSLOG_FACILITY";
    pub const PRIORITY: &str = "PRIORITY";
    pub const HOSTNAME: &str = "_HOSTNAME";
}

/// Pod annotations that control enrichment
pub mod annotations {
    pub const EXCLUDE: &str = "sumologic.com/exclude";
    pub const FORMAT: &str = "sumologic.com/format";
    pub const SOURCE_HOST: &str = "sumologic.com/sourceHost";
    pub const SOURCE_NAME: &str = "sumologic.com/sourceName";
    pub const SOURCE_CATEGORY: &str = "sumologic.com/sourceCategory";
    pub const KUBERNETES_META: &str = "sumologic.com/kubernetes_meta";
}

/// Textual form of a scalar record value.
///
/// Strings are borrowed, numbers and booleans are formatted. Null, arrays and
/// objects have no textual form and yield `None`.
pub fn value_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Textual form of `map[key]`, if present and scalar
pub fn field_text<'a>(map: &'a Map<String, Value>, key: &str) -> Option<Cow<'a, str>> {
    map.get(key).and_then(value_text)
}

// ============================================================================
// Workload Metadata
// ============================================================================

/// Identifying attributes of the workload that emitted a record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadMetadata {
    pub namespace: Option<String>,

    /// Raw pod name as reported by the orchestrator
    pub pod: Option<String>,

    /// Pod name with generated replica suffixes removed
    pub pod_name: Option<String>,

    pub container: Option<String>,

    /// Node the pod runs on
    pub source_host: Option<String>,
}

impl WorkloadMetadata {
    /// Build from a `kubernetes` block, leaving `pod_name` unset
    pub fn from_kubernetes(block: &Map<String, Value>) -> Self {
        let text = |key: &str| field_text(block, key).map(Cow::into_owned);
        Self {
            namespace: text(keys::NAMESPACE_NAME),
            pod: text(keys::POD_NAME),
            pod_name: None,
            container: text(keys::CONTAINER_NAME),
            source_host: text(keys::HOST),
        }
    }

    /// Look up a field by its template placeholder name
    pub fn get(&self, name: &str) -> Option<&str> {
        let field = match name {
            "namespace" => &self.namespace,
            "pod" => &self.pod,
            "pod_name" => &self.pod_name,
            "container" => &self.container,
            "source_host" => &self.source_host,
            _ => return None,
        };
        field.as_deref()
    }
}

// ============================================================================
// Sumo Metadata
// ============================================================================

/// Routing metadata attached to every record under `_sumo_metadata`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumoMetadata {
    pub log_format: String,
    pub host: String,
    pub source: String,
    pub category: String,
}

impl SumoMetadata {
    /// Write the fields into the record's side-channel object.
    ///
    /// A missing or non-object side-channel is replaced with a fresh object;
    /// unrelated keys already present in it are kept.
    pub fn attach(&self, record: &mut Record) {
        let slot = record
            .entry(keys::SUMO_METADATA)
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(map) = slot {
            map.insert("log_format".into(), Value::String(self.log_format.clone()));
            map.insert("host".into(), Value::String(self.host.clone()));
            map.insert("source".into(), Value::String(self.source.clone()));
            map.insert("category".into(), Value::String(self.category.clone()));
        }
    }

    /// Read the side-channel back out of a record
    pub fn from_record(record: &Record) -> Option<Self> {
        record
            .get(keys::SUMO_METADATA)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&json!("6")).as_deref(), Some("6"));
        assert_eq!(value_text(&json!(6)).as_deref(), Some("6"));
        assert_eq!(value_text(&json!(true)).as_deref(), Some("true"));
        assert!(value_text(&json!(null)).is_none());
        assert!(value_text(&json!({"a": 1})).is_none());
    }

    #[test]
    fn test_workload_from_kubernetes() {
        let block = json!({
            "namespace_name": "prod",
            "pod_name": "web-7d4b9c7c99-abc12",
            "container_name": "nginx",
            "host": "node-1",
        });
        let meta = WorkloadMetadata::from_kubernetes(block.as_object().unwrap());
        assert_eq!(meta.get("namespace"), Some("prod"));
        assert_eq!(meta.get("pod"), Some("web-7d4b9c7c99-abc12"));
        assert_eq!(meta.get("pod_name"), None);
        assert_eq!(meta.get("source_host"), Some("node-1"));
        assert_eq!(meta.get("labels"), None);
    }

    #[test]
    fn test_attach_keeps_unrelated_keys() {
        let mut record: Record = json!({"_sumo_metadata": {"fields": "x=1"}})
            .as_object()
            .unwrap()
            .clone();
        let meta = SumoMetadata {
            log_format: "json".into(),
            host: "h".into(),
            source: "s".into(),
            category: "c".into(),
        };
        meta.attach(&mut record);

        assert_eq!(record["_sumo_metadata"]["fields"], "x=1");
        assert_eq!(SumoMetadata::from_record(&record), Some(meta));
    }

    #[test]
    fn test_attach_replaces_non_object() {
        let mut record: Record = json!({"_sumo_metadata": "junk"}).as_object().unwrap().clone();
        SumoMetadata::default().attach(&mut record);
        assert!(record["_sumo_metadata"].is_object());
    }
}
