use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use kubesumo_types::{Record, WorkloadMetadata, field_text, keys};

use crate::error::{FilterError, Result};

/// Exclusion patterns as configured, one per dimension.
///
/// An empty string means no rule for that dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    pub exclude_namespace_regex: String,
    pub exclude_pod_regex: String,
    pub exclude_container_regex: String,
    pub exclude_host_regex: String,
    pub exclude_facility_regex: String,
    pub exclude_priority_regex: String,
    pub exclude_unit_regex: String,
}

/// Which rule caused a record to be dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropReason {
    Unit,
    Facility,
    Priority,
    Host,
    Namespace,
    Pod,
    Container,
    /// `sumologic.com/exclude: "true"` on the pod
    Annotation,
}

impl DropReason {
    pub const ALL: [DropReason; 8] = [
        Self::Unit,
        Self::Facility,
        Self::Priority,
        Self::Host,
        Self::Namespace,
        Self::Pod,
        Self::Container,
        Self::Annotation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Facility => "facility",
            Self::Priority => "priority",
            Self::Host => "host",
            Self::Namespace => "namespace",
            Self::Pod => "pod",
            Self::Container => "container",
            Self::Annotation => "annotation",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single compiled exclusion pattern
#[derive(Clone)]
pub struct ExclusionPattern {
    /// Compiled regex, `None` when the pattern is empty
    regex: Option<Regex>,

    /// Original pattern string
    pattern: String,
}

impl ExclusionPattern {
    /// Compile a pattern; `field` names the setting in error messages
    pub fn new(field: &'static str, pattern: &str) -> Result<Self> {
        let regex = if pattern.is_empty() {
            None
        } else {
            let re = Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
                field,
                pattern: pattern.to_string(),
                source,
            })?;
            Some(re)
        };

        Ok(Self {
            regex,
            pattern: pattern.to_string(),
        })
    }

    /// Unanchored match. An empty pattern or a missing value never matches.
    pub fn matches(&self, value: Option<&str>) -> bool {
        match (&self.regex, value) {
            (Some(re), Some(v)) => re.is_match(v),
            _ => false,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for ExclusionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExclusionPattern").field(&self.pattern).finish()
    }
}

/// Compiled exclusion rules for every dimension.
///
/// Never mutated after construction; a reload builds a new value.
#[derive(Clone, Debug)]
pub struct ExclusionRules {
    namespace: ExclusionPattern,
    pod: ExclusionPattern,
    container: ExclusionPattern,
    host: ExclusionPattern,
    facility: ExclusionPattern,
    priority: ExclusionPattern,
    unit: ExclusionPattern,
}

impl ExclusionRules {
    /// Compile every pattern, failing on the first invalid one
    pub fn compile(config: &ExclusionConfig) -> Result<Self> {
        Ok(Self {
            namespace: ExclusionPattern::new(
                "exclude_namespace_regex",
                &config.exclude_namespace_regex,
            )?,
            pod: ExclusionPattern::new("exclude_pod_regex", &config.exclude_pod_regex)?,
            container: ExclusionPattern::new(
                "exclude_container_regex",
                &config.exclude_container_regex,
            )?,
            host: ExclusionPattern::new("exclude_host_regex", &config.exclude_host_regex)?,
            facility: ExclusionPattern::new(
                "exclude_facility_regex",
                &config.exclude_facility_regex,
            )?,
            priority: ExclusionPattern::new(
                "exclude_priority_regex",
                &config.exclude_priority_regex,
            )?,
            unit: ExclusionPattern::new("exclude_unit_regex", &config.exclude_unit_regex)?,
        })
    }

    /// Rules that never drop anything
    pub fn empty() -> Self {
        // empty patterns skip regex compilation entirely
        let none = || ExclusionPattern {
            regex: None,
            pattern: String::new(),
        };
        Self {
            namespace: none(),
            pod: none(),
            container: none(),
            host: none(),
            facility: none(),
            priority: none(),
            unit: none(),
        }
    }

    /// The source patterns these rules were compiled from
    pub fn config(&self) -> ExclusionConfig {
        ExclusionConfig {
            exclude_namespace_regex: self.namespace.pattern().to_string(),
            exclude_pod_regex: self.pod.pattern().to_string(),
            exclude_container_regex: self.container.pattern().to_string(),
            exclude_host_regex: self.host.pattern().to_string(),
            exclude_facility_regex: self.facility.pattern().to_string(),
            exclude_priority_regex: self.priority.pattern().to_string(),
            exclude_unit_regex: self.unit.pattern().to_string(),
        }
    }

    /// Check journald fields: unit, facility, priority, then host.
    ///
    /// Only applies to records carrying a non-empty `_SYSTEMD_UNIT`.
    pub fn check_journal(&self, record: &Record) -> Option<DropReason> {
        let unit = field_text(record, keys::SYSTEMD_UNIT).filter(|u| !u.is_empty())?;

        if self.unit.matches(Some(unit.as_ref())) {
            return Some(DropReason::Unit);
        }
        if self
            .facility
            .matches(field_text(record, keys::SYSLOG_FACILITY).as_deref())
        {
            return Some(DropReason::Facility);
        }
        if self
            .priority
            .matches(field_text(record, keys::PRIORITY).as_deref())
        {
            return Some(DropReason::Priority);
        }
        if self
            .host
            .matches(field_text(record, keys::HOSTNAME).as_deref())
        {
            return Some(DropReason::Host);
        }
        None
    }

    /// Check workload metadata: namespace, pod, container, then host
    pub fn check_workload(&self, meta: &WorkloadMetadata) -> Option<DropReason> {
        if self.namespace.matches(meta.namespace.as_deref()) {
            return Some(DropReason::Namespace);
        }
        if self.pod.matches(meta.pod.as_deref()) {
            return Some(DropReason::Pod);
        }
        if self.container.matches(meta.container.as_deref()) {
            return Some(DropReason::Container);
        }
        if self.host.matches(meta.source_host.as_deref()) {
            return Some(DropReason::Host);
        }
        None
    }
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self::empty()
    }
}
