use arc_swap::ArcSwap;
use regex::Regex;
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use std::collections::HashSet;
use std::sync::Arc;

/// On-disk shape of the embedded redaction config (spec.md §4.5
/// "Redaction config lifecycle"): a list of sensitive field names and a
/// list of regexes over string values.
#[derive(Debug, Deserialize)]
struct RawPolicy {
    #[serde(default)]
    sensitive_keys: Vec<String>,
    #[serde(default)]
    sensitive_value_patterns: Vec<String>,
    /// Hostnames whose listed paths are excluded from the repro-eligible
    /// check (spec.md §4.4 policy gate).
    #[serde(default)]
    cloud_api_exclusions: Vec<CloudApiExclusion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudApiExclusion {
    pub host: String,
    pub paths: Vec<String>,
}

/// A set of lowercase-normalized sensitive field names and a list of
/// compiled regular expressions over string values (spec.md §3). Loaded
/// once at startup from an embedded config; may be refreshed
/// periodically per-service from the ingestion service
/// (`GetDynamicAgentConfig`, spec.md §6) via [`PolicyStore`].
#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    sensitive_keys: HashSet<String>,
    sensitive_value_regexes: Vec<Regex>,
    cloud_api_exclusions: Vec<CloudApiExclusion>,
}

#[derive(Debug, Snafu)]
pub enum PolicyError {
    #[snafu(display("failed to parse redaction policy: {source}"))]
    Parse { source: serde_yaml::Error },
    #[snafu(display("sensitive-value regex {pattern:?} failed to compile: {source}"))]
    BadRegex { pattern: String, source: regex::Error },
}

const EMBEDDED_POLICY_YAML: &str = include_str!("../config/redaction_policy.yaml");

impl RedactionPolicy {
    /// Loads the embedded default policy. Each regex must compile;
    /// failure here is fatal at startup per spec.md §4.5 (this content
    /// is agent-controlled, not user input, so a bad regex is a build
    /// defect, not a runtime condition to recover from).
    pub fn load_embedded() -> Result<Self, PolicyError> {
        Self::parse(EMBEDDED_POLICY_YAML)
    }

    pub fn parse(yaml: &str) -> Result<Self, PolicyError> {
        let raw: RawPolicy = serde_yaml::from_str(yaml).context(ParseSnafu)?;
        let sensitive_keys = raw
            .sensitive_keys
            .into_iter()
            .map(|k| k.to_lowercase())
            .collect();
        let sensitive_value_regexes = raw
            .sensitive_value_patterns
            .into_iter()
            .map(|pattern| {
                Regex::new(&pattern).context(BadRegexSnafu {
                    pattern: pattern.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sensitive_keys,
            sensitive_value_regexes,
            cloud_api_exclusions: raw.cloud_api_exclusions,
        })
    }

    pub fn is_sensitive_key(&self, field_name: &str) -> bool {
        self.sensitive_keys.contains(&field_name.to_lowercase())
    }

    pub fn matches_sensitive_value(&self, value: &str) -> bool {
        self.sensitive_value_regexes
            .iter()
            .any(|re| re.is_match(value))
    }

    pub fn matches_sensitive_path_segment(&self, segment: &str) -> bool {
        self.matches_sensitive_value(segment)
    }

    /// True if `(host, path)` is on the repro-mode exclusion list
    /// (spec.md §4.4 policy gate: "the path is not on the exclusion
    /// list, which currently includes specified endpoints on
    /// configured cloud-API hostnames").
    pub fn is_excluded_endpoint(&self, host: &str, path: &str) -> bool {
        self.cloud_api_exclusions
            .iter()
            .any(|exclusion| exclusion.host == host && exclusion.paths.iter().any(|p| p == path))
    }
}

/// Process-wide, swappable holder for the active [`RedactionPolicy`]
/// (spec.md §9 Design Note: "process-wide immutable state ... passed by
/// reference, not by global mutation"). A refresh from
/// `GetDynamicAgentConfig` installs a new immutable snapshot; readers
/// never observe a partially-updated policy.
#[derive(Debug)]
pub struct PolicyStore {
    current: ArcSwap<RedactionPolicy>,
}

impl PolicyStore {
    pub fn new(initial: RedactionPolicy) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    pub fn current(&self) -> Arc<RedactionPolicy> {
        self.current.load_full()
    }

    /// Installs a fresh policy snapshot. Callers use this after a
    /// successful `GetDynamicAgentConfig` round trip; a failed refresh
    /// simply does not call this, leaving the previous snapshot active.
    pub fn refresh(&self, updated: RedactionPolicy) {
        self.current.store(Arc::new(updated));
    }
}
