//! Daemon-level configuration, read once at start from the process
//! environment (spec.md §6) and passed by reference thereafter — this
//! crate never mutates global state.

use snafu::Snafu;
use std::collections::BTreeSet;

/// Discovery mode for pods on this node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum DiscoveryMode {
    /// Derive a service name from the pod's owning controller.
    #[default]
    ServiceFromController,
    /// Discovery is disabled; every admitted pod is captured individually.
    Disabled,
}

/// Namespace/label include/exclude sets applied by the Pod Supervisor's
/// filter pipeline (spec.md §4.1).
#[derive(Clone, Debug, Default)]
pub struct FilterConfig {
    pub discovery_mode: DiscoveryMode,
    pub namespace_include: BTreeSet<String>,
    pub namespace_exclude: BTreeSet<String>,
    pub label_include: BTreeSet<String>,
    pub label_exclude: BTreeSet<String>,
}

fn comma_separated_set(raw: Option<String>) -> BTreeSet<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

impl FilterConfig {
    /// Reads the discovery mode and namespace/label include/exclude
    /// sets from the process environment (spec.md §6 Start contract:
    /// "filter configuration (discovery mode plus namespace/label
    /// include/exclude sets)"). Every set is comma-separated; an unset
    /// variable yields an empty set, which `filter::admit` already
    /// treats as "no restriction" for an include set.
    pub fn from_env(env: &impl EnvSource) -> Self {
        let discovery_mode = match env.get("POSTMAN_INSIGHTS_DISCOVERY_MODE").as_deref() {
            Some("disabled") => DiscoveryMode::Disabled,
            _ => DiscoveryMode::ServiceFromController,
        };

        Self {
            discovery_mode,
            namespace_include: comma_separated_set(env.get("POSTMAN_INSIGHTS_NAMESPACE_INCLUDE")),
            namespace_exclude: comma_separated_set(env.get("POSTMAN_INSIGHTS_NAMESPACE_EXCLUDE")),
            label_include: comma_separated_set(env.get("POSTMAN_INSIGHTS_LABEL_INCLUDE")),
            label_exclude: comma_separated_set(env.get("POSTMAN_INSIGHTS_LABEL_EXCLUDE")),
        }
    }
}

/// Daemon-level configuration assembled from environment variables at
/// start (spec.md §6). Immutable once constructed.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Absent disables telemetry, per spec.md §4.1 Start contract.
    pub cluster_name: Option<String>,
    pub api_key: String,
    pub env_label: Option<String>,
    pub workspace_id: Option<String>,
    pub system_env: Option<String>,
    pub verification_token: Option<String>,
    pub disable_repro_mode: bool,
    pub drop_nginx_traffic: bool,
    pub rate_limit_per_minute: Option<u64>,
    pub filter: FilterConfig,
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("missing required environment variable {name}"))]
    MissingEnvVar { name: &'static str },
    #[snafu(display("environment variable {name} has an invalid value: {value}"))]
    InvalidEnvVar { name: &'static str, value: String },
}

/// Minimal view of the process environment the config loader needs.
/// Exists so tests can supply a fake environment instead of mutating
/// `std::env` (which is process-global and not safely test-parallel).
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from the real process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl AgentConfig {
    /// Loads the daemon-level configuration. This is a startup-fatal
    /// path per spec.md §7: a missing required variable is returned to
    /// the caller, not swallowed.
    pub fn from_env(env: &impl EnvSource, filter: FilterConfig) -> Result<Self, ConfigError> {
        let api_key = env
            .get("POSTMAN_INSIGHTS_API_KEY")
            .ok_or(ConfigError::MissingEnvVar {
                name: "POSTMAN_INSIGHTS_API_KEY",
            })?;

        let rate_limit_per_minute = match env.get("POSTMAN_INSIGHTS_AGENT_RATE_LIMIT") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| ConfigError::InvalidEnvVar {
                name: "POSTMAN_INSIGHTS_AGENT_RATE_LIMIT",
                value: raw,
            })?),
            None => None,
        };

        Ok(Self {
            cluster_name: env.get("POSTMAN_INSIGHTS_CLUSTER_NAME"),
            api_key,
            env_label: env.get("POSTMAN_INSIGHTS_ENV"),
            workspace_id: env.get("POSTMAN_INSIGHTS_WORKSPACE_ID"),
            system_env: env.get("POSTMAN_INSIGHTS_SYSTEM_ENV"),
            verification_token: env.get("POSTMAN_INSIGHTS_VERIFICATION_TOKEN"),
            disable_repro_mode: env
                .get("POSTMAN_INSIGHTS_DISABLE_REPRO_MODE")
                .as_deref()
                == Some("true"),
            drop_nginx_traffic: env.get("POSTMAN_INSIGHTS_DROP_NGINX_TRAFFIC").as_deref()
                == Some("true"),
            rate_limit_per_minute,
            filter,
        })
    }
}

/// Per-pod credentials resolved via the Namespace Resolver's
/// `ReadContainerEnv`, distinct from daemon-level config (spec.md §6).
#[derive(Clone, Debug, Default)]
pub struct PodCredentials {
    pub project_id: Option<String>,
    pub api_key: Option<String>,
    /// Pod-level repro-mode override (spec.md §6: "takes precedence over
    /// the daemon-wide flag only to disable; cannot re-enable"). Combined
    /// with the daemon-wide `AgentConfig::disable_repro_mode` as an OR:
    /// either one being set disables repro mode for this pod.
    pub disable_repro_mode: bool,
}

impl PodCredentials {
    pub fn from_container_env(env: &std::collections::HashMap<String, String>) -> Self {
        Self {
            project_id: env.get("POSTMAN_INSIGHTS_PROJECT_ID").cloned(),
            api_key: env.get("POSTMAN_INSIGHTS_API_KEY").cloned(),
            disable_repro_mode: env
                .get("POSTMAN_INSIGHTS_DISABLE_REPRO_MODE")
                .map(|v| v == "true")
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeEnv(HashMap<&'static str, &'static str>);

    impl EnvSource for FakeEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|s| s.to_string())
        }
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let env = FakeEnv(HashMap::new());
        let err = AgentConfig::from_env(&env, FilterConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar { name } if name == "POSTMAN_INSIGHTS_API_KEY"));
    }

    #[test]
    fn loads_optional_fields() {
        let mut map = HashMap::new();
        map.insert("POSTMAN_INSIGHTS_API_KEY", "key-123");
        map.insert("POSTMAN_INSIGHTS_CLUSTER_NAME", "prod-cluster");
        map.insert("POSTMAN_INSIGHTS_DISABLE_REPRO_MODE", "true");
        map.insert("POSTMAN_INSIGHTS_AGENT_RATE_LIMIT", "120");
        let env = FakeEnv(map);

        let cfg = AgentConfig::from_env(&env, FilterConfig::default()).unwrap();
        assert_eq!(cfg.api_key, "key-123");
        assert_eq!(cfg.cluster_name.as_deref(), Some("prod-cluster"));
        assert!(cfg.disable_repro_mode);
        assert_eq!(cfg.rate_limit_per_minute, Some(120));
    }

    #[test]
    fn invalid_rate_limit_is_an_error() {
        let mut map = HashMap::new();
        map.insert("POSTMAN_INSIGHTS_API_KEY", "key-123");
        map.insert("POSTMAN_INSIGHTS_AGENT_RATE_LIMIT", "not-a-number");
        let env = FakeEnv(map);

        let err = AgentConfig::from_env(&env, FilterConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { name, .. } if name == "POSTMAN_INSIGHTS_AGENT_RATE_LIMIT"));
    }

    #[test]
    fn filter_config_from_env_parses_comma_separated_sets() {
        let mut map = HashMap::new();
        map.insert("POSTMAN_INSIGHTS_DISCOVERY_MODE", "disabled");
        map.insert("POSTMAN_INSIGHTS_NAMESPACE_EXCLUDE", "kube-system, istio-system");
        map.insert("POSTMAN_INSIGHTS_LABEL_INCLUDE", "app=checkout");
        let env = FakeEnv(map);

        let filter = FilterConfig::from_env(&env);
        assert_eq!(filter.discovery_mode, DiscoveryMode::Disabled);
        assert!(filter.namespace_exclude.contains("istio-system"));
        assert!(filter.label_include.contains("app=checkout"));
        assert!(filter.namespace_include.is_empty());
    }

    #[test]
    fn filter_config_from_env_defaults_to_service_from_controller() {
        let env = FakeEnv(HashMap::new());
        let filter = FilterConfig::from_env(&env);
        assert_eq!(filter.discovery_mode, DiscoveryMode::ServiceFromController);
        assert!(filter.namespace_exclude.is_empty());
    }
}
