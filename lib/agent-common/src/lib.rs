//! Shared constants, environment configuration, and error style for the
//! capture agent core.

pub mod config;
pub mod constants;

pub use config::{AgentConfig, ConfigError, DiscoveryMode, EnvSource, FilterConfig, PodCredentials, ProcessEnv};
pub use constants::*;
