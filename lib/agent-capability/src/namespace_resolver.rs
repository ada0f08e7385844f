use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum NamespaceResolverError {
    #[snafu(display("container {container_id} not found"))]
    ContainerNotFound { container_id: String },
    #[snafu(display("failed to resolve network namespace for {container_id}: {message}"))]
    ResolveFailed {
        container_id: String,
        message: String,
    },
}

/// Capability interface 2 (spec.md §6): resolves a container UUID to a
/// network-namespace path and reads its environment (used for the
/// per-pod credential env vars, spec.md §6). The real implementation is
/// a container-runtime client and is out of scope (spec.md §1).
#[async_trait]
pub trait NamespaceResolver: Send + Sync {
    async fn resolve_network_namespace(
        &self,
        container_id: &str,
    ) -> Result<PathBuf, NamespaceResolverError>;

    async fn read_container_env(
        &self,
        container_id: &str,
    ) -> Result<HashMap<String, String>, NamespaceResolverError>;
}
