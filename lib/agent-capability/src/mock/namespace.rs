use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::namespace_resolver::{NamespaceResolver, NamespaceResolverError};

/// An in-memory `NamespaceResolver` keyed by container id.
#[derive(Default)]
pub struct MockNamespaceResolver {
    namespaces: HashMap<String, PathBuf>,
    env: HashMap<String, HashMap<String, String>>,
}

impl MockNamespaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(
        mut self,
        container_id: impl Into<String>,
        ns_path: impl AsRef<Path>,
        env: HashMap<String, String>,
    ) -> Self {
        let container_id = container_id.into();
        self.namespaces
            .insert(container_id.clone(), ns_path.as_ref().to_path_buf());
        self.env.insert(container_id, env);
        self
    }
}

#[async_trait]
impl NamespaceResolver for MockNamespaceResolver {
    async fn resolve_network_namespace(
        &self,
        container_id: &str,
    ) -> Result<PathBuf, NamespaceResolverError> {
        self.namespaces
            .get(container_id)
            .cloned()
            .ok_or_else(|| NamespaceResolverError::ContainerNotFound {
                container_id: container_id.to_string(),
            })
    }

    async fn read_container_env(
        &self,
        container_id: &str,
    ) -> Result<HashMap<String, String>, NamespaceResolverError> {
        self.env
            .get(container_id)
            .cloned()
            .ok_or_else(|| NamespaceResolverError::ContainerNotFound {
                container_id: container_id.to_string(),
            })
    }
}
