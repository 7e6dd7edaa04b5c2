//! Mapping from `(apiVersion, kind)` pairs in manifests to concrete resource endpoints.
//! The cluster-backed resolver caches discovery responses per group/version; a stale
//! cache entry (e.g. a CRD installed mid-run) is handled by the planner resetting the
//! cache and retrying once.

use crate::client::Client;
use crate::error::ClusterError;
use crate::k8s_types::{as_group_and_version, ApiResource};

use async_trait::async_trait;
use tokio::sync::Mutex;

use std::collections::HashMap;
use std::fmt::{self, Display};

#[derive(Debug)]
pub enum ResolveError {
    /// The group/version exists but has no resource for the kind.
    UnknownKind,
    /// Discovery itself failed.
    Cluster(ClusterError),
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResolveError::UnknownKind => f.write_str("no resource registered for this kind"),
            ResolveError::Cluster(e) => write!(f, "discovery failed: {}", e),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<ClusterError> for ResolveError {
    fn from(e: ClusterError) -> ResolveError {
        ResolveError::Cluster(e)
    }
}

#[async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn resolve(&self, api_version: &str, kind: &str) -> Result<ApiResource, ResolveError>;

    /// Drops any cached discovery data so the next `resolve` asks the cluster again.
    async fn reset_cache(&self);
}

/// Resolver backed by the discovery endpoints of a live cluster.
#[derive(Debug)]
pub struct DiscoveryResolver {
    client: Client,
    cache: Mutex<HashMap<String, Vec<CachedResource>>>,
}

#[derive(Debug, Clone)]
struct CachedResource {
    kind: String,
    plural_kind: String,
    namespaced: bool,
}

impl DiscoveryResolver {
    pub fn new(client: Client) -> DiscoveryResolver {
        DiscoveryResolver {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn group_version_resources(
        &self,
        api_version: &str,
        group: &str,
        version: &str,
    ) -> Result<Vec<CachedResource>, ResolveError> {
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(api_version) {
                return Ok(cached.clone());
            }
        }

        log::debug!("Fetching discovery info for groupVersion: '{}'", api_version);
        let list = self
            .client
            .api_resource_list(group, version)
            .await
            .map_err(|e| ResolveError::Cluster(e.into()))?;

        let resources: Vec<CachedResource> = list
            .resources
            .into_iter()
            .filter(|info| !info.name.contains('/')) // skip subresources like deployments/status
            .map(|info| CachedResource {
                kind: info.kind,
                plural_kind: info.name,
                namespaced: info.namespaced,
            })
            .collect();

        let mut cache = self.cache.lock().await;
        cache.insert(api_version.to_owned(), resources.clone());
        Ok(resources)
    }
}

#[async_trait]
impl ResourceResolver for DiscoveryResolver {
    async fn resolve(&self, api_version: &str, kind: &str) -> Result<ApiResource, ResolveError> {
        let (group, version) = as_group_and_version(api_version);
        let resources = self
            .group_version_resources(api_version, group, version)
            .await?;

        resources
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| ApiResource::new(group, version, kind, r.plural_kind.as_str(), r.namespaced))
            .ok_or(ResolveError::UnknownKind)
    }

    async fn reset_cache(&self) {
        let mut cache = self.cache.lock().await;
        cache.clear();
    }
}
