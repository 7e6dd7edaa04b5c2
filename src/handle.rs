//! The seam between the transaction engine and the cluster. A [`ResourceHandle`] is
//! bound to one resource type in one namespace and exposes only the four verbs the
//! engine needs, so the whole engine can run against in-memory fakes in tests. The
//! [`HandleFactory`] hands out handles as the plan is built.

use crate::client::Client;
use crate::error::ClusterError;
use crate::k8s_types::ApiResource;

use async_trait::async_trait;
use serde_json::Value;

use std::fmt::Debug;
use std::sync::Arc;

/// Verbs against a single resource endpoint. All objects cross this boundary as raw
/// json values.
#[async_trait]
pub trait ResourceHandle: Send + Sync + Debug {
    /// Reads the named resource. `None` means the resource does not exist, which is a
    /// normal outcome during planning, not an error.
    async fn get(&self, name: &str) -> Result<Option<Value>, ClusterError>;

    /// Submits a forced apply patch under the given field manager, creating the
    /// resource if it does not exist. Returns the resulting live object.
    async fn apply_patch(
        &self,
        name: &str,
        payload: &Value,
        field_manager: &str,
    ) -> Result<Value, ClusterError>;

    /// Replaces the entire resource with the given object.
    async fn replace(&self, name: &str, object: &Value) -> Result<Value, ClusterError>;

    /// Deletes the named resource. Deleting a resource that is already gone is a
    /// success.
    async fn delete(&self, name: &str) -> Result<(), ClusterError>;
}

/// Binds handles for (resource type, namespace) pairs. `namespace` is `None` for
/// cluster-scoped types.
pub trait HandleFactory: Send + Sync {
    fn bind(&self, resource: &ApiResource, namespace: Option<&str>) -> Arc<dyn ResourceHandle>;
}

#[derive(Debug)]
pub struct ClusterHandle {
    client: Client,
    resource: ApiResource,
    namespace: Option<String>,
}

impl ClusterHandle {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

#[async_trait]
impl ResourceHandle for ClusterHandle {
    async fn get(&self, name: &str) -> Result<Option<Value>, ClusterError> {
        self.client
            .get_resource(&self.resource, self.namespace(), name)
            .await
            .map_err(Into::into)
    }

    async fn apply_patch(
        &self,
        name: &str,
        payload: &Value,
        field_manager: &str,
    ) -> Result<Value, ClusterError> {
        self.client
            .apply_patch(&self.resource, self.namespace(), name, payload, field_manager)
            .await
            .map_err(Into::into)
    }

    async fn replace(&self, name: &str, object: &Value) -> Result<Value, ClusterError> {
        self.client
            .replace_resource(&self.resource, self.namespace(), name, object)
            .await
            .map_err(Into::into)
    }

    async fn delete(&self, name: &str) -> Result<(), ClusterError> {
        self.client
            .delete_resource(&self.resource, self.namespace(), name)
            .await
            .map_err(Into::into)
    }
}

#[derive(Debug, Clone)]
pub struct ClusterHandleFactory {
    client: Client,
}

impl ClusterHandleFactory {
    pub fn new(client: Client) -> ClusterHandleFactory {
        ClusterHandleFactory { client }
    }
}

impl HandleFactory for ClusterHandleFactory {
    fn bind(&self, resource: &ApiResource, namespace: Option<&str>) -> Arc<dyn ResourceHandle> {
        Arc::new(ClusterHandle {
            client: self.client.clone(),
            resource: resource.clone(),
            namespace: namespace.map(String::from),
        })
    }
}
