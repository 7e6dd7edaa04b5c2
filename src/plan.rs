//! The planning stage. Every desired object is resolved to an endpoint, bound to a
//! handle, and paired with a snapshot of its prior live state before anything is
//! mutated. The resulting plan is the unit the apply and rollback stages operate on,
//! always in manifest order.

use crate::config::{ApplyConfig, DEFAULT_NAMESPACE};
use crate::error::Error;
use crate::handle::{HandleFactory, ResourceHandle};
use crate::k8s_types::ApiResource;
use crate::resolve::ResourceResolver;
use crate::resource::{strip_volatile_fields, DesiredObject, ResourceIdentity};

use serde_json::Value;

use std::sync::Arc;

/// One resource in the transaction, carrying everything needed to apply it and to put
/// it back the way it was.
#[derive(Debug)]
pub struct PlanItem {
    pub desired: DesiredObject,
    pub resource: ApiResource,
    pub identity: ResourceIdentity,
    pub handle: Arc<dyn ResourceHandle>,
    /// Whether the resource existed before this run touched it.
    pub existed: bool,
    /// Serialized snapshot of the prior live object with volatile fields removed.
    /// `None` when the resource did not exist.
    pub backup: Option<Vec<u8>>,
    /// The resourceVersion the prior live object carried.
    pub prior_version: Option<String>,
}

/// Builds the plan for the given desired objects, in input order. No mutations happen
/// here; any error leaves the cluster untouched.
pub async fn build_plan(
    config: &ApplyConfig,
    resolver: &dyn ResourceResolver,
    handles: &dyn HandleFactory,
    desired: Vec<DesiredObject>,
) -> Result<Vec<PlanItem>, Error> {
    let mut plan = Vec::with_capacity(desired.len());

    for mut object in desired {
        let resource = resolve_with_retry(resolver, &object).await?;

        let namespace = effective_namespace(&resource, &object, config);
        if let Some(ref ns) = namespace {
            // written back so the payload sent to the cluster matches the plan
            object.set_namespace(ns);
        }
        let identity = ResourceIdentity::from_object(&resource, object.as_value());
        let handle = handles.bind(&resource, namespace.as_deref());

        let (existed, backup, prior_version) = match handle.get(object.name()).await {
            Ok(Some(live)) => {
                let prior_version = live
                    .pointer("/metadata/resourceVersion")
                    .and_then(Value::as_str)
                    .map(String::from);
                let mut snapshot = live;
                strip_volatile_fields(&mut snapshot);
                let backup = serde_json::to_vec(&snapshot)?;
                (true, Some(backup), prior_version)
            }
            Ok(None) => (false, None, None),
            Err(err) => {
                // an unreadable resource is planned as absent; if it does exist the
                // apply stage will surface the real failure
                log::warn!("Failed to read prior state of {}: {}", identity, err);
                (false, None, None)
            }
        };

        log::debug!(
            "Planned {} (existed: {}, priorVersion: {:?})",
            identity,
            existed,
            prior_version
        );
        plan.push(PlanItem {
            desired: object,
            resource,
            identity,
            handle,
            existed,
            backup,
            prior_version,
        });
    }

    Ok(plan)
}

/// Resolves the object's type, resetting the discovery cache and retrying once on
/// failure so a type installed after the cache was primed still resolves.
async fn resolve_with_retry(
    resolver: &dyn ResourceResolver,
    object: &DesiredObject,
) -> Result<ApiResource, Error> {
    let api_version = object.api_version();
    let kind = object.kind();
    match resolver.resolve(api_version, kind).await {
        Ok(resource) => Ok(resource),
        Err(first) => {
            log::debug!(
                "Could not resolve {}/{} ({}), resetting discovery cache and retrying",
                api_version,
                kind,
                first
            );
            resolver.reset_cache().await;
            resolver
                .resolve(api_version, kind)
                .await
                .map_err(|err| Error::mapping(api_version, kind, err.to_string()))
        }
    }
}

/// The namespace a planned object will live in: the manifest's own namespace, then the
/// run's default, then the cluster default. Cluster-scoped types never get one.
fn effective_namespace(
    resource: &ApiResource,
    object: &DesiredObject,
    config: &ApplyConfig,
) -> Option<String> {
    if !resource.namespaced {
        return None;
    }
    object
        .namespace()
        .map(String::from)
        .or_else(|| config.default_namespace.clone())
        .or_else(|| Some(DEFAULT_NAMESPACE.to_owned()))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn object(ns: Option<&str>) -> DesiredObject {
        let mut value = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings"}
        });
        if let Some(ns) = ns {
            value["metadata"]["namespace"] = json!(ns);
        }
        DesiredObject::from_value(value).unwrap()
    }

    fn namespaced_type() -> ApiResource {
        ApiResource::new("", "v1", "ConfigMap", "configmaps", true)
    }

    #[test]
    fn manifest_namespace_wins() {
        let config = ApplyConfig::default().with_namespace("flag-ns");
        let ns = effective_namespace(&namespaced_type(), &object(Some("manifest-ns")), &config);
        assert_eq!(Some("manifest-ns".to_owned()), ns);
    }

    #[test]
    fn configured_namespace_fills_the_gap() {
        let config = ApplyConfig::default().with_namespace("flag-ns");
        let ns = effective_namespace(&namespaced_type(), &object(None), &config);
        assert_eq!(Some("flag-ns".to_owned()), ns);
    }

    #[test]
    fn cluster_default_is_the_last_resort() {
        let ns = effective_namespace(&namespaced_type(), &object(None), &ApplyConfig::default());
        assert_eq!(Some(DEFAULT_NAMESPACE.to_owned()), ns);
    }

    #[test]
    fn cluster_scoped_types_never_get_a_namespace() {
        let resource = ApiResource::new("", "v1", "Namespace", "namespaces", false);
        let config = ApplyConfig::default().with_namespace("flag-ns");
        let ns = effective_namespace(&resource, &object(None), &config);
        assert_eq!(None, ns);
    }
}
