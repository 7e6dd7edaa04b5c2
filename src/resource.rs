//! The generic resource model. Manifests are decoded into [`DesiredObject`]s, which are
//! thin wrappers around a raw json tree; we never deserialize into typed structs because
//! the engine must handle arbitrary kinds, including custom resources.

use crate::k8s_types::ApiResource;

use serde_json::Value;

use std::fmt::{self, Display};

/// Error returned when a decoded document is not a usable resource manifest.
#[derive(Debug, PartialEq, Clone)]
pub struct InvalidManifestError {
    pub message: &'static str,
    pub value: Value,
}

impl Display for InvalidManifestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invalid manifest: {}", self.message)
    }
}

impl std::error::Error for InvalidManifestError {}

/// A single desired resource, decoded from a manifest document. Immutable after
/// planning; the only mutation the engine ever performs is writing back the resolved
/// namespace during plan construction.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredObject(Value);

impl DesiredObject {
    pub fn from_value(value: Value) -> Result<DesiredObject, InvalidManifestError> {
        if let Err(message) = DesiredObject::validate(&value) {
            Err(InvalidManifestError { message, value })
        } else {
            Ok(DesiredObject(value))
        }
    }

    fn validate(value: &Value) -> Result<(), &'static str> {
        str_value(value, "/apiVersion").ok_or("missing apiVersion")?;
        str_value(value, "/kind").ok_or("missing kind")?;
        str_value(value, "/metadata/name").ok_or("missing metadata.name")?;
        Ok(())
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn api_version(&self) -> &str {
        self.str_value("/apiVersion").unwrap_or("")
    }

    pub fn kind(&self) -> &str {
        self.str_value("/kind").unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.str_value("/metadata/name").unwrap_or("")
    }

    /// Returns a non-empty namespace, if one is declared on the manifest.
    pub fn namespace(&self) -> Option<&str> {
        self.str_value("/metadata/namespace").filter(|ns| !ns.is_empty())
    }

    /// Writes the resolved namespace back onto the object so later stages need no
    /// re-derivation.
    pub fn set_namespace(&mut self, namespace: &str) {
        if let Some(metadata) = self.0.pointer_mut("/metadata").and_then(Value::as_object_mut) {
            metadata.insert("namespace".to_owned(), Value::String(namespace.to_owned()));
        }
    }

    fn str_value(&self, pointer: &str) -> Option<&str> {
        str_value(&self.0, pointer)
    }
}

impl AsRef<Value> for DesiredObject {
    fn as_ref(&self) -> &Value {
        &self.0
    }
}

pub fn str_value<'a>(json: &'a Value, pointer: &str) -> Option<&'a str> {
    json.pointer(pointer).and_then(Value::as_str)
}

/// The aggregation key used everywhere: (group, kind, namespace-or-cluster-scoped, name).
/// An empty namespace means the resource is cluster scoped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(group: &str, kind: &str, namespace: Option<&str>, name: &str) -> ResourceIdentity {
        ResourceIdentity {
            group: group.to_owned(),
            kind: kind.to_owned(),
            namespace: namespace.unwrap_or("").to_owned(),
            name: name.to_owned(),
        }
    }

    /// Derives the identity of a live or desired object from its json tree, using the
    /// resolved endpoint for group and scope.
    pub fn from_object(resource: &ApiResource, object: &Value) -> ResourceIdentity {
        let namespace = if resource.namespaced {
            str_value(object, "/metadata/namespace")
        } else {
            None
        };
        let name = str_value(object, "/metadata/name").unwrap_or("");
        ResourceIdentity::new(&resource.group, &resource.kind, namespace, name)
    }

    /// Returns a non-empty namespace, or `None` for cluster-scoped identities.
    pub fn namespace(&self) -> Option<&str> {
        if self.namespace.is_empty() {
            None
        } else {
            Some(self.namespace.as_str())
        }
    }
}

impl Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.group.is_empty() {
            write!(f, "{}/", self.group)?;
        }
        match self.namespace() {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Removes the fields that must not be preserved in a backup snapshot: the status block,
/// and the server-owned metadata fields that would cause conflicts when the snapshot is
/// written back during rollback.
pub fn strip_volatile_fields(object: &mut Value) {
    if let Some(root) = object.as_object_mut() {
        root.remove("status");
        if let Some(metadata) = root.get_mut("metadata").and_then(Value::as_object_mut) {
            for key in &["managedFields", "resourceVersion", "uid", "creationTimestamp"] {
                metadata.remove(*key);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn desired_object_requires_api_version_kind_and_name() {
        let missing_name = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {}
        });
        let err = DesiredObject::from_value(missing_name).unwrap_err();
        assert_eq!("missing metadata.name", err.message);

        let ok = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "conf" }
        });
        let obj = DesiredObject::from_value(ok).unwrap();
        assert_eq!("ConfigMap", obj.kind());
        assert_eq!("conf", obj.name());
        assert!(obj.namespace().is_none());
    }

    #[test]
    fn set_namespace_writes_back_onto_the_tree() {
        let mut obj = DesiredObject::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "conf" }
        }))
        .unwrap();
        obj.set_namespace("staging");
        assert_eq!(Some("staging"), obj.namespace());
    }

    #[test]
    fn strip_volatile_fields_removes_status_and_server_owned_metadata() {
        let mut live = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "conf",
                "namespace": "default",
                "labels": { "app": "demo" },
                "resourceVersion": "42",
                "uid": "abc-123",
                "creationTimestamp": "2024-01-01T00:00:00Z",
                "managedFields": [{ "manager": "kubectl" }]
            },
            "data": { "key": "value" },
            "status": { "phase": "Active" }
        });
        strip_volatile_fields(&mut live);
        assert_eq!(
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {
                    "name": "conf",
                    "namespace": "default",
                    "labels": { "app": "demo" }
                },
                "data": { "key": "value" }
            }),
            live
        );
    }

    #[test]
    fn identity_display_includes_group_and_namespace_when_present() {
        let deploy = ResourceIdentity::new("apps", "Deployment", Some("prod"), "web");
        assert_eq!("apps/Deployment prod/web", deploy.to_string());

        let ns = ResourceIdentity::new("", "Namespace", None, "prod");
        assert_eq!("Namespace prod", ns.to_string());
    }
}
