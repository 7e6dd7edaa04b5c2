//! Decoding of manifest text into desired objects. A single input may contain any number
//! of yaml documents (json is a subset, so json manifests work too). Empty documents are
//! dropped, matching `kubectl apply`; any malformed document fails the whole read.

use crate::resource::{DesiredObject, InvalidManifestError};

use serde::Deserialize;
use serde_json::Value;

use std::fmt::{self, Display};

#[derive(Debug)]
pub enum ManifestError {
    Yaml(serde_yaml::Error),
    Invalid(InvalidManifestError),
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ManifestError::Yaml(e) => write!(f, "failed to decode document: {}", e),
            ManifestError::Invalid(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ManifestError::Yaml(e) => Some(e),
            ManifestError::Invalid(e) => Some(e),
        }
    }
}

impl From<serde_yaml::Error> for ManifestError {
    fn from(e: serde_yaml::Error) -> ManifestError {
        ManifestError::Yaml(e)
    }
}

impl From<InvalidManifestError> for ManifestError {
    fn from(e: InvalidManifestError) -> ManifestError {
        ManifestError::Invalid(e)
    }
}

/// Decodes every document in `input`, in order. Returns an empty vec when the input
/// contains only empty or separator documents.
pub fn parse_manifests(input: &str) -> Result<Vec<DesiredObject>, ManifestError> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(input) {
        let value = Value::deserialize(document)?;
        match value {
            Value::Null => continue,
            Value::Object(ref map) if map.is_empty() => continue,
            other => docs.push(DesiredObject::from_value(other)?),
        }
    }
    Ok(docs)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_multiple_documents_in_input_order() {
        let input = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: first
data:
  a: "1"
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: second
  namespace: prod
spec:
  replicas: 2
"#;
        let docs = parse_manifests(input).unwrap();
        assert_eq!(2, docs.len());
        assert_eq!("first", docs[0].name());
        assert_eq!("ConfigMap", docs[0].kind());
        assert_eq!("second", docs[1].name());
        assert_eq!(Some("prod"), docs[1].namespace());
    }

    #[test]
    fn drops_empty_and_separator_only_documents() {
        let docs = parse_manifests("---\n---\n\n---\n").unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn accepts_a_json_document() {
        let input = r#"{"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "js"}}"#;
        let docs = parse_manifests(input).unwrap();
        assert_eq!(1, docs.len());
        assert_eq!("js", docs[0].name());
    }

    #[test]
    fn malformed_yaml_fails_the_whole_read() {
        let input = "apiVersion: v1\nkind: ConfigMap\nmetadata: [unbalanced";
        assert!(parse_manifests(input).is_err());
    }

    #[test]
    fn document_missing_kind_is_invalid() {
        let input = "apiVersion: v1\nmetadata:\n  name: nameless\n";
        match parse_manifests(input) {
            Err(ManifestError::Invalid(e)) => assert_eq!("missing kind", e.message),
            other => panic!("expected invalid manifest error, got {:?}", other.map(|d| d.len())),
        }
    }
}
