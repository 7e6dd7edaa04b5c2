//! Descriptions of concrete, addressable api endpoints. An [`ApiResource`] is what the
//! resolver hands back for a manifest's apiVersion/kind pair: enough information to
//! build request urls and to know whether the resource lives in a namespace.

use std::fmt::{self, Display};

/// A resolved resource endpoint: the group/version/plural triple used in request paths,
/// plus the scope of the resource. Owned strings, since these are produced at runtime
/// from discovery data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiResource {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural_kind: String,
    pub namespaced: bool,
}

impl ApiResource {
    pub fn new(group: &str, version: &str, kind: &str, plural_kind: &str, namespaced: bool) -> ApiResource {
        ApiResource {
            group: group.to_owned(),
            version: version.to_owned(),
            kind: kind.to_owned(),
            plural_kind: plural_kind.to_owned(),
            namespaced,
        }
    }
}

impl Display for ApiResource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.plural_kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.plural_kind)
        }
    }
}

/// Splits an `apiVersion` string into its group and version parts. The group is empty
/// for the legacy core api ("v1").
pub fn as_group_and_version(api_version: &str) -> (&str, &str) {
    match api_version.find('/') {
        Some(slash_idx) => (&api_version[..slash_idx], &api_version[(slash_idx + 1)..]),
        None => ("", api_version),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn api_version_with_group_splits_on_slash() {
        assert_eq!(("apps", "v1"), as_group_and_version("apps/v1"));
        assert_eq!(
            ("storage.k8s.io", "v1beta1"),
            as_group_and_version("storage.k8s.io/v1beta1")
        );
    }

    #[test]
    fn core_api_version_has_empty_group() {
        assert_eq!(("", "v1"), as_group_and_version("v1"));
    }
}
