//! The error taxonomy of a run. Planning-stage errors (`Manifest`, `Mapping`, `Serde`)
//! are returned before any mutation has happened, so they never involve a rollback.
//! Every error raised during the apply or wait stage causes a rollback before it is
//! surfaced inside [`crate::runner::ApplyOutcome::RolledBack`]. `RollbackFailed` is
//! terminal: the cluster is left in a state that requires manual intervention, and the
//! error says so loudly instead of being absorbed.

use crate::manifest::ManifestError;
use crate::resource::ResourceIdentity;
use crate::status::ConvergenceState;

use std::fmt::{self, Display};
use std::io;
use std::time::Duration;

/// A failure reported by the cluster, or by the transport on the way there.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterError {
    pub status: Option<u16>,
    pub message: String,
}

impl ClusterError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> ClusterError {
        ClusterError {
            status,
            message: message.into(),
        }
    }
}

impl Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "cluster returned status {}: {}", code, self.message),
            None => write!(f, "cluster request failed: {}", self.message),
        }
    }
}

impl std::error::Error for ClusterError {}

impl From<io::Error> for ClusterError {
    fn from(e: io::Error) -> ClusterError {
        ClusterError::new(None, e.to_string())
    }
}

/// A human-readable "not ready" fact, collected for every tracked resource that had not
/// reached `Current` when the wait deadline elapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct NotReadyResource {
    pub identity: ResourceIdentity,
    pub state: ConvergenceState,
}

impl Display for NotReadyResource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "resource not ready: {} ({})", self.identity, self.state)
    }
}

/// Which half of the rollback was being attempted when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackAction {
    Restore,
    Delete,
}

impl Display for RollbackAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RollbackAction::Restore => f.write_str("restore"),
            RollbackAction::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// Malformed or invalid manifest input; nothing has been mutated.
    Manifest(ManifestError),
    /// The kind could not be resolved to an endpoint, even after a cache reset.
    Mapping { type_ref: String, message: String },
    /// The cluster rejected a mutation during the apply stage.
    Apply {
        identity: ResourceIdentity,
        source: ClusterError,
    },
    /// The deadline elapsed before every tracked resource reached `Current`.
    Timeout {
        not_ready: Vec<NotReadyResource>,
        timeout: Duration,
    },
    /// The cluster reported a terminal failure status for a tracked resource.
    ConvergenceFailed {
        identity: ResourceIdentity,
        message: String,
    },
    /// A restore or delete failed during rollback. Fatal; the operator must reconcile
    /// the cluster manually.
    RollbackFailed {
        identity: ResourceIdentity,
        action: RollbackAction,
        source: ClusterError,
    },
    /// Json serialization failed while building a snapshot during planning.
    Serde(serde_json::Error),
    /// A transport-level failure outside the apply stage (client setup, status polling).
    Client(ClusterError),
}

impl Error {
    pub fn mapping(api_version: &str, kind: &str, message: impl Into<String>) -> Error {
        Error::Mapping {
            type_ref: format!("{}/{}", api_version, kind),
            message: message.into(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Manifest(e) => write!(f, "manifest error: {}", e),
            Error::Mapping { type_ref, message } => {
                write!(f, "could not map {} to a resource endpoint: {}", type_ref, message)
            }
            Error::Apply { identity, source } => {
                write!(f, "failed to apply {}: {}", identity, source)
            }
            Error::Timeout { not_ready, timeout } => {
                write!(
                    f,
                    "timed out after {:?} waiting for resources to become Current",
                    timeout
                )?;
                for fact in not_ready {
                    write!(f, "; {}", fact)?;
                }
                Ok(())
            }
            Error::ConvergenceFailed { identity, message } => {
                write!(f, "resource {} reported a terminal failure: {}", identity, message)
            }
            Error::RollbackFailed {
                identity,
                action,
                source,
            } => write!(
                f,
                "rollback failed while attempting to {} {}: {}; manual intervention is required",
                action, identity, source
            ),
            Error::Serde(e) => write!(f, "(de)serialization error: {}", e),
            Error::Client(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Manifest(e) => Some(e),
            Error::Serde(e) => Some(e),
            Error::Apply { source, .. } | Error::RollbackFailed { source, .. } => Some(source),
            Error::Client(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ManifestError> for Error {
    fn from(e: ManifestError) -> Error {
        Error::Manifest(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Serde(e)
    }
}

impl From<ClusterError> for Error {
    fn from(e: ClusterError) -> Error {
        Error::Client(e)
    }
}
