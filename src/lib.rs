//! atomic-apply applies a batch of Kubernetes manifests transactionally: either every
//! resource in the batch is applied *and* reaches its ready state, or the cluster is
//! rolled back to the exact state observed before the run began.
//!
//! The engine works in three sequential stages:
//!
//! 1. **Plan**: each desired object is resolved to a concrete api endpoint, and the
//!    current state of any already-existing resource is captured as a backup snapshot.
//! 2. **Apply**: each object is submitted as a forced server-side-apply patch, in
//!    manifest order. The first failure halts the stage.
//! 3. **Wait**: the live status of every planned resource is polled until all of them
//!    report `Current`, or until the configured timeout elapses.
//!
//! Any failure during apply or wait triggers a rollback over the whole plan, restoring
//! pre-existing resources from their backups and deleting resources the run created.
//! Rollback completion is reported as [`runner::ApplyOutcome::RolledBack`] rather than
//! terminating the process, so library callers and tests can observe it.
//!
//! Typical embedded usage:
//! ```no_run
//! use atomic_apply::prelude::*;
//!
//! # async fn example() -> Result<(), atomic_apply::error::Error> {
//! let docs = atomic_apply::manifest::parse_manifests("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: demo\n")?;
//! let config = ApplyConfig::default();
//! let client_config = ClientConfig::from_kubeconfig("my-tool").expect("no cluster credentials");
//! let mut reporter = ProgressReporter::stdout();
//! let outcome = run_apply_with_client(&config, client_config, docs, &mut reporter).await?;
//! assert!(outcome.is_success());
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate serde_derive;

pub mod apply;
pub mod client;
pub mod config;
pub mod error;
pub mod handle;
pub mod k8s_types;
pub mod manifest;
pub mod plan;
pub mod progress;
pub mod resolve;
pub mod resource;
pub mod rollback;
pub mod runner;
pub mod source;
pub mod status;

pub use serde;
pub use serde_json;
pub use serde_yaml;

pub mod prelude {
    pub use crate::config::{ApplyConfig, ClientConfig};
    pub use crate::error::Error;
    pub use crate::handle::{HandleFactory, ResourceHandle};
    pub use crate::k8s_types::ApiResource;
    pub use crate::progress::ProgressReporter;
    pub use crate::resolve::ResourceResolver;
    pub use crate::resource::{DesiredObject, ResourceIdentity};
    pub use crate::runner::{run_apply, run_apply_with_client, ApplyOutcome};
    pub use crate::status::{ConvergenceState, StatusPoller};
    pub use serde::{Deserialize, Serialize};
}
