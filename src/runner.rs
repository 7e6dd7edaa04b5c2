//! Orchestration of a full run: plan, apply, wait, and rollback on failure. The
//! engine entry point takes every collaborator as a trait object so the complete
//! transaction can be exercised against in-memory fakes; [`run_apply_with_client`]
//! wires up the cluster-backed collaborators for real use.

use crate::apply::apply_plan;
use crate::client::Client;
use crate::config::{ApplyConfig, ClientConfig};
use crate::error::{ClusterError, Error};
use crate::handle::{ClusterHandleFactory, HandleFactory};
use crate::plan::{build_plan, PlanItem};
use crate::progress::ProgressReporter;
use crate::resolve::{DiscoveryResolver, ResourceResolver};
use crate::resource::{DesiredObject, ResourceIdentity};
use crate::rollback::roll_back;
use crate::status::{
    wait_for_convergence, ClusterStatusPoller, PollTarget, ReadinessRegistry, StatusPoller,
};

/// How a run ended. A rollback that succeeds is a normal outcome, not an error: the
/// cluster is back in its prior state and the cause says why the apply was abandoned.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// Every resource was applied and converged.
    Success { applied: Vec<ResourceIdentity> },
    /// The manifest input contained no resources.
    NothingToApply,
    /// The apply or wait stage failed and every resource was restored.
    RolledBack { cause: Error },
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::Success { .. } | ApplyOutcome::NothingToApply
        )
    }
}

/// Runs the whole transaction. Returns `Err` only when the cluster may not be in a
/// known-good state: planning failures (nothing was mutated) and rollback failures
/// (manual intervention required).
pub async fn run_apply(
    config: &ApplyConfig,
    resolver: &dyn ResourceResolver,
    handles: &dyn HandleFactory,
    poller: &dyn StatusPoller,
    registry: &ReadinessRegistry,
    desired: Vec<DesiredObject>,
    reporter: &mut ProgressReporter,
) -> Result<ApplyOutcome, Error> {
    let plan = build_plan(config, resolver, handles, desired).await?;
    if plan.is_empty() {
        reporter.no_trackable();
        return Ok(ApplyOutcome::NothingToApply);
    }

    if let Err(cause) = apply_plan(config, &plan).await {
        return abandon(&plan, cause, reporter).await;
    }

    let identities: Vec<ResourceIdentity> =
        plan.iter().map(|item| item.identity.clone()).collect();
    reporter.tracked(&identities);

    let targets: Vec<PollTarget> = plan
        .iter()
        .map(|item| PollTarget {
            identity: item.identity.clone(),
            handle: item.handle.clone(),
        })
        .collect();
    let wait_result = wait_for_convergence(
        targets,
        registry,
        poller,
        config.timeout,
        config.poll_interval,
        reporter,
    )
    .await;
    // every wait-stage failure rolls back, including transport faults; the cluster
    // must not be left in the applied state just because polling broke
    if let Err(cause) = wait_result {
        return abandon(&plan, cause, reporter).await;
    }

    reporter.success();
    Ok(ApplyOutcome::Success { applied: identities })
}

/// Runs the transaction against a live cluster.
pub async fn run_apply_with_client(
    config: &ApplyConfig,
    client_config: ClientConfig,
    desired: Vec<DesiredObject>,
    reporter: &mut ProgressReporter,
) -> Result<ApplyOutcome, Error> {
    let client =
        Client::new(client_config).map_err(|err| Error::Client(ClusterError::from(err)))?;
    let resolver = DiscoveryResolver::new(client.clone());
    let handles = ClusterHandleFactory::new(client);
    let poller = ClusterStatusPoller::new();
    let registry = ReadinessRegistry::with_builtin_rules();
    run_apply(
        config, &resolver, &handles, &poller, &registry, desired, reporter,
    )
    .await
}

/// Rolls the plan back and converts the cause into an outcome. A rollback failure
/// supersedes the original cause, which is logged so it is not lost.
async fn abandon(
    plan: &[PlanItem],
    cause: Error,
    reporter: &mut ProgressReporter,
) -> Result<ApplyOutcome, Error> {
    log::warn!("Abandoning apply and rolling back: {}", cause);
    reporter.rollback_started(&cause);
    roll_back(plan).await?;
    reporter.rollback_complete();
    Ok(ApplyOutcome::RolledBack { cause })
}
