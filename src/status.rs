//! The wait stage. After the apply stage succeeds, every planned resource is polled
//! until it converges, the deadline elapses, or a resource reports a terminal failure.
//! Polling is split between a dumb fetcher (the [`StatusPoller`], which only reads live
//! objects and emits observations on a channel) and the aggregator in
//! [`wait_for_convergence`], which owns all readiness interpretation. That keeps every
//! readiness decision in synchronous, easily-tested code.

pub mod readiness;

pub use self::readiness::{Readiness, ReadinessRegistry, ReadinessRule};

use crate::error::{ClusterError, Error, NotReadyResource};
use crate::handle::ResourceHandle;
use crate::progress::ProgressReporter;
use crate::resource::ResourceIdentity;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;

/// The convergence state of a single resource, as interpreted from its live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
    /// The resource has reached its desired state.
    Current,
    /// The resource is still making progress toward its desired state.
    InProgress,
    /// The resource reported a terminal failure and will not converge on its own.
    Failed,
    /// The resource does not exist (yet) in the cluster.
    NotFound,
    /// The state could not be determined, e.g. because a poll failed.
    Unknown,
}

impl Display for ConvergenceState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConvergenceState::Current => f.write_str("Current"),
            ConvergenceState::InProgress => f.write_str("InProgress"),
            ConvergenceState::Failed => f.write_str("Failed"),
            ConvergenceState::NotFound => f.write_str("NotFound"),
            ConvergenceState::Unknown => f.write_str("Unknown"),
        }
    }
}

/// One resource the wait stage tracks, paired with the handle used to read it back.
#[derive(Debug, Clone)]
pub struct PollTarget {
    pub identity: ResourceIdentity,
    pub handle: Arc<dyn ResourceHandle>,
}

/// What one poll of one resource saw. Interpretation happens in the aggregator.
#[derive(Debug)]
pub enum Observed {
    Object(serde_json::Value),
    Absent,
    Unreachable(ClusterError),
}

#[derive(Debug)]
pub struct StatusObservation {
    pub identity: ResourceIdentity,
    pub observed: Observed,
}

/// Starts background polling of the given targets. Observations arrive on the returned
/// channel until `cancel` flips to true or the receiver is dropped.
pub trait StatusPoller: Send + Sync {
    fn start(
        &self,
        targets: Vec<PollTarget>,
        interval: Duration,
        cancel: watch::Receiver<bool>,
    ) -> mpsc::Receiver<StatusObservation>;
}

/// Poller that reads live objects through resource handles on a fixed interval.
#[derive(Debug, Default)]
pub struct ClusterStatusPoller;

impl ClusterStatusPoller {
    pub fn new() -> ClusterStatusPoller {
        ClusterStatusPoller
    }
}

impl StatusPoller for ClusterStatusPoller {
    fn start(
        &self,
        targets: Vec<PollTarget>,
        interval: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> mpsc::Receiver<StatusObservation> {
        let (tx, rx) = mpsc::channel(targets.len().max(1) * 2);
        tokio::spawn(async move {
            loop {
                for target in targets.iter() {
                    let observed = match target.handle.get(target.identity.name.as_str()).await {
                        Ok(Some(object)) => Observed::Object(object),
                        Ok(None) => Observed::Absent,
                        Err(err) => {
                            log::warn!("Status poll of {} failed: {}", target.identity, err);
                            Observed::Unreachable(err)
                        }
                    };
                    let observation = StatusObservation {
                        identity: target.identity.clone(),
                        observed,
                    };
                    if tx.send(observation).await.is_err() {
                        return; // aggregator is gone
                    }
                }

                tokio::select! {
                    _ = time::sleep(interval) => {}
                    _ = cancel.changed() => {
                        if *cancel.borrow() {
                            log::debug!("Status polling cancelled");
                            return;
                        }
                    }
                }
            }
        });
        rx
    }
}

/// Drives the wait stage to completion. Returns `Ok(())` once every target is
/// `Current`. A terminal failure short-circuits immediately; hitting the deadline
/// returns a timeout error listing exactly the targets that had not converged.
pub async fn wait_for_convergence(
    targets: Vec<PollTarget>,
    registry: &ReadinessRegistry,
    poller: &dyn StatusPoller,
    timeout: Duration,
    poll_interval: Duration,
    reporter: &mut ProgressReporter,
) -> Result<(), Error> {
    if targets.is_empty() {
        return Ok(());
    }

    // plan order is preserved for reporting
    let order: Vec<ResourceIdentity> = targets.iter().map(|t| t.identity.clone()).collect();
    let mut states: HashMap<ResourceIdentity, Readiness> = order
        .iter()
        .map(|id| (id.clone(), Readiness::in_progress("no status observed yet")))
        .collect();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut observations = poller.start(targets, poll_interval, cancel_rx);
    let deadline = Instant::now() + timeout;

    loop {
        let next = time::timeout_at(deadline, observations.recv()).await;
        let observation = match next {
            Ok(Some(observation)) => observation,
            Ok(None) => {
                return Err(Error::Client(ClusterError::new(
                    None,
                    "status polling stopped unexpectedly",
                )));
            }
            Err(_elapsed) => {
                let _ = cancel_tx.send(true);
                let not_ready = order
                    .iter()
                    .filter_map(|id| {
                        let readiness = states.get(id)?;
                        if readiness.state == ConvergenceState::Current {
                            None
                        } else {
                            Some(NotReadyResource {
                                identity: id.clone(),
                                state: readiness.state,
                            })
                        }
                    })
                    .collect();
                return Err(Error::Timeout { not_ready, timeout });
            }
        };

        let readiness = evaluate_observation(registry, &observation);
        if readiness.state == ConvergenceState::Failed {
            let _ = cancel_tx.send(true);
            return Err(Error::ConvergenceFailed {
                identity: observation.identity,
                message: readiness.message,
            });
        }

        states.insert(observation.identity, readiness);

        // one representative line per event: the not-yet-Current resource with the
        // smallest name
        let representative = states
            .iter()
            .filter(|(_, readiness)| readiness.state != ConvergenceState::Current)
            .min_by(|(a, _), (b, _)| a.name.cmp(&b.name));
        match representative {
            Some((identity, readiness)) => reporter.waiting(identity, readiness.state),
            None => {
                let _ = cancel_tx.send(true);
                return Ok(());
            }
        }
    }
}

fn evaluate_observation(
    registry: &ReadinessRegistry,
    observation: &StatusObservation,
) -> Readiness {
    match &observation.observed {
        Observed::Object(object) => registry.evaluate(
            observation.identity.group.as_str(),
            observation.identity.kind.as_str(),
            object,
        ),
        Observed::Absent => Readiness {
            state: ConvergenceState::NotFound,
            message: "resource not found".to_owned(),
        },
        Observed::Unreachable(err) => Readiness {
            state: ConvergenceState::Unknown,
            message: err.to_string(),
        },
    }
}
