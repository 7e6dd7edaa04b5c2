//! Interpretation of live objects into convergence states. Rules are keyed by
//! `(group, kind)`; anything without a dedicated rule falls back to the generic rule,
//! which honors `observedGeneration` and a `Ready` condition when present and treats
//! everything else (configmaps, secrets, services...) as already converged.

use crate::status::ConvergenceState;

use serde_json::Value;

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Readiness {
    pub state: ConvergenceState,
    pub message: String,
}

impl Readiness {
    pub fn current(message: impl Into<String>) -> Readiness {
        Readiness {
            state: ConvergenceState::Current,
            message: message.into(),
        }
    }

    pub fn in_progress(message: impl Into<String>) -> Readiness {
        Readiness {
            state: ConvergenceState::InProgress,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Readiness {
        Readiness {
            state: ConvergenceState::Failed,
            message: message.into(),
        }
    }
}

pub trait ReadinessRule: Send + Sync {
    fn evaluate(&self, object: &Value) -> Readiness;
}

/// The set of readiness rules used for one run.
pub struct ReadinessRegistry {
    rules: HashMap<(String, String), Box<dyn ReadinessRule>>,
    fallback: GenericRule,
}

impl ReadinessRegistry {
    pub fn new() -> ReadinessRegistry {
        ReadinessRegistry {
            rules: HashMap::new(),
            fallback: GenericRule,
        }
    }

    /// A registry with rules for the built-in workload kinds.
    pub fn with_builtin_rules() -> ReadinessRegistry {
        let mut registry = ReadinessRegistry::new();
        registry.register("apps", "Deployment", Box::new(ScalableWorkloadRule));
        registry.register("apps", "StatefulSet", Box::new(ScalableWorkloadRule));
        registry.register("apps", "ReplicaSet", Box::new(ScalableWorkloadRule));
        registry.register("apps", "DaemonSet", Box::new(DaemonSetRule));
        registry.register("batch", "Job", Box::new(JobRule));
        registry.register("", "Pod", Box::new(PodRule));
        registry
    }

    pub fn register(&mut self, group: &str, kind: &str, rule: Box<dyn ReadinessRule>) {
        self.rules.insert((group.to_owned(), kind.to_owned()), rule);
    }

    pub fn evaluate(&self, group: &str, kind: &str, object: &Value) -> Readiness {
        let key = (group.to_owned(), kind.to_owned());
        match self.rules.get(&key) {
            Some(rule) => rule.evaluate(object),
            None => self.fallback.evaluate(object),
        }
    }
}

impl Default for ReadinessRegistry {
    fn default() -> ReadinessRegistry {
        ReadinessRegistry::with_builtin_rules()
    }
}

fn int_at(object: &Value, pointer: &str) -> Option<i64> {
    object.pointer(pointer).and_then(Value::as_i64)
}

/// Looks up a condition by type and returns `(status, reason, message)`.
fn condition<'a>(object: &'a Value, condition_type: &str) -> Option<(&'a str, &'a str, &'a str)> {
    let conditions = object.pointer("/status/conditions")?.as_array()?;
    conditions.iter().find_map(|cond| {
        if cond.pointer("/type").and_then(Value::as_str) == Some(condition_type) {
            let status = cond.pointer("/status").and_then(Value::as_str).unwrap_or("");
            let reason = cond.pointer("/reason").and_then(Value::as_str).unwrap_or("");
            let message = cond.pointer("/message").and_then(Value::as_str).unwrap_or("");
            Some((status, reason, message))
        } else {
            None
        }
    })
}

/// `None` when the controller has caught up with the latest spec, otherwise the lag.
fn generation_lag(object: &Value) -> Option<(i64, i64)> {
    let generation = int_at(object, "/metadata/generation")?;
    let observed = int_at(object, "/status/observedGeneration")?;
    if observed < generation {
        Some((observed, generation))
    } else {
        None
    }
}

/// Fallback for kinds without a dedicated rule.
pub struct GenericRule;

impl ReadinessRule for GenericRule {
    fn evaluate(&self, object: &Value) -> Readiness {
        if let Some((observed, generation)) = generation_lag(object) {
            return Readiness::in_progress(format!(
                "observed generation {} behind desired {}",
                observed, generation
            ));
        }
        if object.pointer("/status").is_none() {
            // nothing to track
            return Readiness::current("resource has no status");
        }
        match condition(object, "Ready") {
            Some(("True", _, _)) => Readiness::current("Ready condition is True"),
            Some((_, _, message)) if !message.is_empty() => Readiness::in_progress(message),
            Some((status, _, _)) => {
                Readiness::in_progress(format!("Ready condition is {}", status))
            }
            None => Readiness::current("no blocking conditions"),
        }
    }
}

/// Deployments, statefulsets, and replicasets: every replica counter must reach the
/// desired count and no failure condition may be set.
pub struct ScalableWorkloadRule;

impl ReadinessRule for ScalableWorkloadRule {
    fn evaluate(&self, object: &Value) -> Readiness {
        if let Some((observed, generation)) = generation_lag(object) {
            return Readiness::in_progress(format!(
                "observed generation {} behind desired {}",
                observed, generation
            ));
        }
        if let Some(("False", reason, message)) = condition(object, "Progressing") {
            if reason == "ProgressDeadlineExceeded" {
                return Readiness::failed(message.to_owned());
            }
        }
        if let Some(("True", _, message)) = condition(object, "ReplicaFailure") {
            return Readiness::failed(message.to_owned());
        }

        let desired = int_at(object, "/spec/replicas").unwrap_or(1);
        if object.pointer("/status").is_none() {
            return Readiness::in_progress("no status reported yet");
        }
        let total = int_at(object, "/status/replicas").unwrap_or(0);
        let updated = int_at(object, "/status/updatedReplicas").unwrap_or(0);
        let ready = int_at(object, "/status/readyReplicas").unwrap_or(0);

        if updated < desired {
            return Readiness::in_progress(format!("updated {} of {} replicas", updated, desired));
        }
        if total > desired {
            return Readiness::in_progress(format!(
                "{} replicas pending termination",
                total - desired
            ));
        }
        if ready < desired {
            return Readiness::in_progress(format!("ready {} of {} replicas", ready, desired));
        }
        Readiness::current(format!("{} of {} replicas ready", ready, desired))
    }
}

pub struct DaemonSetRule;

impl ReadinessRule for DaemonSetRule {
    fn evaluate(&self, object: &Value) -> Readiness {
        if let Some((observed, generation)) = generation_lag(object) {
            return Readiness::in_progress(format!(
                "observed generation {} behind desired {}",
                observed, generation
            ));
        }
        let desired = match int_at(object, "/status/desiredNumberScheduled") {
            Some(desired) => desired,
            None => return Readiness::in_progress("no scheduling status reported yet"),
        };
        let updated = int_at(object, "/status/updatedNumberScheduled").unwrap_or(0);
        let ready = int_at(object, "/status/numberReady").unwrap_or(0);

        if updated < desired {
            return Readiness::in_progress(format!("updated {} of {} pods", updated, desired));
        }
        if ready < desired {
            return Readiness::in_progress(format!("ready {} of {} pods", ready, desired));
        }
        Readiness::current(format!("{} of {} pods ready", ready, desired))
    }
}

pub struct JobRule;

impl ReadinessRule for JobRule {
    fn evaluate(&self, object: &Value) -> Readiness {
        if let Some(("True", _, message)) = condition(object, "Failed") {
            return Readiness::failed(message.to_owned());
        }
        if let Some(("True", _, _)) = condition(object, "Complete") {
            return Readiness::current("job complete");
        }
        let completions = int_at(object, "/spec/completions").unwrap_or(1);
        let succeeded = int_at(object, "/status/succeeded").unwrap_or(0);
        if succeeded >= completions {
            Readiness::current(format!("{} of {} completions succeeded", succeeded, completions))
        } else {
            Readiness::in_progress(format!(
                "{} of {} completions succeeded",
                succeeded, completions
            ))
        }
    }
}

pub struct PodRule;

impl ReadinessRule for PodRule {
    fn evaluate(&self, object: &Value) -> Readiness {
        let phase = object
            .pointer("/status/phase")
            .and_then(Value::as_str)
            .unwrap_or("");
        match phase {
            "Succeeded" => Readiness::current("pod has succeeded"),
            "Failed" => {
                let message = object
                    .pointer("/status/message")
                    .and_then(Value::as_str)
                    .unwrap_or("pod has failed");
                Readiness::failed(message.to_owned())
            }
            "Running" => match condition(object, "Ready") {
                Some(("True", _, _)) => Readiness::current("pod is ready"),
                _ => Readiness::in_progress("pod is running but not ready"),
            },
            other => Readiness::in_progress(format!("pod phase is {:?}", other)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn eval(group: &str, kind: &str, object: &Value) -> Readiness {
        ReadinessRegistry::with_builtin_rules().evaluate(group, kind, object)
    }

    #[test]
    fn statusless_resources_are_current() {
        let configmap = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings"},
            "data": {"a": "1"}
        });
        assert_eq!(
            ConvergenceState::Current,
            eval("", "ConfigMap", &configmap).state
        );
    }

    #[test]
    fn generation_lag_means_in_progress() {
        let object = json!({
            "metadata": {"generation": 3},
            "status": {"observedGeneration": 2}
        });
        assert_eq!(ConvergenceState::InProgress, eval("", "Widget", &object).state);
    }

    #[test]
    fn deployment_tracks_replica_counters() {
        let mut deployment = json!({
            "metadata": {"generation": 1},
            "spec": {"replicas": 3},
            "status": {
                "observedGeneration": 1,
                "replicas": 3,
                "updatedReplicas": 2,
                "readyReplicas": 2
            }
        });
        let readiness = eval("apps", "Deployment", &deployment);
        assert_eq!(ConvergenceState::InProgress, readiness.state);
        assert_eq!("updated 2 of 3 replicas", readiness.message);

        deployment["status"]["updatedReplicas"] = json!(3);
        deployment["status"]["readyReplicas"] = json!(3);
        assert_eq!(
            ConvergenceState::Current,
            eval("apps", "Deployment", &deployment).state
        );
    }

    #[test]
    fn deployment_progress_deadline_is_terminal() {
        let deployment = json!({
            "metadata": {"generation": 1},
            "spec": {"replicas": 1},
            "status": {
                "observedGeneration": 1,
                "conditions": [{
                    "type": "Progressing",
                    "status": "False",
                    "reason": "ProgressDeadlineExceeded",
                    "message": "deployment exceeded its progress deadline"
                }]
            }
        });
        let readiness = eval("apps", "Deployment", &deployment);
        assert_eq!(ConvergenceState::Failed, readiness.state);
        assert_eq!("deployment exceeded its progress deadline", readiness.message);
    }

    #[test]
    fn job_failed_condition_is_terminal() {
        let job = json!({
            "status": {
                "conditions": [{"type": "Failed", "status": "True", "message": "backoff limit exceeded"}]
            }
        });
        let readiness = eval("batch", "Job", &job);
        assert_eq!(ConvergenceState::Failed, readiness.state);
        assert_eq!("backoff limit exceeded", readiness.message);
    }

    #[test]
    fn job_completes_by_succeeded_count() {
        let job = json!({
            "spec": {"completions": 2},
            "status": {"succeeded": 2}
        });
        assert_eq!(ConvergenceState::Current, eval("batch", "Job", &job).state);
    }

    #[test]
    fn ready_condition_is_honored_by_the_generic_rule() {
        let object = json!({
            "status": {
                "conditions": [{"type": "Ready", "status": "False", "message": "still syncing"}]
            }
        });
        let readiness = eval("example.com", "Widget", &object);
        assert_eq!(ConvergenceState::InProgress, readiness.state);
        assert_eq!("still syncing", readiness.message);
    }
}
