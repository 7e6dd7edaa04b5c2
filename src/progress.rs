//! Line-oriented progress output for interactive runs. The reporter is given to the
//! engine so tests can capture everything it writes. Io errors from the sink are
//! ignored; progress output must never fail a run.

use crate::resource::ResourceIdentity;
use crate::status::ConvergenceState;

use std::collections::HashMap;
use std::io::{self, Write};

pub struct ProgressReporter {
    out: Box<dyn Write + Send>,
    last: HashMap<ResourceIdentity, ConvergenceState>,
}

impl ProgressReporter {
    pub fn new(out: Box<dyn Write + Send>) -> ProgressReporter {
        ProgressReporter {
            out,
            last: HashMap::new(),
        }
    }

    pub fn stdout() -> ProgressReporter {
        ProgressReporter::new(Box::new(io::stdout()))
    }

    /// Announces the set of resources the wait stage will track.
    pub fn tracked(&mut self, identities: &[ResourceIdentity]) {
        let _ = writeln!(self.out, "⏳ waiting for resources:");
        for identity in identities {
            let _ = writeln!(self.out, " - {}", identity);
        }
    }

    /// Prints one wait-progress line. A line is only printed when the resource's state
    /// actually changed, so a slow resource does not flood the output on every poll.
    pub fn waiting(&mut self, identity: &ResourceIdentity, state: ConvergenceState) {
        if self.last.get(identity) == Some(&state) {
            return;
        }
        match identity.namespace() {
            Some(ns) => {
                let _ = writeln!(
                    self.out,
                    "[watch] waiting: {} {}/{} -> {}",
                    identity.kind, ns, identity.name, state
                );
            }
            None => {
                let _ = writeln!(
                    self.out,
                    "[watch] waiting: {} {} -> {}",
                    identity.kind, identity.name, state
                );
            }
        }
        self.last.insert(identity.clone(), state);
    }

    pub fn success(&mut self) {
        let _ = writeln!(self.out, "✓ success");
    }

    pub fn no_trackable(&mut self) {
        let _ = writeln!(self.out, "✓ no trackable resources");
    }

    pub fn rollback_started(&mut self, cause: &dyn std::fmt::Display) {
        let _ = writeln!(self.out, "⟲ rollback: {}", cause);
    }

    pub fn rollback_complete(&mut self) {
        let _ = writeln!(self.out, "rollback complete");
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("last", &self.last)
            .finish()
    }
}
