//! The rollback stage. Walks the plan in the same order as the apply stage and puts
//! every resource back the way the snapshot recorded it: pre-existing resources are
//! restored with a full replace, freshly-created ones are deleted. Deletes are
//! tolerant, so items the failed run never reached roll back as no-ops. Any failure
//! here is terminal; a half-rolled-back cluster needs a human.

use crate::error::{ClusterError, Error, RollbackAction};
use crate::plan::PlanItem;

use serde_json::Value;

pub async fn roll_back(plan: &[PlanItem]) -> Result<(), Error> {
    for item in plan {
        match item.backup {
            Some(ref backup) => {
                log::info!("Rollback: restoring prior state of {}", item.identity);
                // the snapshot has no resourceVersion, so the replace is unconditional
                let snapshot: Value =
                    serde_json::from_slice(backup).map_err(|err| Error::RollbackFailed {
                        identity: item.identity.clone(),
                        action: RollbackAction::Restore,
                        source: ClusterError::new(None, err.to_string()),
                    })?;
                item.handle
                    .replace(item.identity.name.as_str(), &snapshot)
                    .await
                    .map_err(|source| Error::RollbackFailed {
                        identity: item.identity.clone(),
                        action: RollbackAction::Restore,
                        source,
                    })?;
            }
            None => {
                log::info!("Rollback: deleting {}", item.identity);
                item.handle
                    .delete(item.identity.name.as_str())
                    .await
                    .map_err(|source| Error::RollbackFailed {
                        identity: item.identity.clone(),
                        action: RollbackAction::Delete,
                        source,
                    })?;
            }
        }
    }
    Ok(())
}
