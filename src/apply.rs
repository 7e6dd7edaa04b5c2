//! The apply stage: forced server-side-apply of every plan item, in plan order. The
//! first rejection aborts the stage; the caller is responsible for rolling back.

use crate::config::ApplyConfig;
use crate::error::Error;
use crate::plan::PlanItem;

pub async fn apply_plan(config: &ApplyConfig, plan: &[PlanItem]) -> Result<(), Error> {
    for item in plan {
        log::info!("Applying {}", item.identity);
        item.handle
            .apply_patch(
                item.desired.name(),
                item.desired.as_value(),
                config.field_manager.as_str(),
            )
            .await
            .map_err(|source| Error::Apply {
                identity: item.identity.clone(),
                source,
            })?;
    }
    Ok(())
}
