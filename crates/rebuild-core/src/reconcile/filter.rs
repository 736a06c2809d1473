use log::{debug, info};

use super::{Deadline, PassOutcome, ReconcileCtx};
use crate::constants::FILTER_KEY;
use crate::engine::ExecutionEngine;
use crate::errors::{ReconcileError, StoreError};
use crate::filter::create_filter;
use crate::model::{ConfigBlob, RebuiltRecord};
use crate::store::{ObjectStore, TypedStore};

/// Recalcula el filtro desde el conjunto completo de RebuiltRecords y lo
/// publica sólo si los bytes cambiaron.
pub fn reconcile_filter<S, E>(ctx: &ReconcileCtx<S, E>, deadline: &Deadline) -> Result<PassOutcome, ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    let records = ctx.store.list::<RebuiltRecord>()?;
    let bytes = create_filter(records.iter().map(|r| r.gav.as_str()));
    let name = &ctx.config.filter_config_name;

    deadline.check()?;
    match ctx.store.get::<ConfigBlob>(name)? {
        Some(blob) if blob.data.get(FILTER_KEY) == Some(&bytes) => {
            debug!("filter {name} up to date ({} coordinates)", records.len());
        }
        Some(mut blob) => {
            blob.data.insert(FILTER_KEY.to_string(), bytes);
            match ctx.store.update(&mut blob) {
                Ok(()) => info!("filter {name} republished ({} coordinates)", records.len()),
                Err(StoreError::NotFound(_)) => return Ok(PassOutcome::Requeue),
                Err(e) => return Err(e.into()),
            }
        }
        None => {
            let mut blob = ConfigBlob::new(name.clone());
            blob.data.insert(FILTER_KEY.to_string(), bytes);
            match ctx.store.create(&mut blob) {
                Ok(()) => info!("filter {name} published ({} coordinates)", records.len()),
                Err(StoreError::AlreadyExists(_)) => return Ok(PassOutcome::Requeue),
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(PassOutcome::Done)
}
