//! Pases de reconciliación.
//!
//! Un pase lee el estado persistido actual, llama al `decide` puro, aplica
//! los efectos sobre otras entidades y por último persiste la propia entidad
//! (escritura condicionada por `resource_version`). Si algo falla a mitad,
//! el siguiente pase re-deriva todo desde el estado fresco: los efectos son
//! idempotentes.

mod artifact;
mod filter;
mod source_build;

pub use artifact::reconcile_artifact_request;
pub use filter::reconcile_filter;
pub use source_build::reconcile_source_build;

use std::time::{Duration, Instant};

use log::debug;
use tokio::sync::broadcast::error::TryRecvError;

use crate::config::ControllerConfig;
use crate::discovery::{DeclaredOrder, RecipeOrdering};
use crate::engine::ExecutionEngine;
use crate::errors::{ReconcileError, StoreError};
use crate::model::{ArtifactRequest, SourceBuild};
use crate::store::{Kind, ObjectKey, ObjectStore, TypedStore};

/// Re-evaluaciones máximas dentro de un mismo pase.
const MAX_REEVALUATIONS: usize = 8;

/// Colaboradores y configuración inyectados una vez al arrancar.
pub struct ReconcileCtx<S, E> {
    pub store: S,
    pub engine: E,
    pub config: ControllerConfig,
    pub ordering: Box<dyn RecipeOrdering>,
}

impl<S: ObjectStore, E: ExecutionEngine> ReconcileCtx<S, E> {
    pub fn new(store: S, engine: E, config: ControllerConfig) -> Self {
        Self { store, engine, config, ordering: Box::new(DeclaredOrder) }
    }

    pub fn with_ordering(mut self, ordering: impl RecipeOrdering + 'static) -> Self {
        self.ordering = Box::new(ordering);
        self
    }

    pub fn filter_key(&self) -> ObjectKey { ObjectKey::new(Kind::ConfigBlob, self.config.filter_config_name.clone()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    Done,
    Requeue,
    RequeueAfter(Duration),
    /// La entidad ya no existe: no-op terminal.
    Gone,
}

/// Límite de reloj cooperativo: se consulta antes de cada escritura.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self { Self { at: None } }

    pub fn after(budget: Duration) -> Self { Self { at: Instant::now().checked_add(budget) } }

    pub fn check(&self) -> Result<(), ReconcileError> {
        match self.at {
            Some(at) if Instant::now() >= at => Err(ReconcileError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Despacha un pase según el tipo de la clave.
pub fn reconcile<S, E>(ctx: &ReconcileCtx<S, E>, key: &ObjectKey, deadline: &Deadline) -> Result<PassOutcome, ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    match key.kind {
        Kind::ArtifactRequest => reconcile_artifact_request(ctx, &key.name, deadline),
        Kind::SourceBuild => reconcile_source_build(ctx, &key.name, deadline),
        Kind::RebuiltRecord | Kind::ConfigBlob => reconcile_filter(ctx, deadline),
    }
}

/// Una escritura sobre la propia entidad que desapareció a mitad del pase
/// es el no-op terminal, no un error.
pub(crate) fn persist_self<T, S>(store: &S, obj: &mut T) -> Result<Option<PassOutcome>, ReconcileError>
    where T: crate::store::Entity,
          S: ObjectStore
{
    match store.update(obj) {
        Ok(()) => Ok(None),
        Err(StoreError::NotFound(key)) => {
            debug!("{key} vanished mid-pass");
            Ok(Some(PassOutcome::Gone))
        }
        Err(e) => Err(e.into()),
    }
}

/// Reconcilia todo hasta que una ronda completa no escriba nada en el store.
/// Devuelve el número de rondas. Pensado para simulaciones y tests: el
/// runtime real es `crate::runtime::Controller`.
pub fn settle<S, E>(ctx: &ReconcileCtx<S, E>, max_rounds: usize) -> Result<usize, ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    let mut changes = ctx.store.subscribe();
    for round in 1..=max_rounds {
        let mut keys: Vec<ObjectKey> = Vec::new();
        keys.extend(ctx.store.list::<ArtifactRequest>()?.into_iter().map(|r| ObjectKey::new(Kind::ArtifactRequest, r.meta.name)));
        keys.extend(ctx.store.list::<SourceBuild>()?.into_iter().map(|s| ObjectKey::new(Kind::SourceBuild, s.meta.name)));
        keys.push(ctx.filter_key());
        for key in &keys {
            match reconcile(ctx, key, &Deadline::none()) {
                Ok(_) => {}
                Err(e) if e.is_conflict() => debug!("{key}: {e}; retrying next round"),
                Err(e) => return Err(e),
            }
        }
        let mut wrote = false;
        loop {
            match changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => wrote = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if !wrote {
            return Ok(round);
        }
    }
    Err(ReconcileError::InvalidState(format!("store did not settle after {max_rounds} rounds")))
}
