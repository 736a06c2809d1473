//! Arranque de la aplicación: resuelve la política de orden, arma el
//! `ReconcileCtx` y envuelve el `Controller`.

use std::time::Duration;

use log::info;
use rebuild_core::{Controller, ExecutionEngine, ObjectStore, ReconcileCtx};
use rebuild_policies::ordering_by_name;

use crate::config::AppConfig;
use crate::error::RebuildError;

pub struct AppState<S, E> {
    pub config: AppConfig,
    pub controller: Controller<S, E>,
}

/// Construye el estado sin arrancar nada.
pub fn bootstrap<S, E>(store: S, engine: E, config: AppConfig) -> Result<AppState<S, E>, RebuildError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    let ordering =
        ordering_by_name(&config.recipe_order).ok_or_else(|| RebuildError::UnknownOrdering(config.recipe_order.clone()))?;
    let mut ctx = ReconcileCtx::new(store, engine, config.controller.clone());
    ctx.ordering = ordering;
    info!("bootstrap: recipe order {} ({}), {} builder images",
          config.recipe_order,
          ctx.ordering.id(),
          config.controller.builder_images.len());
    Ok(AppState { config, controller: Controller::new(ctx) })
}

impl<S: ObjectStore, E: ExecutionEngine> AppState<S, E> {
    pub async fn start(&mut self) -> Result<(), RebuildError> {
        self.controller.start().await?;
        Ok(())
    }

    pub async fn wait_idle(&self, timeout: Duration) -> bool { self.controller.wait_idle(timeout).await }

    pub async fn shutdown(self) { self.controller.shutdown().await }
}
