use rebuild_core::config::ConfigError;
use rebuild_core::ReconcileError;
use rebuild_persistence::PersistenceError;
use thiserror::Error;

/// Errores de arranque y operación de la aplicación.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("configuración inválida: {0}")]
    Config(#[from] ConfigError),
    #[error("orden de recetas desconocido: {0}")]
    UnknownOrdering(String),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
