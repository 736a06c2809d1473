//! Errores del core.
//!
//! Ningún error de colaborador se refleja en el estado de las entidades: el
//! runtime los traduce siempre a un requeue.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("object not found: {0}")] NotFound(String),
    #[error("object already exists: {0}")] AlreadyExists(String),
    #[error("resource version conflict on {key} (expected {expected})")]
    Conflict { key: String, expected: u64 },
    #[error("store unavailable: {0}")] Unavailable(String),
    #[error("serialization: {0}")] Serialization(String),
    #[error("backend: {0}")] Backend(String),
}

impl StoreError {
    /// Conflictos e indisponibilidad se resuelven re-encolando el pase.
    pub fn is_transient(&self) -> bool { matches!(self, Self::Conflict { .. } | Self::Unavailable(_)) }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self { Self::Serialization(e.to_string()) }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("execution engine unavailable: {0}")] Unavailable(String),
    #[error("run rejected: {0}")] Rejected(String),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Engine(#[from] EngineError),
    #[error("pass deadline exceeded")] DeadlineExceeded,
    #[error("invalid state: {0}")] InvalidState(String),
    /// El pase terminó por pánico o cancelación de la tarea.
    #[error("pass aborted: {0}")] Aborted(String),
}

impl ReconcileError {
    /// Carrera de escritura perdida (update con versión vieja o create de una
    /// clave que otro pase acaba de crear): se re-encola de inmediato.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. } | StoreError::AlreadyExists(_)))
    }
}
