//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas y de ahí a los
//! `StoreError` que entiende el core.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use rebuild_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("configuration: {0}")]
    Config(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl PersistenceError {
    /// Errores que conviene reintentar en el acto (backoff corto).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SerializationConflict | Self::TransientIo(_) => true,
            // Algunos drivers sólo dejan el texto; best-effort sin SQLSTATE.
            Self::Unknown(msg) => {
                let m = msg.to_lowercase();
                m.contains("deadlock detected")
                || m.contains("could not serialize access")
                || m.contains("terminating connection")
                || m.contains("connection closed")
                || m.contains("connection refused")
                || m.contains("timeout")
            }
            _ => false,
        }
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Unknown(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound => StoreError::NotFound("row".into()),
            PersistenceError::UniqueViolation(m) => StoreError::AlreadyExists(m),
            e @ (PersistenceError::SerializationConflict | PersistenceError::TransientIo(_)) => StoreError::Unavailable(e.to_string()),
            e => StoreError::Backend(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_map_to_unavailable() {
        let e: StoreError = PersistenceError::TransientIo("pool timeout".into()).into();
        assert!(e.is_transient());
        let e: StoreError = PersistenceError::SerializationConflict.into();
        assert!(e.is_transient());
    }

    #[test]
    fn check_violations_are_permanent() {
        let e = PersistenceError::CheckViolation("objects_kind_chk".into());
        assert!(!e.is_retryable());
        assert!(matches!(StoreError::from(e), StoreError::Backend(_)));
    }

    #[test]
    fn unknown_errors_are_retryable_by_message() {
        assert!(PersistenceError::Unknown("Deadlock detected".into()).is_retryable());
        assert!(!PersistenceError::Unknown("syntax error".into()).is_retryable());
    }
}
