//! Máquinas de estado puras.
//!
//! Cada `decide` recibe el estado persistido actual y lo relacionado ya
//! leído, y devuelve la entidad actualizada (si cambió) más los efectos sobre
//! otras entidades. No hay I/O aquí; `crate::reconcile` aplica las decisiones.

pub mod artifact;
pub mod cascade;
pub mod contamination;
pub mod source_build;

use std::time::Duration;

/// Qué hacer tras aplicar una decisión.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FollowUp {
    /// Esperar al próximo evento.
    Done,
    /// Volver a decidir en el mismo pase con el estado recién persistido.
    Reevaluate,
    RequeueAfter(Duration),
    /// Borrar la entidad (TTL vencido).
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
#[must_use]
pub struct Decision<T, E> {
    /// `Some` si la entidad cambió y hay que persistirla.
    pub updated: Option<T>,
    pub effects: Vec<E>,
    pub follow_up: FollowUp,
    /// Anomalía a registrar como warning (no es error).
    pub warning: Option<String>,
}

impl<T, E> Decision<T, E> {
    pub fn wait() -> Self { Self { updated: None, effects: Vec::new(), follow_up: FollowUp::Done, warning: None } }

    pub fn update(updated: T) -> Self { Self { updated: Some(updated), ..Self::wait() } }

    pub fn with_effect(mut self, effect: E) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn then(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = follow_up;
        self
    }

    pub fn warn(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn is_noop(&self) -> bool { self.updated.is_none() && self.effects.is_empty() && self.follow_up == FollowUp::Done }
}
