//! rebuildflow
//!
//! Fachada del plano de control de rebuilds:
//! - `config`: `AppConfig` (controlador, orden de recetas, base de datos).
//! - `app`: arranque del `Controller` a partir de la configuración.
//! - `error`: errores de arranque.
//!
//! Los crates del workspace se re-exportan para que un binario dependa sólo
//! de éste.

pub mod app;
pub mod config;
pub mod error;

pub use app::{bootstrap, AppState};
pub use config::AppConfig;
pub use error::RebuildError;

pub use rebuild_core;
pub use rebuild_persistence;
pub use rebuild_policies;
