//! Configuración central de la aplicación.
//! Carga `.env` una sola vez y compone la configuración del controlador con
//! la política de orden de recetas y, si hay `DATABASE_URL`, la del pool.
use std::env;

use rebuild_core::ControllerConfig;
use rebuild_persistence::{init_dotenv, DbConfig, PersistenceError};

use crate::error::RebuildError;

pub const DEFAULT_RECIPE_ORDER: &str = "preferred-jdk";

/// Configuración global de la aplicación.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub controller: ControllerConfig,
    /// Nombre de la política (`REBUILD_RECIPE_ORDER`), ver `rebuild_policies::ordering_by_name`.
    pub recipe_order: String,
    /// `None` sin `DATABASE_URL`: sólo backends en memoria.
    pub database: Option<DbConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { controller: ControllerConfig::default(), recipe_order: DEFAULT_RECIPE_ORDER.to_string(), database: None }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, RebuildError> {
        init_dotenv();
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, RebuildError>
        where F: Fn(&str) -> Option<String>
    {
        let controller = ControllerConfig::from_lookup(&lookup)?;
        let recipe_order = lookup("REBUILD_RECIPE_ORDER").map(|v| v.trim().to_string())
                                                         .filter(|v| !v.is_empty())
                                                         .unwrap_or_else(|| DEFAULT_RECIPE_ORDER.to_string());
        let database = match DbConfig::from_lookup(&lookup) {
            Ok(db) => Some(db),
            Err(PersistenceError::Config(_)) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self { controller, recipe_order, database })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_in_memory_with_preferred_jdk() {
        let cfg = AppConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(cfg, AppConfig::default());
        assert!(cfg.database.is_none());
    }

    #[test]
    fn composes_controller_order_and_database() {
        let cfg = AppConfig::from_lookup(lookup(&[("REBUILD_WORKERS", "2"),
                                                  ("REBUILD_RECIPE_ORDER", " declared "),
                                                  ("DATABASE_URL", "postgres://localhost/rebuild")])).expect("config");
        assert_eq!(cfg.controller.workers, 2);
        assert_eq!(cfg.recipe_order, "declared");
        assert_eq!(cfg.database.map(|d| d.url).as_deref(), Some("postgres://localhost/rebuild"));
    }

    #[test]
    fn controller_errors_propagate() {
        let err = AppConfig::from_lookup(lookup(&[("REBUILD_ENABLED", "maybe")])).expect_err("debe fallar");
        assert!(matches!(err, RebuildError::Config(_)));
    }
}
