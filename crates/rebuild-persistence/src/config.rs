//! Carga de configuración de conexión desde variables de entorno.
//! Usa convención `DATABASE_URL` y parámetros opcionales de pool.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, PersistenceError>
        where F: Fn(&str) -> Option<String>
    {
        let url = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty())
                                        .ok_or_else(|| PersistenceError::Config("DATABASE_URL no definido".into()))?;
        let min_connections = lookup("DATABASE_MIN_CONNECTIONS").and_then(|v| v.parse().ok()).unwrap_or(2);
        let max_connections = lookup("DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()).unwrap_or(16);
        Ok(Self { url, min_connections, max_connections })
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() { Lazy::force(&DOTENV_LOADED); }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_url_is_a_config_error() {
        assert!(matches!(DbConfig::from_lookup(|_| None), Err(PersistenceError::Config(_))));
    }

    #[test]
    fn pool_sizes_default_when_unset_or_invalid() {
        let cfg = DbConfig::from_lookup(|k| match k {
                      "DATABASE_URL" => Some("postgres://localhost/rebuild".into()),
                      "DATABASE_MAX_CONNECTIONS" => Some("many".into()),
                      _ => None,
                  }).expect("config");
        assert_eq!(cfg.min_connections, 2);
        assert_eq!(cfg.max_connections, 16);
    }
}
