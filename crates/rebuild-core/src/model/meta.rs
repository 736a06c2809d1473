use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadatos comunes a toda entidad del store.
///
/// `resource_version` lo asigna el store en cada escritura; un `update` con
/// una versión vieja falla con `Conflict`. Anotaciones y labels son el canal
/// fuera de banda (comandos de rebuild, TTL, back-references).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub uid: Option<Uuid>,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self { Self { name: name.into(), ..Default::default() } }

    pub fn annotation(&self, key: &str) -> Option<&str> { self.annotations.get(key).map(String::as_str) }

    pub fn label(&self, key: &str) -> Option<&str> { self.labels.get(key).map(String::as_str) }

    /// Prefijo de ids de run: nombre más 8 hex del uid, para que una
    /// instancia recreada con el mismo nombre no herede runs viejos.
    pub fn run_prefix(&self) -> String {
        match self.uid {
            Some(uid) => {
                let hex = uid.simple().to_string();
                format!("{}-{}", self.name, &hex[..8])
            }
            None => self.name.clone(),
        }
    }
}
