use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::artifact_key;
use crate::model::ObjectMeta;

/// Coordenada con una reconstrucción limpia completada; input del filtro.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RebuiltRecord {
    pub meta: ObjectMeta,
    pub gav: String,
    pub source_build: String,
}

impl RebuiltRecord {
    pub fn new(gav: impl Into<String>, source_build: impl Into<String>) -> Self {
        let gav = gav.into();
        Self { meta: ObjectMeta::named(artifact_key(&gav)), gav, source_build: source_build.into() }
    }
}

/// Blob binario publicado bajo claves conocidas (p.ej. el filtro).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigBlob {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl ConfigBlob {
    pub fn new(name: impl Into<String>) -> Self { Self { meta: ObjectMeta::named(name), data: BTreeMap::new() } }
}
