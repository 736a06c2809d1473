//! ArtifactRequest: una por GAV pedido.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{artifact_key, source_build_key};
use crate::model::ObjectMeta;

/// Coordenadas SCM descubiertas para un artefacto.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScmInfo {
    pub url: String,
    #[serde(default)]
    pub scm_type: String,
    pub tag: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub private: bool,
}

impl ScmInfo {
    pub fn new(url: impl Into<String>, tag: impl Into<String>, path: impl Into<String>) -> Self {
        Self { url: url.into(),
               scm_type: "git".into(),
               tag: tag.into(),
               path: path.into(),
               ..Default::default() }
    }

    /// Sin url o sin tag no hay nada que construir.
    pub fn is_usable(&self) -> bool { !self.url.is_empty() && !self.tag.is_empty() }

    pub fn source_build_key(&self) -> String { source_build_key(&self.url, &self.tag, &self.path) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactState {
    #[default]
    New,
    Discovering,
    Building,
    Complete,
    Failed,
    Missing,
}

impl ArtifactState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Discovering => "Discovering",
            Self::Building => "Building",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Missing => "Missing",
        }
    }

    /// Estados en los que corre el TTL.
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Complete | Self::Failed | Self::Missing) }
}

impl std::fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRequest {
    pub meta: ObjectMeta,
    pub gav: String,
    #[serde(default)]
    pub scm: Option<ScmInfo>,
    #[serde(default)]
    pub state: ArtifactState,
    /// Diagnóstico visible (Failed/Missing).
    #[serde(default)]
    pub message: String,
    /// Número de runs de discovery lanzados; forma parte del run id.
    #[serde(default)]
    pub discovery_attempts: u32,
    /// Momento en que entró al estado terminal actual (base del TTL).
    #[serde(default)]
    pub terminal_since: Option<DateTime<Utc>>,
}

impl ArtifactRequest {
    pub fn new(gav: impl Into<String>) -> Self {
        let gav = gav.into();
        Self { meta: ObjectMeta::named(artifact_key(&gav)),
               gav,
               scm: None,
               state: ArtifactState::New,
               message: String::new(),
               discovery_attempts: 0,
               terminal_since: None }
    }

    pub fn name(&self) -> &str { &self.meta.name }
}
