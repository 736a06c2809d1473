//! SourceBuild: una por ubicación SCM única (url, tag, path).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::SOURCE_BUILD_LABEL;
use crate::model::{ObjectMeta, ScmInfo};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceBuildState {
    #[default]
    New,
    SubmitBuild,
    Building,
    Complete,
    Contaminated,
    Failed,
}

impl SourceBuildState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::SubmitBuild => "SubmitBuild",
            Self::Building => "Building",
            Self::Complete => "Complete",
            Self::Contaminated => "Contaminated",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SourceBuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Receta candidata: imagen de builder + invocación.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildRecipe {
    pub image: String,
    /// Versión mayor de JDK de la imagen.
    pub jdk: u32,
    /// Herramienta de build (`maven`, `gradle`, ...).
    pub tool: String,
    #[serde(default)]
    pub tool_version: Option<String>,
    pub invocation: Vec<String>,
    #[serde(default)]
    pub enforce_version: Option<String>,
    #[serde(default)]
    pub ignored_artifacts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildAttempt {
    pub run_id: String,
    pub recipe: BuildRecipe,
    pub succeeded: bool,
    #[serde(default)]
    pub produced: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

/// Componente no reconstruido embebido en la salida de un build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contaminant {
    pub gav: String,
    /// Coordenadas de la salida que lo embeben.
    #[serde(default)]
    pub contaminated_artifacts: BTreeSet<String>,
    #[serde(default)]
    pub allowed: bool,
    #[serde(default)]
    pub rebuild_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
}

impl Contaminant {
    pub fn new(gav: impl Into<String>) -> Self { Self { gav: gav.into(), ..Default::default() } }

    pub fn is_resolved(&self) -> bool { self.allowed || self.rebuild_available }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceBuild {
    pub meta: ObjectMeta,
    pub scm: ScmInfo,
    /// Versión del artefacto que sembró el build.
    #[serde(default)]
    pub version: String,
    /// Registro multi-owner: nombres de ArtifactRequest (sólo referencia).
    #[serde(default)]
    pub owners: BTreeSet<String>,
    #[serde(default)]
    pub state: SourceBuildState,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub recipes: Vec<BuildRecipe>,
    #[serde(default)]
    pub cursor: usize,
    #[serde(default)]
    pub attempts: Vec<BuildAttempt>,
    #[serde(default)]
    pub failed_recipes: Vec<BuildRecipe>,
    #[serde(default)]
    pub contaminants: Vec<Contaminant>,
    #[serde(default)]
    pub deployed_artifacts: Vec<String>,
    /// Runs de build despachados hasta ahora; forma parte del run id.
    #[serde(default)]
    pub dispatched: u32,
    #[serde(default)]
    pub current_run: Option<String>,
}

impl SourceBuild {
    /// SourceBuild nuevo bajo `scm.source_build_key()`, con un primer owner.
    pub fn seed(scm: ScmInfo, version: impl Into<String>, owner: &str) -> Self {
        let name = scm.source_build_key();
        let mut meta = ObjectMeta::named(name.clone());
        meta.labels.insert(SOURCE_BUILD_LABEL.to_string(), name);
        Self { meta,
               scm,
               version: version.into(),
               owners: BTreeSet::from([owner.to_string()]),
               state: SourceBuildState::New,
               message: String::new(),
               recipes: Vec::new(),
               cursor: 0,
               attempts: Vec::new(),
               failed_recipes: Vec::new(),
               contaminants: Vec::new(),
               deployed_artifacts: Vec::new(),
               dispatched: 0,
               current_run: None }
    }

    pub fn name(&self) -> &str { &self.meta.name }

    pub fn has_deployed(&self, gav: &str) -> bool { self.deployed_artifacts.iter().any(|d| d == gav) }

    pub fn current_recipe(&self) -> Option<&BuildRecipe> { self.recipes.get(self.cursor) }

    pub fn unresolved_contaminants(&self) -> impl Iterator<Item = &Contaminant> {
        self.contaminants.iter().filter(|c| !c.is_resolved())
    }
}
