//! Contrato con el motor de ejecución externo.
//!
//! El motor recibe un `RunRequest` (idempotente por `run_id`), corre de forma
//! asíncrona y deja un `RunResult` con outputs de nombre fijo (ver
//! `constants::OUT_*`). Las finalizaciones se difunden para que el runtime
//! re-encole la entidad dueña del run.

mod memory;
pub mod outputs;

pub use memory::InMemoryExecutionEngine;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::constants::OUT_MESSAGE;
use crate::errors::EngineError;
use crate::model::{BuildRecipe, ScmInfo};
use crate::store::{Kind, ObjectKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunKind {
    /// ¿De qué repositorio/tag salió este GAV?
    ScmDiscovery,
    /// Análisis del fuente: produce el JSON `build-info`.
    BuildAnalysis,
    Build,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub run_id: String,
    pub kind: RunKind,
    pub owner: ObjectKey,
    #[serde(default)]
    pub gav: Option<String>,
    #[serde(default)]
    pub scm: Option<ScmInfo>,
    #[serde(default)]
    pub recipe: Option<BuildRecipe>,
}

impl RunRequest {
    pub fn scm_discovery(run_id: impl Into<String>, request: &str, gav: &str) -> Self {
        Self { run_id: run_id.into(),
               kind: RunKind::ScmDiscovery,
               owner: ObjectKey::new(Kind::ArtifactRequest, request),
               gav: Some(gav.to_string()),
               scm: None,
               recipe: None }
    }

    pub fn build_analysis(run_id: impl Into<String>, source_build: &str, scm: &ScmInfo) -> Self {
        Self { run_id: run_id.into(),
               kind: RunKind::BuildAnalysis,
               owner: ObjectKey::new(Kind::SourceBuild, source_build),
               gav: None,
               scm: Some(scm.clone()),
               recipe: None }
    }

    pub fn build(run_id: impl Into<String>, source_build: &str, scm: &ScmInfo, recipe: &BuildRecipe) -> Self {
        Self { run_id: run_id.into(),
               kind: RunKind::Build,
               owner: ObjectKey::new(Kind::SourceBuild, source_build),
               gav: None,
               scm: Some(scm.clone()),
               recipe: Some(recipe.clone()) }
    }
}

/// Resultado estructurado de un run terminado.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub succeeded: bool,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl RunResult {
    pub fn success() -> Self { Self { succeeded: true, outputs: BTreeMap::new() } }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { succeeded: false, outputs: BTreeMap::new() }.with_output(OUT_MESSAGE, message)
    }

    pub fn with_output(mut self, name: &str, value: impl Into<String>) -> Self {
        self.outputs.insert(name.to_string(), value.into());
        self
    }

    /// Output no vacío con ese nombre.
    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunCompletion {
    pub run_id: String,
    pub owner: ObjectKey,
}

pub trait ExecutionEngine: Send + Sync + 'static {
    /// Lanza el run; re-enviar un `run_id` existente es un no-op.
    fn submit(&self, run: &RunRequest) -> Result<(), EngineError>;
    /// `None` mientras el run no haya terminado (o no exista).
    fn result(&self, run_id: &str) -> Result<Option<RunResult>, EngineError>;
    fn completions(&self) -> broadcast::Receiver<RunCompletion>;
}

impl<E: ExecutionEngine + ?Sized> ExecutionEngine for std::sync::Arc<E> {
    fn submit(&self, run: &RunRequest) -> Result<(), EngineError> { (**self).submit(run) }
    fn result(&self, run_id: &str) -> Result<Option<RunResult>, EngineError> { (**self).result(run_id) }
    fn completions(&self) -> broadcast::Receiver<RunCompletion> { (**self).completions() }
}
