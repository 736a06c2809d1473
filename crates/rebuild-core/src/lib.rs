//! rebuild-core: plano de control de reconstrucciones.
//!
//! Dos máquinas de estado acopladas (ArtifactRequest y SourceBuild) que
//! convergen por reconciliación level-triggered sobre un object store con
//! concurrencia optimista. Cada handler es una función pura
//! `decide(actual, relacionado) -> (nuevo estado, efectos)`; los pases de
//! `reconcile` leen estado fresco, aplican efectos y persisten.
pub mod config;
pub mod constants;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod filter;
pub mod hashing;
pub mod identity;
pub mod model;
pub mod queue;
pub mod reconcile;
pub mod resolver;
pub mod runtime;
pub mod store;

pub use config::ControllerConfig;
pub use discovery::{BuildInfo, DeclaredOrder, RecipeOrdering};
pub use engine::{ExecutionEngine, InMemoryExecutionEngine, RunRequest, RunResult};
pub use errors::{EngineError, ReconcileError, StoreError};
pub use identity::{artifact_key, source_build_key};
pub use model::{ArtifactRequest, ArtifactState, BuildRecipe, ConfigBlob, Contaminant, RebuiltRecord, ScmInfo, SourceBuild,
                SourceBuildState};
pub use queue::WorkQueue;
pub use reconcile::{PassOutcome, ReconcileCtx};
pub use runtime::Controller;
pub use store::{InMemoryObjectStore, Kind, ObjectKey, ObjectStore, TypedStore};
