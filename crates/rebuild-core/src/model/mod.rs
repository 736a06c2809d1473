//! Modelo de entidades persistidas.

pub mod artifact_request;
pub mod meta;
pub mod records;
pub mod source_build;

pub use artifact_request::{ArtifactRequest, ArtifactState, ScmInfo};
pub use meta::ObjectMeta;
pub use records::{ConfigBlob, RebuiltRecord};
pub use source_build::{BuildAttempt, BuildRecipe, Contaminant, SourceBuild, SourceBuildState};
