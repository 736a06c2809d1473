//! Constantes compartidas: claves de anotaciones/labels y nombres fijos de
//! outputs del motor de ejecución.
//!
//! Los nombres de outputs forman parte del contrato con el motor externo; no
//! cambiarlos sin versionar ambos lados.

/// Prefijo común de anotaciones y labels.
pub const DOMAIN_PREFIX: &str = "rebuild.io/";

/// Comando de rebuild: `true` (plano) o `failed` (sólo si está Failed).
pub const REBUILD_ANNOTATION: &str = "rebuild.io/rebuild";
pub const REBUILD_PLAIN: &str = "true";
pub const REBUILD_FAILED_ONLY: &str = "failed";
/// Marca escrita cuando la request observa su propio reset a New.
pub const REBUILD_DONE_ANNOTATION: &str = "rebuild.io/rebuild-done";
/// Segundos tras alcanzar estado terminal antes de borrar la request.
pub const TTL_ANNOTATION: &str = "rebuild.io/ttl";
/// Prefijo de back-reference de contaminación; sufijo = digest del nombre del SourceBuild.
pub const CONTAMINATED_BY_PREFIX: &str = "rebuild.io/contaminated-";
/// Longitud (hex) del sufijo de la anotación de contaminación.
pub const CONTAMINATED_SUFFIX_LEN: usize = 20;

pub const SOURCE_BUILD_LABEL: &str = "rebuild.io/source-build-id";
pub const CONTAMINANT_OF_LABEL: &str = "rebuild.io/contaminant-of";

// Outputs del motor (discovery SCM)
pub const OUT_SCM_URL: &str = "scm-url";
pub const OUT_SCM_TYPE: &str = "scm-type";
pub const OUT_SCM_TAG: &str = "scm-tag";
pub const OUT_SCM_COMMIT: &str = "scm-commit";
pub const OUT_SCM_PATH: &str = "scm-path";
pub const OUT_SCM_PRIVATE: &str = "scm-private";
pub const OUT_MESSAGE: &str = "message";
// Outputs del motor (análisis y build)
pub const OUT_BUILD_INFO: &str = "build-info";
pub const OUT_DEPLOYED: &str = "deployed-artifacts";
pub const OUT_CONTAMINANTS: &str = "contaminants";
pub const OUT_CONTAMINANT_DETAILS: &str = "contaminant-details";

/// Clave dentro del ConfigBlob donde se publica el filtro.
pub const FILTER_KEY: &str = "filter";
pub const DEFAULT_FILTER_CONFIG_NAME: &str = "rebuild-filter";

/// Límite de longitud de nombres de entidades (estilo DNS label).
pub const MAX_NAME_LEN: usize = 63;
