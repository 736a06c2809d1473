//! Identidad y deduplicación.
//!
//! Funciones puras: mismo input, misma clave, entre llamadas y reinicios.
//! `artifact_key` da el nombre de la ArtifactRequest de un GAV;
//! `source_build_key` da el nombre del SourceBuild de una ubicación SCM y es la
//! clave de dedup (independiente de qué request lo creó).

use crate::constants::{CONTAMINATED_BY_PREFIX, CONTAMINATED_SUFFIX_LEN, MAX_NAME_LEN};
use crate::hashing::short_digest;

const ARTIFACT_SUFFIX_LEN: usize = 8;
const SOURCE_BUILD_KEY_LEN: usize = 32;

/// Slug determinista de un GAV: se descarta el grupo, cada racha de
/// caracteres no alfanuméricos colapsa a un `.`, se pasa a minúsculas y se
/// agrega `-` + 8 hex del digest del GAV completo.
///
/// El resultado cabe en 63 caracteres y sólo contiene `[a-z0-9.-]`, empezando
/// y terminando en alfanumérico.
pub fn artifact_key(gav: &str) -> String {
    let name_part = gav.split_once(':').map_or(gav, |(_, rest)| rest);
    let mut slug = String::with_capacity(name_part.len());
    let mut pending_sep = false;
    for c in name_part.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('.');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    let max_slug = MAX_NAME_LEN - ARTIFACT_SUFFIX_LEN - 1;
    if slug.len() > max_slug {
        slug.truncate(max_slug);
        while slug.ends_with('.') {
            slug.pop();
        }
    }
    let suffix = short_digest(gav, ARTIFACT_SUFFIX_LEN);
    if slug.is_empty() { format!("gav-{suffix}") } else { format!("{slug}-{suffix}") }
}

/// Clave de dedup del SourceBuild: digest de `url + tag + path`.
pub fn source_build_key(url: &str, tag: &str, path: &str) -> String {
    let mut joined = String::with_capacity(url.len() + tag.len() + path.len());
    joined.push_str(url);
    joined.push_str(tag);
    joined.push_str(path);
    short_digest(&joined, SOURCE_BUILD_KEY_LEN)
}

/// Clave de anotación de back-reference hacia un SourceBuild contaminado.
pub fn contamination_annotation(source_build: &str) -> String {
    format!("{CONTAMINATED_BY_PREFIX}{}", short_digest(source_build, CONTAMINATED_SUFFIX_LEN))
}
