//! Contrato JSON de discovery (`build-info`) y expansión a recetas candidatas.
//!
//! ```json
//! {"tools": {"jdk": {"min": "8", "max": "17", "preferred": "11"},
//!            "maven": {"min": "3.8", "max": "3.9", "preferred": "3.8.8"}},
//!  "invocations": [["clean", "install", "-DskipTests"]],
//!  "enforceVersion": "1.0", "ignoredArtifacts": ["com.acme:docs"]}
//! ```
//!
//! Candidatos = imagen de builder × invocación, filtrando imágenes fuera del
//! rango JDK. El orden final lo decide un `RecipeOrdering`.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::config::BuilderImage;
use crate::model::BuildRecipe;

pub const JDK_TOOL: &str = "jdk";
pub const DEFAULT_BUILD_TOOL: &str = "maven";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolVersions {
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
    #[serde(default)]
    pub preferred: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    #[serde(default)]
    pub tools: BTreeMap<String, ToolVersions>,
    #[serde(default)]
    pub invocations: Vec<Vec<String>>,
    #[serde(default)]
    pub enforce_version: Option<String>,
    #[serde(default)]
    pub ignored_artifacts: Vec<String>,
    /// Argumentos agregados a toda invocación.
    #[serde(default)]
    pub additional_args: Vec<String>,
}

impl BuildInfo {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> { serde_json::from_str(raw) }

    /// Herramienta de build declarada: gradle si aparece, si no la primera
    /// distinta de `jdk`, si no maven.
    pub fn build_tool(&self) -> (&str, Option<&ToolVersions>) {
        if let Some(v) = self.tools.get("gradle") {
            return ("gradle", Some(v));
        }
        self.tools
            .iter()
            .find(|(name, _)| name.as_str() != JDK_TOOL)
            .map(|(name, v)| (name.as_str(), Some(v)))
            .unwrap_or((DEFAULT_BUILD_TOOL, None))
    }

    pub fn jdk(&self) -> Option<&ToolVersions> { self.tools.get(JDK_TOOL) }

    /// ¿La versión mayor de JDK cae en el rango declarado?
    pub fn accepts_jdk(&self, major: u32) -> bool {
        let Some(jdk) = self.jdk() else { return true };
        let min_ok = jdk.min.as_deref().and_then(parse_major).map_or(true, |min| major >= min);
        let max_ok = jdk.max.as_deref().and_then(parse_major).map_or(true, |max| major <= max);
        min_ok && max_ok
    }
}

/// Versión mayor de JDK: `1.8` → 8, `11` → 11, `17.0.2` → 17.
pub fn parse_major(version: &str) -> Option<u32> {
    let mut parts = version.trim().split(['.', '_', '-']);
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        return parts.next()?.parse().ok();
    }
    Some(first)
}

/// Producto cruzado imagen × invocación, sin duplicados, en orden declarado.
pub fn candidate_recipes(info: &BuildInfo, images: &[BuilderImage]) -> Vec<BuildRecipe> {
    let (tool, versions) = info.build_tool();
    let tool_version = versions.and_then(|v| v.preferred.clone());
    let mut set: IndexSet<BuildRecipe> = IndexSet::new();
    for image in images.iter().filter(|i| info.accepts_jdk(i.jdk)) {
        for invocation in &info.invocations {
            let mut args = invocation.clone();
            args.extend(info.additional_args.iter().cloned());
            set.insert(BuildRecipe { image: image.image.clone(),
                                     jdk: image.jdk,
                                     tool: tool.to_string(),
                                     tool_version: tool_version.clone(),
                                     invocation: args,
                                     enforce_version: info.enforce_version.clone(),
                                     ignored_artifacts: info.ignored_artifacts.clone() });
        }
    }
    set.into_iter().collect()
}

/// Orden de preferencia de recetas candidatas. Debe ser determinista: el
/// cursor de intentos indexa esta lista.
pub trait RecipeOrdering: Send + Sync {
    fn id(&self) -> &str;
    fn order(&self, info: &BuildInfo, candidates: Vec<BuildRecipe>) -> Vec<BuildRecipe>;
}

/// Conserva el orden del producto cruzado.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeclaredOrder;

impl RecipeOrdering for DeclaredOrder {
    fn id(&self) -> &str { "declared_order_v1" }
    fn order(&self, _info: &BuildInfo, candidates: Vec<BuildRecipe>) -> Vec<BuildRecipe> { candidates }
}
