//! rebuild-policies – Orden de preferencia de recetas de build
//!
//! El cursor de intentos de un SourceBuild indexa la lista ordenada, así que
//! toda política debe ser determinista: mismos candidatos y mismos
//! parámetros, mismo orden. Cada decisión queda explicada con un `Rationale`
//! y un hash canónico de parámetros para auditoría.

use log::debug;
use rebuild_core::discovery::parse_major;
use rebuild_core::hashing::{hash_str, to_canonical_json};
use rebuild_core::{BuildInfo, BuildRecipe, DeclaredOrder, RecipeOrdering};
use serde::{Deserialize, Serialize};

/// Parámetros de ordenamiento soportados.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "policy", content = "params")]
pub enum OrderingParams {
    PreferredJdk(PreferredJdkParams),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreferredJdkParams {
    /// JDK fijo; si `None` se usa el `preferred` del build-info.
    pub preferred: Option<u32>,
    pub fallback: JdkFallback,
}

/// Orden del resto de JDKs una vez agotado el preferido.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum JdkFallback {
    /// Mayor versión primero.
    #[default]
    Newest,
    Oldest,
}

/// Explicación tipada del orden elegido.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Rationale {
    pub policy_id: String,
    pub params: OrderingParams,
    pub considered_n: usize,
    /// JDK efectivamente preferido (parámetro o build-info).
    pub preferred_jdk: Option<u32>,
    /// Etiquetas de recetas en el orden final.
    pub order: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OrderingDecision {
    pub policy_id: String,
    pub params_hash: String,
    pub recipes: Vec<BuildRecipe>,
    pub rationale: Rationale,
}

/// Etiqueta legible y estable de una receta.
pub fn recipe_label(recipe: &BuildRecipe) -> String {
    format!("{}@jdk{}:{}", recipe.tool, recipe.jdk, recipe.invocation.join(" "))
}

/// Hash canónico de parámetros.
pub fn params_hash(params: &OrderingParams) -> String {
    serde_json::to_value(params).map(|v| hash_str(&to_canonical_json(&v))).unwrap_or_default()
}

/// Política: primero las recetas del JDK preferido, luego el resto según
/// `fallback`. El sort es estable: dentro de un JDK se conserva el orden de
/// invocaciones declarado.
#[derive(Clone, Debug, Default)]
pub struct PreferredJdkPolicy {
    params: PreferredJdkParams,
}

impl PreferredJdkPolicy {
    pub fn new(params: PreferredJdkParams) -> Self { Self { params } }

    pub fn params(&self) -> OrderingParams { OrderingParams::PreferredJdk(self.params.clone()) }

    fn preferred_jdk(&self, info: &BuildInfo) -> Option<u32> {
        self.params
            .preferred
            .or_else(|| info.jdk().and_then(|j| j.preferred.as_deref()).and_then(parse_major))
    }

    pub fn decide(&self, info: &BuildInfo, candidates: Vec<BuildRecipe>) -> OrderingDecision {
        let considered_n = candidates.len();
        let preferred = self.preferred_jdk(info);
        let fallback = self.params.fallback;
        let mut recipes = candidates;
        recipes.sort_by_key(|r| {
            let rank = match fallback {
                JdkFallback::Newest => u32::MAX - r.jdk,
                JdkFallback::Oldest => r.jdk,
            };
            (Some(r.jdk) != preferred, rank)
        });
        let params = self.params();
        let rationale = Rationale { policy_id: self.id().into(),
                                    params: params.clone(),
                                    considered_n,
                                    preferred_jdk: preferred,
                                    order: recipes.iter().map(recipe_label).collect() };
        OrderingDecision { policy_id: self.id().into(), params_hash: params_hash(&params), recipes, rationale }
    }
}

impl RecipeOrdering for PreferredJdkPolicy {
    fn id(&self) -> &str { "preferred_jdk_v1" }

    fn order(&self, info: &BuildInfo, candidates: Vec<BuildRecipe>) -> Vec<BuildRecipe> {
        let decision = self.decide(info, candidates);
        debug!("recipe order ({}, params {}): {:?}",
               decision.policy_id,
               &decision.params_hash[..decision.params_hash.len().min(12)],
               decision.rationale.order);
        decision.recipes
    }
}

/// Política por nombre (`declared` o `preferred-jdk`), para configuración.
pub fn ordering_by_name(name: &str) -> Option<Box<dyn RecipeOrdering>> {
    match name.trim() {
        "declared" => Some(Box::new(DeclaredOrder)),
        "preferred-jdk" | "preferred-jdk-newest" => Some(Box::new(PreferredJdkPolicy::default())),
        "preferred-jdk-oldest" => {
            Some(Box::new(PreferredJdkPolicy::new(PreferredJdkParams { preferred: None, fallback: JdkFallback::Oldest })))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(jdk: u32, inv: &str) -> BuildRecipe {
        BuildRecipe { image: format!("builder:jdk{jdk}"),
                      jdk,
                      tool: "maven".into(),
                      invocation: vec![inv.into()],
                      ..Default::default() }
    }

    fn candidates() -> Vec<BuildRecipe> {
        vec![recipe(8, "install"), recipe(8, "deploy"), recipe(11, "install"), recipe(11, "deploy"), recipe(17, "install")]
    }

    fn info(preferred: &str) -> BuildInfo {
        BuildInfo::parse(&format!(r#"{{"tools":{{"jdk":{{"preferred":"{preferred}"}}}},"invocations":[["install"]]}}"#))
            .expect("json")
    }

    #[test]
    fn preferred_jdk_first_then_newest() {
        let p = PreferredJdkPolicy::default();
        let order: Vec<(u32, String)> =
            p.order(&info("11"), candidates()).into_iter().map(|r| (r.jdk, r.invocation[0].clone())).collect();
        assert_eq!(order,
                   vec![(11, "install".to_string()),
                        (11, "deploy".to_string()),
                        (17, "install".to_string()),
                        (8, "install".to_string()),
                        (8, "deploy".to_string())]);
    }

    #[test]
    fn explicit_preference_overrides_build_info() {
        let p = PreferredJdkPolicy::new(PreferredJdkParams { preferred: Some(8), fallback: JdkFallback::Oldest });
        let d = p.decide(&info("1.8.0_292"), candidates());
        assert_eq!(d.rationale.preferred_jdk, Some(8));
        let jdks: Vec<u32> = d.recipes.iter().map(|r| r.jdk).collect();
        assert_eq!(jdks, vec![8, 8, 11, 11, 17]);
        assert_eq!(d.rationale.considered_n, 5);
        assert_eq!(d.rationale.order[0], "maven@jdk8:install");
    }

    #[test]
    fn decision_is_deterministic_and_params_hash_tracks_params() {
        let p = PreferredJdkPolicy::default();
        let d1 = p.decide(&info("17"), candidates());
        let d2 = p.decide(&info("17"), candidates());
        assert_eq!(d1, d2);
        assert!(!d1.params_hash.is_empty());

        let other = PreferredJdkPolicy::new(PreferredJdkParams { preferred: None, fallback: JdkFallback::Oldest });
        assert_ne!(params_hash(&p.params()), params_hash(&other.params()));
    }

    #[test]
    fn orderings_resolve_by_name() {
        assert_eq!(ordering_by_name("declared").map(|o| o.id().to_string()).as_deref(), Some("declared_order_v1"));
        assert_eq!(ordering_by_name("preferred-jdk").map(|o| o.id().to_string()).as_deref(), Some("preferred_jdk_v1"));
        assert!(ordering_by_name("random").is_none());
    }
}
