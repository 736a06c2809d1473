//! Interpretación de los outputs de nombre fijo de cada tipo de run.

use std::collections::BTreeSet;

use log::warn;
use serde::Deserialize;

use super::RunResult;
use crate::constants::*;
use crate::discovery::BuildInfo;
use crate::model::{Contaminant, ScmInfo};

#[derive(Clone, Debug, PartialEq)]
pub enum DiscoveryOutcome {
    Found(ScmInfo),
    /// Terminal: sin url/tag utilizables.
    Missing(String),
}

pub fn discovery_outcome(result: &RunResult) -> DiscoveryOutcome {
    let message = result.output(OUT_MESSAGE).unwrap_or_default().to_string();
    if !result.succeeded {
        let reason = if message.is_empty() { "SCM discovery failed".to_string() } else { message };
        return DiscoveryOutcome::Missing(reason);
    }
    let scm = ScmInfo { url: result.output(OUT_SCM_URL).unwrap_or_default().to_string(),
                        scm_type: result.output(OUT_SCM_TYPE).unwrap_or("git").to_string(),
                        tag: result.output(OUT_SCM_TAG).unwrap_or_default().to_string(),
                        commit: result.output(OUT_SCM_COMMIT).unwrap_or_default().to_string(),
                        path: result.output(OUT_SCM_PATH).unwrap_or_default().to_string(),
                        private: result.output(OUT_SCM_PRIVATE).is_some_and(|p| p.eq_ignore_ascii_case("true")) };
    if scm.is_usable() {
        DiscoveryOutcome::Found(scm)
    } else if message.is_empty() {
        DiscoveryOutcome::Missing(format!("no usable SCM coordinates discovered (url={:?}, tag={:?})", scm.url, scm.tag))
    } else {
        DiscoveryOutcome::Missing(message)
    }
}

/// `build-info` del run de análisis, o el motivo del fallo.
pub fn analysis_outcome(result: &RunResult) -> Result<BuildInfo, String> {
    if !result.succeeded {
        return Err(result.output(OUT_MESSAGE).unwrap_or("build analysis failed").to_string());
    }
    let raw = result.output(OUT_BUILD_INFO).ok_or_else(|| "build analysis produced no build-info".to_string())?;
    BuildInfo::parse(raw).map_err(|e| format!("malformed build-info: {e}"))
}

#[derive(Clone, Debug, PartialEq)]
pub enum BuildOutcome {
    Failed(String),
    Succeeded { deployed: Vec<String>, contaminants: Vec<Contaminant> },
}

/// Detalle opcional de contaminantes (`contaminant-details`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContaminantDetail {
    gav: String,
    #[serde(default)]
    contaminated_artifacts: Vec<String>,
    #[serde(default)]
    allowed: bool,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    build_id: Option<String>,
}

pub fn build_outcome(result: &RunResult) -> BuildOutcome {
    if !result.succeeded {
        return BuildOutcome::Failed(result.output(OUT_MESSAGE).unwrap_or("build failed").to_string());
    }
    let deployed = split_list(result.output(OUT_DEPLOYED));
    let mut contaminants: Vec<Contaminant> = split_list(result.output(OUT_CONTAMINANTS)).into_iter()
                                                                                       .map(Contaminant::new)
                                                                                       .collect();
    if let Some(raw) = result.output(OUT_CONTAMINANT_DETAILS) {
        match serde_json::from_str::<Vec<ContaminantDetail>>(raw) {
            Ok(details) => merge_details(&mut contaminants, details),
            Err(e) => warn!("ignoring malformed {OUT_CONTAMINANT_DETAILS}: {e}"),
        }
    }
    BuildOutcome::Succeeded { deployed, contaminants }
}

fn merge_details(contaminants: &mut Vec<Contaminant>, details: Vec<ContaminantDetail>) {
    for d in details {
        let idx = match contaminants.iter().position(|c| c.gav == d.gav) {
            Some(i) => i,
            None => {
                contaminants.push(Contaminant::new(d.gav.clone()));
                contaminants.len() - 1
            }
        };
        let c = &mut contaminants[idx];
        c.contaminated_artifacts.extend(d.contaminated_artifacts);
        c.allowed = d.allowed;
        c.source = d.source;
        c.build_id = d.build_id;
    }
}

/// Lista separada por comas, sin vacíos ni duplicados, en orden de aparición.
fn split_list(raw: Option<&str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.unwrap_or_default()
       .split(',')
       .map(str::trim)
       .filter(|s| !s.is_empty() && seen.insert(*s))
       .map(str::to_string)
       .collect()
}
