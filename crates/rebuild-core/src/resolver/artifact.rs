//! Resolver de ArtifactRequest.
//!
//! New → Discovering → {Building, Missing}; Building → {Complete, Failed};
//! Failed → Building (recuperación tardía); cualquier estado → New vía
//! cascada de rebuild (`resolver::cascade`).

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{cascade, contamination, Decision, FollowUp};
use crate::constants::{SOURCE_BUILD_LABEL, TTL_ANNOTATION};
use crate::engine::outputs::{discovery_outcome, DiscoveryOutcome};
use crate::engine::{RunRequest, RunResult};
use crate::model::{ArtifactRequest, ArtifactState, ScmInfo, SourceBuild, SourceBuildState};

/// Estado leído para decidir sobre una request.
pub struct ArtifactInputs<'a> {
    pub request: &'a ArtifactRequest,
    /// SourceBuild bajo la clave de `effective_scm`, si existe.
    pub source_build: Option<&'a SourceBuild>,
    /// Resultado del run de discovery en curso, si terminó.
    pub discovery: Option<&'a RunResult>,
    /// SourceBuilds referidos por anotaciones de contaminación.
    pub back_referenced: &'a [SourceBuild],
    pub rebuilds_enabled: bool,
    pub default_ttl: Option<Duration>,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArtifactEffect {
    SubmitDiscovery(RunRequest),
    CreateSourceBuild(SourceBuild),
    /// Inserción idempotente en el registro de owners.
    AttachOwner { source_build: String },
    /// Copia el comando de rebuild a las demás requests dueñas.
    PropagateRebuild { source_build: String, siblings: Vec<String> },
    DeleteSourceBuild { name: String },
    MarkRebuildAvailable { source_build: String, gav: String },
}

pub type ArtifactDecision = Decision<ArtifactRequest, ArtifactEffect>;

pub fn discovery_run_id(request: &ArtifactRequest) -> String {
    format!("{}-scm-discovery-{}", request.meta.run_prefix(), request.discovery_attempts)
}

/// SCM ya registrado en la request o, en Discovering, el que trae el run.
pub fn effective_scm(request: &ArtifactRequest, discovery: Option<&RunResult>) -> Option<ScmInfo> {
    if let Some(scm) = &request.scm {
        return Some(scm.clone());
    }
    if request.state != ArtifactState::Discovering {
        return None;
    }
    match discovery.map(discovery_outcome) {
        Some(DiscoveryOutcome::Found(scm)) => Some(scm),
        _ => None,
    }
}

pub fn decide(inp: &ArtifactInputs<'_>) -> ArtifactDecision {
    if let Some(command) = cascade::rebuild_command(inp.request) {
        return cascade::decide(inp, command);
    }
    match inp.request.state {
        ArtifactState::New => on_new(inp),
        ArtifactState::Discovering => on_discovering(inp),
        ArtifactState::Building => on_building(inp),
        ArtifactState::Failed => on_failed(inp),
        ArtifactState::Complete => on_complete(inp),
        ArtifactState::Missing => with_ttl(inp, Decision::wait()),
    }
}

fn on_new(inp: &ArtifactInputs<'_>) -> ArtifactDecision {
    if !inp.rebuilds_enabled {
        return Decision::wait();
    }
    let mut next = inp.request.clone();
    next.discovery_attempts += 1;
    next.scm = None;
    next.message.clear();
    set_state(&mut next, ArtifactState::Discovering, inp.now);
    let run = RunRequest::scm_discovery(discovery_run_id(&next), next.name(), &next.gav);
    Decision::update(next).with_effect(ArtifactEffect::SubmitDiscovery(run))
}

fn on_discovering(inp: &ArtifactInputs<'_>) -> ArtifactDecision {
    let req = inp.request;
    let scm = match effective_scm(req, inp.discovery) {
        Some(scm) => scm,
        None => {
            return match inp.discovery.map(discovery_outcome) {
                Some(DiscoveryOutcome::Missing(reason)) => missing(inp, reason),
                _ => Decision::wait(),
            }
        }
    };
    // SCM escrito externamente pero todavía vacío: seguir esperando.
    if scm.url.is_empty() && scm.tag.is_empty() && scm.path.is_empty() && req.message.is_empty() {
        return Decision::wait();
    }
    if !scm.is_usable() {
        return missing(inp, format!("discovered SCM coordinates lack url or tag (url={:?}, tag={:?})", scm.url, scm.tag));
    }

    let key = scm.source_build_key();
    let effect = match matching_source_build(inp, &key) {
        Some(sb) if sb.owners.contains(req.name()) => None,
        Some(_) => Some(ArtifactEffect::AttachOwner { source_build: key.clone() }),
        None => Some(ArtifactEffect::CreateSourceBuild(SourceBuild::seed(scm.clone(), version_of(&req.gav), req.name()))),
    };
    let mut next = req.clone();
    next.scm = Some(scm);
    next.message.clear();
    next.meta.labels.insert(SOURCE_BUILD_LABEL.to_string(), key);
    set_state(&mut next, ArtifactState::Building, inp.now);

    // Re-evaluar Building en el mismo pase cierra la ventana entre adjuntar
    // el owner y que el SourceBuild termine.
    let mut decision = Decision::update(next).then(FollowUp::Reevaluate);
    if let Some(effect) = effect {
        decision = decision.with_effect(effect);
    }
    decision
}

fn on_building(inp: &ArtifactInputs<'_>) -> ArtifactDecision {
    let req = inp.request;
    let Some(key) = req.scm.as_ref().map(ScmInfo::source_build_key) else {
        return reset_dangling(inp, "request is Building without SCM coordinates".to_string());
    };
    let Some(sb) = matching_source_build(inp, &key) else {
        return reset_dangling(inp, format!("owning source build {key} not found"));
    };

    let decision = match sb.state {
        SourceBuildState::Complete if sb.has_deployed(&req.gav) => transition(inp, ArtifactState::Complete, String::new()),
        SourceBuildState::Complete => {
            let msg = format!("source build {key} completed but did not deploy {} (deployed: {})",
                              req.gav,
                              sb.deployed_artifacts.join(", "));
            transition(inp, ArtifactState::Failed, msg)
        }
        SourceBuildState::Contaminated => {
            let culprits: Vec<&str> = sb.unresolved_contaminants().map(|c| c.gav.as_str()).collect();
            transition(inp, ArtifactState::Failed, format!("source build {key} is contaminated by {}", culprits.join(", ")))
        }
        SourceBuildState::Failed => transition(inp, ArtifactState::Failed, format!("source build {key} failed: {}", sb.message)),
        SourceBuildState::New | SourceBuildState::SubmitBuild | SourceBuildState::Building => Decision::wait(),
    };
    let decision = attach_if_missing(decision, sb, req);
    with_ttl(inp, decision)
}

fn on_failed(inp: &ArtifactInputs<'_>) -> ArtifactDecision {
    let req = inp.request;
    let Some(key) = req.scm.as_ref().map(ScmInfo::source_build_key) else {
        return reset_dangling(inp, "request is Failed without SCM coordinates".to_string());
    };
    let Some(sb) = matching_source_build(inp, &key) else {
        return reset_dangling(inp, format!("owning source build {key} not found"));
    };
    // Un Complete que no desplegó el GAV volvería a fallar: no se recupera.
    let recover = match sb.state {
        SourceBuildState::Complete => sb.has_deployed(&req.gav),
        SourceBuildState::New | SourceBuildState::SubmitBuild | SourceBuildState::Building => true,
        SourceBuildState::Contaminated | SourceBuildState::Failed => false,
    };
    if recover {
        return transition(inp, ArtifactState::Building, String::new()).then(FollowUp::Reevaluate);
    }
    with_ttl(inp, Decision::wait())
}

fn on_complete(inp: &ArtifactInputs<'_>) -> ArtifactDecision {
    let gav = &inp.request.gav;
    let mut decision = Decision::wait();
    for sb in inp.back_referenced {
        if contamination::should_mark_available(sb, gav) {
            decision = decision.with_effect(ArtifactEffect::MarkRebuildAvailable { source_build: sb.name().to_string(),
                                                                                  gav: gav.clone() });
        }
    }
    with_ttl(inp, decision)
}

fn matching_source_build<'a>(inp: &ArtifactInputs<'a>, key: &str) -> Option<&'a SourceBuild> {
    inp.source_build.filter(|sb| sb.name() == key)
}

fn attach_if_missing(decision: ArtifactDecision, sb: &SourceBuild, req: &ArtifactRequest) -> ArtifactDecision {
    if sb.owners.contains(req.name()) {
        decision
    } else {
        decision.with_effect(ArtifactEffect::AttachOwner { source_build: sb.name().to_string() })
    }
}

fn set_state(req: &mut ArtifactRequest, state: ArtifactState, now: DateTime<Utc>) {
    req.state = state;
    req.terminal_since = state.is_terminal().then_some(now);
}

fn transition(inp: &ArtifactInputs<'_>, state: ArtifactState, message: String) -> ArtifactDecision {
    let mut next = inp.request.clone();
    set_state(&mut next, state, inp.now);
    next.message = message;
    Decision::update(next)
}

fn missing(inp: &ArtifactInputs<'_>, reason: String) -> ArtifactDecision {
    with_ttl(inp, transition(inp, ArtifactState::Missing, reason))
}

/// Vuelve a New limpiando SCM y diagnóstico; conserva anotaciones.
pub fn reset_to_new(req: &ArtifactRequest) -> ArtifactRequest {
    let mut next = req.clone();
    next.state = ArtifactState::New;
    next.scm = None;
    next.message.clear();
    next.terminal_since = None;
    next.meta.labels.remove(SOURCE_BUILD_LABEL);
    next
}

fn reset_dangling(inp: &ArtifactInputs<'_>, reason: String) -> ArtifactDecision {
    Decision::update(reset_to_new(inp.request)).warn(format!("{reason}; resetting to New"))
}

fn version_of(gav: &str) -> &str { gav.rsplit(':').next().unwrap_or(gav) }

fn ttl_of(req: &ArtifactRequest, default_ttl: Option<Duration>) -> Option<Duration> {
    req.meta
       .annotation(TTL_ANNOTATION)
       .and_then(|v| v.trim().parse::<u64>().ok())
       .map(Duration::from_secs)
       .or(default_ttl)
}

/// En estados terminales: borrar si venció el TTL, si no re-encolar para
/// cuando venza.
fn with_ttl(inp: &ArtifactInputs<'_>, mut decision: ArtifactDecision) -> ArtifactDecision {
    if decision.follow_up != FollowUp::Done {
        return decision;
    }
    let (terminal, ttl, terminal_since) = {
        let current = decision.updated.as_ref().unwrap_or(inp.request);
        (current.state.is_terminal(), ttl_of(current, inp.default_ttl), current.terminal_since)
    };
    let Some(ttl) = ttl.filter(|_| terminal) else {
        return decision;
    };
    let since = match terminal_since {
        Some(since) => since,
        None => {
            let mut stamped = decision.updated.take().unwrap_or_else(|| inp.request.clone());
            stamped.terminal_since = Some(inp.now);
            decision.updated = Some(stamped);
            inp.now
        }
    };
    let Some(expires) = chrono::Duration::from_std(ttl).ok().and_then(|d| since.checked_add_signed(d)) else {
        return decision;
    };
    if inp.now >= expires {
        decision.then(FollowUp::Delete)
    } else {
        let remaining = (expires - inp.now).to_std().unwrap_or(Duration::ZERO);
        decision.then(FollowUp::RequeueAfter(remaining))
    }
}
