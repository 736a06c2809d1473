//! Cascada de rebuild.
//!
//! Disparada por la anotación `rebuild.io/rebuild`:
//! 1. resolver el SourceBuild actual por su clave,
//! 2. propagar el comando a las demás requests dueñas,
//! 3. borrar el SourceBuild,
//! 4. volver la request a New.
//!
//! Cada hermana re-deriva los pasos por su cuenta y sólo limpia su propio
//! comando después de observarse en New. Una request que ya no figura entre
//! los owners del SourceBuild actual (uno recreado tras la cascada) no lo
//! borra: así dos hermanas nunca se rebotan el comando indefinidamente.

use super::artifact::{reset_to_new, ArtifactDecision, ArtifactEffect, ArtifactInputs};
use super::{Decision, FollowUp};
use crate::constants::{REBUILD_ANNOTATION, REBUILD_DONE_ANNOTATION, REBUILD_FAILED_ONLY, REBUILD_PLAIN};
use crate::model::{ArtifactRequest, ArtifactState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RebuildCommand {
    Plain,
    /// Sólo si la request está Failed; si no, el comando se descarta.
    FailedOnly,
    Unrecognized(String),
}

pub fn rebuild_command(req: &ArtifactRequest) -> Option<RebuildCommand> {
    req.meta.annotation(REBUILD_ANNOTATION).map(|v| match v.trim() {
                                               REBUILD_PLAIN => RebuildCommand::Plain,
                                               REBUILD_FAILED_ONLY => RebuildCommand::FailedOnly,
                                               other => RebuildCommand::Unrecognized(other.to_string()),
                                           })
}

fn clear_command(req: &ArtifactRequest) -> ArtifactRequest {
    let mut next = req.clone();
    next.meta.annotations.remove(REBUILD_ANNOTATION);
    next
}

pub fn decide(inp: &ArtifactInputs<'_>, command: RebuildCommand) -> ArtifactDecision {
    let req = inp.request;
    match command {
        RebuildCommand::Unrecognized(value) => {
            return Decision::update(clear_command(req)).then(FollowUp::Reevaluate)
                                                       .warn(format!("ignoring unrecognized rebuild command {value:?}"));
        }
        RebuildCommand::FailedOnly if !matches!(req.state, ArtifactState::Failed | ArtifactState::New) => {
            return Decision::update(clear_command(req)).then(FollowUp::Reevaluate);
        }
        RebuildCommand::Plain | RebuildCommand::FailedOnly => {}
    }

    if req.state == ArtifactState::New {
        // Reset propio observado: recién ahora se limpia el comando.
        let mut next = clear_command(req);
        next.meta.annotations.insert(REBUILD_DONE_ANNOTATION.to_string(), inp.now.to_rfc3339());
        return Decision::update(next).then(FollowUp::Reevaluate);
    }

    let mut decision = Decision::update(reset_to_new(req));
    let key = req.scm.as_ref().map(|scm| scm.source_build_key());
    let owned = inp.source_build
                   .filter(|sb| Some(sb.name()) == key.as_deref() && sb.owners.contains(req.name()));
    if let Some(sb) = owned {
        let siblings: Vec<String> = sb.owners.iter().filter(|o| o.as_str() != req.name()).cloned().collect();
        if !siblings.is_empty() {
            decision = decision.with_effect(ArtifactEffect::PropagateRebuild { source_build: sb.name().to_string(), siblings });
        }
        decision = decision.with_effect(ArtifactEffect::DeleteSourceBuild { name: sb.name().to_string() });
    }
    decision
}
