//! Protocolo de contaminación.
//!
//! Un SourceBuild Contaminated queda así mientras algún contaminante no
//! esté `allowed` ni `rebuild_available`: es contrapresión deliberada, nunca
//! se acepta la salida contaminada.

use std::collections::BTreeSet;

use super::source_build::{SourceBuildDecision, SourceBuildEffect};
use super::{Decision, FollowUp};
use crate::model::{Contaminant, SourceBuild, SourceBuildState};

/// ¿Completar `gav` destraba un contaminante de `sb`?
pub fn should_mark_available(sb: &SourceBuild, gav: &str) -> bool {
    sb.state == SourceBuildState::Contaminated && sb.contaminants.iter().any(|c| c.gav == gav && !c.rebuild_available)
}

/// Marca el contaminante; devuelve si hubo cambio.
pub fn mark_available(sb: &mut SourceBuild, gav: &str) -> bool {
    let mut changed = false;
    for c in sb.contaminants.iter_mut().filter(|c| c.gav == gav && !c.rebuild_available) {
        c.rebuild_available = true;
        changed = true;
    }
    changed
}

/// Decisión en estado Contaminated. `rebuilt` son las coordenadas
/// contaminantes que ya tienen RebuiltRecord.
pub fn decide_contaminated(sb: &SourceBuild, rebuilt: &BTreeSet<String>) -> SourceBuildDecision {
    let mut next = sb.clone();
    let mut changed = false;
    for gav in rebuilt {
        changed |= mark_available(&mut next, gav);
    }

    if next.contaminants.iter().all(Contaminant::is_resolved) {
        next.cursor = 0;
        next.state = SourceBuildState::SubmitBuild;
        next.current_run = None;
        next.message.clear();
        return Decision::update(next).then(FollowUp::Reevaluate);
    }

    let name = sb.name().to_string();
    let mut decision = if changed { Decision::update(next.clone()) } else { Decision::wait() };
    for c in next.unresolved_contaminants() {
        decision = decision.with_effect(SourceBuildEffect::EnsureContaminantRequest { gav: c.gav.clone(),
                                                                                     source_build: name.clone() });
    }
    for owner in &sb.owners {
        decision = decision.with_effect(SourceBuildEffect::TagOwner { owner: owner.clone(), source_build: name.clone() });
    }
    decision
}
