//! Máquina de estados del SourceBuild.
//!
//! New → SubmitBuild → Building → {Complete, Contaminated, Failed};
//! Contaminated → SubmitBuild (`resolver::contamination`). Failed es terminal
//! para la instancia: sólo la cascada la recrea.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::{contamination, Decision, FollowUp};
use crate::config::BuilderImage;
use crate::discovery::{candidate_recipes, RecipeOrdering};
use crate::engine::outputs::{analysis_outcome, build_outcome, BuildOutcome};
use crate::engine::{RunRequest, RunResult};
use crate::model::{BuildAttempt, SourceBuild, SourceBuildState};

pub struct SourceBuildInputs<'a> {
    pub source_build: &'a SourceBuild,
    /// Resultado del run de análisis (sólo en New).
    pub analysis: Option<&'a RunResult>,
    /// Resultado de `current_run` (sólo en Building).
    pub build: Option<&'a RunResult>,
    /// Contaminantes con RebuiltRecord: los pendientes en Contaminated, o los
    /// reportados por `build` en Building.
    pub rebuilt: &'a BTreeSet<String>,
    pub images: &'a [BuilderImage],
    pub ordering: &'a dyn RecipeOrdering,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SourceBuildEffect {
    Submit(RunRequest),
    /// Crear (si falta) la request del contaminante y anotarle la back-reference.
    EnsureContaminantRequest { gav: String, source_build: String },
    /// Anotar la back-reference en una request dueña.
    TagOwner { owner: String, source_build: String },
    RecordRebuilt { gavs: Vec<String> },
}

pub type SourceBuildDecision = Decision<SourceBuild, SourceBuildEffect>;

pub fn analysis_run_id(sb: &SourceBuild) -> String { format!("{}-build-discovery", sb.meta.run_prefix()) }

pub fn build_run_id(sb: &SourceBuild) -> String { format!("{}-build-{}", sb.meta.run_prefix(), sb.dispatched) }

pub fn decide(inp: &SourceBuildInputs<'_>) -> SourceBuildDecision {
    let sb = inp.source_build;
    match sb.state {
        SourceBuildState::New => on_new(inp),
        SourceBuildState::SubmitBuild => on_submit(sb),
        SourceBuildState::Building => on_building(inp),
        SourceBuildState::Contaminated => contamination::decide_contaminated(sb, inp.rebuilt),
        SourceBuildState::Complete | SourceBuildState::Failed => Decision::wait(),
    }
}

fn on_new(inp: &SourceBuildInputs<'_>) -> SourceBuildDecision {
    let sb = inp.source_build;
    if !sb.recipes.is_empty() {
        return to_state(sb, SourceBuildState::SubmitBuild).then(FollowUp::Reevaluate);
    }
    let Some(result) = inp.analysis else {
        let run = RunRequest::build_analysis(analysis_run_id(sb), sb.name(), &sb.scm);
        return Decision::wait().with_effect(SourceBuildEffect::Submit(run));
    };
    let info = match analysis_outcome(result) {
        Ok(info) => info,
        Err(reason) => return fail(sb, reason),
    };
    let recipes = inp.ordering.order(&info, candidate_recipes(&info, inp.images));
    if recipes.is_empty() {
        return fail(sb, "build analysis yielded no candidate recipes".to_string());
    }
    let mut next = sb.clone();
    next.recipes = recipes;
    next.cursor = 0;
    next.state = SourceBuildState::SubmitBuild;
    Decision::update(next).then(FollowUp::Reevaluate)
}

fn on_submit(sb: &SourceBuild) -> SourceBuildDecision {
    let Some(recipe) = sb.current_recipe() else {
        return fail(sb, format!("all {} candidate recipes failed", sb.recipes.len()));
    };
    let run_id = build_run_id(sb);
    let run = RunRequest::build(run_id.clone(), sb.name(), &sb.scm, recipe);
    let mut next = sb.clone();
    next.dispatched += 1;
    next.current_run = Some(run_id);
    next.state = SourceBuildState::Building;
    Decision::update(next).with_effect(SourceBuildEffect::Submit(run))
}

fn on_building(inp: &SourceBuildInputs<'_>) -> SourceBuildDecision {
    let sb = inp.source_build;
    let Some(run_id) = sb.current_run.clone() else {
        return to_state(sb, SourceBuildState::SubmitBuild).then(FollowUp::Reevaluate)
                                                          .warn("Building without a dispatched run");
    };
    let Some(result) = inp.build else {
        return Decision::wait();
    };
    let recipe = sb.current_recipe().cloned().unwrap_or_default();
    let mut next = sb.clone();
    next.current_run = None;
    match build_outcome(result) {
        BuildOutcome::Failed(reason) => {
            next.message = format!("recipe {} ({} on jdk{}) failed: {reason}", sb.cursor, recipe.tool, recipe.jdk);
            next.attempts.push(BuildAttempt { run_id, recipe: recipe.clone(), succeeded: false, produced: Vec::new(), finished_at: inp.now });
            next.failed_recipes.push(recipe);
            next.cursor += 1;
            next.state = SourceBuildState::SubmitBuild;
            Decision::update(next).then(FollowUp::Reevaluate)
        }
        BuildOutcome::Succeeded { deployed, mut contaminants } => {
            // Con RebuiltRecord el contaminante ya está resuelto.
            for c in contaminants.iter_mut().filter(|c| inp.rebuilt.contains(&c.gav)) {
                c.rebuild_available = true;
            }
            next.attempts.push(BuildAttempt { run_id, recipe, succeeded: true, produced: deployed.clone(), finished_at: inp.now });
            let culprits: Vec<String> =
                contaminants.iter().filter(|c| !c.is_resolved()).map(|c| c.gav.clone()).collect();
            next.contaminants = contaminants;
            if culprits.is_empty() {
                next.deployed_artifacts = deployed.clone();
                next.message.clear();
                next.state = SourceBuildState::Complete;
                Decision::update(next).with_effect(SourceBuildEffect::RecordRebuilt { gavs: deployed })
            } else {
                next.deployed_artifacts.clear();
                next.message = format!("contaminated by {}", culprits.join(", "));
                next.state = SourceBuildState::Contaminated;
                Decision::update(next).then(FollowUp::Reevaluate)
            }
        }
    }
}

fn to_state(sb: &SourceBuild, state: SourceBuildState) -> SourceBuildDecision {
    let mut next = sb.clone();
    next.state = state;
    Decision::update(next)
}

fn fail(sb: &SourceBuild, reason: String) -> SourceBuildDecision {
    let mut next = sb.clone();
    next.state = SourceBuildState::Failed;
    next.current_run = None;
    next.message = reason;
    Decision::update(next)
}
