use std::collections::BTreeSet;

use chrono::Utc;
use log::{debug, info, warn};

use super::{persist_self, Deadline, PassOutcome, ReconcileCtx, MAX_REEVALUATIONS};
use crate::constants::CONTAMINANT_OF_LABEL;
use crate::engine::outputs::{build_outcome, BuildOutcome};
use crate::engine::ExecutionEngine;
use crate::errors::{ReconcileError, StoreError};
use crate::identity::{artifact_key, contamination_annotation};
use crate::model::{ArtifactRequest, RebuiltRecord, SourceBuild, SourceBuildState};
use crate::resolver::source_build::{analysis_run_id, decide, SourceBuildEffect, SourceBuildInputs};
use crate::resolver::FollowUp;
use crate::store::{ObjectStore, TypedStore};

pub fn reconcile_source_build<S, E>(ctx: &ReconcileCtx<S, E>, name: &str, deadline: &Deadline) -> Result<PassOutcome, ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    let Some(mut sb) = ctx.store.get::<SourceBuild>(name)? else {
        debug!("SourceBuild/{name} gone");
        return Ok(PassOutcome::Gone);
    };

    let stale = stale_owners(ctx, &sb)?;
    if !stale.is_empty() {
        deadline.check()?;
        let mut pruned = sb.clone();
        pruned.owners.retain(|o| !stale.contains(o));
        info!("SourceBuild/{name}: detached owners {stale:?}");
        if let Some(gone) = persist_self(&ctx.store, &mut pruned)? {
            return Ok(gone);
        }
        sb = pruned;
    }

    for _ in 0..MAX_REEVALUATIONS {
        deadline.check()?;
        let analysis = if sb.state == SourceBuildState::New && sb.recipes.is_empty() {
            ctx.engine.result(&analysis_run_id(&sb))?
        } else {
            None
        };
        let build = match (&sb.state, &sb.current_run) {
            (SourceBuildState::Building, Some(run)) => ctx.engine.result(run)?,
            _ => None,
        };
        let rebuilt = match (&sb.state, &build) {
            (SourceBuildState::Contaminated, _) => {
                rebuilt_among(ctx, sb.unresolved_contaminants().map(|c| c.gav.as_str()))?
            }
            (SourceBuildState::Building, Some(result)) => match build_outcome(result) {
                BuildOutcome::Succeeded { contaminants, .. } => rebuilt_among(ctx, contaminants.iter().map(|c| c.gav.as_str()))?,
                BuildOutcome::Failed(_) => BTreeSet::new(),
            },
            _ => BTreeSet::new(),
        };

        let decision = decide(&SourceBuildInputs { source_build: &sb,
                                                   analysis: analysis.as_ref(),
                                                   build: build.as_ref(),
                                                   rebuilt: &rebuilt,
                                                   images: &ctx.config.builder_images,
                                                   ordering: ctx.ordering.as_ref(),
                                                   now: Utc::now() });
        if let Some(warning) = &decision.warning {
            warn!("SourceBuild/{name}: {warning}");
        }
        for effect in decision.effects {
            deadline.check()?;
            apply(ctx, name, effect)?;
        }
        if let Some(mut updated) = decision.updated {
            deadline.check()?;
            if updated.state != sb.state {
                info!("SourceBuild/{name}: {} -> {} (cursor {}/{})", sb.state, updated.state, updated.cursor, updated.recipes.len());
            }
            if let Some(gone) = persist_self(&ctx.store, &mut updated)? {
                return Ok(gone);
            }
            sb = updated;
        }
        match decision.follow_up {
            FollowUp::Done => return Ok(PassOutcome::Done),
            FollowUp::Reevaluate => continue,
            FollowUp::RequeueAfter(delay) => return Ok(PassOutcome::RequeueAfter(delay)),
            FollowUp::Delete => {
                ctx.store.delete::<SourceBuild>(name)?;
                return Ok(PassOutcome::Gone);
            }
        }
    }
    Ok(PassOutcome::Requeue)
}

/// Owners cuya request ya no existe o resolvió a otro SourceBuild. Una
/// request sin SCM todavía puede estar adjuntándose: se conserva.
fn stale_owners<S, E>(ctx: &ReconcileCtx<S, E>, sb: &SourceBuild) -> Result<BTreeSet<String>, ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    let mut stale = BTreeSet::new();
    for owner in &sb.owners {
        let belongs = match ctx.store.get::<ArtifactRequest>(owner)? {
            Some(req) => req.scm.as_ref().map_or(true, |scm| scm.source_build_key() == sb.name()),
            None => false,
        };
        if !belongs {
            stale.insert(owner.clone());
        }
    }
    Ok(stale)
}

/// Coordenadas de `gavs` que ya tienen RebuiltRecord.
fn rebuilt_among<'a, S, E>(ctx: &ReconcileCtx<S, E>, gavs: impl Iterator<Item = &'a str>) -> Result<BTreeSet<String>, ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    let mut rebuilt = BTreeSet::new();
    for gav in gavs {
        if ctx.store.get::<RebuiltRecord>(&artifact_key(gav))?.is_some_and(|r| r.gav == gav) {
            rebuilt.insert(gav.to_string());
        }
    }
    Ok(rebuilt)
}

fn apply<S, E>(ctx: &ReconcileCtx<S, E>, owner: &str, effect: SourceBuildEffect) -> Result<(), ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    match effect {
        SourceBuildEffect::Submit(run) => {
            ctx.engine.submit(&run)?;
            debug!("submitted {:?} run {}", run.kind, run.run_id);
        }
        SourceBuildEffect::EnsureContaminantRequest { gav, source_build } => {
            let annotation = contamination_annotation(&source_build);
            match ctx.store.get::<ArtifactRequest>(&artifact_key(&gav))? {
                Some(mut existing) => {
                    if existing.meta.annotation(&annotation) != Some(source_build.as_str()) {
                        existing.meta.annotations.insert(annotation, source_build.clone());
                        ctx.store.update(&mut existing)?;
                        info!("ArtifactRequest/{} tagged as contaminant of SourceBuild/{source_build}", existing.name());
                    }
                }
                None => {
                    let mut req = ArtifactRequest::new(gav.clone());
                    req.meta.annotations.insert(annotation, source_build.clone());
                    req.meta.labels.insert(CONTAMINANT_OF_LABEL.to_string(), source_build.clone());
                    ctx.store.create(&mut req)?;
                    info!("ArtifactRequest/{} created to rebuild contaminant {gav} of SourceBuild/{source_build}", req.name());
                }
            }
        }
        SourceBuildEffect::TagOwner { owner, source_build } => {
            let annotation = contamination_annotation(&source_build);
            if let Some(mut req) = ctx.store.get::<ArtifactRequest>(&owner)? {
                if req.meta.annotation(&annotation) != Some(source_build.as_str()) {
                    req.meta.annotations.insert(annotation, source_build);
                    ctx.store.update(&mut req)?;
                }
            }
        }
        SourceBuildEffect::RecordRebuilt { gavs } => {
            for gav in gavs {
                let mut record = RebuiltRecord::new(gav, owner);
                match ctx.store.create(&mut record) {
                    Ok(()) => debug!("RebuiltRecord/{} recorded", record.meta.name),
                    Err(StoreError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
    Ok(())
}
