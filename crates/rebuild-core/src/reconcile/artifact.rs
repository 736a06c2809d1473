use chrono::Utc;
use log::{debug, info, warn};

use super::{persist_self, Deadline, PassOutcome, ReconcileCtx, MAX_REEVALUATIONS};
use crate::constants::{CONTAMINATED_BY_PREFIX, REBUILD_ANNOTATION, REBUILD_PLAIN};
use crate::engine::ExecutionEngine;
use crate::errors::{ReconcileError, StoreError};
use crate::model::{ArtifactRequest, ArtifactState, SourceBuild};
use crate::resolver::artifact::{decide, discovery_run_id, effective_scm, ArtifactEffect, ArtifactInputs};
use crate::resolver::contamination::mark_available;
use crate::resolver::FollowUp;
use crate::store::{ObjectStore, TypedStore};

pub fn reconcile_artifact_request<S, E>(ctx: &ReconcileCtx<S, E>, name: &str, deadline: &Deadline) -> Result<PassOutcome, ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    let Some(mut request) = ctx.store.get::<ArtifactRequest>(name)? else {
        debug!("ArtifactRequest/{name} gone");
        return Ok(PassOutcome::Gone);
    };

    for _ in 0..MAX_REEVALUATIONS {
        deadline.check()?;
        let discovery = if request.state == ArtifactState::Discovering && request.scm.is_none() {
            ctx.engine.result(&discovery_run_id(&request))?
        } else {
            None
        };
        let source_build = match effective_scm(&request, discovery.as_ref()) {
            Some(scm) if scm.is_usable() => ctx.store.get::<SourceBuild>(&scm.source_build_key())?,
            _ => None,
        };
        let back_referenced = if request.state == ArtifactState::Complete {
            load_back_referenced(ctx, &request)?
        } else {
            Vec::new()
        };

        let decision = decide(&ArtifactInputs { request: &request,
                                                source_build: source_build.as_ref(),
                                                discovery: discovery.as_ref(),
                                                back_referenced: &back_referenced,
                                                rebuilds_enabled: ctx.config.rebuilds_enabled,
                                                default_ttl: ctx.config.request_ttl,
                                                now: Utc::now() });
        if let Some(warning) = &decision.warning {
            warn!("ArtifactRequest/{name}: {warning}");
        }
        for effect in decision.effects {
            deadline.check()?;
            apply(ctx, &request, effect)?;
        }
        if let Some(mut updated) = decision.updated {
            deadline.check()?;
            if updated.state != request.state {
                info!("ArtifactRequest/{name} ({}): {} -> {}", updated.gav, request.state, updated.state);
            }
            if let Some(gone) = persist_self(&ctx.store, &mut updated)? {
                return Ok(gone);
            }
            request = updated;
        }
        match decision.follow_up {
            FollowUp::Done => return Ok(PassOutcome::Done),
            FollowUp::Reevaluate => continue,
            FollowUp::RequeueAfter(delay) => return Ok(PassOutcome::RequeueAfter(delay)),
            FollowUp::Delete => {
                deadline.check()?;
                ctx.store.delete::<ArtifactRequest>(name)?;
                info!("ArtifactRequest/{name} ({}) expired, deleted", request.gav);
                return Ok(PassOutcome::Gone);
            }
        }
    }
    Ok(PassOutcome::Requeue)
}

fn load_back_referenced<S, E>(ctx: &ReconcileCtx<S, E>, request: &ArtifactRequest) -> Result<Vec<SourceBuild>, ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    let mut found = Vec::new();
    for (key, source_build) in &request.meta.annotations {
        if !key.starts_with(CONTAMINATED_BY_PREFIX) {
            continue;
        }
        if let Some(sb) = ctx.store.get::<SourceBuild>(source_build)? {
            found.push(sb);
        }
    }
    Ok(found)
}

fn apply<S, E>(ctx: &ReconcileCtx<S, E>, request: &ArtifactRequest, effect: ArtifactEffect) -> Result<(), ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    let owner = request.name();
    match effect {
        ArtifactEffect::SubmitDiscovery(run) => {
            ctx.engine.submit(&run)?;
            debug!("submitted {}", run.run_id);
        }
        ArtifactEffect::CreateSourceBuild(mut sb) => {
            ctx.store.create(&mut sb)?;
            info!("SourceBuild/{} created for {} ({} @ {})", sb.name(), request.gav, sb.scm.url, sb.scm.tag);
        }
        ArtifactEffect::AttachOwner { source_build } => {
            let mut sb = ctx.store
                            .get::<SourceBuild>(&source_build)?
                            .ok_or_else(|| StoreError::NotFound(format!("SourceBuild/{source_build}")))?;
            if sb.owners.insert(owner.to_string()) {
                ctx.store.update(&mut sb)?;
                info!("ArtifactRequest/{owner} attached to SourceBuild/{source_build}");
            }
        }
        ArtifactEffect::PropagateRebuild { source_build, siblings } => {
            for sibling in siblings {
                let Some(mut other) = ctx.store.get::<ArtifactRequest>(&sibling)? else {
                    continue;
                };
                if other.meta.annotation(REBUILD_ANNOTATION) == Some(REBUILD_PLAIN) {
                    continue;
                }
                other.meta.annotations.insert(REBUILD_ANNOTATION.to_string(), REBUILD_PLAIN.to_string());
                ctx.store.update(&mut other)?;
                info!("rebuild of SourceBuild/{source_build} propagated from {owner} to {sibling}");
            }
        }
        ArtifactEffect::DeleteSourceBuild { name } => {
            if ctx.store.delete::<SourceBuild>(&name)? {
                info!("SourceBuild/{name} deleted by rebuild of {owner}");
            }
        }
        ArtifactEffect::MarkRebuildAvailable { source_build, gav } => {
            let Some(mut sb) = ctx.store.get::<SourceBuild>(&source_build)? else {
                return Ok(());
            };
            if mark_available(&mut sb, &gav) {
                ctx.store.update(&mut sb)?;
                info!("SourceBuild/{source_build}: contaminant {gav} now has a rebuild available");
            }
        }
    }
    Ok(())
}
