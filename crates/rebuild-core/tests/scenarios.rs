
use rebuild_core::constants::*;
use rebuild_core::engine::RunKind;
use rebuild_core::filter::might_contain;
use rebuild_core::identity::contamination_annotation;
use rebuild_core::{artifact_key, source_build_key, ArtifactRequest, ArtifactState, ConfigBlob, ControllerConfig, RebuiltRecord,
                   RunResult, SourceBuildState, TypedStore};
use test_support::*;

const FOO: &str = "com.acme:foo:1.0";
const BAR: &str = "com.acme:bar:2.0";
const X: &str = "org.other:x:9";

#[test]
fn discovery_creates_source_build_and_moves_to_building() {
    let h = Harness::new();
    let name = h.request(FOO);
    h.settle();
    assert_eq!(h.req(FOO).state, ArtifactState::Discovering);
    assert_eq!(h.engine.submissions(RunKind::ScmDiscovery).len(), 1);

    h.discover(FOO, URL, TAG, "");
    h.settle();

    let key = source_build_key(URL, TAG, "");
    let sb = h.sb(&key).expect("source build created");
    assert!(sb.owners.contains(&name));
    assert_eq!(sb.scm.url, URL);
    assert_eq!(sb.version, "1.0");
    let req = h.req(FOO);
    assert_eq!(req.state, ArtifactState::Building);
    assert_eq!(req.meta.label(SOURCE_BUILD_LABEL), Some(key.as_str()));
    assert_eq!(req.scm.as_ref().map(|s| s.commit.as_str()), Some("0123abcd"));
}

#[test]
fn failed_discovery_is_missing() {
    let h = Harness::new();
    h.request(FOO);
    h.settle();
    h.discovery_fails(FOO, "no source found on maven central");
    h.settle();
    let req = h.req(FOO);
    assert_eq!(req.state, ArtifactState::Missing);
    assert_eq!(req.message, "no source found on maven central");
    assert!(req.terminal_since.is_some());
}

#[test]
fn rebuilds_disabled_leaves_new_untouched() {
    let h = Harness::with_config(ControllerConfig { rebuilds_enabled: false, ..ControllerConfig::default() });
    h.request(FOO);
    h.settle();
    assert_eq!(h.req(FOO).state, ArtifactState::New);
    assert!(h.engine.pending().is_empty());
}

#[test]
fn shared_source_build_survives_deleting_one_owner() {
    let h = Harness::new();
    let foo = h.request(FOO);
    let bar = h.request(BAR);
    h.settle();
    h.discover(FOO, URL, TAG, "");
    h.discover(BAR, URL, TAG, "");
    h.settle();

    let key = source_build_key(URL, TAG, "");
    let sb = h.sb(&key).expect("one source build");
    assert_eq!(sb.owners.iter().cloned().collect::<Vec<_>>(), {
        let mut v = vec![foo.clone(), bar.clone()];
        v.sort();
        v
    });
    assert_eq!(h.store.list::<rebuild_core::SourceBuild>().expect("list").len(), 1);

    assert!(h.store.delete::<ArtifactRequest>(&foo).expect("delete"));
    h.settle();
    let after = h.sb(&key).expect("still there");
    assert_eq!((after.state, after.cursor, after.dispatched), (sb.state, sb.cursor, sb.dispatched));
    assert_eq!(after.current_run, sb.current_run);
    // El owner borrado se desprende del registro.
    assert_eq!(after.owners.iter().cloned().collect::<Vec<_>>(), vec![bar.clone()]);
    assert_eq!(h.req(BAR).state, ArtifactState::Building);

    // Recrear el GAV no hereda la membresía anterior: vuelve a adjuntarse.
    let again = h.request(FOO);
    assert_eq!(again, foo);
    h.settle();
    assert!(!h.sb(&key).expect("sb").owners.contains(&foo));
    h.discover(FOO, URL, TAG, "");
    h.settle();
    assert!(h.sb(&key).expect("sb").owners.contains(&foo));
    assert_eq!(h.req(FOO).state, ArtifactState::Building);
}

#[test]
fn dedup_is_independent_of_arrival_order() {
    let mut names = Vec::new();
    for order in [[FOO, BAR], [BAR, FOO]] {
        let h = Harness::new();
        for gav in order {
            h.request(gav);
            h.settle();
            h.discover(gav, URL, TAG, "sub");
            h.settle();
        }
        let sbs = h.store.list::<rebuild_core::SourceBuild>().expect("list");
        assert_eq!(sbs.len(), 1);
        assert_eq!(sbs[0].owners.len(), 2);
        names.push(sbs[0].meta.name.clone());
    }
    assert_eq!(names[0], names[1]);
    assert_eq!(names[0], source_build_key(URL, TAG, "sub"));
}

#[test]
fn complete_only_when_gav_was_deployed() {
    let h = Harness::new();
    h.request(FOO);
    h.request(BAR);
    h.settle();
    h.discover(BAR, URL, TAG, "");
    let sb = h.discover_and_analyse(FOO, URL, TAG);

    h.finish_build(&sb, deployed(&[FOO]));
    h.settle();

    assert_eq!(h.sb(&sb).map(|s| s.state), Some(SourceBuildState::Complete));
    assert_eq!(h.req(FOO).state, ArtifactState::Complete);
    let bar = h.req(BAR);
    assert_eq!(bar.state, ArtifactState::Failed);
    assert!(bar.message.contains("did not deploy com.acme:bar:2.0"), "{}", bar.message);
    // El filtro publicado contiene lo desplegado.
    let blob = h.store.get::<ConfigBlob>(DEFAULT_FILTER_CONFIG_NAME).expect("get").expect("published");
    let bytes = blob.data.get(FILTER_KEY).expect("filter key");
    assert!(might_contain(bytes, FOO));
    assert!(h.store.get::<RebuiltRecord>(&artifact_key(FOO)).expect("get").is_some());
}

#[test]
fn exhausted_recipes_fail_every_owner_and_cursor_never_decreases() {
    let h = Harness::new();
    h.request(FOO);
    let sb = h.discover_and_analyse(FOO, URL, TAG);
    let recipes = h.sb(&sb).expect("sb").recipes.len();
    assert_eq!(recipes, 2);

    let mut last_cursor = 0;
    for i in 0..recipes {
        h.finish_build(&sb, RunResult::failure(format!("compilation error {i}")));
        h.settle();
        let current = h.sb(&sb).expect("sb");
        assert!(current.cursor >= last_cursor);
        last_cursor = current.cursor;
    }
    let failed = h.sb(&sb).expect("sb");
    assert_eq!(failed.state, SourceBuildState::Failed);
    assert_eq!(failed.failed_recipes.len(), 2);
    assert_eq!(failed.attempts.len(), 2);
    assert_eq!(h.req(FOO).state, ArtifactState::Failed);
    assert!(h.engine.pending().is_empty());
}

#[test]
fn contamination_spawns_rebuild_and_resumes_from_first_recipe() {
    let h = Harness::new();
    let foo = h.request(FOO);
    let sb = h.discover_and_analyse(FOO, URL, TAG);

    // Primera receta falla, la segunda produce salida contaminada.
    h.finish_build(&sb, RunResult::failure("boom"));
    h.settle();
    assert_eq!(h.sb(&sb).map(|s| s.cursor), Some(1));
    h.finish_build(&sb, deployed(&[FOO]).with_output(OUT_CONTAMINANTS, X));
    h.settle();

    let contaminated = h.sb(&sb).expect("sb");
    assert_eq!(contaminated.state, SourceBuildState::Contaminated);
    assert_eq!(contaminated.contaminants.len(), 1);
    assert_eq!(contaminated.contaminants[0].gav, X);
    assert!(!contaminated.contaminants[0].rebuild_available);
    assert_eq!(h.req(FOO).state, ArtifactState::Failed);

    let back_ref = contamination_annotation(&sb);
    let x = h.req(X);
    assert_eq!(x.meta.annotation(&back_ref), Some(sb.as_str()));
    assert_eq!(x.meta.label(CONTAMINANT_OF_LABEL), Some(sb.as_str()));
    assert_eq!(x.state, ArtifactState::Discovering);
    let owner = h.store.get::<ArtifactRequest>(&foo).expect("get").expect("owner");
    assert_eq!(owner.meta.annotation(&back_ref), Some(sb.as_str()));

    // Rebuild del contaminante en su propio repositorio.
    h.discover(X, "https://github.com/other/x", "x-9", "");
    h.settle();
    let x_sb = source_build_key("https://github.com/other/x", "x-9", "");
    h.finish_analysis(&x_sb, BUILD_INFO);
    h.settle();
    h.finish_build(&x_sb, deployed(&[X]));
    h.settle();

    assert_eq!(h.req(X).state, ArtifactState::Complete);
    let resumed = h.sb(&sb).expect("sb");
    assert!(resumed.contaminants[0].rebuild_available);
    assert_eq!(resumed.cursor, 0);
    assert_eq!(resumed.state, SourceBuildState::Building);
    assert_eq!(resumed.dispatched, 3);
    let run = h.engine.submitted(resumed.current_run.as_deref().expect("dispatched")).expect("submitted");
    assert_eq!(run.recipe.as_ref(), resumed.recipes.first());
    // La request dueña se recupera al ver el SourceBuild activo otra vez.
    assert_eq!(h.req(FOO).state, ArtifactState::Building);

    // Con X en el filtro el build ya no lo reporta como contaminante.
    h.finish_build(&sb, deployed(&[FOO]));
    h.settle();
    assert_eq!(h.sb(&sb).map(|s| s.state), Some(SourceBuildState::Complete));
    assert_eq!(h.req(FOO).state, ArtifactState::Complete);
}

#[test]
fn contaminant_reported_again_after_its_rebuild_settles_complete() {
    let h = Harness::new();
    h.request(FOO);
    let sb = h.discover_and_analyse(FOO, URL, TAG);
    h.finish_build(&sb, deployed(&[FOO]).with_output(OUT_CONTAMINANTS, X));
    h.settle();
    assert_eq!(h.sb(&sb).map(|s| s.state), Some(SourceBuildState::Contaminated));

    h.discover(X, "https://github.com/other/x", "x-9", "");
    h.settle();
    let x_sb = source_build_key("https://github.com/other/x", "x-9", "");
    h.finish_analysis(&x_sb, BUILD_INFO);
    h.settle();
    h.finish_build(&x_sb, deployed(&[X]));
    h.settle();
    let resumed = h.sb(&sb).expect("sb");
    assert_eq!(resumed.state, SourceBuildState::Building);
    assert_eq!(resumed.dispatched, 2);

    // El build sigue nombrando a X, que ya tiene RebuiltRecord.
    h.finish_build(&sb, deployed(&[FOO]).with_output(OUT_CONTAMINANTS, X));
    h.settle();
    let done = h.sb(&sb).expect("sb");
    assert_eq!(done.state, SourceBuildState::Complete);
    assert_eq!(done.dispatched, 2);
    assert_eq!(done.attempts.len(), 2);
    assert!(done.contaminants.iter().all(|c| c.gav == X && c.rebuild_available));
    assert!(h.engine.pending().iter().all(|r| r.owner.name != sb), "no further builds dispatched");
    assert_eq!(h.req(FOO).state, ArtifactState::Complete);
}

#[test]
fn contaminant_rebuilt_beforehand_never_contaminates() {
    let h = Harness::new();
    h.request(X);
    let x_sb = h.discover_and_analyse(X, "https://github.com/other/x", "x-9");
    h.finish_build(&x_sb, deployed(&[X]));
    h.settle();
    assert_eq!(h.req(X).state, ArtifactState::Complete);

    h.request(FOO);
    let sb = h.discover_and_analyse(FOO, URL, TAG);
    h.finish_build(&sb, deployed(&[FOO]).with_output(OUT_CONTAMINANTS, X));
    h.settle();
    let done = h.sb(&sb).expect("sb");
    assert_eq!(done.state, SourceBuildState::Complete);
    assert_eq!(done.dispatched, 1);
    assert!(done.contaminants[0].rebuild_available);
}

#[test]
fn allowed_contaminants_do_not_block_completion() {
    let h = Harness::new();
    h.request(FOO);
    let sb = h.discover_and_analyse(FOO, URL, TAG);
    let details = format!(r#"[{{"gav":"{X}","allowed":true,"contaminatedArtifacts":["{FOO}"]}}]"#);
    h.finish_build(&sb, deployed(&[FOO]).with_output(OUT_CONTAMINANTS, X).with_output(OUT_CONTAMINANT_DETAILS, details));
    h.settle();
    let done = h.sb(&sb).expect("sb");
    assert_eq!(done.state, SourceBuildState::Complete);
    assert!(done.contaminants[0].allowed);
    assert!(h.store.get::<ArtifactRequest>(&artifact_key(X)).expect("get").is_none());
}

#[test]
fn rebuild_command_resets_the_whole_ownership_group() {
    let mut h = Harness::new();
    let foo = h.request(FOO);
    let bar = h.request(BAR);
    h.settle();
    h.discover(BAR, URL, TAG, "");
    let sb = h.discover_and_analyse(FOO, URL, TAG);
    h.finish_build(&sb, deployed(&[BAR]));
    h.settle();
    assert_eq!(h.req(FOO).state, ArtifactState::Failed);
    assert_eq!(h.req(BAR).state, ArtifactState::Complete);

    // Con rebuilds desactivados New es estable y se puede observar.
    h.reconfigure(ControllerConfig { rebuilds_enabled: false, ..ControllerConfig::default() });
    let mut a = h.req(FOO);
    a.meta.annotations.insert(REBUILD_ANNOTATION.into(), REBUILD_PLAIN.into());
    h.store.update(&mut a).expect("annotate");
    h.settle();

    assert!(h.sb(&sb).is_none(), "shared source build deleted");
    for name in [&foo, &bar] {
        let req = h.store.get::<ArtifactRequest>(name).expect("get").expect("request");
        assert_eq!(req.state, ArtifactState::New, "{name}");
        assert!(req.scm.is_none());
        assert!(req.message.is_empty());
        assert_eq!(req.meta.annotation(REBUILD_ANNOTATION), None);
        assert!(req.meta.annotation(REBUILD_DONE_ANNOTATION).is_some());
        assert_eq!(req.meta.label(SOURCE_BUILD_LABEL), None);
    }
}

#[test]
fn rebuild_recreates_source_build_under_the_same_key() {
    let h = Harness::new();
    h.request(FOO);
    let sb = h.discover_and_analyse(FOO, URL, TAG);
    for _ in 0..2 {
        h.finish_build(&sb, RunResult::failure("boom"));
        h.settle();
    }
    assert_eq!(h.sb(&sb).map(|s| s.state), Some(SourceBuildState::Failed));

    let mut a = h.req(FOO);
    a.meta.annotations.insert(REBUILD_ANNOTATION.into(), REBUILD_FAILED_ONLY.into());
    h.store.update(&mut a).expect("annotate");
    h.settle();

    let req = h.req(FOO);
    assert_eq!(req.state, ArtifactState::Discovering);
    assert_eq!(req.discovery_attempts, 2);
    h.discover(FOO, URL, TAG, "");
    h.settle();
    let fresh = h.sb(&sb).expect("recreated");
    assert_eq!(fresh.state, SourceBuildState::New);
    assert_eq!(fresh.cursor, 0);
    assert!(fresh.attempts.is_empty());
    assert_eq!(h.req(FOO).state, ArtifactState::Building);
}

#[test]
fn failed_only_command_is_dropped_for_complete_requests() {
    let h = Harness::new();
    h.request(FOO);
    let sb = h.discover_and_analyse(FOO, URL, TAG);
    h.finish_build(&sb, deployed(&[FOO]));
    h.settle();

    let mut a = h.req(FOO);
    a.meta.annotations.insert(REBUILD_ANNOTATION.into(), REBUILD_FAILED_ONLY.into());
    h.store.update(&mut a).expect("annotate");
    h.settle();

    let req = h.req(FOO);
    assert_eq!(req.state, ArtifactState::Complete);
    assert_eq!(req.meta.annotation(REBUILD_ANNOTATION), None);
    assert!(h.sb(&sb).is_some());
}

#[test]
fn expired_ttl_deletes_terminal_request() {
    let h = Harness::new();
    h.request(FOO);
    h.settle();
    let mut a = h.req(FOO);
    a.meta.annotations.insert(TTL_ANNOTATION.into(), "0".into());
    h.store.update(&mut a).expect("annotate");
    h.discovery_fails(FOO, "gone");
    h.settle();
    assert!(h.store.get::<ArtifactRequest>(&artifact_key(FOO)).expect("get").is_none());
}

#[test]
fn dangling_owner_reference_resets_to_new() {
    let h = Harness::new();
    h.request(FOO);
    let sb = h.discover_and_analyse(FOO, URL, TAG);
    assert!(h.store.delete::<rebuild_core::SourceBuild>(&sb).expect("delete"));
    h.settle();
    // Reset a New y, con rebuilds activos, un nuevo discovery.
    let req = h.req(FOO);
    assert_eq!(req.state, ArtifactState::Discovering);
    assert_eq!(req.discovery_attempts, 2);
}
