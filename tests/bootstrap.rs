use std::sync::Arc;
use std::time::Duration;

use rebuildflow::rebuild_core::constants::{OUT_BUILD_INFO, OUT_SCM_TAG, OUT_SCM_URL};
use rebuildflow::rebuild_core::engine::{RunKind, RunRequest};
use rebuildflow::rebuild_core::{ArtifactRequest, InMemoryExecutionEngine, InMemoryObjectStore, RunResult, TypedStore};
use rebuildflow::{bootstrap, AppConfig, RebuildError};

const INFO: &str = r#"{"tools":{"jdk":{"min":"11","preferred":"17"}},"invocations":[["install"]]}"#;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                                     .with_test_writer()
                                     .try_init();
}

async fn pending(engine: &InMemoryExecutionEngine, kind: RunKind) -> RunRequest {
    for _ in 0..500 {
        if let Some(run) = engine.pending().into_iter().find(|r| r.kind == kind) {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no pending {kind:?} run");
}

/// Primer build despachado según la política configurada.
async fn first_build_jdk(order: &str) -> u32 {
    init_logging();
    let store = Arc::new(InMemoryObjectStore::new());
    let engine = Arc::new(InMemoryExecutionEngine::new());
    let config = AppConfig { recipe_order: order.to_string(), ..AppConfig::default() };
    let mut app = bootstrap(Arc::clone(&store), Arc::clone(&engine), config).expect("bootstrap");
    app.start().await.expect("start");

    let mut req = ArtifactRequest::new("com.acme:foo:1.0");
    store.create(&mut req).expect("create");
    let run = pending(&engine, RunKind::ScmDiscovery).await;
    engine.complete(&run.run_id,
                    RunResult::success().with_output(OUT_SCM_URL, "https://github.com/acme/foo").with_output(OUT_SCM_TAG, "v1"));
    let run = pending(&engine, RunKind::BuildAnalysis).await;
    engine.complete(&run.run_id, RunResult::success().with_output(OUT_BUILD_INFO, INFO));
    let build = pending(&engine, RunKind::Build).await;

    app.shutdown().await;
    build.recipe.expect("build run carries its recipe").jdk
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preferred_jdk_order_builds_preferred_first() {
    assert_eq!(first_build_jdk("preferred-jdk").await, 17);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn declared_order_follows_builder_images() {
    assert_eq!(first_build_jdk("declared").await, 11);
}

#[test]
fn unknown_ordering_is_rejected() {
    let store = InMemoryObjectStore::new();
    let engine = InMemoryExecutionEngine::new();
    let config = AppConfig { recipe_order: "random".into(), ..AppConfig::default() };
    let err = bootstrap(store, engine, config).err().expect("debe fallar");
    assert!(matches!(err, RebuildError::UnknownOrdering(ref name) if name == "random"));
}
