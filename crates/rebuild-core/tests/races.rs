
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rebuild_core::constants::{OUT_SCM_TAG, OUT_SCM_URL};
use rebuild_core::engine::RunKind;
use rebuild_core::reconcile::{reconcile, settle, Deadline};
use rebuild_core::store::{StoredObject, WatchEvent};
use rebuild_core::{artifact_key, source_build_key, ArtifactRequest, ArtifactState, ControllerConfig, InMemoryExecutionEngine,
                   InMemoryObjectStore, Kind, ObjectKey, ObjectStore, ReconcileCtx, RunResult, SourceBuild, StoreError,
                   TypedStore};
use serde_json::Value;
use test_support::{init_logging, TAG, URL};
use tokio::sync::broadcast;

/// Store que, mientras `hide` esté activo, responde que ningún SourceBuild
/// existe: el pase decide crearlo y choca con el ya creado.
#[derive(Default)]
struct StaleSourceBuildReads {
    inner: InMemoryObjectStore,
    hide: AtomicBool,
}

impl ObjectStore for StaleSourceBuildReads {
    fn get_raw(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StoreError> {
        if key.kind == Kind::SourceBuild && self.hide.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get_raw(key)
    }
    fn list_raw(&self, kind: Kind) -> Result<Vec<StoredObject>, StoreError> { self.inner.list_raw(kind) }
    fn create_raw(&self, key: &ObjectKey, body: Value) -> Result<u64, StoreError> { self.inner.create_raw(key, body) }
    fn update_raw(&self, key: &ObjectKey, expected: u64, body: Value) -> Result<u64, StoreError> {
        self.inner.update_raw(key, expected, body)
    }
    fn delete_raw(&self, key: &ObjectKey) -> Result<bool, StoreError> { self.inner.delete_raw(key) }
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> { self.inner.subscribe() }
}

fn discover(engine: &InMemoryExecutionEngine, gav: &str) {
    let run = engine.pending()
                    .into_iter()
                    .find(|r| r.kind == RunKind::ScmDiscovery && r.gav.as_deref() == Some(gav))
                    .expect("pending discovery");
    assert!(engine.complete(&run.run_id, RunResult::success().with_output(OUT_SCM_URL, URL).with_output(OUT_SCM_TAG, TAG)));
}

#[test]
fn losing_the_source_build_create_race_is_a_conflict() {
    init_logging();
    let store = Arc::new(StaleSourceBuildReads::default());
    let engine = Arc::new(InMemoryExecutionEngine::new());
    let ctx = ReconcileCtx::new(Arc::clone(&store), Arc::clone(&engine), ControllerConfig::default());

    let (foo, bar) = ("com.acme:foo:1.0", "com.acme:bar:2.0");
    store.create(&mut ArtifactRequest::new(bar)).expect("create");
    settle(&ctx, 64).expect("settle");
    discover(&engine, bar);
    settle(&ctx, 64).expect("settle");
    let key = source_build_key(URL, TAG, "");
    assert!(store.get::<SourceBuild>(&key).expect("get").is_some());

    store.create(&mut ArtifactRequest::new(foo)).expect("create");
    settle(&ctx, 64).expect("settle");
    discover(&engine, foo);

    store.hide.store(true, Ordering::SeqCst);
    let err = reconcile(&ctx, &ObjectKey::new(Kind::ArtifactRequest, artifact_key(foo)), &Deadline::none())
        .expect_err("create collides with the existing source build");
    assert!(err.is_conflict(), "unexpected error: {err}");
    let req = store.get::<ArtifactRequest>(&artifact_key(foo)).expect("get").expect("request");
    assert_eq!(req.state, ArtifactState::Discovering);

    // El reintento ve el SourceBuild y se adjunta.
    store.hide.store(false, Ordering::SeqCst);
    settle(&ctx, 64).expect("settle");
    let sb = store.get::<SourceBuild>(&key).expect("get").expect("sb");
    assert!(sb.owners.contains(&artifact_key(foo)));
    assert_eq!(store.get::<ArtifactRequest>(&artifact_key(foo)).expect("get").expect("request").state,
               ArtifactState::Building);
}
