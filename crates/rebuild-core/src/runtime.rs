//! Runtime asíncrono del controlador.
//!
//! Eventos del store y finalizaciones del motor se traducen en claves de la
//! `WorkQueue`; un dispatcher reparte las claves entre a lo sumo
//! `config.workers` pases concurrentes. Cada pase corre en `spawn_blocking`
//! (los colaboradores son síncronos) con un `Deadline` cooperativo.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinHandle;

use crate::engine::{ExecutionEngine, RunCompletion};
use crate::errors::ReconcileError;
use crate::identity::artifact_key;
use crate::model::{ArtifactRequest, SourceBuild};
use crate::queue::WorkQueue;
use crate::reconcile::{reconcile, Deadline, PassOutcome, ReconcileCtx};
use crate::store::{Kind, ObjectKey, ObjectStore, TypedStore, WatchEvent};

type Queue = Arc<WorkQueue<ObjectKey>>;

pub struct Controller<S, E> {
    ctx: Arc<ReconcileCtx<S, E>>,
    queue: Queue,
    started: bool,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: ObjectStore, E: ExecutionEngine> Controller<S, E> {
    pub fn new(ctx: ReconcileCtx<S, E>) -> Self {
        let (stop, _) = watch::channel(false);
        Self { ctx: Arc::new(ctx), queue: Arc::new(WorkQueue::new()), started: false, stop, tasks: Vec::new() }
    }

    pub fn ctx(&self) -> &Arc<ReconcileCtx<S, E>> { &self.ctx }

    pub fn queue(&self) -> &Queue { &self.queue }

    pub fn is_started(&self) -> bool { self.started }

    pub fn enqueue(&self, key: ObjectKey) { self.queue.add(key); }

    /// Arranca forwarders y dispatcher y siembra la cola con todo el estado
    /// existente. Sólo puede llamarse una vez.
    pub async fn start(&mut self) -> Result<(), ReconcileError> {
        if self.started {
            return Err(ReconcileError::InvalidState("controller already started".into()));
        }
        // Suscribirse antes de sembrar: nada escrito entre medias se pierde.
        let store_events = self.ctx.store.subscribe();
        let completions = self.ctx.engine.completions();

        let seeded = {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let joined = tokio::task::spawn_blocking(move || seed_all(&ctx, &queue)).await;
            joined.map_err(|e| ReconcileError::Aborted(e.to_string()))??
        };
        self.started = true;
        info!("controller started: {} keys seeded, {} workers", seeded, self.ctx.config.workers);

        self.tasks.push(tokio::spawn(forward_store_events(Arc::clone(&self.ctx),
                                                          Arc::clone(&self.queue),
                                                          store_events,
                                                          self.stop.subscribe())));
        self.tasks.push(tokio::spawn(forward_completions(Arc::clone(&self.ctx),
                                                         Arc::clone(&self.queue),
                                                         completions,
                                                         self.stop.subscribe())));
        self.tasks.push(tokio::spawn(dispatch(Arc::clone(&self.ctx), Arc::clone(&self.queue))));
        Ok(())
    }

    /// Espera a que la cola quede ociosa de forma estable. `false` si vence
    /// `timeout` antes.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let until = Instant::now() + timeout;
        let mut quiet = 0;
        while Instant::now() < until {
            if self.queue.is_idle() {
                quiet += 1;
                if quiet >= 3 {
                    return true;
                }
            } else {
                quiet = 0;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// Detiene forwarders y dispatcher. Los pases en vuelo terminan solos.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        self.queue.shutdown();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("controller task ended abnormally: {e}");
            }
        }
        info!("controller stopped");
    }
}

/// Encola todas las requests, todos los SourceBuilds y el filtro.
pub fn seed_all<S, E>(ctx: &ReconcileCtx<S, E>, queue: &WorkQueue<ObjectKey>) -> Result<usize, ReconcileError>
    where S: ObjectStore,
          E: ExecutionEngine
{
    let mut n = 0;
    for req in ctx.store.list::<ArtifactRequest>()? {
        queue.add(ObjectKey::new(Kind::ArtifactRequest, req.meta.name));
        n += 1;
    }
    for sb in ctx.store.list::<SourceBuild>()? {
        queue.add(ObjectKey::new(Kind::SourceBuild, sb.meta.name));
        n += 1;
    }
    queue.add(ctx.filter_key());
    Ok(n + 1)
}

/// Claves a reconciliar por un cambio en el store.
pub fn keys_for_event(event: &WatchEvent, filter_config_name: &str) -> Vec<ObjectKey> {
    match event.key.kind {
        Kind::ArtifactRequest => vec![event.key.clone()],
        Kind::SourceBuild => {
            let mut keys = vec![event.key.clone()];
            if let Some(owners) = event.object.get("owners").and_then(|o| o.as_array()) {
                keys.extend(owners.iter()
                                  .filter_map(|o| o.as_str())
                                  .map(|o| ObjectKey::new(Kind::ArtifactRequest, o)));
            }
            keys
        }
        Kind::RebuiltRecord => {
            let mut keys = vec![ObjectKey::new(Kind::ConfigBlob, filter_config_name)];
            // La request del mismo GAV comparte nombre con el record.
            if let Some(gav) = event.object.get("gav").and_then(|g| g.as_str()) {
                keys.push(ObjectKey::new(Kind::ArtifactRequest, artifact_key(gav)));
            }
            keys
        }
        Kind::ConfigBlob if event.key.name == filter_config_name => vec![event.key.clone()],
        Kind::ConfigBlob => Vec::new(),
    }
}

async fn forward_store_events<S, E>(ctx: Arc<ReconcileCtx<S, E>>,
                                    queue: Queue,
                                    mut events: broadcast::Receiver<WatchEvent>,
                                    mut stop: watch::Receiver<bool>)
    where S: ObjectStore,
          E: ExecutionEngine
{
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    for key in keys_for_event(&event, &ctx.config.filter_config_name) {
                        queue.add(key);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("store watch lagged by {missed} events; resyncing");
                    resync(&ctx, &queue).await;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!("store event forwarder stopped");
}

async fn forward_completions<S, E>(ctx: Arc<ReconcileCtx<S, E>>,
                                   queue: Queue,
                                   mut completions: broadcast::Receiver<RunCompletion>,
                                   mut stop: watch::Receiver<bool>)
    where S: ObjectStore,
          E: ExecutionEngine
{
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            done = completions.recv() => match done {
                Ok(RunCompletion { run_id, owner }) => {
                    debug!("run {run_id} finished; waking {owner}");
                    queue.add(owner);
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("engine completions lagged by {missed}; resyncing");
                    resync(&ctx, &queue).await;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!("completion forwarder stopped");
}

async fn resync<S, E>(ctx: &Arc<ReconcileCtx<S, E>>, queue: &Queue)
    where S: ObjectStore,
          E: ExecutionEngine
{
    let ctx = Arc::clone(ctx);
    let q = Arc::clone(queue);
    match tokio::task::spawn_blocking(move || seed_all(&ctx, &q)).await {
        Ok(Ok(n)) => debug!("resync enqueued {n} keys"),
        Ok(Err(e)) => warn!("resync failed: {e}"),
        Err(e) => warn!("resync aborted: {e}"),
    }
}

async fn dispatch<S, E>(ctx: Arc<ReconcileCtx<S, E>>, queue: Queue)
    where S: ObjectStore,
          E: ExecutionEngine
{
    let slots = Arc::new(Semaphore::new(ctx.config.workers.max(1)));
    loop {
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };
        let Some(key) = queue.next().await else {
            break;
        };
        let ctx = Arc::clone(&ctx);
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            let _permit = permit;
            run_pass(ctx, queue, key).await;
        });
    }
    debug!("dispatcher stopped");
}

async fn run_pass<S, E>(ctx: Arc<ReconcileCtx<S, E>>, queue: Queue, key: ObjectKey)
    where S: ObjectStore,
          E: ExecutionEngine
{
    let budget = ctx.config.pass_timeout;
    let deadline = Deadline::after(budget);
    let started = Instant::now();
    let pass = {
        let ctx = Arc::clone(&ctx);
        let key = key.clone();
        tokio::task::spawn_blocking(move || reconcile(&ctx, &key, &deadline))
    };
    // Se espera siempre al pase: la clave no se libera mientras corre.
    let outcome = pass.await.unwrap_or_else(|e| Err(ReconcileError::Aborted(e.to_string())));
    if started.elapsed() > budget {
        warn!("{key}: pass took {:?} (budget {:?})", started.elapsed(), budget);
    }
    match outcome {
        Ok(PassOutcome::Done) | Ok(PassOutcome::Gone) => {}
        Ok(PassOutcome::Requeue) => queue.add(key.clone()),
        Ok(PassOutcome::RequeueAfter(delay)) => queue.add_after(key.clone(), delay),
        Err(e) if e.is_conflict() => {
            debug!("{key}: {e}; requeued");
            queue.add(key.clone());
        }
        Err(e) => {
            warn!("{key}: {e}; retry in {:?}", ctx.config.requeue_delay);
            queue.add_after(key.clone(), ctx.config.requeue_delay);
        }
    }
    queue.done(&key);
}
