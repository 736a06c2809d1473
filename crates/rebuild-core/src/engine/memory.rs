//! Motor en memoria: registra submissions y permite completar runs a mano.
//! Usado por tests y simulaciones.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use log::debug;
use tokio::sync::broadcast;

use super::{ExecutionEngine, RunCompletion, RunKind, RunRequest, RunResult};
use crate::errors::EngineError;

pub struct InMemoryExecutionEngine {
    submitted: DashMap<String, RunRequest>,
    results: DashMap<String, RunResult>,
    completions: broadcast::Sender<RunCompletion>,
    unavailable: AtomicBool,
}

impl Default for InMemoryExecutionEngine {
    fn default() -> Self {
        let (completions, _) = broadcast::channel(256);
        Self { submitted: DashMap::new(),
               results: DashMap::new(),
               completions,
               unavailable: AtomicBool::new(false) }
    }
}

impl InMemoryExecutionEngine {
    pub fn new() -> Self { Self::default() }

    /// Simula caída del motor: `submit`/`result` devuelven `Unavailable`.
    pub fn set_unavailable(&self, down: bool) { self.unavailable.store(down, Ordering::SeqCst); }

    pub fn submitted(&self, run_id: &str) -> Option<RunRequest> { self.submitted.get(run_id).map(|r| r.clone()) }

    /// Runs de un tipo, ordenados por id.
    pub fn submissions(&self, kind: RunKind) -> Vec<RunRequest> {
        let mut runs: Vec<RunRequest> =
            self.submitted.iter().filter(|r| r.kind == kind).map(|r| r.value().clone()).collect();
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        runs
    }

    /// Runs lanzados y aún sin resultado.
    pub fn pending(&self) -> Vec<RunRequest> {
        let mut runs: Vec<RunRequest> = self.submitted
                                            .iter()
                                            .filter(|r| !self.results.contains_key(r.key()))
                                            .map(|r| r.value().clone())
                                            .collect();
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        runs
    }

    /// Registra el resultado y notifica al dueño. `false` si el run nunca se lanzó.
    pub fn complete(&self, run_id: &str, result: RunResult) -> bool {
        let Some(owner) = self.submitted.get(run_id).map(|r| r.owner.clone()) else {
            return false;
        };
        self.results.insert(run_id.to_string(), result);
        let _ = self.completions.send(RunCompletion { run_id: run_id.to_string(), owner });
        true
    }

    fn check_available(&self) -> Result<(), EngineError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable("in-memory engine marked down".into()));
        }
        Ok(())
    }
}

impl ExecutionEngine for InMemoryExecutionEngine {
    fn submit(&self, run: &RunRequest) -> Result<(), EngineError> {
        self.check_available()?;
        if self.submitted.contains_key(&run.run_id) {
            debug!("run {} already submitted", run.run_id);
            return Ok(());
        }
        self.submitted.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    fn result(&self, run_id: &str) -> Result<Option<RunResult>, EngineError> {
        self.check_available()?;
        Ok(self.results.get(run_id).map(|r| r.clone()))
    }

    fn completions(&self) -> broadcast::Receiver<RunCompletion> { self.completions.subscribe() }
}
