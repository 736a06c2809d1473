//! Cola de trabajo con deduplicación por clave.
//!
//! Invariantes:
//! - una clave aparece a lo sumo una vez en `pending`;
//! - una clave en vuelo no se entrega a un segundo worker: si se vuelve a
//!   añadir mientras está en vuelo queda marcada `dirty` y se re-encola al
//!   llamar `done`.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

struct QueueState<K> {
    pending: VecDeque<K>,
    queued: HashSet<K>,
    in_flight: HashSet<K>,
    dirty: HashSet<K>,
    shutdown: bool,
}

pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    /// Re-encolados diferidos aún sin disparar.
    scheduled: AtomicUsize,
}

impl<K> Default for WorkQueue<K> where K: Eq + Hash + Clone + Send + 'static
{
    fn default() -> Self { Self::new() }
}

impl<K> WorkQueue<K> where K: Eq + Hash + Clone + Send + 'static
{
    pub fn new() -> Self {
        Self { state: Mutex::new(QueueState { pending: VecDeque::new(),
                                              queued: HashSet::new(),
                                              in_flight: HashSet::new(),
                                              dirty: HashSet::new(),
                                              shutdown: false }),
               notify: Notify::new(),
               scheduled: AtomicUsize::new(0) }
    }

    // Un pánico con el lock tomado no deja el estado a medias: todas las
    // mutaciones son de una sola operación sobre colecciones.
    fn lock(&self) -> MutexGuard<'_, QueueState<K>> { self.state.lock().unwrap_or_else(|e| e.into_inner()) }

    /// Añade la clave; no-op si ya está pendiente.
    pub fn add(&self, key: K) {
        let mut st = self.lock();
        if st.shutdown {
            return;
        }
        if st.in_flight.contains(&key) {
            st.dirty.insert(key);
            return;
        }
        if st.queued.insert(key.clone()) {
            st.pending.push_back(key);
            drop(st);
            self.notify.notify_one();
        }
    }

    /// Añade la clave tras `delay`. Requiere un runtime tokio activo.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
            queue.scheduled.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Espera la siguiente clave. `None` tras `shutdown`.
    pub async fn next(&self) -> Option<K> {
        loop {
            // Registrarse antes de mirar el estado evita perder un aviso.
            let notified = self.notify.notified();
            {
                let mut st = self.lock();
                if st.shutdown {
                    return None;
                }
                if let Some(key) = st.pending.pop_front() {
                    st.queued.remove(&key);
                    st.in_flight.insert(key.clone());
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Libera la clave; si se marcó durante el pase vuelve a la cola.
    pub fn done(&self, key: &K) {
        let mut st = self.lock();
        st.in_flight.remove(key);
        if st.dirty.remove(key) && !st.shutdown && st.queued.insert(key.clone()) {
            st.pending.push_back(key.clone());
            drop(st);
            self.notify.notify_one();
        }
    }

    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool { self.lock().shutdown }

    /// Claves pendientes (sin contar las en vuelo).
    pub fn len(&self) -> usize { self.lock().pending.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Nada pendiente, nada en vuelo y ningún re-encolado diferido.
    pub fn is_idle(&self) -> bool {
        let st = self.lock();
        st.pending.is_empty() && st.in_flight.is_empty() && st.dirty.is_empty() && self.scheduled.load(Ordering::SeqCst) == 0
    }
}
