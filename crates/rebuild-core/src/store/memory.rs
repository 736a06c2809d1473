//! Backend en memoria (DashMap) con feed de cambios broadcast.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{Change, Kind, ObjectKey, ObjectStore, StoredObject, WatchEvent};
use crate::errors::StoreError;

const WATCH_CAPACITY: usize = 1024;

pub struct InMemoryObjectStore {
    objects: DashMap<ObjectKey, StoredObject>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self { objects: DashMap::new(), events }
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.objects.len() }

    pub fn is_empty(&self) -> bool { self.objects.is_empty() }

    fn notify(&self, key: &ObjectKey, change: Change, object: Value) {
        // Sin suscriptores el envío falla; no es un error.
        let _ = self.events.send(WatchEvent { key: key.clone(), change, object });
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get_raw(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StoreError> {
        Ok(self.objects.get(key).map(|slot| slot.value().clone()))
    }

    fn list_raw(&self, kind: Kind) -> Result<Vec<StoredObject>, StoreError> {
        let mut found: Vec<(String, StoredObject)> = self.objects
                                                          .iter()
                                                          .filter(|e| e.key().kind == kind)
                                                          .map(|e| (e.key().name.clone(), e.value().clone()))
                                                          .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found.into_iter().map(|(_, obj)| obj).collect())
    }

    fn create_raw(&self, key: &ObjectKey, body: Value) -> Result<u64, StoreError> {
        match self.objects.entry(key.clone()) {
            Entry::Occupied(_) => return Err(StoreError::AlreadyExists(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(StoredObject { version: 1, body: body.clone() });
            }
        }
        debug!("created {key}");
        self.notify(key, Change::Upserted, body);
        Ok(1)
    }

    fn update_raw(&self, key: &ObjectKey, expected: u64, body: Value) -> Result<u64, StoreError> {
        let version = {
            let mut slot = self.objects.get_mut(key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            if slot.version != expected {
                return Err(StoreError::Conflict { key: key.to_string(), expected });
            }
            slot.version += 1;
            slot.body = body.clone();
            slot.version
        };
        self.notify(key, Change::Upserted, body);
        Ok(version)
    }

    fn delete_raw(&self, key: &ObjectKey) -> Result<bool, StoreError> {
        match self.objects.remove(key) {
            Some((_, last)) => {
                debug!("deleted {key}");
                self.notify(key, Change::Deleted, last.body);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> { self.events.subscribe() }
}
