//! Contrato del object store declarativo.
//!
//! CRUD + watch sobre entidades tipadas con concurrencia optimista: cada
//! escritura incrementa `resource_version` y un `update` con versión vieja
//! falla con `StoreError::Conflict`. La propiedad entre entidades es sólo por
//! referencia; borrar una entidad nunca borra otras.

mod memory;

pub use memory::InMemoryObjectStore;

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::model::{ArtifactRequest, ConfigBlob, ObjectMeta, RebuiltRecord, SourceBuild};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    ArtifactRequest,
    SourceBuild,
    RebuiltRecord,
    ConfigBlob,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::ArtifactRequest, Kind::SourceBuild, Kind::RebuiltRecord, Kind::ConfigBlob];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArtifactRequest => "ArtifactRequest",
            Self::SourceBuild => "SourceBuild",
            Self::RebuiltRecord => "RebuiltRecord",
            Self::ConfigBlob => "ConfigBlob",
        }
    }

    pub fn parse(s: &str) -> Option<Kind> { Self::ALL.into_iter().find(|k| k.as_str() == s) }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Identidad de una entidad; también es la clave de la cola de trabajo.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: Kind,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: Kind, name: impl Into<String>) -> Self { Self { kind, name: name.into() } }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}/{}", self.kind, self.name) }
}

/// Cuerpo JSON tal como lo guarda el backend, con su versión.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredObject {
    pub version: u64,
    pub body: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Upserted,
    Deleted,
}

/// Evento de cambio. `object` es el cuerpo escrito (o el último conocido si
/// fue borrado).
#[derive(Clone, Debug)]
pub struct WatchEvent {
    pub key: ObjectKey,
    pub change: Change,
    pub object: Value,
}

/// Operaciones crudas que implementa cada backend.
pub trait ObjectStore: Send + Sync + 'static {
    fn get_raw(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StoreError>;
    /// Todas las entidades de un tipo, ordenadas por nombre.
    fn list_raw(&self, kind: Kind) -> Result<Vec<StoredObject>, StoreError>;
    /// Falla con `AlreadyExists` si la clave existe. Devuelve la versión nueva.
    fn create_raw(&self, key: &ObjectKey, body: Value) -> Result<u64, StoreError>;
    /// Falla con `Conflict` si `expected` no es la versión actual.
    fn update_raw(&self, key: &ObjectKey, expected: u64, body: Value) -> Result<u64, StoreError>;
    /// Idempotente: `Ok(false)` si no existía.
    fn delete_raw(&self, key: &ObjectKey) -> Result<bool, StoreError>;
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn get_raw(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StoreError> { (**self).get_raw(key) }
    fn list_raw(&self, kind: Kind) -> Result<Vec<StoredObject>, StoreError> { (**self).list_raw(kind) }
    fn create_raw(&self, key: &ObjectKey, body: Value) -> Result<u64, StoreError> { (**self).create_raw(key, body) }
    fn update_raw(&self, key: &ObjectKey, expected: u64, body: Value) -> Result<u64, StoreError> {
        (**self).update_raw(key, expected, body)
    }
    fn delete_raw(&self, key: &ObjectKey) -> Result<bool, StoreError> { (**self).delete_raw(key) }
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> { (**self).subscribe() }
}

/// Entidad tipada persistible.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + 'static {
    const KIND: Kind;
    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    fn key(&self) -> ObjectKey { ObjectKey::new(Self::KIND, self.meta().name.clone()) }
}

macro_rules! entity {
    ($ty:ty, $kind:expr) => {
        impl Entity for $ty {
            const KIND: Kind = $kind;
            fn meta(&self) -> &ObjectMeta { &self.meta }
            fn meta_mut(&mut self) -> &mut ObjectMeta { &mut self.meta }
        }
    };
}

entity!(ArtifactRequest, Kind::ArtifactRequest);
entity!(SourceBuild, Kind::SourceBuild);
entity!(RebuiltRecord, Kind::RebuiltRecord);
entity!(ConfigBlob, Kind::ConfigBlob);

/// Decodifica un cuerpo crudo; la versión autoritativa es la del backend.
pub fn decode<T: Entity>(stored: StoredObject) -> Result<T, StoreError> {
    let mut obj: T = serde_json::from_value(stored.body)?;
    obj.meta_mut().resource_version = stored.version;
    Ok(obj)
}

/// Acceso tipado sobre cualquier `ObjectStore`.
pub trait TypedStore: ObjectStore {
    fn get<T: Entity>(&self, name: &str) -> Result<Option<T>, StoreError> {
        self.get_raw(&ObjectKey::new(T::KIND, name))?.map(decode::<T>).transpose()
    }

    fn list<T: Entity>(&self) -> Result<Vec<T>, StoreError> { self.list_raw(T::KIND)?.into_iter().map(decode::<T>).collect() }

    /// Crea la entidad; asigna `uid`/`created_at` si faltan y deja en `obj`
    /// la versión asignada.
    fn create<T: Entity>(&self, obj: &mut T) -> Result<(), StoreError> {
        let meta = obj.meta_mut();
        meta.uid.get_or_insert_with(Uuid::new_v4);
        meta.created_at.get_or_insert_with(Utc::now);
        meta.resource_version = 0;
        let body = serde_json::to_value(&*obj)?;
        let version = self.create_raw(&obj.key(), body)?;
        obj.meta_mut().resource_version = version;
        Ok(())
    }

    /// Escritura condicionada a `obj.meta().resource_version`.
    fn update<T: Entity>(&self, obj: &mut T) -> Result<(), StoreError> {
        let expected = obj.meta().resource_version;
        let body = serde_json::to_value(&*obj)?;
        let version = self.update_raw(&obj.key(), expected, body)?;
        obj.meta_mut().resource_version = version;
        Ok(())
    }

    fn delete<T: Entity>(&self, name: &str) -> Result<bool, StoreError> { self.delete_raw(&ObjectKey::new(T::KIND, name)) }
}

impl<S: ObjectStore + ?Sized> TypedStore for S {}
