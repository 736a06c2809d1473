//! Implementación Postgres (Diesel) del `ObjectStore` del core.
//!
//! - Una fila por entidad en `objects`, clave `(kind, name)`; el cuerpo es el
//!   JSON completo de la entidad.
//! - Concurrencia optimista: `update` es un único `UPDATE ... WHERE
//!   resource_version = $expected`; cero filas afectadas es `Conflict` (o
//!   `NotFound` si la fila ya no existe).
//! - El feed de cambios es local al proceso: sólo difunde las escrituras
//!   hechas a través de esta instancia. Otro proceso escribiendo en la misma
//!   tabla requiere un resync periódico.

use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};
use serde_json::Value;
use tokio::sync::broadcast;

use rebuild_core::store::{Change, Kind, ObjectKey, ObjectStore, StoredObject, WatchEvent};
use rebuild_core::StoreError;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::objects;

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// El pool se construye con `min_idle` y `max_size`; al construirlo se corren
/// las migraciones pendientes (una sola vez).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

type PooledConn = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real o un proveedor de test sin acoplar el store
/// a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PooledConn, PersistenceError>;
}

/// `ConnectionProvider` respaldado por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PooledConn, PersistenceError> {
        self.pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Retry con backoff corto (hasta 3 reintentos: 15ms, 30ms, 45ms) para
/// errores transitorios. No altera la semántica: repite la unidad de
/// trabajo completa.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

fn to_version(v: i64) -> u64 { u64::try_from(v).unwrap_or_default() }

fn to_db_version(v: u64) -> Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::Backend(format!("resource version {v} out of range")))
}

const WATCH_CAPACITY: usize = 1024;

pub struct PgObjectStore<P: ConnectionProvider> {
    pub provider: P,
    events: broadcast::Sender<WatchEvent>,
}

impl<P: ConnectionProvider> PgObjectStore<P> {
    pub fn new(provider: P) -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self { provider, events }
    }

    fn notify(&self, key: &ObjectKey, change: Change, object: Value) {
        let _ = self.events.send(WatchEvent { key: key.clone(), change, object });
    }

    fn exists(&self, conn: &mut PooledConn, key: &ObjectKey) -> Result<bool, PersistenceError> {
        let n: i64 = objects::table.filter(objects::kind.eq(key.kind.as_str()))
                                   .filter(objects::name.eq(&key.name))
                                   .count()
                                   .get_result(conn)?;
        Ok(n > 0)
    }
}

impl PgObjectStore<PoolProvider> {
    pub fn from_pool(pool: PgPool) -> Self { Self::new(PoolProvider { pool }) }
}

impl<P: ConnectionProvider> ObjectStore for PgObjectStore<P> {
    fn get_raw(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StoreError> {
        let row: Option<(i64, Value)> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            objects::table.filter(objects::kind.eq(key.kind.as_str()))
                          .filter(objects::name.eq(&key.name))
                          .select((objects::resource_version, objects::body))
                          .first(&mut conn)
                          .optional()
                          .map_err(PersistenceError::from)
        })?;
        Ok(row.map(|(version, body)| StoredObject { version: to_version(version), body }))
    }

    fn list_raw(&self, kind: Kind) -> Result<Vec<StoredObject>, StoreError> {
        let rows: Vec<(i64, Value)> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            objects::table.filter(objects::kind.eq(kind.as_str()))
                          .order(objects::name.asc())
                          .select((objects::resource_version, objects::body))
                          .load(&mut conn)
                          .map_err(PersistenceError::from)
        })?;
        Ok(rows.into_iter().map(|(version, body)| StoredObject { version: to_version(version), body }).collect())
    }

    fn create_raw(&self, key: &ObjectKey, body: Value) -> Result<u64, StoreError> {
        let inserted = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(objects::table).values((objects::kind.eq(key.kind.as_str()),
                                                        objects::name.eq(&key.name),
                                                        objects::resource_version.eq(1_i64),
                                                        objects::body.eq(&body),
                                                        objects::updated_at.eq(Utc::now())))
                                               .on_conflict_do_nothing()
                                               .execute(&mut conn)
                                               .map_err(PersistenceError::from)
        })?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        debug!("created {key}");
        self.notify(key, Change::Upserted, body);
        Ok(1)
    }

    fn update_raw(&self, key: &ObjectKey, expected: u64, body: Value) -> Result<u64, StoreError> {
        let expected_db = to_db_version(expected)?;
        let next = expected_db + 1;
        let (updated, present) = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let n = diesel::update(objects::table.filter(objects::kind.eq(key.kind.as_str()))
                                                 .filter(objects::name.eq(&key.name))
                                                 .filter(objects::resource_version.eq(expected_db)))
                    .set((objects::resource_version.eq(next), objects::body.eq(&body), objects::updated_at.eq(Utc::now())))
                    .execute(&mut conn)?;
            if n > 0 {
                return Ok((n, true));
            }
            let present = self.exists(&mut conn, key)?;
            Ok((n, present))
        })?;
        match (updated, present) {
            (0, false) => Err(StoreError::NotFound(key.to_string())),
            (0, true) => Err(StoreError::Conflict { key: key.to_string(), expected }),
            _ => {
                self.notify(key, Change::Upserted, body);
                Ok(to_version(next))
            }
        }
    }

    fn delete_raw(&self, key: &ObjectKey) -> Result<bool, StoreError> {
        let removed: Option<Value> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(objects::table.filter(objects::kind.eq(key.kind.as_str())).filter(objects::name.eq(&key.name)))
                .returning(objects::body)
                .get_result(&mut conn)
                .optional()
                .map_err(PersistenceError::from)
        })?;
        match removed {
            Some(body) => {
                debug!("deleted {key}");
                self.notify(key, Change::Deleted, body);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> { self.events.subscribe() }
}

/// Construye un pool Postgres y corre las migraciones pendientes.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_max = max_size.max(1);
    let validated_min = min_size.max(1);
    if validated_min > validated_max {
        warn!("min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración (DATABASE_URL,
/// tamaños) y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
