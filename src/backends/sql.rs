//! Relational Backend
//!
//! Cache backend on a SQL table `(key, value, expiration)` using SQLite
//! through sqlx. The table is created on first use, reads filter on
//! `expiration >= now`, and a background sweep deletes expired rows.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::cache::{BackendCore, Cache};
use crate::config::SqlConfig;
use crate::error::Result;
use crate::models::{CacheEvent, CacheKey};
use crate::tasks::{spawn_sweep_task, Sweep};

/// Current time in epoch seconds, the unit of the expiration column.
fn now() -> i64 {
    Utc::now().timestamp()
}

/// Bind variables per statement. SQLite builds before 3.32 cap this at 999.
const MAX_BIND_VARIABLES: usize = 999;

/// Keys per `IN` list; one variable is taken by the expiration bound.
const SELECT_CHUNK: usize = MAX_BIND_VARIABLES - 1;

/// Rows per multi-row upsert, three variables each.
const UPSERT_CHUNK: usize = MAX_BIND_VARIABLES / 3;

fn expiration_after(ttl: u64) -> i64 {
    now().saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX))
}

/// Escapes an identifier for use inside a statement.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// == Statements ==
/// Statements built once per backend from the escaped table name.
#[derive(Debug, Clone)]
struct Statements {
    table: String,
    create: String,
    upsert: String,
    select_value: String,
    select_exists: String,
    select_expiration: String,
    select_keys: String,
    select_entries: String,
    delete_one: String,
    delete_all: String,
    take: String,
    refresh: String,
    sweep: String,
}

impl Statements {
    fn new(table: &str) -> Self {
        let t = quote_identifier(table);
        Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {t} (\
                 \"key\" VARCHAR(255) NOT NULL PRIMARY KEY, \
                 \"value\" TEXT NOT NULL, \
                 \"expiration\" INTEGER NOT NULL)"
            ),
            upsert: format!(
                "INSERT INTO {t} (\"key\", \"value\", \"expiration\") VALUES (?, ?, ?) \
                 ON CONFLICT(\"key\") DO UPDATE SET \
                 \"value\" = excluded.\"value\", \"expiration\" = excluded.\"expiration\""
            ),
            select_value: format!(
                "SELECT \"value\" FROM {t} WHERE \"key\" = ? AND \"expiration\" >= ?"
            ),
            select_exists: format!(
                "SELECT 1 FROM {t} WHERE \"key\" = ? AND \"expiration\" >= ?"
            ),
            select_expiration: format!(
                "SELECT \"expiration\" FROM {t} WHERE \"key\" = ? AND \"expiration\" >= ?"
            ),
            select_keys: format!(
                "SELECT \"key\" FROM {t} WHERE \"expiration\" >= ? ORDER BY \"key\""
            ),
            select_entries: format!(
                "SELECT \"key\", \"value\" FROM {t} WHERE \"expiration\" >= ? ORDER BY \"key\""
            ),
            delete_one: format!(
                "DELETE FROM {t} WHERE \"key\" = ? AND \"expiration\" >= ?"
            ),
            delete_all: format!("DELETE FROM {t}"),
            take: format!(
                "DELETE FROM {t} WHERE \"key\" = ? AND \"expiration\" >= ? RETURNING \"value\""
            ),
            refresh: format!(
                "UPDATE {t} SET \"expiration\" = ? WHERE \"key\" = ? AND \"expiration\" >= ?"
            ),
            sweep: format!("DELETE FROM {t} WHERE \"expiration\" < ?"),
            table: t,
        }
    }

    /// `SELECT key, value ... WHERE key IN (...)` for a bulk read of at most
    /// [`SELECT_CHUNK`] keys.
    fn select_many<'a>(&self, keys: &'a [CacheKey], now: i64) -> QueryBuilder<'a, Sqlite> {
        let mut query = QueryBuilder::new(format!(
            "SELECT \"key\", \"value\" FROM {} WHERE \"expiration\" >= ",
            self.table
        ));
        query.push_bind(now).push(" AND \"key\" IN (");
        let mut separated = query.separated(", ");
        for key in keys {
            separated.push_bind(key.as_str());
        }
        separated.push_unseparated(")");
        query
    }

    /// Multi-row upsert for a bulk write of at most [`UPSERT_CHUNK`] rows.
    fn upsert_many<'a>(
        &self,
        rows: &'a [(&'a CacheKey, String)],
        expiration: i64,
    ) -> QueryBuilder<'a, Sqlite> {
        let mut query = QueryBuilder::new(format!(
            "INSERT INTO {} (\"key\", \"value\", \"expiration\") ",
            self.table
        ));
        query.push_values(rows, |mut row, (key, value)| {
            row.push_bind(key.as_str())
                .push_bind(value.as_str())
                .push_bind(expiration);
        });
        query.push(
            " ON CONFLICT(\"key\") DO UPDATE SET \
             \"value\" = excluded.\"value\", \"expiration\" = excluded.\"expiration\"",
        );
        query
    }
}

/// Deletes expired rows on the background timer.
struct SqlSweep {
    pool: SqlitePool,
    statements: Arc<Statements>,
    core: BackendCore,
}

#[async_trait]
impl Sweep for SqlSweep {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let removed = sqlx::query(&self.statements.sweep)
            .bind(now())
            .execute(&self.pool)
            .await?
            .rows_affected() as usize;
        if removed > 0 {
            self.core.emit(CacheEvent::Expired { count: removed });
        }
        Ok(removed)
    }
}

/// Relational cache backend.
pub struct SqlCache {
    core: BackendCore,
    config: SqlConfig,
    statements: Arc<Statements>,
    pool: RwLock<Option<SqlitePool>>,
    ready: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SqlCache {
    // == Constructor ==
    /// Creates a backend without touching the database. The pool and the
    /// backing table are created by the first operation.
    pub fn new(config: SqlConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            core: BackendCore::new("sql", config.default_ttl),
            statements: Arc::new(Statements::new(&config.table)),
            config,
            pool: RwLock::new(None),
            ready: AtomicBool::new(false),
            sweeper: Mutex::new(None),
        })
    }

    /// Escaped name of the backing table.
    pub fn table(&self) -> &str {
        &self.statements.table
    }

    async fn open_pool(&self) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&self.config.url)?.create_if_missing(true);

        // In-memory databases live as long as their connection
        let pool = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::query(&self.statements.create).execute(&pool).await?;
        Ok(pool)
    }

    /// Idempotent guard run before every storage operation: opens the pool,
    /// creates the table and starts the sweep on first use.
    #[instrument(skip(self), fields(table = %self.statements.table))]
    async fn check_ready(&self) -> Result<SqlitePool> {
        if let Some(pool) = self.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }

        let mut slot = self.pool.write().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        let pool = match self.open_pool().await {
            Ok(pool) => pool,
            Err(err) => {
                warn!("Opening {} failed: {}", self.config.url, err);
                self.core.emit_error("connect", &err);
                return Err(err);
            }
        };

        let sweep = SqlSweep {
            pool: pool.clone(),
            statements: self.statements.clone(),
            core: self.core.clone(),
        };
        if let Ok(mut sweeper) = self.sweeper.lock() {
            *sweeper = Some(spawn_sweep_task(Arc::new(sweep), self.config.sweep_interval));
        }

        *slot = Some(pool.clone());
        self.ready.store(true, Ordering::SeqCst);
        info!("SQL cache ready");
        self.core.emit(CacheEvent::Connect);
        Ok(pool)
    }

    async fn fetch_many(
        &self,
        pool: &SqlitePool,
        keys: &[CacheKey],
    ) -> Result<HashMap<CacheKey, Value>> {
        let at = now();
        let mut found = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(SELECT_CHUNK) {
            let rows: Vec<(String, String)> = self
                .statements
                .select_many(chunk, at)
                .build_query_as()
                .fetch_all(pool)
                .await?;
            found.extend(decode_rows(rows)?);
        }
        Ok(found)
    }

    async fn try_set(&self, key: &CacheKey, value: &Value, ttl: u64) -> Result<bool> {
        let pool = self.check_ready().await?;
        let encoded = BackendCore::encode_value(value)?;
        sqlx::query(&self.statements.upsert)
            .bind(key.as_str())
            .bind(encoded)
            .bind(expiration_after(ttl))
            .execute(&pool)
            .await?;
        self.core.emit_set(key, value);
        Ok(true)
    }

    async fn try_mset(&self, keys: &[CacheKey], values: &[Value], ttl: u64) -> Result<bool> {
        if keys.is_empty() {
            return Ok(true);
        }
        let pool = self.check_ready().await?;
        let rows = keys
            .iter()
            .zip(values)
            .map(|(key, value)| -> Result<(&CacheKey, String)> {
                Ok((key, BackendCore::encode_value(value)?))
            })
            .collect::<Result<Vec<_>>>()?;

        // All chunks commit together or not at all
        let expiration = expiration_after(ttl);
        let mut tx = pool.begin().await?;
        for chunk in rows.chunks(UPSERT_CHUNK) {
            self.statements
                .upsert_many(chunk, expiration)
                .build()
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        for (key, value) in keys.iter().zip(values) {
            self.core.emit_set(key, value);
        }
        Ok(true)
    }

    async fn try_del(&self, key: &CacheKey) -> Result<usize> {
        let pool = self.check_ready().await?;
        let removed = sqlx::query(&self.statements.delete_one)
            .bind(key.as_str())
            .bind(now())
            .execute(&pool)
            .await?
            .rows_affected() as usize;
        if removed > 0 {
            self.core.emit_del(key, None);
        }
        Ok(removed)
    }

    /// Deletes key by key inside one transaction. Each delete returns the
    /// removed value, so notifications cover exactly the rows removed here.
    async fn try_mdel(&self, keys: &[CacheKey]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let pool = self.check_ready().await?;

        let at = now();
        let mut tx = pool.begin().await?;
        let mut removed = Vec::new();
        for key in keys {
            let row: Option<(String,)> = sqlx::query_as(&self.statements.take)
                .bind(key.as_str())
                .bind(at)
                .fetch_optional(&mut *tx)
                .await?;
            if let Some((encoded,)) = row {
                removed.push((key, encoded));
            }
        }
        tx.commit().await?;

        for (key, encoded) in &removed {
            self.core
                .emit_del(key, BackendCore::decode_value(encoded).ok());
        }
        Ok(removed.len())
    }

    async fn try_clear(&self) -> Result<bool> {
        let pool = self.check_ready().await?;
        sqlx::query(&self.statements.delete_all)
            .execute(&pool)
            .await?;
        self.core.emit(CacheEvent::Flush);
        Ok(true)
    }

    async fn try_keys(&self) -> Result<Vec<CacheKey>> {
        let pool = self.check_ready().await?;
        let keys: Vec<(String,)> = sqlx::query_as(&self.statements.select_keys)
            .bind(now())
            .fetch_all(&pool)
            .await?;
        Ok(keys
            .into_iter()
            .map(|(key,)| CacheKey::from_encoded(key))
            .collect())
    }

    async fn try_list(&self) -> Result<HashMap<CacheKey, Value>> {
        let pool = self.check_ready().await?;
        let rows: Vec<(String, String)> = sqlx::query_as(&self.statements.select_entries)
            .bind(now())
            .fetch_all(&pool)
            .await?;
        decode_rows(rows)
    }

    async fn try_refresh(&self, key: &CacheKey, ttl: u64) -> Result<bool> {
        let pool = self.check_ready().await?;
        let updated = sqlx::query(&self.statements.refresh)
            .bind(expiration_after(ttl))
            .bind(key.as_str())
            .bind(now())
            .execute(&pool)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().ok().and_then(|mut slot| slot.take()) {
            handle.abort();
        }
    }
}

fn decode_rows(rows: Vec<(String, String)>) -> Result<HashMap<CacheKey, Value>> {
    rows.into_iter()
        .map(|(key, value)| -> Result<(CacheKey, Value)> {
            Ok((CacheKey::from_encoded(key), BackendCore::decode_value(&value)?))
        })
        .collect()
}

#[async_trait]
impl Cache for SqlCache {
    fn backend_name(&self) -> &'static str {
        self.core.name()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.core.subscribe()
    }

    async fn connect(&self) -> Result<()> {
        self.check_ready().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<()> {
        let pool = self.pool.write().await.take();
        if let Some(pool) = pool {
            self.stop_sweeper();
            self.ready.store(false, Ordering::SeqCst);
            pool.close().await;
            info!("SQL cache disconnected");
            self.core.emit(CacheEvent::Disconnect);
        }
        Ok(())
    }

    async fn set(&self, key: &CacheKey, value: &Value, ttl: Option<u64>) -> Result<bool> {
        BackendCore::validate_key(key)?;
        let ttl = self.core.resolve_ttl(ttl)?;
        let outcome = self.try_set(key, value, ttl).await;
        self.core.settle("set", outcome)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        let pool = self.check_ready().await?;
        let row: Option<(String,)> = sqlx::query_as(&self.statements.select_value)
            .bind(key.as_str())
            .bind(now())
            .fetch_optional(&pool)
            .await?;
        row.map(|(value,)| BackendCore::decode_value(&value))
            .transpose()
    }

    async fn includes(&self, key: &CacheKey) -> Result<bool> {
        let pool = self.check_ready().await?;
        let row: Option<(i64,)> = sqlx::query_as(&self.statements.select_exists)
            .bind(key.as_str())
            .bind(now())
            .fetch_optional(&pool)
            .await?;
        Ok(row.is_some())
    }

    async fn del(&self, key: &CacheKey) -> Result<usize> {
        let outcome = self.try_del(key).await;
        self.core.settle("del", outcome)
    }

    async fn clear(&self) -> Result<bool> {
        let outcome = self.try_clear().await;
        self.core.settle("clear", outcome)
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let outcome = self.try_keys().await;
        self.core.settle("keys", outcome)
    }

    async fn mget(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, Value>> {
        let pool = self.check_ready().await?;
        self.fetch_many(&pool, keys).await
    }

    async fn mdel(&self, keys: &[CacheKey]) -> Result<usize> {
        let outcome = self.try_mdel(keys).await;
        self.core.settle("mdel", outcome)
    }

    async fn mset(&self, keys: &[CacheKey], values: &[Value], ttl: Option<u64>) -> Result<bool> {
        BackendCore::validate_bulk(keys, values)?;
        let ttl = self.core.resolve_ttl(ttl)?;
        let outcome = self.try_mset(keys, values, ttl).await;
        self.core.settle("mset", outcome)
    }

    async fn list(&self) -> Result<HashMap<CacheKey, Value>> {
        let outcome = self.try_list().await;
        self.core.settle("list", outcome)
    }

    async fn ttl(&self, key: &CacheKey, ttl: Option<u64>) -> Result<bool> {
        let ttl = self.core.resolve_ttl(ttl)?;
        let outcome = self.try_refresh(key, ttl).await;
        self.core.settle("ttl", outcome)
    }

    async fn get_ttl(&self, key: &CacheKey) -> Result<Option<u64>> {
        let pool = self.check_ready().await?;
        let row: Option<(i64,)> = sqlx::query_as(&self.statements.select_expiration)
            .bind(key.as_str())
            .bind(now())
            .fetch_optional(&pool)
            .await?;
        // A row stays readable through its expiration second, report at least 1
        Ok(row.map(|(expiration,)| {
            u64::try_from(expiration - now()).unwrap_or(0).max(1)
        }))
    }

    async fn take(&self, key: &CacheKey) -> Result<Option<Value>> {
        let pool = self.check_ready().await?;
        let row: Option<(String,)> = sqlx::query_as(&self.statements.take)
            .bind(key.as_str())
            .bind(now())
            .fetch_optional(&pool)
            .await?;
        let Some((encoded,)) = row else {
            return Ok(None);
        };
        let value = BackendCore::decode_value(&encoded)?;
        self.core.emit_del(key, Some(value.clone()));
        Ok(Some(value))
    }
}

impl Drop for SqlCache {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

impl std::fmt::Debug for SqlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlCache")
            .field("table", &self.statements.table)
            .field("default_ttl", &self.core.default_ttl())
            .field("sweep_interval", &self.config.sweep_interval)
            .field("ready", &self.is_ready())
            .finish()
    }
}
