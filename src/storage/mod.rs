mod error;
pub(crate) mod row;

pub use error::StorageError;

use std::sync::Arc;

use libsql::params::IntoParams;
use libsql::{Builder, Connection, Database as TursoDatabase, Row, Value};

use crate::config::DatabaseConfig;

/// Idempotent schema. Uniqueness lives in the store so that concurrent
/// writers cannot race past it: one telegram identity per user row, one
/// authority per transaction, one free subscription per user.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    telegram_id INTEGER NOT NULL UNIQUE,
    username TEXT,
    first_name TEXT,
    last_name TEXT,
    is_banned INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plans (
    plan_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    price_toman INTEGER NOT NULL,
    traffic_bytes INTEGER NOT NULL,
    duration_days INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS extra_traffic_plans (
    extra_traffic_plan_id INTEGER PRIMARY KEY AUTOINCREMENT,
    price_toman INTEGER NOT NULL,
    traffic_bytes INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    transaction_id INTEGER PRIMARY KEY AUTOINCREMENT,
    telegram_id INTEGER NOT NULL,
    transaction_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    plan_id INTEGER REFERENCES plans (plan_id),
    extra_traffic_plan_id INTEGER REFERENCES extra_traffic_plans (extra_traffic_plan_id),
    price_toman INTEGER NOT NULL,
    authority TEXT NOT NULL UNIQUE,
    ref_id INTEGER,
    created_at TEXT NOT NULL,
    CHECK ((plan_id IS NULL) != (extra_traffic_plan_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions (telegram_id, created_at);

CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id INTEGER PRIMARY KEY AUTOINCREMENT,
    telegram_id INTEGER NOT NULL,
    purchase_id INTEGER NOT NULL REFERENCES transactions (transaction_id),
    traffic_limit_bytes INTEGER NOT NULL,
    traffic_used_bytes INTEGER NOT NULL DEFAULT 0,
    extra_traffic_bytes INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_active ON subscriptions (telegram_id, is_active, expires_at);

CREATE TABLE IF NOT EXISTS free_subscriptions (
    free_subscription_id INTEGER PRIMARY KEY AUTOINCREMENT,
    telegram_id INTEGER NOT NULL UNIQUE,
    traffic_limit_bytes INTEGER NOT NULL,
    traffic_used_bytes INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
";

/// Handle to the record store. Clone-cheap; owns no entity state. Every
/// operation opens its own connection, so independent callers never share a
/// transaction scope by accident.
#[derive(Clone)]
pub struct Database {
    inner: Arc<TursoDatabase>,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        info!("Connecting to database...");
        let db = if config.is_local() {
            let path = config.url.strip_prefix("file:").unwrap_or(&config.url);
            Builder::new_local(path).build().await?
        } else {
            Builder::new_remote(config.url.clone(), config.token.clone())
                .build()
                .await?
        };
        info!("Database connected");
        Ok(Self { inner: Arc::new(db) })
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        info!("Applying database schema...");
        let conn = self.connection().await?;
        conn.execute_batch(SCHEMA).await?;
        Ok(())
    }

    /// Raw connection, for callers that need an atomic unit of work spanning
    /// several statements (`Connection::transaction()`).
    pub async fn connection(&self) -> Result<Connection, StorageError> {
        Ok(self.inner.connect()?)
    }

    pub async fn fetch_one(
        &self,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<Option<Row>, StorageError> {
        let conn = self.connection().await?;
        let mut rows = conn.query(sql, params).await?;
        Ok(rows.next().await?)
    }

    /// Rows are decoded inside the iteration: a `libsql::Row` is a view into
    /// the live cursor, so it must be read before the statement advances.
    pub async fn fetch_all<T>(
        &self,
        sql: &str,
        params: impl IntoParams,
        map: impl Fn(&Row) -> Result<T, StorageError>,
    ) -> Result<Vec<T>, StorageError> {
        let conn = self.connection().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map(&row)?);
        }
        Ok(out)
    }

    pub async fn fetch_scalar(
        &self,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<Option<Value>, StorageError> {
        match self.fetch_one(sql, params).await? {
            Some(row) => Ok(Some(row.get_value(0)?)),
            None => Ok(None),
        }
    }

    pub async fn execute(&self, sql: &str, params: impl IntoParams) -> Result<u64, StorageError> {
        let conn = self.connection().await?;
        Ok(conn.execute(sql, params).await?)
    }
}
