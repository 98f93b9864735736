//! Database module: one query surface over interchangeable storage engines.
//!
//! Layout:
//! - `placeholder.rs`: `?` marker to native parameter syntax
//! - `identity.rs`: makes inserts report their generated `id`
//! - `schema.rs`: SQL DDL for initializing the database, per backend
//! - `sqlite.rs` / `postgres.rs`: [`Database`] implementations over sqlx pools
//! - `value.rs`: bound parameter values
//! - `models.rs`: Rust structs mirroring DB rows

pub mod identity;
pub mod models;
pub mod placeholder;
pub mod postgres;
pub mod schema;
pub mod sqlite;
pub mod value;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::DbError;
use placeholder::PlaceholderStyle;

pub use models::{Medicine, NewMedicine, User};
pub use postgres::PostgresDatabase;
pub use sqlite::SqliteDatabase;
pub use value::SqlValue;

/// A result row keyed by column name as declared in the schema.
pub type Row = serde_json::Map<String, Value>;

/// Outcome of [`Db::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Identifier of the inserted row. `None` for anything but a single-row insert.
    pub last_id: Option<i64>,
    /// Rows affected by the statement.
    pub changes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    /// Choose the backend from the scheme of a database url.
    pub fn from_url(database_url: &str) -> Result<Self, DbError> {
        let url = url::Url::parse(database_url)?;
        match url.scheme() {
            "sqlite" => Ok(Backend::Sqlite),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            other => Err(DbError::UnsupportedUrl(other.to_string())),
        }
    }

    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Backend::Sqlite => PlaceholderStyle::Question,
            Backend::Postgres => PlaceholderStyle::Dollar,
        }
    }

    /// Whether the engine reports the last inserted rowid without `RETURNING`.
    pub fn native_identity(self) -> bool {
        matches!(self, Backend::Sqlite)
    }

    pub fn name(self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }
}

/// A storage engine behind the uniform query surface.
///
/// Queries use `?` markers; implementations translate them and acquire a pooled
/// connection for the duration of one statement.
#[async_trait]
pub trait Database: Send + Sync {
    fn backend(&self) -> Backend;

    /// Idempotent `CREATE TABLE IF NOT EXISTS` for every table.
    async fn initialize(&self) -> Result<(), DbError>;

    /// First matching row, if any.
    async fn get(&self, query: &str, params: &[SqlValue]) -> Result<Option<Row>, DbError>;

    /// All matching rows in engine order.
    async fn all(&self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError>;

    /// Execute a mutating statement.
    async fn run(&self, query: &str, params: &[SqlValue]) -> Result<RunResult, DbError>;

    async fn close(&self);
}

/// Cloneable handle the application talks to.
///
/// Obtained from [`Db::connect`], which has already created the schema, or
/// from [`Db::new`] around an injected backend.
#[derive(Clone)]
pub struct Db {
    inner: Arc<dyn Database>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("backend", &self.inner.backend())
            .finish_non_exhaustive()
    }
}

impl Db {
    pub fn new(inner: Arc<dyn Database>) -> Self {
        Self { inner }
    }

    /// Open the pool named by `cfg.database_url` and initialize the schema.
    ///
    /// Transient connect failures are retried; any error left after that,
    /// including a failed schema creation, is returned to the caller.
    pub async fn connect(cfg: &Config) -> Result<Self, DbError> {
        let backend = Backend::from_url(&cfg.database_url)?;
        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(cfg.connect_retries)
            .with_jitter();

        let inner = (|| async move { open_backend(backend, cfg).await })
            .retry(retry_policy)
            .when(is_transient)
            .notify(|e, dur| {
                warn!(
                    backend = backend.name(),
                    error = %e,
                    "connect failed, retrying in {:?}",
                    dur
                );
            })
            .await?;

        let db = Self::new(inner);
        db.initialize().await?;
        info!(backend = backend.name(), "database ready");
        Ok(db)
    }

    pub fn backend(&self) -> Backend {
        self.inner.backend()
    }

    pub async fn initialize(&self) -> Result<(), DbError> {
        self.inner.initialize().await
    }

    pub async fn get(&self, query: &str, params: &[SqlValue]) -> Result<Option<Row>, DbError> {
        self.inner.get(query, params).await
    }

    pub async fn all(&self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        self.inner.all(query, params).await
    }

    pub async fn run(&self, query: &str, params: &[SqlValue]) -> Result<RunResult, DbError> {
        self.inner.run(query, params).await
    }

    /// [`Db::get`] decoded into `T`.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<Option<T>, DbError> {
        self.get(query, params)
            .await?
            .map(|row| serde_json::from_value(Value::Object(row)))
            .transpose()
            .map_err(DbError::from)
    }

    /// [`Db::all`] decoded into `T`.
    pub async fn all_as<T: DeserializeOwned>(
        &self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<Vec<T>, DbError> {
        self.all(query, params)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(DbError::from))
            .collect()
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }
}

async fn open_backend(backend: Backend, cfg: &Config) -> Result<Arc<dyn Database>, DbError> {
    let inner: Arc<dyn Database> = match backend {
        Backend::Sqlite => Arc::new(
            SqliteDatabase::connect(
                &cfg.database_url,
                cfg.max_connections,
                cfg.acquire_timeout(),
            )
            .await?,
        ),
        Backend::Postgres => Arc::new(
            PostgresDatabase::connect(
                &cfg.database_url,
                cfg.max_connections,
                cfg.acquire_timeout(),
            )
            .await?,
        ),
    };
    Ok(inner)
}

fn is_transient(e: &DbError) -> bool {
    matches!(
        e,
        DbError::Database(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_))
    )
}
