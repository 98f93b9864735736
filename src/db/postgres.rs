//! Networked, connection-pooled backend.
//!
//! Postgres wants `$n` parameters and only reports generated keys through
//! `RETURNING`, so every statement goes through the translator and inserts
//! through the identity planner.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, TypeInfo, ValueRef};
use tracing::{debug, warn};

use super::identity::{identity_from_rows, plan_run};
use super::placeholder::translate;
use super::schema::{POSTGRES_INIT, statements};
use super::{Backend, Database, Row, RunResult, SqlValue};
use crate::error::DbError;

#[derive(Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            // sent as a TEXT-typed NULL; only valid where a text value would be
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Bool(v) => query.bind(*v),
        };
    }
    query
}

/// JSON-representable Postgres column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PgScalar {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Bool,
    Text,
    Bytea,
}

fn pg_scalar(type_name: &str) -> Option<PgScalar> {
    Some(match type_name {
        "INT2" => PgScalar::Int2,
        "INT4" => PgScalar::Int4,
        "INT8" => PgScalar::Int8,
        "FLOAT4" => PgScalar::Float4,
        "FLOAT8" => PgScalar::Float8,
        "BOOL" => PgScalar::Bool,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => PgScalar::Text,
        "BYTEA" => PgScalar::Bytea,
        _ => return None,
    })
}

fn row_to_map(row: &PgRow) -> Result<Row, DbError> {
    let mut map = Row::new();
    for column in row.columns() {
        let i = column.ordinal();
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_info = raw.type_info();
            let type_name = type_info.name();
            let Some(scalar) = pg_scalar(type_name) else {
                return Err(DbError::UnsupportedColumn {
                    column: column.name().to_string(),
                    type_name: type_name.to_string(),
                });
            };
            match scalar {
                PgScalar::Int2 => Value::from(row.try_get_unchecked::<i16, _>(i)?),
                PgScalar::Int4 => Value::from(row.try_get_unchecked::<i32, _>(i)?),
                PgScalar::Int8 => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                PgScalar::Float4 => Value::from(row.try_get_unchecked::<f32, _>(i)?),
                PgScalar::Float8 => Value::from(row.try_get_unchecked::<f64, _>(i)?),
                PgScalar::Bool => Value::from(row.try_get_unchecked::<bool, _>(i)?),
                PgScalar::Text => Value::from(row.try_get_unchecked::<String, _>(i)?),
                PgScalar::Bytea => {
                    Value::from(BASE64.encode(row.try_get_unchecked::<Vec<u8>, _>(i)?))
                }
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

/// Two processes racing on `CREATE TABLE IF NOT EXISTS` can still see
/// `duplicate_table` (42P07) or a `unique_violation` (23505) on `pg_type`.
fn is_ddl_race_code(code: &str) -> bool {
    matches!(code, "42P07" | "23505")
}

fn is_ddl_race(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| is_ddl_race_code(&code)),
        _ => false,
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn initialize(&self) -> Result<(), DbError> {
        for stmt in statements(POSTGRES_INIT) {
            match sqlx::query(stmt).execute(&self.pool).await {
                Ok(_) => {}
                Err(e) if is_ddl_race(&e) => {
                    warn!(backend = "postgres", error = %e, "schema created concurrently; ignoring");
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!(backend = "postgres", "schema initialized");
        Ok(())
    }

    async fn get(&self, query: &str, params: &[SqlValue]) -> Result<Option<Row>, DbError> {
        let sql = translate(query, Backend::Postgres.placeholder_style());
        debug!(backend = "postgres", sql = %sql, params = params.len(), "get");
        let row = bind_params(sqlx::query(&sql), params)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_map).transpose()
    }

    async fn all(&self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let sql = translate(query, Backend::Postgres.placeholder_style());
        debug!(backend = "postgres", sql = %sql, params = params.len(), "all");
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_map).collect()
    }

    async fn run(&self, query: &str, params: &[SqlValue]) -> Result<RunResult, DbError> {
        let sql = translate(query, Backend::Postgres.placeholder_style());
        let plan = plan_run(&sql, Backend::Postgres.native_identity());
        debug!(backend = "postgres", sql = %plan.sql, params = params.len(), "run");

        if plan.returns_rows {
            let rows = bind_params(sqlx::query(&plan.sql), params)
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(row_to_map)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(RunResult {
                last_id: identity_from_rows(&rows),
                changes: rows.len() as u64,
            });
        }

        let done = bind_params(sqlx::query(&plan.sql), params)
            .execute(&self.pool)
            .await?;
        Ok(RunResult {
            last_id: None,
            changes: done.rows_affected(),
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
