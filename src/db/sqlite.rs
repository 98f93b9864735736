use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Pool, Row as _, Sqlite, TypeInfo, ValueRef};
use tracing::debug;

use super::identity::{identity_from_native, identity_from_rows, plan_run};
use super::placeholder::translate;
use super::schema::{SQLITE_INIT, statements};
use super::{Backend, Database, Row, RunResult, SqlValue};
use crate::error::DbError;

pub type SqlitePool = Pool<Sqlite>;

/// Embedded single-file backend.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool on `url`, creating the database file if missing.
    ///
    /// In-memory databases are per connection, so they get a single connection
    /// that is never recycled.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, DbError> {
        let connect_opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_opts = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout);
        if is_memory_url(url) {
            pool_opts = pool_opts
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_opts.connect_with(connect_opts).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Bool(v) => query.bind(*v),
        };
    }
    query
}

/// Decode by the value's storage class, not the declared column type.
fn row_to_map(row: &SqliteRow) -> Result<Row, DbError> {
    let mut map = Row::new();
    for column in row.columns() {
        let i = column.ordinal();
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" | "NUMERIC" => Value::from(row.try_get_unchecked::<f64, _>(i)?),
                "TEXT" | "DATE" | "TIME" | "DATETIME" => {
                    Value::from(row.try_get_unchecked::<String, _>(i)?)
                }
                "BLOB" => Value::from(BASE64.encode(row.try_get_unchecked::<Vec<u8>, _>(i)?)),
                other => {
                    return Err(DbError::UnsupportedColumn {
                        column: column.name().to_string(),
                        type_name: other.to_string(),
                    });
                }
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

#[async_trait]
impl Database for SqliteDatabase {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn initialize(&self) -> Result<(), DbError> {
        for stmt in statements(SQLITE_INIT) {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        debug!(backend = "sqlite", "schema initialized");
        Ok(())
    }

    async fn get(&self, query: &str, params: &[SqlValue]) -> Result<Option<Row>, DbError> {
        let sql = translate(query, Backend::Sqlite.placeholder_style());
        debug!(backend = "sqlite", sql = %sql, params = params.len(), "get");
        let row = bind_params(sqlx::query(&sql), params)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_map).transpose()
    }

    async fn all(&self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let sql = translate(query, Backend::Sqlite.placeholder_style());
        debug!(backend = "sqlite", sql = %sql, params = params.len(), "all");
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_map).collect()
    }

    async fn run(&self, query: &str, params: &[SqlValue]) -> Result<RunResult, DbError> {
        let sql = translate(query, Backend::Sqlite.placeholder_style());
        let plan = plan_run(&sql, Backend::Sqlite.native_identity());
        debug!(backend = "sqlite", sql = %plan.sql, params = params.len(), "run");

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
            last_id: identity_from_native(
                plan.is_insert,
                done.rows_affected(),
                done.last_insert_rowid(),
            ),
            changes: done.rows_affected(),
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_db() -> SqliteDatabase {
        let db = SqliteDatabase::connect("sqlite::memory:", 5, Duration::from_secs(5))
            .await
            .unwrap();
        db.initialize().await.unwrap();
        db
    }

    #[tokio::test]
    async fn rows_keep_declared_column_names() {
        let db = memory_db().await;
        let id = db
            .run(
                "INSERT INTO users (username, password) VALUES (?, ?)",
                &["alice".into(), "hash".into()],
            )
            .await
            .unwrap()
            .last_id
            .unwrap();

        let row = db
            .get("SELECT * FROM users WHERE id = ?", &[id.into()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            Value::Object(row),
            json!({"id": id, "username": "alice", "password": "hash"})
        );
    }

    #[tokio::test]
    async fn storage_classes_map_to_json() {
        let db = memory_db().await;
        let row = db
            .get(
                "SELECT 1 AS i, 2.5 AS r, 'x' AS t, NULL AS n, x'0102' AS b, ? AS p",
                &[SqlValue::Bool(true)],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            Value::Object(row),
            json!({"i": 1, "r": 2.5, "t": "x", "n": null, "b": "AQI=", "p": 1})
        );
    }

    #[tokio::test]
    async fn explicit_returning_on_sqlite_is_used() {
        let db = memory_db().await;
        let res = db
            .run(
                "INSERT INTO users (username, password) VALUES (?, ?) RETURNING id",
                &["bob".into(), "hash".into()],
            )
            .await
            .unwrap();
        assert_eq!(res.changes, 1);
        assert!(res.last_id.is_some());
    }

    #[tokio::test]
    async fn returning_without_id_still_reports_identity() {
        let db = memory_db().await;
        let res = db
            .run(
                "INSERT INTO users (username, password) VALUES (?, ?) RETURNING username",
                &["carl".into(), "hash".into()],
            )
            .await
            .unwrap();
        let id = res.last_id.unwrap();
        let row = db
            .get("SELECT username FROM users WHERE id = ?", &[id.into()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["username"], "carl");
    }

    #[tokio::test]
    async fn multi_row_insert_reports_no_identity() {
        let db = memory_db().await;
        let res = db
            .run(
                "INSERT INTO users (username, password) VALUES (?, ?), (?, ?)",
                &["a".into(), "1".into(), "b".into(), "2".into()],
            )
            .await
            .unwrap();
        assert_eq!(res.changes, 2);
        assert_eq!(res.last_id, None);
    }

    #[tokio::test]
    async fn engine_errors_come_back_as_values() {
        let db = memory_db().await;
        let err = db.all("SELECT * FROM no_such_table", &[]).await;
        assert!(matches!(err, Err(DbError::Database(_))));
    }

    #[tokio::test]
    async fn close_marks_pool_closed() {
        let db = memory_db().await;
        db.close().await;
        assert!(db.pool().is_closed());
    }
}
