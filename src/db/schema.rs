//! SQL DDL for initializing the medicine tracker storage.
//!
//! Every statement uses `IF NOT EXISTS`, so running the whole script again on an
//! initialized store is a no-op.

/// SQLite schema with:
/// - `id` INTEGER PRIMARY KEY AUTOINCREMENT on both tables
/// - `username` UNIQUE (case-sensitive, SQLite's default BINARY collation)
/// - `medicines.user_id` referencing `users(id)`
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS medicines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    dose TEXT NOT NULL,
    frequency TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id)
);
"#;

/// Postgres schema, same shape. BIGSERIAL keeps ids `INT8` so rows decode
/// to the same integer type as on SQLite.
pub const POSTGRES_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS medicines (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    dose TEXT NOT NULL,
    frequency TEXT NOT NULL
);
"#;

/// Split a DDL script into individual statements (sqlx runs one per query).
pub fn statements(script: &str) -> impl Iterator<Item = &str> {
    script.split(';').map(str::trim).filter(|s| !s.is_empty())
}
