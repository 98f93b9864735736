use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum DbError {
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Unsupported database url scheme: {0}")]
    UnsupportedUrl(String),

    #[error("Unsupported column type {type_name} for column {column}")]
    UnsupportedColumn { column: String, type_name: String },

    #[error("Insert into {0} reported no id")]
    MissingInsertId(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for DbError {
    fn from(e: figment::Error) -> Self {
        DbError::Config(Box::new(e))
    }
}

impl DbError {
    /// True when the engine rejected the statement because of a UNIQUE constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Database(SqlxError::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }

    /// Engine-specific error code (SQLSTATE on Postgres, extended result code on SQLite).
    pub fn code(&self) -> Option<String> {
        match self {
            DbError::Database(SqlxError::Database(db_err)) => {
                db_err.code().map(|c| c.into_owned())
            }
            _ => None,
        }
    }
}
