pub mod config;
pub mod db;
pub mod error;
pub mod service;

pub use config::Config;
pub use db::{Backend, Database, Db, Row, RunResult, SqlValue};
pub use error::DbError;
pub use service::MedicineStore;
