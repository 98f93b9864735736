//! Application-facing services built on the [`Db`](crate::db::Db) facade.

pub mod medicine_store;

pub use medicine_store::MedicineStore;
