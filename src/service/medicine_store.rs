use crate::db::{Db, Medicine, NewMedicine, User};
use crate::error::DbError;
use crate::params;
use tracing::{debug, info};

/// The queries the medicine tracker issues, typed.
///
/// Every medicine query is scoped by `user_id`, so a user can never read or
/// change another user's rows through this store.
#[derive(Clone, Debug)]
pub struct MedicineStore {
    db: Db,
}

impl MedicineStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Insert a user and return its generated id.
    ///
    /// A taken username comes back as a database error for which
    /// [`DbError::is_unique_violation`] is true.
    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<i64, DbError> {
        let res = self
            .db
            .run(
                "INSERT INTO users (username, password) VALUES (?, ?)",
                params![username, password_hash],
            )
            .await?;
        let id = res
            .last_id
            .ok_or_else(|| DbError::MissingInsertId("users".to_string()))?;
        info!(user_id = id, %username, "user registered");
        Ok(id)
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        self.db
            .get_as("SELECT * FROM users WHERE username = ?", params![username])
            .await
    }

    pub async fn add_medicine(&self, user_id: i64, medicine: &NewMedicine) -> Result<i64, DbError> {
        let res = self
            .db
            .run(
                "INSERT INTO medicines (user_id, name, dose, frequency) VALUES (?, ?, ?, ?)",
                params![user_id, &medicine.name, &medicine.dose, &medicine.frequency],
            )
            .await?;
        let id = res
            .last_id
            .ok_or_else(|| DbError::MissingInsertId("medicines".to_string()))?;
        debug!(user_id, medicine_id = id, "medicine added");
        Ok(id)
    }

    pub async fn list_medicines(&self, user_id: i64) -> Result<Vec<Medicine>, DbError> {
        self.db
            .all_as("SELECT * FROM medicines WHERE user_id = ?", params![user_id])
            .await
    }

    pub async fn get_medicine(&self, id: i64, user_id: i64) -> Result<Option<Medicine>, DbError> {
        self.db
            .get_as(
                "SELECT * FROM medicines WHERE id = ? AND user_id = ?",
                params![id, user_id],
            )
            .await
    }

    /// Returns false when no medicine with `id` belongs to `user_id`.
    pub async fn update_medicine(
        &self,
        id: i64,
        user_id: i64,
        medicine: &NewMedicine,
    ) -> Result<bool, DbError> {
        let res = self
            .db
            .run(
                "UPDATE medicines SET name = ?, dose = ?, frequency = ? WHERE id = ? AND user_id = ?",
                params![
                    &medicine.name,
                    &medicine.dose,
                    &medicine.frequency,
                    id,
                    user_id
                ],
            )
            .await?;
        Ok(res.changes > 0)
    }

    pub async fn delete_medicine(&self, id: i64, user_id: i64) -> Result<bool, DbError> {
        let res = self
            .db
            .run(
                "DELETE FROM medicines WHERE id = ? AND user_id = ?",
                params![id, user_id],
            )
            .await?;
        Ok(res.changes > 0)
    }
}
