use chrono::Utc;

use super::SqliteStore;
use crate::{
    error::AppError,
    models::user::{NewUser, User},
};

impl SqliteStore {
    pub async fn create_user(&self, user: &NewUser) -> Result<User, AppError> {
        let result = sqlx::query(
            "INSERT INTO users (fname, lname, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&user.fname)
        .bind(&user.lname)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::BadRequest("An account with this email already exists.".into())
            }
            other => AppError::Database(other),
        })?;

        self.user_by_id(result.last_insert_rowid())
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn user_by_id(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }
}
