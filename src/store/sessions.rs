use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::SqliteStore;
use crate::{
    error::AppError,
    models::{session::Session, user::User},
};

impl SqliteStore {
    pub async fn create_session(&self, user_id: i64, ttl: Duration) -> Result<Session, AppError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            created_at: now,
            last_seen_at: now,
            expires_at: Some(now + ttl),
        };
        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, last_seen_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.last_seen_at)
        .bind(session.expires_at)
        .execute(self.pool())
        .await?;
        Ok(session)
    }

    /// Resolves a live session to its user. Expired sessions resolve to
    /// `None` and are removed.
    pub async fn session_user(&self, session_id: &str) -> Result<Option<User>, AppError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(self.pool())
            .await?;
        let Some(session) = session else {
            return Ok(None);
        };

        let now = Utc::now();
        if session.is_expired(now) {
            self.delete_session(&session.id).await?;
            return Ok(None);
        }

        self.touch_session(&session.id, now).await?;
        self.user_by_id(session.user_id).await
    }

    pub async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET last_seen_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(session_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let purged = sqlx::query("DELETE FROM sessions WHERE expires_at IS NOT NULL AND expires_at <= ?1")
            .bind(now)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(purged)
    }
}
