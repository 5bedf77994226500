use super::SqliteStore;
use crate::{
    error::AppError,
    models::friendship::{Friend, Friendship},
};

impl SqliteStore {
    pub async fn add_friendship(&self, admin_id: i64, friend_id: i64) -> Result<Friendship, AppError> {
        if admin_id == friend_id {
            return Err(AppError::BadRequest("You can't add yourself as a friend.".into()));
        }

        let result = sqlx::query("INSERT INTO friendships (admin_id, friend_id) VALUES (?1, ?2)")
            .bind(admin_id)
            .bind(friend_id)
            .execute(self.pool())
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    AppError::BadRequest("You are already friends.".into())
                }
                other => AppError::Database(other),
            })?;

        Ok(Friendship {
            id: result.last_insert_rowid(),
            admin_id,
            friend_id,
        })
    }

    pub async fn friends_of(&self, user_id: i64) -> Result<Vec<Friend>, AppError> {
        let friends = sqlx::query_as::<_, Friend>(
            r#"SELECT u.id AS user_id, u.fname, u.img_url FROM friendships f
               JOIN users u ON u.id = f.friend_id
               WHERE f.admin_id = ?1
               ORDER BY u.fname, u.id"#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(friends)
    }
}
