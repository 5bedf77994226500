use serde::Serialize;
use sqlx::FromRow;

/// Directed: `admin_id` added `friend_id`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Friendship {
    pub id: i64,
    pub admin_id: i64,
    pub friend_id: i64,
}

/// A friend as listed on a profile page.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Friend {
    pub user_id: i64,
    pub fname: String,
    pub img_url: Option<String>,
}
