use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub fname: String,
    pub lname: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub img_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.fname, self.lname)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub password_hash: String,
}
