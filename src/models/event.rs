use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

pub const DEFAULT_DESCRIPTION: &str = "No description available.";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub day_id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub url: Option<String>,
    pub place_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: String,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub day_id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub url: Option<String>,
    pub place_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: String,
    pub country_code: Option<String>,
}
