use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Trip {
    pub id: i64,
    pub admin_id: i64,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub place_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country_code: Option<String>,
}

/// A trip that has not been written yet.
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub admin_id: i64,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub place_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country_code: Option<String>,
}

impl NewTrip {
    pub fn new(
        admin_id: i64,
        title: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        Self {
            admin_id,
            title: title.into(),
            start,
            end,
            place_name: None,
            latitude: None,
            longitude: None,
            address: None,
            city: None,
            country_code: None,
        }
    }
}
