use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Day {
    pub id: i64,
    pub trip_id: i64,
    pub day_num: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Day {
    pub fn label(&self) -> String {
        format!("Day {} · {}", self.day_num, self.start.format("%a %d %b %Y"))
    }
}
