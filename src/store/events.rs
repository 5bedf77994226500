use super::SqliteStore;
use crate::{
    error::AppError,
    models::event::{Event, NewEvent, DEFAULT_DESCRIPTION},
};

impl SqliteStore {
    pub async fn create_event(&self, event: &NewEvent) -> Result<Event, AppError> {
        let description = event.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION);
        let result = sqlx::query(
            r#"INSERT INTO events
               (day_id, user_id, title, description, start, "end", url, place_name,
                latitude, longitude, address, city, country_code)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
        )
        .bind(event.day_id)
        .bind(event.user_id)
        .bind(&event.title)
        .bind(description)
        .bind(event.start)
        .bind(event.end)
        .bind(&event.url)
        .bind(&event.place_name)
        .bind(event.latitude)
        .bind(event.longitude)
        .bind(&event.address)
        .bind(&event.city)
        .bind(&event.country_code)
        .execute(self.pool())
        .await?;

        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?1")
            .bind(result.last_insert_rowid())
            .fetch_optional(self.pool())
            .await?
            .ok_or(AppError::NotFound)
    }

    /// All events of a trip, in chronological order.
    pub async fn events_for_trip(&self, trip_id: i64) -> Result<Vec<Event>, AppError> {
        let events = sqlx::query_as::<_, Event>(
            r#"SELECT e.* FROM events e
               JOIN days d ON d.id = e.day_id
               WHERE d.trip_id = ?1
               ORDER BY e.start, e.id"#,
        )
        .bind(trip_id)
        .fetch_all(self.pool())
        .await?;
        Ok(events)
    }
}
