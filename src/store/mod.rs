pub mod events;
pub mod friendships;
pub mod permissions;
pub mod sessions;
pub mod users;

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::info;

use crate::{
    db::DbPool,
    error::AppError,
    models::{day::Day, trip::NewTrip, trip::Trip},
    partition::{self, DayWindow, PartitionError},
};

/// Persistence for trips and their generated days.
#[async_trait]
pub trait TripStore: Send + Sync {
    /// Writes the trip and its owner's view+edit permission.
    async fn create_trip(&self, trip: &NewTrip) -> Result<i64, AppError>;

    async fn get_trip(&self, trip_id: i64) -> Result<Trip, AppError>;

    /// Writes every window or none of them.
    async fn insert_days(&self, trip_id: i64, days: &[DayWindow]) -> Result<(), AppError>;

    async fn days_for_trip(&self, trip_id: i64) -> Result<Vec<Day>, AppError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Creates a trip together with its owner permission and all of its
    /// days in one transaction.
    pub async fn create_planned_trip(&self, trip: &NewTrip) -> Result<Trip, AppError> {
        let windows = partition::partition(trip.start, trip.end)?;

        let mut tx = self.pool.begin().await?;
        let trip_id = insert_trip_row(&mut tx, trip).await?;
        insert_owner_permission(&mut tx, trip_id, trip.admin_id).await?;
        insert_day_rows(&mut tx, trip_id, &windows).await?;
        tx.commit().await?;

        info!(trip_id, admin_id = trip.admin_id, days = windows.len(), "trip created");
        self.get_trip(trip_id).await
    }

    /// Trips the user may view, earliest first.
    pub async fn trips_for_user(&self, user_id: i64) -> Result<Vec<Trip>, AppError> {
        let trips = sqlx::query_as::<_, Trip>(
            r#"SELECT t.* FROM trips t
               JOIN permissions p ON p.trip_id = t.id
               WHERE p.user_id = ?1 AND p.can_view
               ORDER BY t.start, t.id"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(trips)
    }

    /// First day carrying the given number; duplicates from repeated
    /// partitioning are ignored.
    pub async fn day_by_number(&self, trip_id: i64, day_num: i64) -> Result<Day, AppError> {
        sqlx::query_as::<_, Day>(
            "SELECT * FROM days WHERE trip_id = ?1 AND day_num = ?2 ORDER BY id LIMIT 1",
        )
        .bind(trip_id)
        .bind(day_num)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)
    }

    /// Removes the trip with its events, days and permissions.
    pub async fn delete_trip(&self, trip_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM events WHERE day_id IN (SELECT id FROM days WHERE trip_id = ?1)")
            .bind(trip_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM days WHERE trip_id = ?1")
            .bind(trip_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM permissions WHERE trip_id = ?1")
            .bind(trip_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM trips WHERE id = ?1")
            .bind(trip_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AppError::NotFound);
        }
        tx.commit().await?;

        info!(trip_id, "trip deleted");
        Ok(())
    }
}

#[async_trait]
impl TripStore for SqliteStore {
    async fn create_trip(&self, trip: &NewTrip) -> Result<i64, AppError> {
        if trip.start > trip.end {
            return Err(PartitionError::StartAfterEnd {
                start: trip.start,
                end: trip.end,
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let trip_id = insert_trip_row(&mut tx, trip).await?;
        insert_owner_permission(&mut tx, trip_id, trip.admin_id).await?;
        tx.commit().await?;
        Ok(trip_id)
    }

    async fn get_trip(&self, trip_id: i64) -> Result<Trip, AppError> {
        sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE id = ?1")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn insert_days(&self, trip_id: i64, days: &[DayWindow]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        insert_day_rows(&mut tx, trip_id, days).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn days_for_trip(&self, trip_id: i64) -> Result<Vec<Day>, AppError> {
        let days = sqlx::query_as::<_, Day>(
            "SELECT * FROM days WHERE trip_id = ?1 ORDER BY day_num, id",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(days)
    }
}

async fn insert_trip_row(conn: &mut SqliteConnection, trip: &NewTrip) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"INSERT INTO trips
           (admin_id, title, start, "end", place_name, latitude, longitude, address, city, country_code)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
    )
    .bind(trip.admin_id)
    .bind(&trip.title)
    .bind(trip.start)
    .bind(trip.end)
    .bind(&trip.place_name)
    .bind(trip.latitude)
    .bind(trip.longitude)
    .bind(&trip.address)
    .bind(&trip.city)
    .bind(&trip.country_code)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

async fn insert_owner_permission(
    conn: &mut SqliteConnection,
    trip_id: i64,
    admin_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO permissions (trip_id, user_id, can_view, can_edit) VALUES (?1, ?2, 1, 1)",
    )
    .bind(trip_id)
    .bind(admin_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_day_rows(
    conn: &mut SqliteConnection,
    trip_id: i64,
    days: &[DayWindow],
) -> Result<(), sqlx::Error> {
    for day in days {
        sqlx::query(r#"INSERT INTO days (trip_id, day_num, start, "end") VALUES (?1, ?2, ?3, ?4)"#)
            .bind(trip_id)
            .bind(day.day_num)
            .bind(day.start)
            .bind(day.end)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
