use tracing::info;

use super::{SqliteStore, TripStore};
use crate::{
    error::AppError,
    models::{
        permission::{Access, Permission, SharedPermission},
        trip::Trip,
    },
};

impl SqliteStore {
    pub async fn permission_for(
        &self,
        trip_id: i64,
        user_id: i64,
    ) -> Result<Option<Permission>, AppError> {
        let permission = sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions WHERE trip_id = ?1 AND user_id = ?2",
        )
        .bind(trip_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(permission)
    }

    /// Loads the trip if `user_id` holds `access` on it.
    pub async fn authorize(
        &self,
        trip_id: i64,
        user_id: i64,
        access: Access,
    ) -> Result<Trip, AppError> {
        let trip = self.get_trip(trip_id).await?;
        if trip.admin_id == user_id {
            return Ok(trip);
        }
        match self.permission_for(trip_id, user_id).await? {
            Some(permission) if permission.allows(access) => Ok(trip),
            _ => Err(AppError::Forbidden),
        }
    }

    /// Loads the trip if `user_id` owns it.
    pub async fn authorize_owner(&self, trip_id: i64, user_id: i64) -> Result<Trip, AppError> {
        let trip = self.get_trip(trip_id).await?;
        if trip.admin_id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(trip)
    }

    /// Everyone the trip is shared with, owner excluded.
    pub async fn shared_permissions(&self, trip_id: i64) -> Result<Vec<SharedPermission>, AppError> {
        let shared = sqlx::query_as::<_, SharedPermission>(
            r#"SELECT p.user_id, u.fname, u.lname, p.can_edit FROM permissions p
               JOIN users u ON u.id = p.user_id
               JOIN trips t ON t.id = p.trip_id
               WHERE p.trip_id = ?1 AND p.user_id != t.admin_id
               ORDER BY u.fname, u.id"#,
        )
        .bind(trip_id)
        .fetch_all(self.pool())
        .await?;
        Ok(shared)
    }

    /// Grants or replaces the user's access to the trip.
    pub async fn grant_permission(
        &self,
        trip_id: i64,
        user_id: i64,
        access: Access,
    ) -> Result<Permission, AppError> {
        let can_edit = access == Access::Edit;
        sqlx::query(
            r#"INSERT INTO permissions (trip_id, user_id, can_view, can_edit) VALUES (?1, ?2, 1, ?3)
               ON CONFLICT (trip_id, user_id) DO UPDATE SET can_view = 1, can_edit = excluded.can_edit"#,
        )
        .bind(trip_id)
        .bind(user_id)
        .bind(can_edit)
        .execute(self.pool())
        .await?;

        info!(trip_id, user_id, access = access.as_str(), "permission granted");
        self.permission_for(trip_id, user_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn revoke_permission(&self, trip_id: i64, user_id: i64) -> Result<(), AppError> {
        let trip = self.get_trip(trip_id).await?;
        if trip.admin_id == user_id {
            return Err(AppError::BadRequest(
                "The trip owner's access can't be revoked.".into(),
            ));
        }

        let removed = sqlx::query("DELETE FROM permissions WHERE trip_id = ?1 AND user_id = ?2")
            .bind(trip_id)
            .bind(user_id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(AppError::NotFound);
        }

        info!(trip_id, user_id, "permission revoked");
        Ok(())
    }
}
