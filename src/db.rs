use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::error;

use crate::error::AppError;

pub type DbPool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<DbPool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &DbPool) -> Result<(), AppError> {
    if let Err(err) = sqlx::migrate!("./migrations").run(pool).await {
        error!("migration failed: {err:?}");
        return Err(AppError::Other(err.into()));
    }
    Ok(())
}
