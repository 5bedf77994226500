use std::{env, net::SocketAddr, path::PathBuf};

use chrono::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub static_root: PathBuf,
    pub cookie_secret: String,
    pub session_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://wayfarer.db".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let static_root = env::var("STATIC_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("static"));

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-wayfarer-cookie-secret".to_string());

        let ttl_hours: i64 = env::var("SESSION_TTL_HOURS")
            .unwrap_or_else(|_| "336".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid SESSION_TTL_HOURS: {err}")))?;
        if ttl_hours <= 0 {
            return Err(AppError::Config(
                "SESSION_TTL_HOURS must be positive".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            listen_addr,
            static_root,
            cookie_secret,
            session_ttl: Duration::hours(ttl_hours),
        })
    }
}
