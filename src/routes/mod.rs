pub mod profile;
pub mod public;
pub mod trips;

use axum::Router;
use chrono::NaiveDateTime;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let static_root = state.config.static_root.clone();
    Router::new()
        .merge(public::router())
        .merge(profile::router())
        .nest("/trips", trips::router())
        .nest_service("/static", ServeDir::new(static_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub(crate) fn format_day_range(start: NaiveDateTime, end: NaiveDateTime) -> String {
    let start_day = start.format("%d.%m.%Y");
    let end_day = end.format("%d.%m.%Y");
    if start.date() == end.date() {
        start_day.to_string()
    } else {
        format!("{start_day} – {end_day}")
    }
}
