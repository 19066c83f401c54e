pub mod api;
pub mod itinerary;
pub mod trips;

use axum::Router;
use chrono::{DateTime, Local, NaiveDate, Utc};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(trips::router())
        .merge(itinerary::router())
        .nest("/api", api::router())
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%d.%m.%Y %H:%M")
        .to_string()
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%a %d %b %Y").to_string())
        .unwrap_or_else(|| "–".into())
}
