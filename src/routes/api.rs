use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::AppError,
    models::{
        stop::{NewStop, Stop, TravelMode},
        trip::{Destination, Trip},
        vote::{Tally, Vote, VoteSummary},
    },
    services::{
        itinerary::StopUpdate,
        planning::{finalize_trip, Finalized},
        weather::EnrichedItinerary,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips/:id", get(trip_detail))
        .route("/trips/:id/votes", post(record_vote))
        .route("/trips/:id/tally/:category", get(tally))
        .route("/trips/:id/summary", get(summary))
        .route("/trips/:id/finalize", post(finalize))
        .route("/trips/:id/itinerary", get(itinerary))
        .route("/trips/:id/stops", post(insert_stop))
        .route("/trips/:id/order", put(reorder))
        .route(
            "/trips/:id/stops/:stop_id",
            patch(update_stop).delete(remove_stop),
        )
}

#[derive(Serialize)]
struct TripDetail {
    #[serde(flatten)]
    trip: Trip,
    destinations: Vec<Destination>,
}

async fn trip_detail(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Json<TripDetail>, AppError> {
    let trip = state.trips.get_trip(&trip_id).await?;
    let destinations = state.trips.destinations(&trip_id).await?;
    Ok(Json(TripDetail { trip, destinations }))
}

#[derive(Deserialize)]
struct VoteRequest {
    voter: String,
    category: String,
    value: String,
}

async fn record_vote(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
    Json(request): Json<VoteRequest>,
) -> Result<(StatusCode, Json<Vote>), AppError> {
    let vote = state
        .voting
        .record_vote(&trip_id, &request.voter, &request.category, &request.value)
        .await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

async fn tally(
    State(state): State<AppState>,
    Path((trip_id, category)): Path<(String, String)>,
) -> Result<Json<TallyResponse>, AppError> {
    let tally = state.voting.tally(&trip_id, &category).await?;
    Ok(Json(TallyResponse::from(tally)))
}

async fn summary(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Json<VoteSummary>, AppError> {
    Ok(Json(state.voting.summary(&trip_id).await?))
}

#[derive(Serialize)]
struct TallyResponse {
    #[serde(flatten)]
    tally: Tally,
    winner: Option<String>,
    tie: bool,
}

impl From<Tally> for TallyResponse {
    fn from(tally: Tally) -> Self {
        Self {
            winner: tally.winner().map(|w| w.value.clone()),
            tie: tally.is_tie(),
            tally,
        }
    }
}

async fn finalize(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Json<Finalized>, AppError> {
    Ok(Json(finalize_trip(&state, &trip_id).await?))
}

async fn itinerary(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Json<EnrichedItinerary>, AppError> {
    let itinerary = state.itinerary.itinerary(&trip_id).await?;
    Ok(Json(state.weather.enrich(itinerary).await))
}

#[derive(Deserialize)]
struct InsertStopRequest {
    #[serde(flatten)]
    stop: NewStop,
    position: Option<i64>,
}

async fn insert_stop(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
    Json(request): Json<InsertStopRequest>,
) -> Result<(StatusCode, Json<Stop>), AppError> {
    let stop = state
        .itinerary
        .insert_stop(&trip_id, request.stop, request.position)
        .await?;
    Ok((StatusCode::CREATED, Json(stop)))
}

#[derive(Deserialize)]
struct ReorderRequest {
    stop_ids: Vec<String>,
}

async fn reorder(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<Vec<Stop>>, AppError> {
    debug!(%trip_id, order = ?request.stop_ids, "reorder requested");
    Ok(Json(state.itinerary.reorder(&trip_id, &request.stop_ids).await?))
}

/// Absent fields stay as they are; `null` clears a date or the notes.
#[derive(Deserialize)]
struct UpdateStopRequest {
    #[serde(default, with = "serde_with::rust::double_option")]
    arrival: Option<Option<NaiveDate>>,
    #[serde(default, with = "serde_with::rust::double_option")]
    departure: Option<Option<NaiveDate>>,
    travel_mode: Option<TravelMode>,
    #[serde(default, with = "serde_with::rust::double_option")]
    notes: Option<Option<String>>,
}

async fn update_stop(
    State(state): State<AppState>,
    Path((trip_id, stop_id)): Path<(String, String)>,
    Json(request): Json<UpdateStopRequest>,
) -> Result<Json<Stop>, AppError> {
    let update = StopUpdate {
        arrival: request.arrival,
        departure: request.departure,
        travel_mode: request.travel_mode,
        notes: request.notes,
    };
    Ok(Json(
        state
            .itinerary
            .update_stop(&trip_id, &stop_id, update)
            .await?,
    ))
}

async fn remove_stop(
    State(state): State<AppState>,
    Path((trip_id, stop_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.itinerary.remove_stop(&trip_id, &stop_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
