use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::Form;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_with::{serde_as, NoneAsEmptyString};

use super::{format_date, normalize_optional};
use crate::{
    error::AppError,
    models::{
        stop::{NewStop, Place, TravelMode},
        trip::Destination,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trip/:id/itinerary", get(itinerary_page))
        .route("/trip/:id/itinerary/stops", post(add_stop))
        .route("/trip/:id/itinerary/stops/:stop_id/delete", post(delete_stop))
}

#[derive(Clone)]
struct StopRow {
    id: String,
    position: i64,
    name: String,
    coordinates: String,
    arrival: String,
    departure: String,
    travel_mode: String,
    notes: String,
    weather: String,
    weather_ok: bool,
}

#[derive(Clone)]
struct SegmentRow {
    from_name: String,
    to_name: String,
    travel_mode: String,
    distance: String,
    duration: String,
    weather: String,
    weather_ok: bool,
}

#[derive(Template)]
#[template(path = "trips/itinerary.html")]
struct ItineraryTemplate {
    trip_id: String,
    trip_name: String,
    status: String,
    stops: Vec<StopRow>,
    segments: Vec<SegmentRow>,
    destinations: Vec<Destination>,
    travel_modes: Vec<String>,
    show_error: bool,
    error_message: String,
}

async fn render_itinerary(
    state: &AppState,
    trip_id: &str,
    error: Option<String>,
) -> Result<ItineraryTemplate, AppError> {
    let trip = state.trips.get_trip(trip_id).await?;
    let destinations = state.trips.destinations(trip_id).await?;
    let itinerary = state.itinerary.itinerary(trip_id).await?;
    // the database work is done; forecasts are fetched without holding anything
    let enriched = state.weather.enrich(itinerary).await;

    let stops = enriched
        .stops
        .into_iter()
        .map(|entry| StopRow {
            id: entry.stop.id,
            position: entry.stop.position + 1,
            coordinates: format!(
                "{:.4}, {:.4}",
                entry.stop.place.latitude, entry.stop.place.longitude
            ),
            name: entry.stop.place.name,
            arrival: format_date(entry.stop.arrival),
            departure: format_date(entry.stop.departure),
            travel_mode: entry.stop.travel_mode.to_string(),
            notes: entry.stop.notes.unwrap_or_default(),
            weather_ok: entry.weather.is_available(),
            weather: entry.weather.label(),
        })
        .collect();

    let segments = enriched
        .segments
        .into_iter()
        .map(|entry| SegmentRow {
            travel_mode: entry.segment.travel_mode.to_string(),
            distance: format!("{:.1} km", entry.segment.distance_km),
            duration: entry.segment.duration_label(),
            from_name: entry.segment.from_name,
            to_name: entry.segment.to_name,
            weather_ok: entry.weather.is_available(),
            weather: entry.weather.label(),
        })
        .collect();

    Ok(ItineraryTemplate {
        trip_id: trip.id.clone(),
        trip_name: trip.display_name(),
        status: trip.status.label().to_string(),
        stops,
        segments,
        destinations,
        travel_modes: TravelMode::ALL.iter().map(|m| m.to_string()).collect(),
        show_error: error.is_some(),
        error_message: error.unwrap_or_default(),
    })
}

async fn itinerary_page(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let page = render_itinerary(&state, &trip_id, None).await?;
    Ok(AskamaTemplateResponse::into_response(page))
}

#[serde_as]
#[derive(Deserialize)]
struct AddStopForm {
    /// Either a destination code of the trip or empty for a custom place.
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    destination: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    name: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    latitude: Option<f64>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    longitude: Option<f64>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    position: Option<i64>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    arrival: Option<NaiveDate>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    departure: Option<NaiveDate>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    travel_mode: Option<TravelMode>,
    notes: Option<String>,
}

async fn add_stop(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
    Form(form): Form<AddStopForm>,
) -> Result<Response, AppError> {
    let place = match resolve_place(&state, &trip_id, &form).await {
        Ok(place) => place,
        Err(AppError::Validation(message)) => return render_error(&state, &trip_id, message).await,
        Err(err) => return Err(err),
    };
    let new = NewStop {
        place,
        arrival: form.arrival,
        departure: form.departure,
        travel_mode: form.travel_mode.unwrap_or_default(),
        notes: normalize_optional(form.notes),
    };
    // positions are 1-based in the form
    let position = match form.position {
        Some(p) if p < 1 => {
            return render_error(&state, &trip_id, "Positions start at 1.".to_string()).await
        }
        p => p.map(|p| p - 1),
    };

    match state.itinerary.insert_stop(&trip_id, new, position).await {
        Ok(_) => Ok(Redirect::to(&format!("/trip/{trip_id}/itinerary")).into_response()),
        Err(AppError::Validation(message)) => render_error(&state, &trip_id, message).await,
        Err(err) => Err(err),
    }
}

async fn resolve_place(
    state: &AppState,
    trip_id: &str,
    form: &AddStopForm,
) -> Result<Place, AppError> {
    if let Some(code) = form.destination.as_deref() {
        let destination = state
            .trips
            .destinations(trip_id)
            .await?
            .into_iter()
            .find(|d| d.code == code)
            .ok_or_else(|| AppError::validation(format!("{code:?} is not a destination of this trip.")))?;
        return Ok(Place {
            name: destination.name,
            latitude: destination.latitude,
            longitude: destination.longitude,
        });
    }
    match (&form.name, form.latitude, form.longitude) {
        (Some(name), Some(latitude), Some(longitude)) => Ok(Place {
            name: name.clone(),
            latitude,
            longitude,
        }),
        _ => Err(AppError::validation(
            "Pick a destination or enter a name with latitude and longitude.",
        )),
    }
}

async fn render_error(state: &AppState, trip_id: &str, message: String) -> Result<Response, AppError> {
    let page = render_itinerary(state, trip_id, Some(message)).await?;
    Ok((
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(page),
    )
        .into_response())
}

async fn delete_stop(
    State(state): State<AppState>,
    Path((trip_id, stop_id)): Path<(String, String)>,
) -> Result<Redirect, AppError> {
    state.itinerary.remove_stop(&trip_id, &stop_id).await?;
    Ok(Redirect::to(&format!("/trip/{trip_id}/itinerary")))
}
