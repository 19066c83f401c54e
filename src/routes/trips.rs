use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::{Form, PrivateCookieJar};
use chrono::Month;
use serde::Deserialize;

use super::{format_timestamp, normalize_optional};
use crate::{
    error::AppError,
    models::{
        trip::{Destination, Season, DEFAULT_DURATIONS},
        vote::{MonthCount, Tally, VoteCategory, TOP_DATES},
    },
    services::{planning::finalize_trip, trips::NewTrip, voting::Ballot},
    state::AppState,
    visitor,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/create", get(create_form).post(create_submit))
        .route("/trip/:id", get(plan_trip))
        .route("/trip/:id/vote", post(vote_submit))
        .route("/trip/:id/close", post(close_voting))
        .route("/trip/:id/finalize", post(finalize))
}

#[derive(Clone)]
struct TripRow {
    id: String,
    name: String,
    status: String,
    voters: i64,
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    trips: Vec<TripRow>,
}

async fn home(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AppError> {
    let ids = visitor::visited_trips(&jar);
    let trips = state
        .trips
        .list_trips(&ids)
        .await?
        .into_iter()
        .map(|trip| TripRow {
            name: trip.display_name(),
            id: trip.id,
            status: trip.status.label().to_string(),
            voters: trip.voters,
        })
        .collect();
    Ok(AskamaTemplateResponse::into_response(HomeTemplate { trips }))
}

#[derive(Clone)]
struct Choice {
    value: String,
    checked: bool,
}

#[derive(Template)]
#[template(path = "trips/create.html")]
struct CreateTemplate {
    show_error: bool,
    error_message: String,
    trip_name: String,
    names: String,
    destinations: String,
    durations: Vec<Choice>,
    seasons: Vec<Choice>,
}

impl CreateTemplate {
    fn blank() -> Self {
        Self {
            show_error: false,
            error_message: String::new(),
            trip_name: String::new(),
            names: String::new(),
            destinations: String::new(),
            durations: DEFAULT_DURATIONS
                .iter()
                .map(|d| Choice {
                    value: d.to_string(),
                    checked: true,
                })
                .collect(),
            seasons: Season::ALL
                .iter()
                .map(|s| Choice {
                    value: s.to_string(),
                    checked: true,
                })
                .collect(),
        }
    }
}

async fn create_form() -> impl IntoResponse {
    AskamaTemplateResponse::into_response(CreateTemplate::blank())
}

#[derive(Deserialize)]
struct CreateForm {
    trip_name: String,
    names: Option<String>,
    destinations: String,
    #[serde(default)]
    durations: Vec<String>,
    #[serde(default)]
    seasons: Vec<String>,
}

async fn create_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<CreateForm>,
) -> Result<Response, AppError> {
    let seasons = form
        .seasons
        .iter()
        .map(|raw| raw.parse::<Season>().map_err(AppError::Validation))
        .collect::<Result<Vec<_>, _>>();

    let result = match seasons {
        Ok(seasons) => {
            state
                .trips
                .create_trip(NewTrip {
                    name: form.trip_name.clone(),
                    creator_name: normalize_optional(form.names.clone()),
                    destinations: form.destinations.clone(),
                    durations: form.durations.clone(),
                    seasons,
                })
                .await
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(trip) => Ok((
            visitor::remember_trip(jar, &trip.id),
            Redirect::to(&format!("/trip/{}", trip.id)),
        )
            .into_response()),
        Err(AppError::Validation(message)) => Ok(render_create_error(form, message)),
        Err(err) => Err(err),
    }
}

fn render_create_error(form: CreateForm, message: String) -> Response {
    let mut template = CreateTemplate::blank();
    template.show_error = true;
    template.error_message = message;
    template.trip_name = form.trip_name;
    template.names = form.names.unwrap_or_default();
    template.destinations = form.destinations;
    for choice in template.durations.iter_mut() {
        choice.checked = form.durations.contains(&choice.value);
    }
    for choice in template.seasons.iter_mut() {
        choice.checked = form.seasons.contains(&choice.value);
    }
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(template),
    )
        .into_response()
}

#[derive(Clone)]
struct TallyRow {
    label: String,
    count: usize,
    percent: usize,
    leading: bool,
}

#[derive(Clone)]
struct TallyView {
    title: String,
    total: usize,
    rows: Vec<TallyRow>,
    has_winner: bool,
    winner: String,
    is_tie: bool,
}

#[derive(Template)]
#[template(path = "trips/plan.html")]
struct PlanTemplate {
    trip_id: String,
    trip_name: String,
    creator: String,
    status: String,
    created_at: String,
    accepts_votes: bool,
    destinations: Vec<Destination>,
    durations: Vec<String>,
    allowed_months: String,
    tallies: Vec<TallyView>,
    months: Vec<MonthRow>,
    voter_hint: String,
    show_error: bool,
    error_message: String,
    show_notice: bool,
}

async fn plan_page(
    state: &AppState,
    trip_id: &str,
    voter_hint: String,
    error: Option<String>,
    show_notice: bool,
) -> Result<PlanTemplate, AppError> {
    let trip = state.trips.get_trip(trip_id).await?;
    let destinations = state.trips.destinations(trip_id).await?;
    let summary = state.voting.summary(trip_id).await?;

    let mut months: Vec<u32> = trip.seasons.iter().flat_map(|s| s.months()).collect();
    months.sort_unstable();
    let allowed_months = months
        .into_iter()
        .filter_map(|m| Month::try_from(m as u8).ok())
        .map(|m| m.name())
        .collect::<Vec<_>>()
        .join(", ");

    let tallies = summary
        .tallies
        .iter()
        .map(|tally| tally_view(tally, &destinations))
        .collect();
    let months = month_rows(&summary.months);

    Ok(PlanTemplate {
        trip_id: trip.id.clone(),
        trip_name: trip.display_name(),
        creator: trip.creator_name.clone().unwrap_or_default(),
        status: trip.status.label().to_string(),
        created_at: format_timestamp(trip.created_at),
        accepts_votes: trip.status.accepts_votes(),
        destinations,
        durations: trip.durations,
        allowed_months,
        tallies,
        months,
        voter_hint,
        show_error: error.is_some(),
        error_message: error.unwrap_or_default(),
        show_notice,
    })
}

fn tally_view(tally: &Tally, destinations: &[Destination]) -> TallyView {
    let label_for = |value: &str| match tally.category {
        VoteCategory::Destination => destinations
            .iter()
            .find(|d| d.code == value)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| value.to_string()),
        VoteCategory::Duration | VoteCategory::Date => value.to_string(),
    };
    let leader_count = tally.winner().map(|w| w.count).unwrap_or(0);
    let shown = match tally.category {
        VoteCategory::Date => tally.top(TOP_DATES),
        VoteCategory::Destination | VoteCategory::Duration => &tally.entries[..],
    };
    TallyView {
        title: match tally.category {
            VoteCategory::Destination => "Destination".into(),
            VoteCategory::Duration => "Duration".into(),
            VoteCategory::Date => "Top dates".into(),
        },
        total: tally.total,
        rows: shown
            .iter()
            .map(|entry| TallyRow {
                label: label_for(&entry.value),
                count: entry.count,
                percent: if tally.total == 0 {
                    0
                } else {
                    entry.count * 100 / tally.total
                },
                leading: entry.count == leader_count,
            })
            .collect(),
        has_winner: tally.winner().is_some(),
        winner: tally
            .winner()
            .map(|w| label_for(&w.value))
            .unwrap_or_default(),
        is_tie: tally.is_tie(),
    }
}

#[derive(Clone)]
struct MonthRow {
    name: String,
    count: usize,
    percent: usize,
}

/// Month popularity as shares of all dated votes.
fn month_rows(months: &[MonthCount]) -> Vec<MonthRow> {
    let total: usize = months.iter().map(|m| m.count).sum();
    months
        .iter()
        .map(|m| MonthRow {
            name: m.name.to_string(),
            count: m.count,
            percent: if total == 0 { 0 } else { m.count * 100 / total },
        })
        .collect()
}

#[derive(Deserialize)]
struct PlanQuery {
    notice: Option<String>,
}

async fn plan_trip(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Path(trip_id): Path<String>,
    Query(query): Query<PlanQuery>,
) -> Result<Response, AppError> {
    let (jar, token) = visitor::voter_token(jar);
    let page = plan_page(
        &state,
        &trip_id,
        token,
        None,
        query.notice.as_deref() == Some("voted"),
    )
    .await?;
    let jar = visitor::remember_trip(jar, &trip_id);
    Ok((jar, AskamaTemplateResponse::into_response(page)).into_response())
}

#[derive(Deserialize)]
struct VoteForm {
    participant_name: Option<String>,
    destination: Option<String>,
    duration: Option<String>,
    date: Option<String>,
}

async fn vote_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Path(trip_id): Path<String>,
    Form(form): Form<VoteForm>,
) -> Result<Response, AppError> {
    let (jar, token) = visitor::voter_token(jar);
    let voter = normalize_optional(form.participant_name).unwrap_or_else(|| token.clone());
    let ballot = Ballot {
        destination: form.destination,
        duration: form.duration,
        date: form.date,
    };

    match state.voting.submit_ballot(&trip_id, &voter, ballot).await {
        Ok(_) => Ok((
            jar,
            Redirect::to(&format!("/trip/{trip_id}?notice=voted")),
        )
            .into_response()),
        Err(AppError::Validation(message)) => {
            let page = plan_page(&state, &trip_id, token, Some(message), false).await?;
            Ok((
                StatusCode::BAD_REQUEST,
                jar,
                AskamaTemplateResponse::into_response(page),
            )
                .into_response())
        }
        Err(err) => Err(err),
    }
}

async fn close_voting(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Redirect, AppError> {
    state.trips.close_voting(&trip_id).await?;
    Ok(Redirect::to(&format!("/trip/{trip_id}")))
}

async fn finalize(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Redirect, AppError> {
    finalize_trip(&state, &trip_id).await?;
    Ok(Redirect::to(&format!("/trip/{trip_id}/itinerary")))
}
