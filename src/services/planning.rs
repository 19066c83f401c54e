use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::{
    error::AppError,
    models::{
        stop::{NewStop, Place, Stop},
        trip::Trip,
    },
    state::AppState,
};

#[derive(Debug, Clone, Serialize)]
pub struct Finalized {
    pub trip: Trip,
    /// The stop created from the winning choices, if the itinerary was empty.
    pub seeded: Option<Stop>,
}

/// Closes voting and seeds the itinerary from the winning destination and
/// date. Without destination votes the first offered destination is used.
pub async fn finalize_trip(state: &AppState, trip_id: &str) -> Result<Finalized, AppError> {
    state.trips.close_voting(trip_id).await?;

    let destinations = state.trips.destinations(trip_id).await?;
    let destination_tally = state.voting.tally(trip_id, "destination").await?;
    let date_tally = state.voting.tally(trip_id, "date").await?;

    let winner = destination_tally
        .winner()
        .and_then(|entry| destinations.iter().find(|d| d.code == entry.value))
        .or_else(|| destinations.first());

    let seeded = match winner {
        Some(destination) => {
            let mut new = NewStop::at(Place {
                name: destination.name.clone(),
                latitude: destination.latitude,
                longitude: destination.longitude,
            });
            new.arrival = date_tally
                .winner()
                .and_then(|entry| NaiveDate::parse_from_str(&entry.value, "%Y-%m-%d").ok());
            state.itinerary.seed(trip_id, new).await?
        }
        None => None,
    };

    let trip = state.trips.get_trip(trip_id).await?;
    info!(
        %trip_id,
        seeded = seeded.is_some(),
        tie = destination_tally.is_tie(),
        "trip finalized"
    );
    Ok(Finalized { trip, seeded })
}
