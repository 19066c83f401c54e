use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};
use tracing::{debug, info};

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        trip::{Destination, Trip, TripStatus},
        vote::{Tally, Vote, VoteCategory, VoteSummary},
    },
    services::trips::{parse_column, TripService},
};

const MAX_VOTER_LEN: usize = 100;

/// One form submission; each filled field becomes a vote.
#[derive(Debug, Clone, Default)]
pub struct Ballot {
    pub destination: Option<String>,
    pub duration: Option<String>,
    pub date: Option<String>,
}

#[derive(Clone)]
pub struct VotingService {
    db: DbPool,
    trips: TripService,
}

impl VotingService {
    pub fn new(db: DbPool, trips: TripService) -> Self {
        Self { db, trips }
    }

    /// Upserts the single active vote of `voter` for `category`.
    pub async fn record_vote(
        &self,
        trip_id: &str,
        voter: &str,
        category: &str,
        value: &str,
    ) -> Result<Vote, AppError> {
        let category = parse_category(category)?;
        let voter = normalize_voter(voter)?;
        let trip = self.open_trip(trip_id).await?;
        let destinations = self.trips.destinations(trip_id).await?;
        let value = validate_value(&trip, &destinations, category, value)?;

        let mut tx = self.db.begin().await?;
        lock_open_trip(&mut tx, trip_id).await?;
        let vote = upsert_vote(&mut tx, trip_id, &voter, category, &value).await?;
        tx.commit().await?;
        Ok(vote)
    }

    /// Records every filled field of the ballot, all or nothing. A category
    /// with a single allowed option is implied when left empty.
    pub async fn submit_ballot(
        &self,
        trip_id: &str,
        voter: &str,
        ballot: Ballot,
    ) -> Result<Vec<Vote>, AppError> {
        let voter = normalize_voter(voter)?;
        let trip = self.open_trip(trip_id).await?;
        let destinations = self.trips.destinations(trip_id).await?;

        let destination = non_empty(ballot.destination).or_else(|| match destinations.as_slice() {
            [only] => Some(only.code.clone()),
            _ => None,
        });
        let duration = non_empty(ballot.duration).or_else(|| match trip.durations.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        });
        let date = non_empty(ballot.date);

        let mut choices = Vec::new();
        for (category, raw) in [
            (VoteCategory::Destination, destination),
            (VoteCategory::Duration, duration),
            (VoteCategory::Date, date),
        ] {
            if let Some(raw) = raw {
                choices.push((category, validate_value(&trip, &destinations, category, &raw)?));
            }
        }
        if choices.is_empty() {
            return Err(AppError::validation("Pick at least one option before voting."));
        }

        let mut tx = self.db.begin().await?;
        lock_open_trip(&mut tx, trip_id).await?;
        let mut votes = Vec::with_capacity(choices.len());
        for (category, value) in choices {
            votes.push(upsert_vote(&mut tx, trip_id, &voter, category, &value).await?);
        }
        tx.commit().await?;

        info!(%trip_id, voter = %voter, votes = votes.len(), "ballot recorded");
        Ok(votes)
    }

    pub async fn votes(&self, trip_id: &str) -> Result<Vec<Vote>, AppError> {
        let rows = sqlx::query(
            r#"SELECT trip_id, voter, category, value, submitted_at
               FROM votes WHERE trip_id = ?1 ORDER BY submitted_at, id"#,
        )
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(vote_from_row).collect()
    }

    pub async fn tally(&self, trip_id: &str, category: &str) -> Result<Tally, AppError> {
        let category = parse_category(category)?;
        self.trips.get_trip(trip_id).await?;
        let rows = sqlx::query(
            r#"SELECT trip_id, voter, category, value, submitted_at
               FROM votes WHERE trip_id = ?1 AND category = ?2"#,
        )
        .bind(trip_id)
        .bind(category.as_str())
        .fetch_all(&self.db)
        .await?;
        let votes = rows.iter().map(vote_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Tally::from_votes(category, &votes))
    }

    /// Tallies for every category, in display order, plus the month view
    /// of the date votes.
    pub async fn summary(&self, trip_id: &str) -> Result<VoteSummary, AppError> {
        self.trips.get_trip(trip_id).await?;
        let votes = self.votes(trip_id).await?;
        Ok(VoteSummary::from_votes(&votes))
    }

    async fn open_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        let trip = self.trips.get_trip(trip_id).await?;
        if !trip.status.accepts_votes() {
            return Err(AppError::validation("Voting is closed for this trip."));
        }
        Ok(trip)
    }
}

/// Takes the write lock on the trip, but only while voting is open. Must be
/// the first write of the transaction.
async fn lock_open_trip(tx: &mut Transaction<'_, Sqlite>, trip_id: &str) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE trips SET version = version WHERE id = ?1 AND status = ?2")
        .bind(trip_id)
        .bind(TripStatus::VotingOpen.as_str())
        .execute(&mut **tx)
        .await
        .map_err(AppError::from_write)?;
    if result.rows_affected() == 0 {
        return Err(AppError::validation("Voting is closed for this trip."));
    }
    Ok(())
}

async fn upsert_vote(
    tx: &mut Transaction<'_, Sqlite>,
    trip_id: &str,
    voter: &str,
    category: VoteCategory,
    value: &str,
) -> Result<Vote, AppError> {
    let submitted_at = Utc::now();
    sqlx::query(
        r#"INSERT INTO votes (trip_id, voter, category, value, submitted_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (trip_id, voter, category)
           DO UPDATE SET value = excluded.value, submitted_at = excluded.submitted_at"#,
    )
    .bind(trip_id)
    .bind(voter)
    .bind(category.as_str())
    .bind(value)
    .bind(submitted_at)
    .execute(&mut **tx)
    .await
    .map_err(AppError::from_write)?;
    debug!(%trip_id, %voter, %category, %value, "vote stored");
    Ok(Vote {
        trip_id: trip_id.to_string(),
        voter: voter.to_string(),
        category,
        value: value.to_string(),
        submitted_at,
    })
}

fn vote_from_row(row: &SqliteRow) -> Result<Vote, AppError> {
    let submitted_at: DateTime<Utc> = row.try_get("submitted_at")?;
    Ok(Vote {
        trip_id: row.try_get("trip_id")?,
        voter: row.try_get("voter")?,
        category: parse_column(row, "category")?,
        value: row.try_get("value")?,
        submitted_at,
    })
}

pub fn parse_category(raw: &str) -> Result<VoteCategory, AppError> {
    raw.parse::<VoteCategory>().map_err(AppError::Validation)
}

fn normalize_voter(voter: &str) -> Result<String, AppError> {
    let voter = voter.trim();
    if voter.is_empty() {
        return Err(AppError::validation("A voter name is required."));
    }
    Ok(voter.chars().take(MAX_VOTER_LEN).collect())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Checks `raw` against the options the trip offers and returns the value
/// in its stored form.
pub fn validate_value(
    trip: &Trip,
    destinations: &[Destination],
    category: VoteCategory,
    raw: &str,
) -> Result<String, AppError> {
    let value = raw.trim();
    match category {
        VoteCategory::Destination => destinations
            .iter()
            .find(|d| d.code == value)
            .map(|d| d.code.clone())
            .ok_or_else(|| AppError::validation(format!("{value:?} is not a destination of this trip."))),
        VoteCategory::Duration => trip
            .durations
            .iter()
            .find(|d| d.as_str() == value)
            .cloned()
            .ok_or_else(|| AppError::validation(format!("{value:?} is not an allowed duration."))),
        VoteCategory::Date => {
            let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_err(|_| AppError::validation(format!("{value:?} is not a date (YYYY-MM-DD).")))?;
            if !trip.allows_date_month(date.month()) {
                return Err(AppError::validation(format!(
                    "{date} is outside the seasons allowed for this trip."
                )));
            }
            Ok(date.format("%Y-%m-%d").to_string())
        }
    }
}
