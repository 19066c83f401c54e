use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};
use tracing::info;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::trip::{display_name, parse_destination_lines, Destination, Season, Trip, TripStatus, DEFAULT_DURATIONS},
};

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct NewTrip {
    pub name: String,
    pub creator_name: Option<String>,
    /// One `Name, latitude, longitude` entry per line.
    pub destinations: String,
    pub durations: Vec<String>,
    pub seasons: Vec<Season>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripSummary {
    pub id: String,
    pub name: String,
    pub status: TripStatus,
    pub voters: i64,
}

impl TripSummary {
    pub fn display_name(&self) -> String {
        display_name(&self.id, &self.name)
    }
}

#[derive(Clone)]
pub struct TripService {
    db: DbPool,
}

impl TripService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn create_trip(&self, new: NewTrip) -> Result<Trip, AppError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Please provide a title for your trip."));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::validation("The trip title is too long."));
        }
        if new.destinations.trim().is_empty() {
            return Err(AppError::validation("Please enter at least one destination."));
        }
        let destinations = parse_destination_lines(&new.destinations);
        if destinations.is_empty() {
            return Err(AppError::validation(
                "None of the destinations could be parsed. Use one `Name, latitude, longitude` per line.",
            ));
        }

        let mut durations: Vec<String> = Vec::new();
        for duration in new.durations.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
            if !durations.iter().any(|known| known == duration) {
                durations.push(duration.to_string());
            }
        }
        if durations.is_empty() {
            durations = DEFAULT_DURATIONS.iter().map(|d| d.to_string()).collect();
        }

        let mut seasons: Vec<Season> = Vec::new();
        for season in new.seasons {
            if !seasons.contains(&season) {
                seasons.push(season);
            }
        }
        if seasons.is_empty() {
            seasons = Season::ALL.to_vec();
        }

        let trip = Trip {
            id: Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            creator_name: new
                .creator_name
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            status: TripStatus::VotingOpen,
            durations,
            seasons,
            version: 0,
            created_at: Utc::now(),
        };

        let durations_json =
            serde_json::to_string(&trip.durations).map_err(|err| AppError::Other(err.into()))?;
        let seasons_json =
            serde_json::to_string(&trip.seasons).map_err(|err| AppError::Other(err.into()))?;

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"INSERT INTO trips (id, name, creator_name, status, durations, seasons, version, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        )
        .bind(&trip.id)
        .bind(&trip.name)
        .bind(&trip.creator_name)
        .bind(trip.status.as_str())
        .bind(durations_json)
        .bind(seasons_json)
        .bind(trip.version)
        .bind(trip.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, destination) in destinations.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO destinations (trip_id, code, name, latitude, longitude, position)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            )
            .bind(&trip.id)
            .bind(&destination.code)
            .bind(&destination.name)
            .bind(destination.latitude)
            .bind(destination.longitude)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(trip_id = %trip.id, destinations = destinations.len(), "trip created");
        Ok(trip)
    }

    pub async fn get_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        let row = sqlx::query(
            r#"SELECT id, name, creator_name, status, durations, seasons, version, created_at
               FROM trips WHERE id = ?1"#,
        )
        .bind(trip_id)
        .fetch_optional(&self.db)
        .await?;
        let Some(row) = row else {
            return Err(AppError::NotFound);
        };
        trip_from_row(&row)
    }

    pub async fn destinations(&self, trip_id: &str) -> Result<Vec<Destination>, AppError> {
        let rows = sqlx::query(
            "SELECT code, name, latitude, longitude FROM destinations WHERE trip_id = ?1 ORDER BY position",
        )
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| Destination {
                code: row.get("code"),
                name: row.get("name"),
                latitude: row.get("latitude"),
                longitude: row.get("longitude"),
            })
            .collect())
    }

    /// Trips among `ids`, newest first. Unknown ids are ignored.
    pub async fn list_trips(&self, ids: &[String]) -> Result<Vec<TripSummary>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT t.id, t.name, t.status,
                      (SELECT COUNT(DISTINCT v.voter) FROM votes v WHERE v.trip_id = t.id) AS voters
               FROM trips t WHERE t.id IN ("#,
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") ORDER BY t.created_at DESC");

        let rows = query.build().fetch_all(&self.db).await?;
        rows.into_iter()
            .map(|row| {
                Ok(TripSummary {
                    id: row.get("id"),
                    name: row.get("name"),
                    status: parse_column(&row, "status")?,
                    voters: row.get("voters"),
                })
            })
            .collect()
    }

    /// Stops accepting votes. Trips already past voting are returned as is.
    pub async fn close_voting(&self, trip_id: &str) -> Result<Trip, AppError> {
        let result = sqlx::query(
            r#"UPDATE trips SET status = ?2, version = version + 1
               WHERE id = ?1 AND status = ?3"#,
        )
        .bind(trip_id)
        .bind(TripStatus::VotingClosed.as_str())
        .bind(TripStatus::VotingOpen.as_str())
        .execute(&self.db)
        .await
        .map_err(AppError::from_write)?;
        if result.rows_affected() > 0 {
            info!(%trip_id, "voting closed");
        }
        self.get_trip(trip_id).await
    }
}

fn trip_from_row(row: &SqliteRow) -> Result<Trip, AppError> {
    let durations: String = row.try_get("durations")?;
    let seasons: String = row.try_get("seasons")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(Trip {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        creator_name: row.try_get("creator_name")?,
        status: parse_column(row, "status")?,
        durations: serde_json::from_str(&durations).map_err(|err| AppError::Other(err.into()))?,
        seasons: serde_json::from_str(&seasons).map_err(|err| AppError::Other(err.into()))?,
        version: row.try_get("version")?,
        created_at,
    })
}

/// Reads a TEXT column into a type with a `FromStr` impl.
pub(crate) fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, AppError>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|err| AppError::Other(anyhow::anyhow!("column {column}: {err}")))
}
