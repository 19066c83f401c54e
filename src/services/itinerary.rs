use std::{collections::HashSet, future::Future};

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        segment::{segments, Segment},
        stop::{NewStop, Place, Stop, TravelMode},
        trip::{valid_coordinates, TripStatus},
    },
    services::trips::parse_column,
};

const STOP_COLUMNS: &str =
    "id, trip_id, name, latitude, longitude, position, arrival, departure, travel_mode, notes";

#[derive(Debug, Clone, Serialize)]
pub struct Itinerary {
    pub trip_id: String,
    pub version: i64,
    pub stops: Vec<Stop>,
    pub segments: Vec<Segment>,
}

/// Non-structural edits of a stop; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct StopUpdate {
    pub arrival: Option<Option<NaiveDate>>,
    pub departure: Option<Option<NaiveDate>>,
    pub travel_mode: Option<TravelMode>,
    pub notes: Option<Option<String>>,
}

/// Owns the stop order of every trip. All structural changes run in one
/// transaction guarded by the trip's version counter.
#[derive(Clone)]
pub struct ItineraryService {
    db: DbPool,
}

impl ItineraryService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn stops(&self, trip_id: &str) -> Result<Vec<Stop>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {STOP_COLUMNS} FROM stops WHERE trip_id = ?1 ORDER BY position"
        ))
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(stop_from_row).collect()
    }

    pub async fn itinerary(&self, trip_id: &str) -> Result<Itinerary, AppError> {
        let version = self.current_version(trip_id).await?;
        let stops = self.stops(trip_id).await?;
        Ok(Itinerary {
            trip_id: trip_id.to_string(),
            version,
            segments: segments(&stops),
            stops,
        })
    }

    /// Rewrites positions to follow `stop_ids`, which must be a permutation
    /// of the trip's current stops.
    pub async fn reorder(&self, trip_id: &str, stop_ids: &[String]) -> Result<Vec<Stop>, AppError> {
        with_conflict_retry("reorder", trip_id, || self.try_reorder(trip_id, stop_ids)).await?;
        info!(%trip_id, stops = stop_ids.len(), "itinerary reordered");
        self.stops(trip_id).await
    }

    /// Inserts a stop at `at_position` (clamped to the valid range, appended
    /// when absent) and moves the trip into planning.
    pub async fn insert_stop(
        &self,
        trip_id: &str,
        new: NewStop,
        at_position: Option<i64>,
    ) -> Result<Stop, AppError> {
        validate_new_stop(&new)?;
        let stop = with_conflict_retry("insert_stop", trip_id, || {
            self.try_insert(trip_id, &new, at_position, false)
        })
        .await?
        .ok_or_else(|| AppError::Other(anyhow::anyhow!("stop insert produced no row")))?;
        info!(%trip_id, stop_id = %stop.id, position = stop.position, "stop added");
        Ok(stop)
    }

    /// Adds `new` as the first stop only if the itinerary is still empty.
    pub async fn seed(&self, trip_id: &str, new: NewStop) -> Result<Option<Stop>, AppError> {
        validate_new_stop(&new)?;
        with_conflict_retry("seed", trip_id, || self.try_insert(trip_id, &new, Some(0), true)).await
    }

    pub async fn remove_stop(&self, trip_id: &str, stop_id: &str) -> Result<(), AppError> {
        with_conflict_retry("remove_stop", trip_id, || self.try_remove(trip_id, stop_id)).await?;
        info!(%trip_id, %stop_id, "stop removed");
        Ok(())
    }

    pub async fn update_stop(
        &self,
        trip_id: &str,
        stop_id: &str,
        update: StopUpdate,
    ) -> Result<Stop, AppError> {
        let mut stop = self
            .stops(trip_id)
            .await?
            .into_iter()
            .find(|s| s.id == stop_id)
            .ok_or(AppError::NotFound)?;
        if let Some(arrival) = update.arrival {
            stop.arrival = arrival;
        }
        if let Some(departure) = update.departure {
            stop.departure = departure;
        }
        if let Some(mode) = update.travel_mode {
            stop.travel_mode = mode;
        }
        if let Some(notes) = update.notes {
            stop.notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        }
        validate_dates(stop.arrival, stop.departure)?;

        sqlx::query(
            r#"UPDATE stops SET arrival = ?1, departure = ?2, travel_mode = ?3, notes = ?4
               WHERE id = ?5 AND trip_id = ?6"#,
        )
        .bind(stop.arrival)
        .bind(stop.departure)
        .bind(stop.travel_mode.as_str())
        .bind(&stop.notes)
        .bind(&stop.id)
        .bind(trip_id)
        .execute(&self.db)
        .await
        .map_err(AppError::from_write)?;
        Ok(stop)
    }

    async fn current_version(&self, trip_id: &str) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT version FROM trips WHERE id = ?1")
            .bind(trip_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn try_reorder(&self, trip_id: &str, stop_ids: &[String]) -> Result<(), AppError> {
        let expected = self.current_version(trip_id).await?;
        let mut tx = self.db.begin().await?;
        claim_version(&mut tx, trip_id, expected).await?;

        let current: Vec<String> =
            sqlx::query_scalar("SELECT id FROM stops WHERE trip_id = ?1 ORDER BY position")
                .bind(trip_id)
                .fetch_all(&mut *tx)
                .await?;
        validate_permutation(&current, stop_ids)?;

        park_positions(&mut tx, trip_id, 0).await?;
        for (position, stop_id) in stop_ids.iter().enumerate() {
            sqlx::query("UPDATE stops SET position = ?1 WHERE id = ?2 AND trip_id = ?3")
                .bind(position as i64)
                .bind(stop_id)
                .bind(trip_id)
                .execute(&mut *tx)
                .await
                .map_err(AppError::from_write)?;
        }
        tx.commit().await.map_err(AppError::from_write)?;
        Ok(())
    }

    async fn try_insert(
        &self,
        trip_id: &str,
        new: &NewStop,
        at_position: Option<i64>,
        only_if_empty: bool,
    ) -> Result<Option<Stop>, AppError> {
        let expected = self.current_version(trip_id).await?;
        let mut tx = self.db.begin().await?;
        claim_version(&mut tx, trip_id, expected).await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stops WHERE trip_id = ?1")
            .bind(trip_id)
            .fetch_one(&mut *tx)
            .await?;
        if only_if_empty && count > 0 {
            debug!(%trip_id, "itinerary already seeded");
            return Ok(None);
        }
        let position = at_position.unwrap_or(count).clamp(0, count);

        // Shift p -> p + 1 via negative parking so the unique index never
        // sees two stops on one position.
        sqlx::query(
            "UPDATE stops SET position = -position - 2 WHERE trip_id = ?1 AND position >= ?2",
        )
        .bind(trip_id)
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from_write)?;
        sqlx::query("UPDATE stops SET position = -position - 1 WHERE trip_id = ?1 AND position < 0")
            .bind(trip_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from_write)?;

        let stop = Stop {
            id: Uuid::new_v4().to_string(),
            trip_id: trip_id.to_string(),
            place: Place {
                name: new.place.name.trim().to_string(),
                latitude: new.place.latitude,
                longitude: new.place.longitude,
            },
            position,
            arrival: new.arrival,
            departure: new.departure,
            travel_mode: new.travel_mode,
            notes: new
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        };
        sqlx::query(
            r#"INSERT INTO stops (id, trip_id, name, latitude, longitude, position, arrival, departure, travel_mode, notes)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
        )
        .bind(&stop.id)
        .bind(&stop.trip_id)
        .bind(&stop.place.name)
        .bind(stop.place.latitude)
        .bind(stop.place.longitude)
        .bind(stop.position)
        .bind(stop.arrival)
        .bind(stop.departure)
        .bind(stop.travel_mode.as_str())
        .bind(&stop.notes)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from_write)?;

        sqlx::query("UPDATE trips SET status = ?2 WHERE id = ?1")
            .bind(trip_id)
            .bind(TripStatus::Planning.as_str())
            .execute(&mut *tx)
            .await
            .map_err(AppError::from_write)?;

        tx.commit().await.map_err(AppError::from_write)?;
        Ok(Some(stop))
    }

    async fn try_remove(&self, trip_id: &str, stop_id: &str) -> Result<(), AppError> {
        let expected = self.current_version(trip_id).await?;
        let mut tx = self.db.begin().await?;
        claim_version(&mut tx, trip_id, expected).await?;

        let position: Option<i64> =
            sqlx::query_scalar("SELECT position FROM stops WHERE id = ?1 AND trip_id = ?2")
                .bind(stop_id)
                .bind(trip_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(position) = position else {
            return Err(AppError::NotFound);
        };

        sqlx::query("DELETE FROM stops WHERE id = ?1 AND trip_id = ?2")
            .bind(stop_id)
            .bind(trip_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from_write)?;
        park_positions(&mut tx, trip_id, position + 1).await?;
        sqlx::query("UPDATE stops SET position = -position - 2 WHERE trip_id = ?1 AND position < 0")
            .bind(trip_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from_write)?;

        tx.commit().await.map_err(AppError::from_write)?;
        Ok(())
    }
}

/// Compare-and-swap on the trip version. Must be the first write of the
/// transaction so SQLite takes the write lock before anything is read.
async fn claim_version(
    tx: &mut Transaction<'_, Sqlite>,
    trip_id: &str,
    expected: i64,
) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE trips SET version = version + 1 WHERE id = ?1 AND version = ?2")
        .bind(trip_id)
        .bind(expected)
        .execute(&mut **tx)
        .await
        .map_err(AppError::from_write)?;
    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "the itinerary was changed by someone else".into(),
        ));
    }
    Ok(())
}

/// Moves every stop at or after `from` to `-position - 1`.
async fn park_positions(
    tx: &mut Transaction<'_, Sqlite>,
    trip_id: &str,
    from: i64,
) -> Result<(), AppError> {
    sqlx::query("UPDATE stops SET position = -position - 1 WHERE trip_id = ?1 AND position >= ?2")
        .bind(trip_id)
        .bind(from)
        .execute(&mut **tx)
        .await
        .map_err(AppError::from_write)?;
    Ok(())
}

/// Runs `attempt` and retries it once if it lost a race on the trip.
async fn with_conflict_retry<T, F, Fut>(op: &str, trip_id: &str, mut attempt: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    match attempt().await {
        Err(err) if err.is_conflict() => {
            warn!(%trip_id, op, "concurrent itinerary change, retrying once");
            attempt().await
        }
        other => other,
    }
}

pub fn validate_permutation(current: &[String], proposed: &[String]) -> Result<(), AppError> {
    let known: HashSet<&str> = current.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(proposed.len());
    for id in proposed {
        if !known.contains(id.as_str()) {
            return Err(AppError::validation(format!("stop {id} does not belong to this trip")));
        }
        if !seen.insert(id.as_str()) {
            return Err(AppError::validation(format!("stop {id} is listed more than once")));
        }
    }
    if let Some(missing) = current.iter().find(|id| !seen.contains(id.as_str())) {
        return Err(AppError::validation(format!("stop {missing} is missing from the new order")));
    }
    Ok(())
}

fn validate_new_stop(new: &NewStop) -> Result<(), AppError> {
    if new.place.name.trim().is_empty() {
        return Err(AppError::validation("A stop needs a place name."));
    }
    if !valid_coordinates(new.place.latitude, new.place.longitude) {
        return Err(AppError::validation("Coordinates are out of range."));
    }
    validate_dates(new.arrival, new.departure)
}

fn validate_dates(arrival: Option<NaiveDate>, departure: Option<NaiveDate>) -> Result<(), AppError> {
    match (arrival, departure) {
        (Some(arrival), Some(departure)) if departure < arrival => Err(AppError::validation(
            "Departure cannot be before arrival.",
        )),
        _ => Ok(()),
    }
}

fn stop_from_row(row: &SqliteRow) -> Result<Stop, AppError> {
    Ok(Stop {
        id: row.try_get("id")?,
        trip_id: row.try_get("trip_id")?,
        place: Place {
            name: row.try_get("name")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
        },
        position: row.try_get("position")?,
        arrival: row.try_get("arrival")?,
        departure: row.try_get("departure")?,
        travel_mode: parse_column(row, "travel_mode")?,
        notes: row.try_get("notes")?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn permutation_accepts_any_order_of_the_same_ids() {
        let current = ids(&["a", "b", "c"]);
        assert!(validate_permutation(&current, &ids(&["c", "a", "b"])).is_ok());
        assert!(validate_permutation(&[], &[]).is_ok());
    }

    #[test]
    fn permutation_rejects_missing_duplicate_and_foreign_ids() {
        let current = ids(&["a", "b", "c"]);
        for bad in [&["a", "b"][..], &["a", "a", "b"], &["a", "b", "c", "d"], &["a", "b", "x"]] {
            let err = validate_permutation(&current, &ids(bad)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{bad:?} -> {err:?}");
        }
    }

    #[test]
    fn departure_before_arrival_is_invalid() {
        let arrival = NaiveDate::from_ymd_opt(2026, 6, 10);
        let departure = NaiveDate::from_ymd_opt(2026, 6, 9);
        assert!(validate_dates(arrival, departure).is_err());
        assert!(validate_dates(arrival, arrival).is_ok());
        assert!(validate_dates(None, departure).is_ok());
    }

    async fn memory_pool_with_trip() -> DbPool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::migrate(&pool).await.unwrap();
        sqlx::query("INSERT INTO trips (id, name, created_at) VALUES ('t1', 'Test', '2026-01-01T00:00:00Z')")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    async fn version_of(pool: &DbPool) -> i64 {
        sqlx::query_scalar("SELECT version FROM trips WHERE id = 't1'")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stale_version_is_retried_once_then_reported() {
        let pool = memory_pool_with_trip().await;
        let counter = AtomicUsize::new(0);
        let (db, attempts) = (&pool, &counter);

        let result = with_conflict_retry("test", "t1", move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            let mut tx = db.begin().await?;
            claim_version(&mut tx, "t1", 41).await?;
            tx.commit().await?;
            Ok::<(), AppError>(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_conflict(), "{err:?}");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(version_of(&pool).await, 0);
        assert_eq!(
            axum::response::IntoResponse::into_response(err).status(),
            axum::http::StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn retry_reads_a_fresh_version() {
        let pool = memory_pool_with_trip().await;
        let counter = AtomicUsize::new(0);
        let (db, attempts) = (&pool, &counter);

        // the first attempt holds the version from before a concurrent change
        with_conflict_retry("test", "t1", move || async move {
            let expected = match attempts.fetch_add(1, Ordering::SeqCst) {
                0 => -1,
                _ => version_of(db).await,
            };
            let mut tx = db.begin().await?;
            claim_version(&mut tx, "t1", expected).await?;
            tx.commit().await?;
            Ok::<(), AppError>(())
        })
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(version_of(&pool).await, 1);
    }

    #[tokio::test]
    async fn non_conflict_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let result = with_conflict_retry("test", "t1", move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), AppError>(AppError::validation("bad order"))
        })
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
