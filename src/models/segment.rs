use chrono::NaiveDate;
use serde::Serialize;

use super::stop::{Stop, TravelMode};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Travel leg between two consecutive stops. Never stored; always rebuilt
/// from the current stop order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Segment {
    pub from_stop_id: String,
    pub to_stop_id: String,
    pub from_name: String,
    pub to_name: String,
    pub travel_mode: TravelMode,
    pub distance_km: f64,
    pub duration_minutes: u32,
    /// Day of travel: departure from the origin, else arrival at the target.
    pub date: Option<NaiveDate>,
    pub latitude: f64,
    pub longitude: f64,
}

impl Segment {
    pub fn duration_label(&self) -> String {
        let hours = self.duration_minutes / 60;
        let minutes = self.duration_minutes % 60;
        if hours == 0 {
            format!("{minutes} min")
        } else {
            format!("{hours} h {minutes:02} min")
        }
    }
}

/// Builds the segments for stops already sorted by position.
pub fn segments(stops: &[Stop]) -> Vec<Segment> {
    stops
        .windows(2)
        .map(|pair| {
            let (from, to) = (&pair[0], &pair[1]);
            let distance_km = haversine_km(
                from.place.latitude,
                from.place.longitude,
                to.place.latitude,
                to.place.longitude,
            );
            Segment {
                from_stop_id: from.id.clone(),
                to_stop_id: to.id.clone(),
                from_name: from.place.name.clone(),
                to_name: to.place.name.clone(),
                travel_mode: to.travel_mode,
                distance_km: (distance_km * 10.0).round() / 10.0,
                duration_minutes: estimate_minutes(distance_km, to.travel_mode),
                date: from.departure.or(to.arrival),
                latitude: to.place.latitude,
                longitude: to.place.longitude,
            }
        })
        .collect()
}

pub fn estimate_minutes(distance_km: f64, mode: TravelMode) -> u32 {
    let travel = (distance_km / mode.average_speed_kmh() * 60.0).ceil();
    travel as u32 + if distance_km > 0.0 { mode.overhead_minutes() } else { 0 }
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stop::Place;

    fn stop(id: &str, position: i64, lat: f64, lon: f64, mode: TravelMode) -> Stop {
        Stop {
            id: id.into(),
            trip_id: "trip".into(),
            place: Place {
                name: id.to_uppercase(),
                latitude: lat,
                longitude: lon,
            },
            position,
            arrival: None,
            departure: None,
            travel_mode: mode,
            notes: None,
        }
    }

    #[test]
    fn one_segment_per_consecutive_pair() {
        let stops = vec![
            stop("a", 0, 48.8566, 2.3522, TravelMode::Drive),
            stop("b", 1, 52.52, 13.405, TravelMode::Train),
            stop("c", 2, 41.9028, 12.4964, TravelMode::Flight),
        ];
        let legs = segments(&stops);
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].from_stop_id, "a");
        assert_eq!(legs[0].to_stop_id, "b");
        assert_eq!(legs[0].travel_mode, TravelMode::Train);
        assert_eq!(legs[1].travel_mode, TravelMode::Flight);
        // Paris to Berlin is roughly 878 km as the crow flies
        assert!((legs[0].distance_km - 878.0).abs() < 5.0);
        assert!(legs[1].duration_minutes > TravelMode::Flight.overhead_minutes());
    }

    #[test]
    fn fewer_than_two_stops_have_no_segments() {
        assert!(segments(&[]).is_empty());
        assert!(segments(&[stop("a", 0, 0.0, 0.0, TravelMode::Walk)]).is_empty());
    }

    #[test]
    fn segment_date_prefers_departure_of_origin() {
        let mut a = stop("a", 0, 0.0, 0.0, TravelMode::Drive);
        let mut b = stop("b", 1, 0.0, 1.0, TravelMode::Drive);
        b.arrival = NaiveDate::from_ymd_opt(2026, 8, 3);
        assert_eq!(segments(&[a.clone(), b.clone()])[0].date, b.arrival);
        a.departure = NaiveDate::from_ymd_opt(2026, 8, 2);
        assert_eq!(segments(&[a.clone(), b])[0].date, a.departure);
    }

    #[test]
    fn duration_label_formats_hours() {
        let legs = segments(&[
            stop("a", 0, 0.0, 0.0, TravelMode::Walk),
            stop("b", 1, 0.0, 0.01, TravelMode::Walk),
        ]);
        assert!(legs[0].duration_label().ends_with("min"));
        assert_eq!(estimate_minutes(150.0, TravelMode::Drive), 120);
    }
}
