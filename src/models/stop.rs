use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    #[default]
    Drive,
    Train,
    Bus,
    Flight,
    Ferry,
    Bike,
    Walk,
}

impl TravelMode {
    pub const ALL: [TravelMode; 7] = [
        TravelMode::Drive,
        TravelMode::Train,
        TravelMode::Bus,
        TravelMode::Flight,
        TravelMode::Ferry,
        TravelMode::Bike,
        TravelMode::Walk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Drive => "drive",
            TravelMode::Train => "train",
            TravelMode::Bus => "bus",
            TravelMode::Flight => "flight",
            TravelMode::Ferry => "ferry",
            TravelMode::Bike => "bike",
            TravelMode::Walk => "walk",
        }
    }

    /// Average door-to-door speed in km/h used for duration estimates.
    pub fn average_speed_kmh(&self) -> f64 {
        match self {
            TravelMode::Drive => 75.0,
            TravelMode::Train => 90.0,
            TravelMode::Bus => 55.0,
            TravelMode::Flight => 650.0,
            TravelMode::Ferry => 30.0,
            TravelMode::Bike => 15.0,
            TravelMode::Walk => 4.5,
        }
    }

    /// Fixed time spent regardless of distance (check-in, boarding).
    pub fn overhead_minutes(&self) -> u32 {
        match self {
            TravelMode::Flight => 120,
            TravelMode::Ferry => 30,
            TravelMode::Train | TravelMode::Bus => 15,
            TravelMode::Drive | TravelMode::Bike | TravelMode::Walk => 0,
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TravelMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s.trim())
            .ok_or_else(|| format!("unknown travel mode {s:?}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub id: String,
    pub trip_id: String,
    pub place: Place,
    pub position: i64,
    pub arrival: Option<NaiveDate>,
    pub departure: Option<NaiveDate>,
    pub travel_mode: TravelMode,
    pub notes: Option<String>,
}

impl Stop {
    /// The day the traveller is at this stop, used for forecasts.
    pub fn weather_date(&self) -> Option<NaiveDate> {
        self.arrival.or(self.departure)
    }

    pub fn nights(&self) -> Option<i64> {
        match (self.arrival, self.departure) {
            (Some(arrival), Some(departure)) => Some((departure - arrival).num_days()),
            _ => None,
        }
    }
}

/// Input for a stop that does not exist yet.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStop {
    pub place: Place,
    #[serde(default)]
    pub arrival: Option<NaiveDate>,
    #[serde(default)]
    pub departure: Option<NaiveDate>,
    #[serde(default)]
    pub travel_mode: TravelMode,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewStop {
    pub fn at(place: Place) -> Self {
        Self {
            place,
            arrival: None,
            departure: None,
            travel_mode: TravelMode::default(),
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_mode_parses_its_own_names() {
        for mode in TravelMode::ALL {
            assert_eq!(mode.as_str().parse::<TravelMode>(), Ok(mode));
        }
        assert!("teleport".parse::<TravelMode>().is_err());
    }

    #[test]
    fn nights_need_both_dates() {
        let mut stop = Stop {
            id: "s".into(),
            trip_id: "t".into(),
            place: Place {
                name: "Lyon".into(),
                latitude: 45.76,
                longitude: 4.83,
            },
            position: 0,
            arrival: NaiveDate::from_ymd_opt(2026, 7, 1),
            departure: None,
            travel_mode: TravelMode::Train,
            notes: None,
        };
        assert_eq!(stop.nights(), None);
        stop.departure = NaiveDate::from_ymd_opt(2026, 7, 4);
        assert_eq!(stop.nights(), Some(3));
        assert_eq!(stop.weather_date(), NaiveDate::from_ymd_opt(2026, 7, 1));
    }
}
