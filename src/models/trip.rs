use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DURATIONS: [&str; 3] = ["Day trip", "Weekend", "Full vacation"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    #[default]
    VotingOpen,
    VotingClosed,
    Planning,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::VotingOpen => "voting_open",
            TripStatus::VotingClosed => "voting_closed",
            TripStatus::Planning => "planning",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TripStatus::VotingOpen => "Voting open",
            TripStatus::VotingClosed => "Voting closed",
            TripStatus::Planning => "Planning",
        }
    }

    pub fn accepts_votes(&self) -> bool {
        matches!(self, TripStatus::VotingOpen)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voting_open" => Ok(TripStatus::VotingOpen),
            "voting_closed" => Ok(TripStatus::VotingClosed),
            "planning" => Ok(TripStatus::Planning),
            other => Err(format!("unknown trip status {other:?}")),
        }
    }
}

/// Seasons a trip may take place in. Date votes must fall into one of the
/// trip's allowed seasons.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Spring, Season::Summer, Season::Fall, Season::Winter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
            Season::Winter => "Winter",
        }
    }

    /// Calendar months (1-based) covered by the season.
    pub fn months(&self) -> [u32; 3] {
        match self {
            Season::Spring => [3, 4, 5],
            Season::Summer => [6, 7, 8],
            Season::Fall => [9, 10, 11],
            Season::Winter => [12, 1, 2],
        }
    }

    pub fn of_month(month: u32) -> Option<Season> {
        Season::ALL
            .into_iter()
            .find(|season| season.months().contains(&month))
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Season::ALL
            .into_iter()
            .find(|season| season.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown season {s:?}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub name: String,
    pub creator_name: Option<String>,
    pub status: TripStatus,
    pub durations: Vec<String>,
    pub seasons: Vec<Season>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// The trip's name, or a short id-based label when it is blank.
pub fn display_name(id: &str, name: &str) -> String {
    if name.trim().is_empty() {
        let short: String = id.chars().take(6).collect();
        format!("Trip {short}")
    } else {
        name.to_string()
    }
}

impl Trip {
    pub fn display_name(&self) -> String {
        display_name(&self.id, &self.name)
    }

    pub fn allows_date_month(&self, month: u32) -> bool {
        self.seasons
            .iter()
            .any(|season| season.months().contains(&month))
    }
}

/// A votable place offered when the trip was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Destination {
    pub code: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Parses `Name, lat, lon` lines into destinations with unique slugs.
/// Lines that do not have three fields or valid coordinates are skipped.
pub fn parse_destination_lines(input: &str) -> Vec<Destination> {
    let mut destinations: Vec<Destination> = Vec::new();
    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let [name, lat, lon] = parts.as_slice() else {
            continue;
        };
        let (Ok(latitude), Ok(longitude)) = (lat.parse::<f64>(), lon.parse::<f64>()) else {
            continue;
        };
        if name.is_empty() || !valid_coordinates(latitude, longitude) {
            continue;
        }

        let base = slugify(name);
        let mut code = base.clone();
        let mut counter = 1;
        while destinations.iter().any(|d| d.code == code) {
            code = format!("{base}_{counter}");
            counter += 1;
        }

        destinations.push(Destination {
            code,
            name: name.to_string(),
            latitude,
            longitude,
        });
    }
    destinations
}

pub fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

pub fn slugify(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() {
                ch.to_lowercase().next().unwrap_or(ch)
            } else {
                '_'
            }
        })
        .collect();
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "place".to_string()
    } else {
        slug
    }
}
