use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Datelike, Month, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How many dates the trip page lists.
pub const TOP_DATES: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VoteCategory {
    Destination,
    Duration,
    Date,
}

impl VoteCategory {
    pub const ALL: [VoteCategory; 3] = [
        VoteCategory::Destination,
        VoteCategory::Duration,
        VoteCategory::Date,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoteCategory::Destination => "destination",
            VoteCategory::Duration => "duration",
            VoteCategory::Date => "date",
        }
    }
}

impl fmt::Display for VoteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "destination" => Ok(VoteCategory::Destination),
            "duration" => Ok(VoteCategory::Duration),
            "date" => Ok(VoteCategory::Date),
            other => Err(format!(
                "unknown vote category {other:?}, expected destination, duration or date"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub trip_id: String,
    pub voter: String,
    pub category: VoteCategory,
    pub value: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TallyEntry {
    pub value: String,
    pub count: usize,
    pub first_submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tally {
    pub category: VoteCategory,
    pub total: usize,
    pub entries: Vec<TallyEntry>,
}

impl Tally {
    /// Counts active votes per value. Entries are ordered by count, highest
    /// first; equal counts go to the value whose earliest standing vote was
    /// submitted first.
    pub fn from_votes<'a>(category: VoteCategory, votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        let mut by_value: HashMap<&str, TallyEntry> = HashMap::new();
        let mut total = 0;
        for vote in votes.into_iter().filter(|v| v.category == category) {
            total += 1;
            by_value
                .entry(vote.value.as_str())
                .and_modify(|entry| {
                    entry.count += 1;
                    if vote.submitted_at < entry.first_submitted_at {
                        entry.first_submitted_at = vote.submitted_at;
                    }
                })
                .or_insert_with(|| TallyEntry {
                    value: vote.value.clone(),
                    count: 1,
                    first_submitted_at: vote.submitted_at,
                });
        }

        let mut entries: Vec<TallyEntry> = by_value.into_values().collect();
        entries.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.first_submitted_at.cmp(&b.first_submitted_at))
                .then_with(|| a.value.cmp(&b.value))
        });

        Self {
            category,
            total,
            entries,
        }
    }

    pub fn winner(&self) -> Option<&TallyEntry> {
        self.entries.first()
    }

    /// True when the leading count is shared by more than one value.
    pub fn is_tie(&self) -> bool {
        matches!(self.entries.as_slice(), [first, second, ..] if first.count == second.count)
    }

    /// The first `n` entries in tally order.
    pub fn top(&self, n: usize) -> &[TallyEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn count_for(&self, value: &str) -> usize {
        self.entries
            .iter()
            .find(|entry| entry.value == value)
            .map(|entry| entry.count)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthCount {
    pub month: u32,
    pub name: &'static str,
    pub count: usize,
}

/// Folds date votes into calendar months, most popular first and ties in
/// calendar order. Values that are not ISO dates are skipped.
pub fn month_summary<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Vec<MonthCount> {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for vote in votes.into_iter().filter(|v| v.category == VoteCategory::Date) {
        if let Ok(date) = NaiveDate::parse_from_str(&vote.value, "%Y-%m-%d") {
            *counts.entry(date.month()).or_default() += 1;
        }
    }

    let mut months: Vec<MonthCount> = counts
        .into_iter()
        .filter_map(|(month, count)| {
            let name = Month::try_from(month as u8).ok()?.name();
            Some(MonthCount { month, name, count })
        })
        .collect();
    months.sort_by(|a, b| b.count.cmp(&a.count).then(a.month.cmp(&b.month)));
    months
}

/// Everything the trip page shows about the votes so far.
#[derive(Debug, Clone, Serialize)]
pub struct VoteSummary {
    pub tallies: Vec<Tally>,
    pub months: Vec<MonthCount>,
}

impl VoteSummary {
    pub fn from_votes(votes: &[Vote]) -> Self {
        Self {
            tallies: VoteCategory::ALL
                .into_iter()
                .map(|category| Tally::from_votes(category, votes))
                .collect(),
            months: month_summary(votes),
        }
    }

    pub fn tally(&self, category: VoteCategory) -> Option<&Tally> {
        self.tallies.iter().find(|t| t.category == category)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn vote(voter: &str, category: VoteCategory, value: &str, minute: i64) -> Vote {
        Vote {
            trip_id: "trip".into(),
            voter: voter.into(),
            category,
            value: value.into(),
            submitted_at: Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minute),
        }
    }

    #[test]
    fn tally_orders_by_count_then_first_submission() {
        let votes = vec![
            vote("ana", VoteCategory::Destination, "rome", 3),
            vote("bo", VoteCategory::Destination, "paris", 1),
            vote("cy", VoteCategory::Destination, "rome", 4),
            vote("di", VoteCategory::Destination, "paris", 5),
            vote("ed", VoteCategory::Destination, "oslo", 0),
            vote("ana", VoteCategory::Duration, "Weekend", 0),
        ];
        let tally = Tally::from_votes(VoteCategory::Destination, &votes);

        assert_eq!(tally.total, 5);
        let order: Vec<&str> = tally.entries.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(order, vec!["paris", "rome", "oslo"]);
        assert!(tally.is_tie());
        assert_eq!(tally.winner().map(|e| e.value.as_str()), Some("paris"));
        assert_eq!(tally.count_for("oslo"), 1);
        assert_eq!(tally.count_for("berlin"), 0);
    }

    #[test]
    fn empty_tally_has_no_winner() {
        let tally = Tally::from_votes(VoteCategory::Date, &[]);
        assert!(tally.winner().is_none());
        assert!(!tally.is_tie());
        assert_eq!(tally.total, 0);
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!("season".parse::<VoteCategory>().is_err());
        assert_eq!("date".parse::<VoteCategory>(), Ok(VoteCategory::Date));
    }

    #[test]
    fn date_votes_fold_into_months() {
        let votes = vec![
            vote("ana", VoteCategory::Date, "2026-07-04", 0),
            vote("bo", VoteCategory::Date, "2026-07-20", 1),
            vote("cy", VoteCategory::Date, "2026-06-01", 2),
            vote("di", VoteCategory::Date, "2026-08-15", 3),
            vote("ed", VoteCategory::Duration, "Weekend", 4),
        ];
        let months = month_summary(&votes);

        let names: Vec<(&str, usize)> = months.iter().map(|m| (m.name, m.count)).collect();
        assert_eq!(names, vec![("July", 2), ("June", 1), ("August", 1)]);
        assert!(month_summary(&[]).is_empty());
    }

    #[test]
    fn top_dates_are_capped() {
        let votes: Vec<Vote> = (0..7)
            .map(|day| {
                vote(
                    &format!("v{day}"),
                    VoteCategory::Date,
                    &format!("2026-07-0{}", day + 1),
                    day,
                )
            })
            .chain([vote("extra", VoteCategory::Date, "2026-07-05", 9)])
            .collect();
        let summary = VoteSummary::from_votes(&votes);
        let dates = summary.tally(VoteCategory::Date).expect("date tally");

        let top: Vec<&str> = dates.top(TOP_DATES).iter().map(|e| e.value.as_str()).collect();
        assert_eq!(
            top,
            vec!["2026-07-05", "2026-07-01", "2026-07-02", "2026-07-03", "2026-07-04"]
        );
        assert_eq!(dates.top(50).len(), 7);
        assert_eq!(summary.months.len(), 1);
        assert_eq!(summary.months[0].count, 8);
    }
}
