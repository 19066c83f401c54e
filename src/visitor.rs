//! Per-browser memory kept in private cookies: which trips this browser has
//! seen, and an anonymous voter token for ballots without a name.

use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use uuid::Uuid;

pub const TRIPS_COOKIE: &str = "wanderplan_trips";
pub const VOTER_COOKIE: &str = "wanderplan_voter";

const MAX_REMEMBERED_TRIPS: usize = 50;

pub fn visited_trips(jar: &PrivateCookieJar) -> Vec<String> {
    jar.get(TRIPS_COOKIE)
        .map(|cookie| parse_trip_list(cookie.value()))
        .unwrap_or_default()
}

/// Adds `trip_id` to the remembered list, most recent last.
pub fn remember_trip(jar: PrivateCookieJar, trip_id: &str) -> PrivateCookieJar {
    let mut trips = visited_trips(&jar);
    if trips.iter().any(|id| id == trip_id) {
        return jar;
    }
    trips.push(trip_id.to_string());
    if trips.len() > MAX_REMEMBERED_TRIPS {
        let overflow = trips.len() - MAX_REMEMBERED_TRIPS;
        trips.drain(..overflow);
    }
    jar.add(long_lived(TRIPS_COOKIE, trips.join(",")))
}

/// Returns the browser's voter token, minting one when absent.
pub fn voter_token(jar: PrivateCookieJar) -> (PrivateCookieJar, String) {
    if let Some(cookie) = jar.get(VOTER_COOKIE) {
        let token = cookie.value().to_string();
        if !token.is_empty() {
            return (jar, token);
        }
    }
    let token = format!("guest-{}", &Uuid::new_v4().simple().to_string()[..8]);
    (jar.add(long_lived(VOTER_COOKIE, token.clone())), token)
}

fn long_lived(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .permanent()
        .build()
}

fn parse_trip_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_hexdigit()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_list_ignores_tampered_entries() {
        assert_eq!(
            parse_trip_list("abc123, ,<script>,def456"),
            vec!["abc123".to_string(), "def456".to_string()]
        );
    }
}
