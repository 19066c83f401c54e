use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        itinerary::ItineraryService, trips::TripService, voting::VotingService,
        weather::WeatherService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub trips: TripService,
    pub voting: VotingService,
    pub itinerary: ItineraryService,
    pub weather: WeatherService,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool, weather: WeatherService) -> Self {
        let digest = Sha512::digest(config.cookie_secret.as_bytes());
        let cookie_key = Key::from(&digest[..]);
        let trips = TripService::new(db.clone());
        let voting = VotingService::new(db.clone(), trips.clone());
        let itinerary = ItineraryService::new(db.clone());
        Self {
            config,
            db,
            trips,
            voting,
            itinerary,
            weather,
            cookie_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
