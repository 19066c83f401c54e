#![allow(dead_code)]

use std::{fmt, fs::File, net::SocketAddr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;
use wanderplan::{
    config::{AppConfig, WeatherConfig},
    db::{init_pool, migrate},
    models::trip::{Season, Trip},
    services::{
        trips::NewTrip,
        weather::{Forecast, ForecastProvider, WeatherError, WeatherService},
    },
    state::AppState,
};

pub struct TestApp {
    pub state: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestApp").finish()
    }
}

impl TestApp {
    pub async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for test database")?;
        let db_path = root.path().join("wanderplan.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "test-cookie-secret".into(),
            weather: WeatherConfig::default(),
        };

        let db = init_pool(&config.database_url).await?;
        migrate(&db).await?;

        let state = AppState::new(config, db, WeatherService::new(Arc::new(SunnyProvider)));
        Ok(Self { state, _root: root })
    }

    pub fn with_weather(&mut self, weather: WeatherService) {
        self.state.weather = weather;
    }

    pub async fn create_trip(&self, name: &str, destinations: &str, seasons: &[Season]) -> Trip {
        self.state
            .trips
            .create_trip(NewTrip {
                name: name.into(),
                creator_name: Some("tester".into()),
                destinations: destinations.into(),
                durations: Vec::new(),
                seasons: seasons.to_vec(),
            })
            .await
            .expect("create trip")
    }
}

/// Always answers with the same pleasant forecast.
pub struct SunnyProvider;

#[async_trait]
impl ForecastProvider for SunnyProvider {
    async fn forecast(
        &self,
        _latitude: f64,
        _longitude: f64,
        date: NaiveDate,
    ) -> Result<Forecast, WeatherError> {
        Ok(Forecast {
            date,
            summary: "Clear sky".into(),
            temperature_max_c: Some(27.0),
            temperature_min_c: Some(18.0),
            precipitation_probability: Some(5.0),
        })
    }
}

/// Behaves like an unreachable weather service.
pub struct DownProvider;

#[async_trait]
impl ForecastProvider for DownProvider {
    async fn forecast(
        &self,
        _latitude: f64,
        _longitude: f64,
        _date: NaiveDate,
    ) -> Result<Forecast, WeatherError> {
        Err(WeatherError::Upstream("connection refused".into()))
    }
}
