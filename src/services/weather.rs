//! Best-effort forecasts for itinerary stops and segments.
//!
//! Nothing in here may fail a render: every problem ends up as a
//! [`WeatherReport::Unavailable`] entry.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::WeatherConfig,
    error::AppError,
    models::{segment::Segment, stop::Stop},
    services::itinerary::Itinerary,
};

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather service unavailable: {0}")]
    Upstream(String),
    #[error("weather service answered {0}")]
    Status(u16),
    #[error("no forecast for {0}")]
    NoData(NaiveDate),
}

impl WeatherError {
    /// Whether further requests during the same render are pointless.
    pub fn is_outage(&self) -> bool {
        match self {
            WeatherError::Upstream(_) => true,
            WeatherError::Status(code) => *code >= 500,
            WeatherError::NoData(_) => false,
        }
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => WeatherError::Status(status.as_u16()),
            None => WeatherError::Upstream(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Forecast {
    pub date: NaiveDate,
    pub summary: String,
    pub temperature_max_c: Option<f64>,
    pub temperature_min_c: Option<f64>,
    pub precipitation_probability: Option<f64>,
}

impl Forecast {
    pub fn label(&self) -> String {
        match (self.temperature_min_c, self.temperature_max_c) {
            (Some(min), Some(max)) => format!("{}, {min:.0}–{max:.0} °C", self.summary),
            (_, Some(max)) => format!("{}, up to {max:.0} °C", self.summary),
            _ => self.summary.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WeatherReport {
    Available(Forecast),
    Unavailable { reason: String },
}

impl WeatherReport {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        WeatherReport::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, WeatherReport::Available(_))
    }

    pub fn label(&self) -> String {
        match self {
            WeatherReport::Available(forecast) => forecast.label(),
            WeatherReport::Unavailable { reason } => format!("Weather unavailable ({reason})"),
        }
    }
}

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn forecast(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<Forecast, WeatherError>;
}

/// Open-Meteo style daily forecast endpoint.
pub struct OpenMeteoProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl OpenMeteoProvider {
    pub fn new(config: &WeatherConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|err| AppError::Config(format!("invalid weather url: {err}")))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("wanderplan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AppError::Other(err.into()))?;
        Ok(Self { client, base_url })
    }

    fn request_url(&self, latitude: f64, longitude: f64, date: NaiveDate) -> Url {
        let day = date.format("%Y-%m-%d").to_string();
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("latitude", &format!("{latitude:.4}"))
            .append_pair("longitude", &format!("{longitude:.4}"))
            .append_pair(
                "daily",
                "weather_code,temperature_2m_max,temperature_2m_min,precipitation_probability_max",
            )
            .append_pair("timezone", "auto")
            .append_pair("start_date", &day)
            .append_pair("end_date", &day);
        url
    }
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    daily: Option<Daily>,
}

#[derive(Debug, Deserialize)]
struct Daily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    weather_code: Vec<Option<i64>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
}

impl Daily {
    fn forecast_for(&self, date: NaiveDate) -> Option<Forecast> {
        let day = date.format("%Y-%m-%d").to_string();
        let idx = self.time.iter().position(|t| *t == day)?;
        let code = self.weather_code.get(idx).copied().flatten()?;
        Some(Forecast {
            date,
            summary: describe_weather_code(code).to_string(),
            temperature_max_c: self.temperature_2m_max.get(idx).copied().flatten(),
            temperature_min_c: self.temperature_2m_min.get(idx).copied().flatten(),
            precipitation_probability: self.precipitation_probability_max.get(idx).copied().flatten(),
        })
    }
}

#[async_trait]
impl ForecastProvider for OpenMeteoProvider {
    async fn forecast(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<Forecast, WeatherError> {
        let url = self.request_url(latitude, longitude, date);
        debug!(%url, "requesting forecast");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }
        let body: DailyResponse = response.json().await?;
        body.daily
            .and_then(|daily| daily.forecast_for(date))
            .ok_or(WeatherError::NoData(date))
    }
}

/// WMO weather interpretation codes.
pub fn describe_weather_code(code: i64) -> &'static str {
    match code {
        0 => "Clear sky",
        1 | 2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 | 56 | 57 => "Drizzle",
        61 | 63 | 65 | 66 | 67 => "Rain",
        71 | 73 | 75 | 77 => "Snow",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95..=99 => "Thunderstorm",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StopWeather {
    #[serde(flatten)]
    pub stop: Stop,
    pub weather: WeatherReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentWeather {
    #[serde(flatten)]
    pub segment: Segment,
    pub weather: WeatherReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedItinerary {
    pub trip_id: String,
    pub version: i64,
    pub stops: Vec<StopWeather>,
    pub segments: Vec<SegmentWeather>,
}

#[derive(Clone)]
pub struct WeatherService {
    provider: Option<Arc<dyn ForecastProvider>>,
}

impl WeatherService {
    pub fn new(provider: Arc<dyn ForecastProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub fn from_config(config: &WeatherConfig) -> Result<Self, AppError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        Ok(Self::new(Arc::new(OpenMeteoProvider::new(config)?)))
    }

    /// Annotates every stop and segment. Lookups are memoized for this call
    /// only, and the first outage short-circuits the remaining lookups.
    pub async fn enrich(&self, itinerary: Itinerary) -> EnrichedItinerary {
        let mut lookup = Lookup {
            provider: self.provider.as_deref(),
            cache: HashMap::new(),
            outage: None,
        };

        let mut stops = Vec::with_capacity(itinerary.stops.len());
        for stop in itinerary.stops {
            let weather = lookup
                .report(stop.place.latitude, stop.place.longitude, stop.weather_date())
                .await;
            stops.push(StopWeather { stop, weather });
        }

        let mut segments = Vec::with_capacity(itinerary.segments.len());
        for segment in itinerary.segments {
            let weather = lookup
                .report(segment.latitude, segment.longitude, segment.date)
                .await;
            segments.push(SegmentWeather { segment, weather });
        }

        EnrichedItinerary {
            trip_id: itinerary.trip_id,
            version: itinerary.version,
            stops,
            segments,
        }
    }
}

type CacheKey = (i64, i64, NaiveDate);

struct Lookup<'a> {
    provider: Option<&'a dyn ForecastProvider>,
    cache: HashMap<CacheKey, WeatherReport>,
    outage: Option<String>,
}

impl Lookup<'_> {
    async fn report(&mut self, latitude: f64, longitude: f64, date: Option<NaiveDate>) -> WeatherReport {
        let Some(provider) = self.provider else {
            return WeatherReport::unavailable("weather disabled");
        };
        let Some(date) = date else {
            return WeatherReport::unavailable("no date");
        };
        if let Some(reason) = &self.outage {
            return WeatherReport::unavailable(reason.clone());
        }

        // ~1 km grid is plenty for a daily forecast
        let key = (
            (latitude * 100.0).round() as i64,
            (longitude * 100.0).round() as i64,
            date,
        );
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let report = match provider.forecast(latitude, longitude, date).await {
            Ok(forecast) => WeatherReport::Available(forecast),
            Err(err) => {
                warn!(latitude, longitude, %date, "forecast lookup failed: {err}");
                if err.is_outage() {
                    self.outage = Some(err.to_string());
                }
                WeatherReport::unavailable(err.to_string())
            }
        };
        self.cache.insert(key, report.clone());
        report
    }
}
