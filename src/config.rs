use std::{env, net::SocketAddr, time::Duration};

use crate::error::AppError;

pub const DEFAULT_WEATHER_API_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub cookie_secret: String,
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub enabled: bool,
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: DEFAULT_WEATHER_API_URL.to_string(),
            timeout: Duration::from_millis(2500),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://wanderplan.db?mode=rwc".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-wanderplan-cookie-secret".to_string());

        Ok(Self {
            database_url,
            listen_addr,
            cookie_secret,
            weather: WeatherConfig::from_env()?,
        })
    }
}

impl WeatherConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let enabled = match env::var("WEATHER_ENABLED") {
            Ok(raw) => parse_flag(&raw)
                .ok_or_else(|| AppError::Config(format!("invalid WEATHER_ENABLED: {raw}")))?,
            Err(_) => defaults.enabled,
        };

        let api_url = env::var("WEATHER_API_URL").unwrap_or(defaults.api_url);
        url::Url::parse(&api_url)
            .map_err(|err| AppError::Config(format!("invalid WEATHER_API_URL: {err}")))?;

        let timeout = match env::var("WEATHER_TIMEOUT_MS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|err| AppError::Config(format!("invalid WEATHER_TIMEOUT_MS: {err}")))?,
            Err(_) => defaults.timeout,
        };

        Ok(Self {
            enabled,
            api_url,
            timeout,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_flag;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
