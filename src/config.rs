//! Configuration loaded from the environment with figment.

use std::time::Duration;

use figment::Figment;
use figment::providers::Env;
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres URL. Without one the service keeps everything in memory.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token required by the admin API when set.
    #[serde(default)]
    pub admin_token: Option<String>,

    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,
    #[serde(
        default = "default_cycle_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub cycle_interval: Duration,
    #[serde(
        default = "default_fetch_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub fetch_timeout: Duration,
    #[serde(
        default = "default_import_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub import_timeout: Duration,

    // Seed values for the stored directory settings.
    #[serde(default)]
    pub directory_endpoint: Option<String>,
    #[serde(default)]
    pub directory_facility_list: Option<String>,
    #[serde(default)]
    pub directory_service_list: Option<String>,
    #[serde(default)]
    pub directory_insurance_list: Option<String>,
    #[serde(default)]
    pub directory_facility_insurance_list: Option<String>,
    #[serde(default)]
    pub directory_facility_service_list: Option<String>,
    #[serde(default)]
    pub directory_username: Option<String>,
    #[serde(default)]
    pub directory_password: Option<String>,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_cycle_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_import_timeout() -> Duration {
    Duration::from_secs(600)
}

const DURATION_PARSER: DurationParser<'static> = DurationParser::with_time_units(&[
    TimeUnit::MilliSecond,
    TimeUnit::Second,
    TimeUnit::Minute,
    TimeUnit::Hour,
]);

/// Parse `"30s"`, `"10m"`, `"1h"` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let parsed = DURATION_PARSER
        .parse(input.trim())
        .map_err(|e| format!("invalid duration '{input}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration '{input}': {e}"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("10m"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_figment(Figment::new()).unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.port, 8080);
        assert_eq!(config.cycle_interval, Duration::from_secs(60));
        assert_eq!(config.import_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_durations_accept_numbers_and_strings() {
        let figment = Figment::new()
            .merge(Serialized::default("cycle_interval", 15))
            .merge(Serialized::default("fetch_timeout", "2m"));
        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.cycle_interval, Duration::from_secs(15));
        assert_eq!(config.fetch_timeout, Duration::from_secs(120));
    }
}
