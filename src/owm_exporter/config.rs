// owm_exporter - Prometheus metrics exporter for OpenWeatherMap
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::error::StartupError;
use clap::{ArgAction, Parser};
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_PREFIX: &str = "openweathermap";
const DEFAULT_BIND_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 9003;
const DEFAULT_REFRESH_SECS: u64 = 300;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_API_URL: &str = "https://api.openweathermap.org/";

/// Options for the exporter. Every option may be set by a flag or an environment variable.
#[derive(Debug, Parser)]
#[clap(name = "owm_exporter", version = clap::crate_version!())]
pub struct ExporterConfig {
    /// Location to fetch weather for, formatted as "City,CountryCode" (e.g. "Surhuisterveen,NL")
    #[clap(long, env = "WEATHER_COUNTRY")]
    pub location: String,

    /// OpenWeatherMap API key
    #[clap(long, env = "APIKEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Language for textual weather descriptions
    #[clap(long, env = "WEATHER_LANGUAGE", default_value_t = DEFAULT_LANGUAGE.into())]
    pub language: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, env = "LOG_LEVEL", default_value_t = DEFAULT_LOG_LEVEL)]
    pub log_level: Level,

    /// Prefix for all metric names, separated from the name by "_". May be empty.
    /// [default: openweathermap]
    #[clap(long, env = "PROMETHEUS_PREFIX")]
    pub prefix: Option<String>,

    #[clap(long, env = "PROMETHEUS_LABEL", hide = true)]
    pub prefix_label: Option<String>,

    /// Port to expose metrics on [default: 9003]
    #[clap(long, env = "PROMETHEUS_PORT")]
    pub port: Option<u16>,

    #[clap(long, env = "EXPORTER_PORT", hide = true)]
    pub exporter_port: Option<u16>,

    /// Address to bind to. By default, owm_exporter will bind to public address since
    /// the purpose is to expose metrics to an external system (Prometheus or another
    /// agent for ingestion)
    #[clap(long, env = "BIND_ADDR", default_value_t = DEFAULT_BIND_ADDR)]
    pub bind_addr: IpAddr,

    /// Fetch weather from the OpenWeatherMap API at this interval, in seconds [default: 300]
    #[clap(long, env = "POLLING_INTERVAL_SECONDS")]
    pub interval_secs: Option<u64>,

    #[clap(long, env = "POOL_FREQUENCY", hide = true)]
    pub pool_frequency: Option<u64>,

    /// Fetch weather once immediately at startup instead of waiting one interval
    #[clap(long, env = "POLL_ON_STARTUP", default_value_t = true, action = ArgAction::Set)]
    pub poll_on_startup: bool,

    /// Base URL for the OpenWeatherMap API
    #[clap(long, env = "OWM_API_URL", default_value_t = DEFAULT_API_URL.into())]
    pub api_url: String,

    /// Timeout for requests to the OpenWeatherMap API, in milliseconds
    #[clap(long, env = "TIMEOUT_MILLIS", default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    pub timeout_millis: u64,
}

/// Validated configuration with all fallbacks resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub location: String,
    pub api_key: String,
    pub language: String,
    pub log_level: Level,
    pub prefix: String,
    pub bind: SocketAddr,
    pub interval: Duration,
    pub poll_on_startup: bool,
    pub api_url: Url,
    pub timeout: Duration,
}

impl ExporterConfig {
    /// Resolve alternate environment variables and validate all values.
    pub fn settings(&self) -> Result<Settings, StartupError> {
        let location = self.location.trim();
        if location.is_empty() {
            return Err(StartupError::InvalidConfig("location must not be empty".to_owned()));
        }

        let prefix = self
            .prefix
            .as_ref()
            .or(self.prefix_label.as_ref())
            .map(|p| p.trim().to_owned())
            .unwrap_or_else(|| DEFAULT_PREFIX.to_owned());
        if !is_valid_prefix(&prefix) {
            return Err(StartupError::InvalidConfig(format!("invalid metric prefix {:?}", prefix)));
        }

        let interval_secs = self
            .interval_secs
            .or(self.pool_frequency)
            .unwrap_or(DEFAULT_REFRESH_SECS);
        if interval_secs == 0 {
            return Err(StartupError::InvalidConfig("polling interval must be at least one second".to_owned()));
        }

        let api_url = Url::parse(&self.api_url)
            .map_err(|e| StartupError::InvalidConfig(format!("invalid API URL {}: {}", self.api_url, e)))?;
        if api_url.cannot_be_a_base() {
            return Err(StartupError::InvalidConfig(format!("invalid API URL {}", self.api_url)));
        }

        let port = self.port.or(self.exporter_port).unwrap_or(DEFAULT_PORT);

        Ok(Settings {
            location: location.to_owned(),
            api_key: self.api_key.clone(),
            language: self.language.clone(),
            log_level: self.log_level,
            prefix,
            bind: SocketAddr::new(self.bind_addr, port),
            interval: Duration::from_secs(interval_secs),
            poll_on_startup: self.poll_on_startup,
            api_url,
            timeout: Duration::from_millis(self.timeout_millis),
        })
    }
}

/// Empty, or something that can start a Prometheus metric name.
fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        None => true,
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{is_valid_prefix, ExporterConfig};
    use crate::error::StartupError;
    use clap::Parser;
    use std::time::Duration;

    // Parsing still reads the process environment for unset flags, every test sets
    // all the flags it asserts on.
    fn parse(args: &[&str]) -> ExporterConfig {
        let mut full = vec!["owm_exporter"];
        full.extend_from_slice(args);
        ExporterConfig::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_explicit_flags() {
        let config = parse(&[
            "--location",
            "Surhuisterveen,NL",
            "--prefix",
            "owm",
            "--port",
            "9100",
            "--interval-secs",
            "600",
            "--poll-on-startup",
            "false",
        ]);
        let settings = config.settings().unwrap();

        assert_eq!("Surhuisterveen,NL", settings.location);
        assert_eq!("owm", settings.prefix);
        assert_eq!(9100, settings.bind.port());
        assert_eq!(Duration::from_secs(600), settings.interval);
        assert!(!settings.poll_on_startup);
    }

    #[test]
    fn test_fallback_names() {
        let mut config = parse(&["--location", "Surhuisterveen,NL"]);
        config.prefix = None;
        config.prefix_label = Some("weather".to_owned());
        config.port = None;
        config.exporter_port = Some(9200);
        config.interval_secs = None;
        config.pool_frequency = Some(450);

        let settings = config.settings().unwrap();
        assert_eq!("weather", settings.prefix);
        assert_eq!(9200, settings.bind.port());
        assert_eq!(Duration::from_secs(450), settings.interval);
    }

    #[test]
    fn test_primary_names_win() {
        let mut config = parse(&["--location", "Surhuisterveen,NL"]);
        config.prefix = Some("owm".to_owned());
        config.prefix_label = Some("weather".to_owned());
        config.port = Some(9100);
        config.exporter_port = Some(9200);

        let settings = config.settings().unwrap();
        assert_eq!("owm", settings.prefix);
        assert_eq!(9100, settings.bind.port());
    }

    #[test]
    fn test_defaults() {
        let mut config = parse(&["--location", "Surhuisterveen,NL"]);
        config.prefix = None;
        config.prefix_label = None;
        config.port = None;
        config.exporter_port = None;
        config.interval_secs = None;
        config.pool_frequency = None;

        let settings = config.settings().unwrap();
        assert_eq!("openweathermap", settings.prefix);
        assert_eq!(9003, settings.bind.port());
        assert_eq!(Duration::from_secs(300), settings.interval);
    }

    #[test]
    fn test_empty_prefix_allowed() {
        let mut config = parse(&["--location", "Surhuisterveen,NL"]);
        config.prefix = Some(String::new());
        assert_eq!("", config.settings().unwrap().prefix);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = parse(&["--location", "Surhuisterveen,NL"]);
        config.interval_secs = Some(0);
        assert!(matches!(config.settings(), Err(StartupError::InvalidConfig(_))));

        let mut config = parse(&["--location", "  "]);
        config.interval_secs = Some(300);
        assert!(matches!(config.settings(), Err(StartupError::InvalidConfig(_))));

        let mut config = parse(&["--location", "Surhuisterveen,NL"]);
        config.interval_secs = Some(300);
        config.prefix = Some("9lives".to_owned());
        assert!(matches!(config.settings(), Err(StartupError::InvalidConfig(_))));

        let mut config = parse(&["--location", "Surhuisterveen,NL"]);
        config.interval_secs = Some(300);
        config.prefix = Some("owm".to_owned());
        config.api_url = "mailto:weather@example.com".to_owned();
        assert!(matches!(config.settings(), Err(StartupError::InvalidConfig(_))));
    }

    #[test]
    fn test_is_valid_prefix() {
        assert!(is_valid_prefix(""));
        assert!(is_valid_prefix("openweathermap"));
        assert!(is_valid_prefix("home:weather_2"));
        assert!(!is_valid_prefix("open-weather"));
        assert!(!is_valid_prefix("1weather"));
    }
}
