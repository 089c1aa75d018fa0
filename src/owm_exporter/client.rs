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

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum FetchError {
    Network(reqwest::Error),
    NotFound(String),
    Unauthorized,
    UpstreamFormat(String),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network error: {}", e),
            Self::NotFound(location) => write!(f, "location {} not found", location),
            Self::Unauthorized => write!(f, "unauthorized, check the API key"),
            Self::UpstreamFormat(msg) => write!(f, "unparseable response: {}", msg),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for FetchError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Network(e) => Some(e),
            _ => None,
        }
    }
}

/// Something that can produce one `RawObservation` for a location per call.
///
/// The poller only depends on this trait so that cycles can be driven by a
/// fake source in tests.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<RawObservation, FetchError>;
}

/// Client for the OpenWeatherMap current weather, geocoding, and UV index APIs.
#[derive(Debug)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: Url,
    api_key: String,
    language: String,
}

impl OpenWeatherClient {
    const USER_AGENT: &'static str = "owm_exporter Prometheus Exporter (https://github.com/56quarters/owm_exporter)";
    const JSON_RESPONSE: &'static str = "application/json";

    /// Create a new client. `base_url` must be usable as a base (`http` or `https`), this
    /// is checked when the configuration is parsed.
    pub fn new(client: Client, base_url: Url, api_key: &str, language: &str) -> Self {
        OpenWeatherClient {
            client,
            base_url,
            api_key: api_key.to_owned(),
            language: language.to_owned(),
        }
    }

    /// Fetch current weather for `location` and the UV index for its coordinates.
    pub async fn observation(&self, location: &str) -> Result<RawObservation, FetchError> {
        let weather_url = self.endpoint(&["data", "2.5", "weather"]);
        tracing::debug!(message = "making current weather request", url = %weather_url);

        let weather: CurrentWeather = self
            .get_json(
                location,
                weather_url,
                &[
                    ("q", location.to_owned()),
                    ("units", "metric".to_owned()),
                    ("lang", self.language.clone()),
                ],
            )
            .await?;

        let place = self.locate(location).await?;

        let uvi_url = self.endpoint(&["data", "2.5", "uvi"]);
        tracing::debug!(message = "making UV index request", url = %uvi_url, lat = place.lat, lon = place.lon);

        let uv: UvIndex = self
            .get_json(
                location,
                uvi_url,
                &[("lat", place.lat.to_string()), ("lon", place.lon.to_string())],
            )
            .await?;

        RawObservation::from_parts(weather, place, uv)
    }

    /// Resolve `location` ("City,CountryCode") to a single place with coordinates.
    pub async fn locate(&self, location: &str) -> Result<Place, FetchError> {
        let geo_url = self.endpoint(&["geo", "1.0", "direct"]);
        tracing::debug!(message = "making location lookup request", url = %geo_url);

        let places: Vec<Place> = self
            .get_json(
                location,
                geo_url,
                &[("q", location.to_owned()), ("limit", "1".to_owned())],
            )
            .await?;

        places
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::NotFound(location.to_owned()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        location: &str,
        url: Url,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let res = self
            .client
            .get(url.clone())
            .query(params)
            .query(&[("appid", &self.api_key)])
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(FetchError::Network)?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FetchError::Unauthorized);
        } else if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(location.to_owned()));
        } else if status != StatusCode::OK {
            return Err(FetchError::Unexpected(status, url));
        }

        let body = res.text().await.map_err(FetchError::Network)?;
        serde_json::from_str(&body).map_err(|e| FetchError::UpstreamFormat(format!("{} from {}", e, url)))
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }

        url
    }
}

#[async_trait]
impl ObservationSource for OpenWeatherClient {
    async fn fetch(&self, location: &str) -> Result<RawObservation, FetchError> {
        self.observation(location).await
    }
}

/// One observation for one location as returned by the provider, before any
/// fallback rules are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub status: String,
    pub detailed_status: String,
    pub weather_code: i64,
    pub icon_name: String,
    pub temperature: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub clouds: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub visibility: Option<f64>,
    pub sunrise: i64,
    pub sunset: i64,
    pub rain: BTreeMap<String, f64>,
    pub snow: BTreeMap<String, f64>,
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub uv_index: f64,
}

impl RawObservation {
    fn from_parts(weather: CurrentWeather, place: Place, uv: UvIndex) -> Result<Self, FetchError> {
        let condition = weather
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::UpstreamFormat("no weather condition in response".to_owned()))?;

        Ok(RawObservation {
            status: condition.main,
            detailed_status: condition.description,
            weather_code: condition.id,
            icon_name: condition.icon,
            temperature: weather.main.temp,
            pressure: weather.main.pressure,
            humidity: weather.main.humidity,
            clouds: weather.clouds.all,
            wind_speed: weather.wind.speed,
            wind_direction: weather.wind.deg,
            visibility: weather.visibility,
            sunrise: weather.sys.sunrise,
            sunset: weather.sys.sunset,
            rain: weather.rain.unwrap_or_default(),
            snow: weather.snow.unwrap_or_default(),
            location_name: weather.name,
            latitude: place.lat,
            longitude: place.lon,
            uv_index: uv.value,
        })
    }
}

#[derive(Deserialize, Debug)]
struct CurrentWeather {
    weather: Vec<Condition>,
    main: Main,
    visibility: Option<f64>,
    wind: Wind,
    clouds: Clouds,
    rain: Option<BTreeMap<String, f64>>,
    snow: Option<BTreeMap<String, f64>>,
    sys: Sys,
    name: String,
}

#[derive(Deserialize, Debug)]
struct Condition {
    id: i64,
    main: String,
    description: String,
    icon: String,
}

#[derive(Deserialize, Debug)]
struct Main {
    temp: f64,
    pressure: f64,
    humidity: f64,
}

#[derive(Deserialize, Debug)]
struct Wind {
    speed: f64,
    #[serde(default)]
    deg: f64,
}

#[derive(Deserialize, Debug)]
struct Clouds {
    all: f64,
}

#[derive(Deserialize, Debug)]
struct Sys {
    sunrise: i64,
    sunset: i64,
}

/// Result of a geocoding lookup.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub country: Option<String>,
}

#[derive(Deserialize, Debug)]
struct UvIndex {
    value: f64,
}
