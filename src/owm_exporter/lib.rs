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

//! Prometheus metrics exporter for OpenWeatherMap
//!
//! ## Features
//!
//! `owm_exporter` fetches current weather and the UV index for a single location using the
//! [OpenWeatherMap] API and emits them as Prometheus metrics. Values are refreshed in the
//! background at a fixed interval, not in response to scrapes. If a refresh fails, the
//! previous values are kept until the next successful one.
//!
//! The following metrics are emitted, each prefixed with `openweathermap_` by default.
//! Nothing is emitted until the first successful refresh.
//!
//! * `temp` - Temperature, in degrees celsius.
//! * `humidity` - Relative humidity (0-100).
//! * `pressure` - Atmospheric pressure, in hPa.
//! * `clouds` - Cloud coverage (0-100).
//! * `wind_speed` - Wind speed, in meters per second.
//! * `wind_deg` - Wind direction, in degrees, 0 when not reported.
//! * `visibility_distance` - Visibility, in meters, 10000 when not reported.
//! * `sunrise_time` - Sunrise, UNIX timestamp in milliseconds.
//! * `sunset_time` - Sunset, UNIX timestamp in milliseconds.
//! * `weather_code` - [Weather condition code].
//! * `lastrain` - Rain volume, in millimeters. The last hour when reported, otherwise the last
//!   three hours, otherwise 0.
//! * `lastsnow` - Snow volume, in millimeters, same rules as `lastrain`.
//! * `uvi` - UV index.
//! * `status{status=$STATUS}` - Short weather status (e.g. "Clouds"). Quotes, backslashes, and
//!   newlines in label values are escaped.
//! * `detailed_status{detailed_status=$DETAILED}` - Detailed weather status (e.g. "broken clouds").
//! * `weather_icon_name{weather_icon_name=$ICON}` - Weather icon name.
//! * `location{location=$NAME}` - Name of the location.
//!
//! [OpenWeatherMap]: https://openweathermap.org/api
//! [Weather condition code]: https://openweathermap.org/weather-conditions
//!
//! ## Build
//!
//! `owm_exporter` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/owm_exporter.git && cd owm_exporter
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Configuration
//!
//! All options can be given as flags or environment variables, see `owm_exporter --help`.
//! The most important ones are below.
//!
//! * `APIKEY` - OpenWeatherMap API key.
//! * `WEATHER_COUNTRY` - Location, as "City,CountryCode". Required.
//! * `WEATHER_LANGUAGE` - Language of textual descriptions, default `en`.
//! * `PROMETHEUS_PREFIX` (or `PROMETHEUS_LABEL`) - Metric name prefix, default `openweathermap`.
//! * `PROMETHEUS_PORT` (or `EXPORTER_PORT`) - Port for metrics, default `9003`.
//! * `POLLING_INTERVAL_SECONDS` (or `POOL_FREQUENCY`) - Refresh interval, default `300`.
//! * `POLL_ON_STARTUP` - Refresh immediately at startup, default `true`.
//! * `LOG_LEVEL` - Logging verbosity, default `info`.
//!
//! ### Run
//!
//! ```text
//! APIKEY=... WEATHER_COUNTRY=Surhuisterveen,NL ./owm_exporter
//! ```
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `9003` at `/metrics`. Once `owm_exporter`
//! is running, configure scrapes of it by your Prometheus server. Add the host running
//! `owm_exporter` as a target under the Prometheus `scrape_configs` section as described by
//! the example below.
//!
//! ```yaml
//! # Sample config for Prometheus.
//!
//! global:
//!   scrape_interval:     1m
//!   evaluation_interval: 1m
//!   external_labels:
//!     monitor: 'my_prom'
//!
//! scrape_configs:
//! - job_name: owm_exporter
//!   static_configs:
//!   - targets: ['example:9003']
//! ```
//!

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod normalize;
pub mod poll;
