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

use crate::client::RawObservation;
use std::collections::BTreeMap;

const WINDOW_1H: &str = "1h";
const WINDOW_3H: &str = "3h";

/// Visibility reported when the provider omits it, the largest value it ever reports.
pub const DEFAULT_VISIBILITY: f64 = 10000.0;

/// Observation with every fallback rule applied, ready to be published.
///
/// Timestamps are in milliseconds, temperature in celsius, pressure in hPa,
/// wind speed in meters per second and rain or snow in millimeters.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedObservation {
    pub status: String,
    pub detailed_status: String,
    pub icon_name: String,
    pub location_name: String,
    pub weather_code: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub clouds: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub visibility: f64,
    pub sunrise_ms: f64,
    pub sunset_ms: f64,
    pub rain: f64,
    pub snow: f64,
    pub uv_index: f64,
}

/// Convert a provider observation into the record published as metrics.
pub fn normalize(raw: &RawObservation) -> NormalizedObservation {
    NormalizedObservation {
        status: raw.status.clone(),
        detailed_status: raw.detailed_status.clone(),
        icon_name: raw.icon_name.clone(),
        location_name: raw.location_name.clone(),
        weather_code: raw.weather_code as f64,
        temperature: raw.temperature,
        pressure: raw.pressure,
        humidity: raw.humidity,
        clouds: raw.clouds,
        wind_speed: raw.wind_speed,
        wind_direction: raw.wind_direction,
        visibility: raw.visibility.unwrap_or(DEFAULT_VISIBILITY),
        sunrise_ms: to_millis(raw.sunrise),
        sunset_ms: to_millis(raw.sunset),
        rain: accumulation(&raw.rain),
        snow: accumulation(&raw.snow),
        uv_index: raw.uv_index,
    }
}

fn to_millis(secs: i64) -> f64 {
    secs as f64 * 1000.0
}

/// Pick a single rain or snow value from the windows the provider returned.
///
/// The "3h" window is applied first and the "1h" window after it, so when both
/// are present the "1h" value wins. No entries at all means 0.
fn accumulation(windows: &BTreeMap<String, f64>) -> f64 {
    let mut value = 0.0;
    if let Some(v) = windows.get(WINDOW_3H) {
        value = *v;
    }
    if let Some(v) = windows.get(WINDOW_1H) {
        value = *v;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::{accumulation, normalize, DEFAULT_VISIBILITY};
    use crate::client::RawObservation;
    use std::collections::BTreeMap;

    fn windows(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn raw() -> RawObservation {
        RawObservation {
            status: "Rain".to_owned(),
            detailed_status: "light rain".to_owned(),
            weather_code: 500,
            icon_name: "10d".to_owned(),
            temperature: 11.25,
            pressure: 1004.0,
            humidity: 93.0,
            clouds: 100.0,
            wind_speed: 7.2,
            wind_direction: 250.0,
            visibility: Some(8000.0),
            sunrise: 1697610000,
            sunset: 1697647000,
            rain: windows(&[("1h", 0.4)]),
            snow: BTreeMap::new(),
            location_name: "Surhuisterveen".to_owned(),
            latitude: 53.18,
            longitude: 6.18,
            uv_index: 0.8,
        }
    }

    #[test]
    fn test_accumulation_empty() {
        assert_eq!(0.0, accumulation(&BTreeMap::new()));
    }

    #[test]
    fn test_accumulation_only_3h() {
        assert_eq!(1.5, accumulation(&windows(&[("3h", 1.5)])));
    }

    #[test]
    fn test_accumulation_only_1h() {
        assert_eq!(0.3, accumulation(&windows(&[("1h", 0.3)])));
    }

    #[test]
    fn test_accumulation_1h_overrides_3h() {
        assert_eq!(0.3, accumulation(&windows(&[("3h", 1.5), ("1h", 0.3)])));
    }

    #[test]
    fn test_accumulation_unknown_window() {
        assert_eq!(0.0, accumulation(&windows(&[("24h", 9.0)])));
    }

    #[test]
    fn test_normalize_passthrough() {
        let raw = raw();
        let obs = normalize(&raw);

        assert_eq!("Rain", obs.status);
        assert_eq!("light rain", obs.detailed_status);
        assert_eq!("10d", obs.icon_name);
        assert_eq!("Surhuisterveen", obs.location_name);
        assert_eq!(500.0, obs.weather_code);
        assert_eq!(raw.temperature, obs.temperature);
        assert_eq!(raw.pressure, obs.pressure);
        assert_eq!(raw.humidity, obs.humidity);
        assert_eq!(raw.clouds, obs.clouds);
        assert_eq!(raw.wind_speed, obs.wind_speed);
        assert_eq!(raw.wind_direction, obs.wind_direction);
        assert_eq!(8000.0, obs.visibility);
        assert_eq!(raw.uv_index, obs.uv_index);
    }

    #[test]
    fn test_normalize_missing_visibility() {
        let mut raw = raw();
        raw.visibility = None;
        assert_eq!(DEFAULT_VISIBILITY, normalize(&raw).visibility);
    }

    #[test]
    fn test_normalize_extreme_timestamp() {
        let mut raw = raw();
        raw.sunrise = i64::MAX;
        assert_eq!(i64::MAX as f64 * 1000.0, normalize(&raw).sunrise_ms);
    }

    #[test]
    fn test_normalize_timestamps_millis() {
        let obs = normalize(&raw());
        assert_eq!(1697610000000.0, obs.sunrise_ms);
        assert_eq!(1697647000000.0, obs.sunset_ms);
    }

    #[test]
    fn test_normalize_rain_and_snow() {
        let obs = normalize(&raw());
        assert_eq!(0.4, obs.rain);
        assert_eq!(0.0, obs.snow);
    }
}
