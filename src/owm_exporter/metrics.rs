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

use crate::normalize::NormalizedObservation;
use parking_lot::{Mutex, RwLock};
use prometheus_client::encoding::text;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::AtomicU64;

const SEPARATOR: &str = "_";

type InfoLabels = Vec<(String, String)>;
type InfoFamily = Family<InfoLabels, Gauge>;
type ValueGauge = Gauge<f64, AtomicU64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Info,
}

/// Each value of a `NormalizedObservation` that is exported as a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Temperature,
    Humidity,
    Pressure,
    Clouds,
    WindSpeed,
    WindDirection,
    Visibility,
    Sunrise,
    Sunset,
    WeatherCode,
    Rain,
    Snow,
    UvIndex,
    Status,
    DetailedStatus,
    IconName,
    Location,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::Temperature,
        Field::Humidity,
        Field::Pressure,
        Field::Clouds,
        Field::WindSpeed,
        Field::WindDirection,
        Field::Visibility,
        Field::Sunrise,
        Field::Sunset,
        Field::WeatherCode,
        Field::Rain,
        Field::Snow,
        Field::UvIndex,
        Field::Status,
        Field::DetailedStatus,
        Field::IconName,
        Field::Location,
    ];

    /// Metric name before any prefix is applied. Info records also use this as their label name.
    pub fn base_name(self) -> &'static str {
        match self {
            Field::Temperature => "temp",
            Field::Humidity => "humidity",
            Field::Pressure => "pressure",
            Field::Clouds => "clouds",
            Field::WindSpeed => "wind_speed",
            Field::WindDirection => "wind_deg",
            Field::Visibility => "visibility_distance",
            Field::Sunrise => "sunrise_time",
            Field::Sunset => "sunset_time",
            Field::WeatherCode => "weather_code",
            Field::Rain => "lastrain",
            Field::Snow => "lastsnow",
            Field::UvIndex => "uvi",
            Field::Status => "status",
            Field::DetailedStatus => "detailed_status",
            Field::IconName => "weather_icon_name",
            Field::Location => "location",
        }
    }

    pub fn kind(self) -> MetricKind {
        match self {
            Field::Status | Field::DetailedStatus | Field::IconName | Field::Location => MetricKind::Info,
            _ => MetricKind::Gauge,
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Field::Temperature => "Temperature in celsius",
            Field::Humidity => "Relative humidity (0-100)",
            Field::Pressure => "Atmospheric pressure in hPa",
            Field::Clouds => "Cloud coverage (0-100)",
            Field::WindSpeed => "Wind speed in meters per second",
            Field::WindDirection => "Wind direction in degrees, 0 when not reported",
            Field::Visibility => "Visibility in meters, 10000 when not reported",
            Field::Sunrise => "Sunrise time, UNIX timestamp in milliseconds",
            Field::Sunset => "Sunset time, UNIX timestamp in milliseconds",
            Field::WeatherCode => "Weather condition code",
            Field::Rain => "Rain volume in millimeters for the last 1h or 3h",
            Field::Snow => "Snow volume in millimeters for the last 1h or 3h",
            Field::UvIndex => "UV index",
            Field::Status => "Short weather status",
            Field::DetailedStatus => "Detailed weather status",
            Field::IconName => "Weather icon name",
            Field::Location => "Name of the observed location",
        }
    }

    fn gauge_value(self, obs: &NormalizedObservation) -> Option<f64> {
        match self {
            Field::Temperature => Some(obs.temperature),
            Field::Humidity => Some(obs.humidity),
            Field::Pressure => Some(obs.pressure),
            Field::Clouds => Some(obs.clouds),
            Field::WindSpeed => Some(obs.wind_speed),
            Field::WindDirection => Some(obs.wind_direction),
            Field::Visibility => Some(obs.visibility),
            Field::Sunrise => Some(obs.sunrise_ms),
            Field::Sunset => Some(obs.sunset_ms),
            Field::WeatherCode => Some(obs.weather_code),
            Field::Rain => Some(obs.rain),
            Field::Snow => Some(obs.snow),
            Field::UvIndex => Some(obs.uv_index),
            _ => None,
        }
    }

    fn info_value(self, obs: &NormalizedObservation) -> Option<&str> {
        match self {
            Field::Status => Some(&obs.status),
            Field::DetailedStatus => Some(&obs.detailed_status),
            Field::IconName => Some(&obs.icon_name),
            Field::Location => Some(&obs.location_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: String,
    pub kind: MetricKind,
    pub help: &'static str,
    pub field: Field,
}

/// Final name of a metric: `prefix_base`, or just `base` when there is no prefix.
pub fn metric_name(prefix: &str, base: &str) -> String {
    if prefix.is_empty() {
        base.to_owned()
    } else {
        format!("{}{}{}", prefix, SEPARATOR, base)
    }
}

/// Escape text for use as a label value in the text exposition format, which the
/// encoder writes as-is between double quotes.
fn escape_label_value(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Every metric exported for a given prefix, keyed by final metric name.
pub fn definitions(prefix: &str) -> BTreeMap<String, MetricDefinition> {
    Field::ALL
        .iter()
        .map(|&field| {
            let name = metric_name(prefix, field.base_name());
            let def = MetricDefinition {
                name: name.clone(),
                kind: field.kind(),
                help: field.help(),
                field,
            };

            (name, def)
        })
        .collect()
}

#[derive(Debug)]
enum Published {
    Gauge(ValueGauge),
    Info {
        family: InfoFamily,
        current: Option<(String, InfoLabels)>,
    },
}

/// Holder for metrics that are set from a `NormalizedObservation`.
///
/// Metrics are registered the first time they are published so that nothing
/// is exposed before the first successful poll. Each gauge update is atomic on
/// its own, scrapes during a publish may see a mix of old and new values.
#[derive(Debug)]
pub struct WeatherMetrics {
    definitions: BTreeMap<String, MetricDefinition>,
    registry: RwLock<Registry>,
    published: Mutex<BTreeMap<String, Published>>,
}

impl WeatherMetrics {
    pub fn new(prefix: &str) -> Self {
        WeatherMetrics {
            definitions: definitions(prefix),
            registry: RwLock::new(Registry::default()),
            published: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn definitions(&self) -> &BTreeMap<String, MetricDefinition> {
        &self.definitions
    }

    /// Set every metric from the provided observation, overwriting previous values.
    pub fn publish(&self, obs: &NormalizedObservation) {
        let mut published = self.published.lock();

        for (name, def) in self.definitions.iter() {
            match def.kind {
                MetricKind::Gauge => {
                    if let Some(v) = def.field.gauge_value(obs) {
                        if let Published::Gauge(g) = self.get_or_register(&mut published, def) {
                            g.set(v);
                            tracing::trace!(message = "published gauge", name = %name, value = v);
                        }
                    }
                }
                MetricKind::Info => {
                    if let Some(text) = def.field.info_value(obs) {
                        if let Published::Info { family, current } = self.get_or_register(&mut published, def) {
                            let labels = vec![(def.field.base_name().to_owned(), escape_label_value(text))];
                            family.get_or_create(&labels).set(1);

                            if let Some((_, previous)) = current.replace((text.to_owned(), labels.clone())) {
                                if previous != labels {
                                    family.remove(&previous);
                                }
                            }
                            tracing::trace!(message = "published info", name = %name, value = %text);
                        }
                    }
                }
            }
        }
    }

    fn get_or_register<'a>(
        &self,
        published: &'a mut BTreeMap<String, Published>,
        def: &MetricDefinition,
    ) -> &'a mut Published {
        published.entry(def.name.clone()).or_insert_with(|| {
            let mut registry = self.registry.write();
            match def.kind {
                MetricKind::Gauge => {
                    let gauge = ValueGauge::default();
                    registry.register(def.name.clone(), def.help, gauge.clone());
                    Published::Gauge(gauge)
                }
                MetricKind::Info => {
                    let family = InfoFamily::default();
                    registry.register(def.name.clone(), def.help, family.clone());
                    Published::Info { family, current: None }
                }
            }
        })
    }

    /// Number of metrics registered so far.
    pub fn registered(&self) -> usize {
        self.published.lock().len()
    }

    /// Current value of the gauge with the given final name, if it has been published.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        match self.published.lock().get(name) {
            Some(Published::Gauge(g)) => Some(g.get()),
            _ => None,
        }
    }

    /// Current text of the info record with the given final name, if it has been published.
    pub fn info(&self, name: &str) -> Option<String> {
        match self.published.lock().get(name) {
            Some(Published::Info { current, .. }) => current.as_ref().map(|(text, _)| text.clone()),
            _ => None,
        }
    }

    /// Encode all registered metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();
        text::encode(&mut buf, &self.registry.read())?;
        Ok(buf)
    }
}
