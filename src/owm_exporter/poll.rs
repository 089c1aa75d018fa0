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

use crate::client::{FetchError, ObservationSource};
use crate::metrics::WeatherMetrics;
use crate::normalize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Level};

/// Outcome of a single fetch, normalize, and publish cycle.
#[derive(Debug)]
pub enum PollCycleResult {
    Published,
    Failed(FetchError),
}

impl PollCycleResult {
    pub fn is_published(&self) -> bool {
        matches!(self, PollCycleResult::Published)
    }
}

/// Periodically fetch observations for one location and publish them as metrics.
///
/// Cycles never overlap: the next sleep only starts once the previous cycle has
/// published or failed. A failed cycle leaves all metrics at their previous values.
pub struct Poller<S> {
    source: S,
    metrics: Arc<WeatherMetrics>,
    location: String,
    interval: Duration,
    poll_on_startup: bool,
}

impl<S> Poller<S>
where
    S: ObservationSource,
{
    pub fn new(
        source: S,
        metrics: Arc<WeatherMetrics>,
        location: &str,
        interval: Duration,
        poll_on_startup: bool,
    ) -> Self {
        Poller {
            source,
            metrics,
            location: location.to_owned(),
            interval,
            poll_on_startup,
        }
    }

    /// Run one cycle, logging (but otherwise ignoring) any failure.
    pub async fn run_cycle(&self) -> PollCycleResult {
        let raw = match self
            .source
            .fetch(&self.location)
            .instrument(tracing::span!(Level::DEBUG, "owm_observation"))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(
                    message = "failed to fetch observation, keeping previous values",
                    stage = "fetch",
                    location = %self.location,
                    error = %e,
                );
                return PollCycleResult::Failed(e);
            }
        };

        let obs = normalize::normalize(&raw);
        self.metrics.publish(&obs);

        tracing::info!(
            message = "published new observation",
            location = %obs.location_name,
            status = %obs.status,
            temperature = obs.temperature,
        );
        PollCycleResult::Published
    }

    /// Poll forever. The first cycle runs immediately if `poll_on_startup` is set,
    /// otherwise after one interval.
    pub async fn run(self) {
        tracing::info!(
            message = "observation polling started",
            location = %self.location,
            interval_secs = self.interval.as_secs(),
            poll_on_startup = self.poll_on_startup,
        );

        if !self.poll_on_startup {
            tokio::time::sleep(self.interval).await;
        }

        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PollCycleResult, Poller};
    use crate::client::{FetchError, ObservationSource, RawObservation};
    use crate::metrics::WeatherMetrics;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const INTERVAL: Duration = Duration::from_secs(300);

    fn raw(temperature: f64) -> RawObservation {
        RawObservation {
            status: "Clear".to_owned(),
            detailed_status: "clear sky".to_owned(),
            weather_code: 800,
            icon_name: "01d".to_owned(),
            temperature,
            pressure: 1020.0,
            humidity: 60.0,
            clouds: 0.0,
            wind_speed: 2.0,
            wind_direction: 90.0,
            visibility: Some(10000.0),
            sunrise: 1697610000,
            sunset: 1697647000,
            rain: BTreeMap::new(),
            snow: BTreeMap::new(),
            location_name: "Surhuisterveen".to_owned(),
            latitude: 53.18,
            longitude: 6.18,
            uv_index: 1.0,
        }
    }

    /// Returns queued results in order, then keeps failing with `NotFound`.
    struct Scripted {
        results: parking_lot::Mutex<VecDeque<Result<RawObservation, FetchError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(results: Vec<Result<RawObservation, FetchError>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Scripted {
                results: parking_lot::Mutex::new(results.into()),
                calls: calls.clone(),
            };
            (source, calls)
        }
    }

    #[async_trait]
    impl ObservationSource for Scripted {
        async fn fetch(&self, location: &str) -> Result<RawObservation, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::NotFound(location.to_owned())))
        }
    }

    #[tokio::test]
    async fn test_run_cycle_publishes() {
        let metrics = Arc::new(WeatherMetrics::new("openweathermap"));
        let (source, calls) = Scripted::new(vec![Ok(raw(14.5))]);
        let poller = Poller::new(source, metrics.clone(), "Surhuisterveen,NL", INTERVAL, true);

        assert!(poller.run_cycle().await.is_published());
        assert_eq!(1, calls.load(Ordering::SeqCst));
        assert_eq!(Some(14.5), metrics.gauge("openweathermap_temp"));
    }

    #[tokio::test]
    async fn test_run_cycle_failure_keeps_values() {
        let metrics = Arc::new(WeatherMetrics::new("openweathermap"));
        let (source, _) = Scripted::new(vec![Ok(raw(14.5)), Err(FetchError::Unauthorized)]);
        let poller = Poller::new(source, metrics.clone(), "Surhuisterveen,NL", INTERVAL, true);

        assert!(poller.run_cycle().await.is_published());
        let before = metrics.render().unwrap();

        let res = poller.run_cycle().await;
        assert!(matches!(res, PollCycleResult::Failed(FetchError::Unauthorized)));
        assert_eq!(before, metrics.render().unwrap());
    }

    #[tokio::test]
    async fn test_run_cycle_failure_before_any_success() {
        let metrics = Arc::new(WeatherMetrics::new("openweathermap"));
        let (source, _) = Scripted::new(vec![]);
        let poller = Poller::new(source, metrics.clone(), "Nowhere,XX", INTERVAL, true);

        assert!(!poller.run_cycle().await.is_published());
        assert_eq!(0, metrics.registered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_on_startup_and_survives_failures() {
        let metrics = Arc::new(WeatherMetrics::new("openweathermap"));
        let (source, calls) = Scripted::new(vec![Ok(raw(14.5)), Err(FetchError::Unauthorized), Ok(raw(16.0))]);
        let poller = Poller::new(source, metrics.clone(), "Surhuisterveen,NL", INTERVAL, true);

        let handle = tokio::spawn(poller.run());
        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(1, calls.load(Ordering::SeqCst));
        assert_eq!(Some(14.5), metrics.gauge("openweathermap_temp"));

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(2, calls.load(Ordering::SeqCst));
        assert_eq!(Some(14.5), metrics.gauge("openweathermap_temp"));

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(3, calls.load(Ordering::SeqCst));
        assert_eq!(Some(16.0), metrics.gauge("openweathermap_temp"));

        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sleeps_first_without_startup_poll() {
        let metrics = Arc::new(WeatherMetrics::new("openweathermap"));
        let (source, calls) = Scripted::new(vec![Ok(raw(14.5))]);
        let poller = Poller::new(source, metrics.clone(), "Surhuisterveen,NL", INTERVAL, false);

        let handle = tokio::spawn(poller.run());
        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(0, calls.load(Ordering::SeqCst));
        assert_eq!(None, metrics.gauge("openweathermap_temp"));

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(1, calls.load(Ordering::SeqCst));
        assert_eq!(Some(14.5), metrics.gauge("openweathermap_temp"));

        handle.abort();
    }
}
