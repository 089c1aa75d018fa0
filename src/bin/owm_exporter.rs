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

use clap::Parser;
use owm_exporter::client::OpenWeatherClient;
use owm_exporter::config::ExporterConfig;
use owm_exporter::error::StartupError;
use owm_exporter::http::RequestContext;
use owm_exporter::metrics::WeatherMetrics;
use owm_exporter::poll::Poller;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{self, SignalKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = ExporterConfig::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let settings = opts.settings().unwrap_or_else(|e| {
        tracing::error!(message = "invalid configuration", error = %e);
        process::exit(1)
    });

    let http_client = Client::builder()
        .timeout(settings.timeout)
        .build()
        .map_err(StartupError::Client)
        .unwrap_or_else(|e| {
            tracing::error!(message = "unable to initialize HTTP client", error = %e);
            process::exit(1)
        });

    // Make an initial lookup of the location to give early feedback about a bad location or API
    // key. Failures here aren't fatal since the location is looked up again on every poll.
    let client = OpenWeatherClient::new(
        http_client,
        settings.api_url.clone(),
        &settings.api_key,
        &settings.language,
    );
    match client.locate(&settings.location).await {
        Err(e) => {
            tracing::warn!(message = "failed to verify location", location = %settings.location, error = %e);
        }
        Ok(p) => {
            tracing::debug!(message = "verified location", location = ?p);
        }
    }

    let metrics = Arc::new(WeatherMetrics::new(&settings.prefix));
    let poller = Poller::new(
        client,
        metrics.clone(),
        &settings.location,
        settings.interval,
        settings.poll_on_startup,
    );
    tokio::spawn(poller.run());

    let context = Arc::new(RequestContext::new(metrics));
    let handler = owm_exporter::http::text_metrics(context);
    let res = owm_exporter::http::serve(handler, settings.bind, async {
        // Wait for either SIGTERM or SIGINT to shutdown
        tokio::select! {
            _ = sigterm() => {}
            _ = sigint() => {}
        }
    })
    .await;

    if let Err(e) = res {
        tracing::error!(message = "error running server", address = %settings.bind, error = %e);
        process::exit(1)
    }

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
