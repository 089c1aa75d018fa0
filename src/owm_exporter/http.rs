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
use crate::metrics::WeatherMetrics;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const TEXT_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// State shared by all requests to the metrics endpoint.
#[derive(Debug)]
pub struct RequestContext {
    metrics: Arc<WeatherMetrics>,
}

impl RequestContext {
    pub fn new(metrics: Arc<WeatherMetrics>) -> Self {
        Self { metrics }
    }
}

/// Router serving the current metrics at `GET /metrics`.
pub fn text_metrics(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn metrics_handler(State(context): State<Arc<RequestContext>>) -> Response {
    match context.metrics.render() {
        Ok(buf) => {
            tracing::debug!(
                message = "encoded prometheus metrics to text format",
                num_bytes = buf.len(),
            );

            (StatusCode::OK, [(CONTENT_TYPE, TEXT_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Bind to `addr` and serve `router` until `shutdown` completes.
pub async fn serve<F>(router: Router, addr: SocketAddr, shutdown: F) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    let server = axum::Server::try_bind(&addr)
        .map_err(|e| StartupError::BindFailure(addr, e))?
        .serve(router.into_make_service());

    tracing::info!(message = "server started", address = %server.local_addr());
    server.with_graceful_shutdown(shutdown).await.map_err(StartupError::Server)
}
