use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::PrometheusReporter;
use crate::application::services::SessionRegistry;
use crate::domain::value_objects::SupervisionState;

/// Health check response structure
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(serde::Serialize)]
struct StatusResponse {
    forwarding: bool,
    sessions: BTreeMap<String, SupervisionState>,
}

fn with_sessions(
    sessions: Arc<SessionRegistry>,
) -> impl Filter<Extract = (Arc<SessionRegistry>,), Error = Infallible> + Clone {
    warp::any().map(move || sessions.clone())
}

/// Metrics, probes, session status and per-camera restart.
pub fn routes(
    sessions: Arc<SessionRegistry>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics_route = warp::get().and(warp::path("metrics")).and(warp::path::end()).map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    let health_route = warp::get().and(warp::path("health")).and(warp::path::end()).map(|| {
        warp::reply::json(&HealthResponse {
            status: "healthy",
            service: "micam-bridge",
            version: env!("CARGO_PKG_VERSION"),
        })
    });

    // Liveness: the daemon is up, whatever the camera is doing
    let liveness_route = warp::get()
        .and(warp::path("livez"))
        .and(warp::path::end())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    // Readiness: every session is forwarding
    let readiness_route = warp::get()
        .and(warp::path("readyz"))
        .and(warp::path::end())
        .and(with_sessions(sessions.clone()))
        .map(|sessions: Arc<SessionRegistry>| {
            let (status, code) = if sessions.all_forwarding() {
                ("ready", StatusCode::OK)
            } else {
                ("not_ready", StatusCode::SERVICE_UNAVAILABLE)
            };
            warp::reply::with_status(
                warp::reply::json(&HealthResponse {
                    status,
                    service: "micam-bridge",
                    version: env!("CARGO_PKG_VERSION"),
                }),
                code,
            )
        });

    let status_route = warp::get()
        .and(warp::path("status"))
        .and(warp::path::end())
        .and(with_sessions(sessions.clone()))
        .map(|sessions: Arc<SessionRegistry>| {
            warp::reply::json(&StatusResponse {
                forwarding: sessions.all_forwarding(),
                sessions: sessions.states(),
            })
        });

    let restart_route = warp::post()
        .and(warp::path!("sessions" / String / "restart"))
        .and(with_sessions(sessions))
        .map(|camera_id: String, sessions: Arc<SessionRegistry>| {
            match sessions.restart(&camera_id) {
                Ok(()) => warp::reply::with_status(
                    warp::reply::json(&serde_json::json!({
                        "camera": camera_id,
                        "restart": "requested",
                    })),
                    StatusCode::ACCEPTED,
                ),
                Err(e) => warp::reply::with_status(
                    warp::reply::json(&serde_json::json!({ "error": e.to_string() })),
                    StatusCode::NOT_FOUND,
                ),
            }
        });

    metrics_route
        .or(health_route)
        .or(liveness_route)
        .or(readiness_route)
        .or(status_route)
        .or(restart_route)
        .with(cors)
}

/// Bind the status server on all interfaces. The returned future serves until
/// `shutdown` resolves.
pub fn bind_status_server(
    port: u16,
    sessions: Arc<SessionRegistry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    tracing::info!("Status server starting on port {}", port);
    warp::serve(routes(sessions)).try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), shutdown)
}
