//! Health check HTTP server
//!
//! Exposes the latest provider status over HTTP so a supervisor (systemd, a
//! container runtime, a chart-plotter dashboard) can see whether telemetry is
//! flowing.
//!
//! - `GET /health` - status text, error text and link state; 503 unless connected
//! - `GET /ready` - 200 once the broker link is up
//! - `GET /live` - always 200 while the process runs

use super::status::ProviderStatus;
use crate::bridge::supervisor::LinkState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::sync::watch;
use warp::http::StatusCode;
use warp::Filter;

/// HTTP health check server
#[derive(Clone)]
pub struct HealthServer {
    status: watch::Receiver<ProviderStatus>,
    port: u16,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    healthy: bool,
    status: String,
    error: Option<String>,
    link: LinkState,
    updated_at: DateTime<Utc>,
    uptime_seconds: i64,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: DateTime<Utc>,
}

impl HealthServer {
    pub fn new(status: watch::Receiver<ProviderStatus>, port: u16) -> Self {
        Self {
            status,
            port,
            started_at: Utc::now(),
        }
    }

    fn health_response(&self) -> (HealthResponse, StatusCode) {
        let snapshot = self.status.borrow().clone();
        let healthy = snapshot.link.is_connected();
        let response = HealthResponse {
            healthy,
            status: snapshot.status,
            error: snapshot.error,
            link: snapshot.link,
            updated_at: snapshot.updated_at,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
        };
        let code = if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (response, code)
    }

    /// All routes, without binding a socket
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let health_server = self.clone();
        let ready_server = self.clone();

        let health = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let (response, code) = health_server.health_response();
                async move {
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&response),
                        code,
                    ))
                }
            });

        let ready = warp::path("ready")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let ready = ready_server.status.borrow().link.is_connected();
                async move {
                    let code = if ready {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    let response = ReadinessResponse {
                        ready,
                        timestamp: Utc::now(),
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&response),
                        code,
                    ))
                }
            });

        let live = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| {
                warp::reply::json(&LivenessResponse {
                    alive: true,
                    timestamp: Utc::now(),
                })
            });

        health.or(ready).or(live)
    }

    /// Serve until `shutdown` resolves
    pub async fn serve(self, shutdown: impl std::future::Future<Output = ()> + Send + 'static) {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let routes = self.routes();
        tracing::info!("Starting health server on port {}", self.port);
        let (_, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, shutdown);
        server.await;
        tracing::debug!("Health server stopped");
    }
}
