//! Read-only stats endpoint
//!
//! - `GET /health` always answers `ok`
//! - `GET /stats` returns host info, service status, the latest resource
//!   sample, recent alerts, endpoint and container history and the tracked
//!   alert states as JSON
//!
//! When credentials are configured every route except `/health` requires
//! HTTP Basic auth.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use monic_core::config::StatsServerConfig;
use monic_core::{AlertEvent, AlertState, ContainerSample, EndpointResult, Monitor, ResourceSample, ServiceStatus};
use serde::Serialize;
use tracing::{info, warn};

use crate::discovery::HostInfo;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub host: Arc<HostInfo>,
    pub credentials: Option<(String, String)>,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>, host: HostInfo, config: &StatsServerConfig) -> Self {
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user.clone(), pass.clone())),
            _ => None,
        };
        Self {
            monitor,
            host: Arc::new(host),
            credentials,
        }
    }
}

#[derive(Serialize)]
struct StatsView {
    host: HostInfo,
    status: ServiceStatus,
    resources: Option<ResourceSample>,
    alerts: Vec<AlertEvent>,
    endpoints: Vec<EndpointResult>,
    containers: Vec<ContainerSample>,
    alert_states: Vec<AlertState>,
}

async fn require_basic_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if req.uri().path().starts_with("/health") {
        return next.run(req).await;
    }
    let Some((user, pass)) = &state.credentials else {
        return next.run(req).await;
    };

    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(decode_basic)
        .map(|(u, p)| &u == user && &p == pass)
        .unwrap_or(false);

    if !authorized {
        warn!(path = %req.uri().path(), "Unauthorized stats request");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"Monic\"")],
            "unauthorized",
        )
            .into_response();
    }
    next.run(req).await
}

/// Decodes an `Authorization: Basic ...` value into user and password.
fn decode_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsView> {
    let monitor = &state.monitor;
    let history = monitor.history();
    Json(StatsView {
        host: (*state.host).clone(),
        status: monitor.status(),
        resources: history.resources().latest(),
        alerts: history.alerts().all(),
        endpoints: history.endpoints().all(),
        containers: history.containers().all(),
        alert_states: monitor.states().snapshot(),
    })
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(get_stats))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_basic_auth))
        .with_state(app_state)
}

/// Serves the stats router until `shutdown` resolves.
pub async fn serve<F>(config: &StatsServerConfig, app_state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind stats server on {}", addr))?;
    info!("Stats server listening on http://{}", addr);

    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Stats server failed")?;
    info!("Stats server stopped");
    Ok(())
}
