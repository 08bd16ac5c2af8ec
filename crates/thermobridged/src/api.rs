//! Hub-facing HTTP surface.
//!
//! Exposes the four thermostat characteristics of every configured accessory.
//! This is the only place that adapts the engine's async operations to the
//! hub's calling convention; all semantics live in the engine.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::device;
use crate::device::HttpTransport;
use crate::engine::HeatingMode;
use crate::engine::Thermostat;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    accessories: Vec<String>,
}

#[derive(Serialize)]
struct TemperatureResponse {
    value: f64,
}

#[derive(Serialize)]
struct ModeResponse {
    value: u8,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct SetTemperatureRequest {
    value: f64,
}

#[derive(Deserialize)]
struct SetModeRequest {
    value: u8,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    accessories: Arc<HashMap<String, Arc<Thermostat<HttpTransport>>>>,
}

impl AppState {
    fn accessory(&self, id: &str) -> Result<&Arc<Thermostat<HttpTransport>>, Response> {
        self.accessories.get(id).ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("unknown accessory: {id}"),
                }),
            )
                .into_response()
        })
    }
}

/// Engine failures surface as a service-communication failure, whatever the
/// underlying cause.
fn communication_failure(err: device::Error) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Handler for GET /v1/ping
#[tracing::instrument(skip_all)]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip_all)]
async fn info(State(state): State<AppState>) -> impl IntoResponse {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let mut accessories: Vec<String> = state.accessories.keys().cloned().collect();
    accessories.sort();

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
            accessories,
        }),
    )
}

#[tracing::instrument(skip(state))]
async fn current_temperature(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let thermostat = match state.accessory(&id) {
        Ok(t) => t,
        Err(response) => return response,
    };

    match thermostat.current_temperature().await {
        Ok(value) => (StatusCode::OK, Json(TemperatureResponse { value })).into_response(),
        Err(e) => communication_failure(e),
    }
}

#[tracing::instrument(skip(state))]
async fn target_temperature(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.accessory(&id) {
        Ok(thermostat) => (
            StatusCode::OK,
            Json(TemperatureResponse {
                value: thermostat.target_temperature(),
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}

#[tracing::instrument(skip(state, request))]
async fn set_target_temperature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetTemperatureRequest>,
) -> Response {
    let thermostat = match state.accessory(&id) {
        Ok(t) => t,
        Err(response) => return response,
    };

    match thermostat.set_target_temperature(request.value).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => communication_failure(e),
    }
}

#[tracing::instrument(skip(state))]
async fn target_mode(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.accessory(&id) {
        Ok(thermostat) => (
            StatusCode::OK,
            Json(ModeResponse {
                value: thermostat.target_mode().into(),
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}

#[tracing::instrument(skip(state, request))]
async fn set_target_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetModeRequest>,
) -> Response {
    let thermostat = match state.accessory(&id) {
        Ok(t) => t,
        Err(response) => return response,
    };

    let mode = match HeatingMode::try_from(request.value) {
        Ok(mode) => mode,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    match thermostat.set_target_mode(mode).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => communication_failure(e),
    }
}

#[tracing::instrument(skip(state))]
async fn current_mode(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.accessory(&id) {
        Ok(thermostat) => (
            StatusCode::OK,
            Json(ModeResponse {
                value: thermostat.current_mode().into(),
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}

/// Create the API router with all endpoints
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route(
            "/v1/accessories/:id/current-temperature",
            get(current_temperature),
        )
        .route(
            "/v1/accessories/:id/target-temperature",
            get(target_temperature).put(set_target_temperature),
        )
        .route(
            "/v1/accessories/:id/target-mode",
            get(target_mode).put(set_target_mode),
        )
        .route("/v1/accessories/:id/current-mode", get(current_mode))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the hub-facing HTTP server
///
/// Binds to the specified address and serves the characteristic endpoints
/// until the provided shutdown signal is triggered.
pub async fn serve(
    accessories: HashMap<String, Arc<Thermostat<HttpTransport>>>,
    listen: String,
    port: u16,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let state = AppState {
        version: env!("CARGO_PKG_VERSION"),
        accessories: Arc::new(accessories),
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting hub API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("Hub API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
