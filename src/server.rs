//! Web server implementation using Axum.

use axum::{
    Router,
    body::Body,
    extract::{Json as ExtractJson, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::camera::{
    BroadcastHub, StillCapture, StillCatalog, StillRecord, StreamSupervisor, status,
};
use crate::config::Settings;
use crate::weather::WeatherService;
use crate::{OurError, OurResult, car_temp, network, system};

/// Application state shared across handlers
pub struct AppState {
    pub settings: Settings,
    pub supervisor: Arc<StreamSupervisor>,
    pub still: StillCapture,
    pub catalog: StillCatalog,
    pub weather: WeatherService,
}

/// Wire up the shared state from settings
pub fn build_state(settings: Settings) -> OurResult<Arc<AppState>> {
    let hub = Arc::new(BroadcastHub::new());
    let supervisor = Arc::new(StreamSupervisor::new(settings.camera.clone(), hub));
    let still = StillCapture::new(settings.camera.clone(), supervisor.clone());
    let catalog = StillCatalog::new(settings.stills_directory.clone());
    catalog.ensure_directory()?;
    let weather = WeatherService::new(
        settings.weather_latitude,
        settings.weather_longitude,
        settings.weather_cache_minutes,
    )?;

    Ok(Arc::new(AppState {
        settings,
        supervisor,
        still,
        catalog,
        weather,
    }))
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let public_directory = state.settings.public_directory.clone();

    Router::new()
        // Camera API
        .route("/api/camera/status", get(camera_status))
        .route("/camera/stream", get(camera_stream))
        .route("/api/camera/snapshot", post(capture_snapshot))
        .route("/api/camera/stills", get(list_stills))
        .route(
            "/api/camera/stills/{id}",
            patch(rename_still).delete(delete_still),
        )
        .route("/api/camera/stills/{id}/image", get(still_image))
        // Dashboard API
        .route("/api/system-stats", get(system_stats))
        .route("/api/network-info", get(network_info))
        .route("/api/car-temp", get(car_temp_reading))
        .route("/api/reboot", post(reboot))
        .route("/api/weather", get(weather_forecast))
        .route("/config.js", get(frontend_config))
        .fallback_service(ServeDir::new(public_directory))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn start_server(settings: Settings) -> OurResult<()> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let state = build_state(settings)?;
    let app = router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| OurError::App(format!("Failed to bind to {addr}: {e}")))?;

    info!("pi-control listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| OurError::App(format!("Server error: {e}")))?;

    Ok(())
}

/// Error wrapper mapping domain errors onto HTTP statuses with an
/// `{"error": ...}` body
pub(crate) struct ApiError(OurError);

impl From<OurError> for ApiError {
    fn from(err: OurError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OurError::NotFound(_) => StatusCode::NOT_FOUND,
            OurError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OurError::Busy(_) => StatusCode::CONFLICT,
            OurError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OurError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

/// A still record plus its access URL, as returned by the API
#[derive(Serialize)]
struct StillEntry {
    id: String,
    name: Option<String>,
    url: String,
    created: chrono::DateTime<chrono::Utc>,
    size: u64,
    width: u32,
    height: u32,
}

impl From<StillRecord> for StillEntry {
    fn from(record: StillRecord) -> Self {
        let url = record.url();
        Self {
            id: record.id,
            name: record.name,
            url,
            created: record.created,
            size: record.size,
            width: record.width,
            height: record.height,
        }
    }
}

// Handler implementations

async fn camera_status(State(state): State<Arc<AppState>>) -> Json<status::CameraStatus> {
    Json(status::report(&state.settings.camera))
}

async fn camera_stream(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    // Subscribe before spawning so a capture process that dies immediately
    // still closes this channel when its teardown drains the subscriber set
    let mut rx = state.supervisor.hub().subscribe();
    if let Err(e) = state.supervisor.ensure_started() {
        drop(rx);
        return Err(e.into());
    }
    let stream = async_stream::stream! {
        while let Some(part) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(part);
        }
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, BroadcastHub::content_type()),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotRequest {
    width: Option<serde_json::Value>,
    height: Option<serde_json::Value>,
    name: Option<String>,
}

/// Dimensions arrive from the frontend as numbers or numeric strings.
/// Anything non-finite or below one pixel falls back to the configured
/// default rather than failing the request.
fn lenient_dimension(value: Option<&serde_json::Value>) -> Option<u32> {
    let number = match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if !number.is_finite() || number < 1.0 {
        return None;
    }
    Some(number.round() as u32)
}

async fn capture_snapshot(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<StillEntry>, ApiError> {
    // The body is optional; an empty POST captures at the defaults
    let request: SnapshotRequest = if body.is_empty() {
        SnapshotRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| OurError::InvalidRequest(format!("bad snapshot request body: {e}")))?
    };

    let width = lenient_dimension(request.width.as_ref());
    let height = lenient_dimension(request.height.as_ref());
    let image = state.still.capture(width, height).await?;
    let record = state
        .catalog
        .create(&image.data, image.width, image.height, request.name)?;

    Ok(Json(record.into()))
}

async fn list_stills(State(state): State<Arc<AppState>>) -> Result<Json<Vec<StillEntry>>, ApiError> {
    let entries = state
        .catalog
        .list()?
        .into_iter()
        .map(StillEntry::from)
        .collect();
    Ok(Json(entries))
}

#[derive(Deserialize)]
struct RenameRequest {
    name: String,
}

async fn rename_still(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    ExtractJson(payload): ExtractJson<RenameRequest>,
) -> Result<Json<StillEntry>, ApiError> {
    let record = state.catalog.rename(&id, payload.name)?;
    Ok(Json(record.into()))
}

async fn delete_still(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn still_image(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let data = state.catalog.image(&id)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/jpeg")],
        data,
    )
        .into_response())
}

async fn system_stats() -> Json<system::SystemStats> {
    Json(system::read())
}

async fn network_info() -> Json<network::NetworkInfo> {
    Json(network::gather().await)
}

async fn car_temp_reading(
    State(state): State<Arc<AppState>>,
) -> Result<Json<car_temp::CarTempReading>, ApiError> {
    let reading = car_temp::read(&state.settings.car_temp).await?;
    Ok(Json(reading))
}

async fn reboot(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    system::reboot(&state.settings.reboot_command).await?;
    Ok(Json(serde_json::json!({ "message": "Rebooting..." })))
}

#[derive(Deserialize)]
struct WeatherQuery {
    lat: Option<f64>,
    lon: Option<f64>,
}

async fn weather_forecast(
    Query(query): Query<WeatherQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<crate::weather::Forecast>, ApiError> {
    let forecast = state.weather.forecast(query.lat, query.lon).await?;
    Ok(Json(forecast))
}

/// Minimal frontend configuration (tile source and camera bounds) exposed
/// as a JS global
async fn frontend_config(State(state): State<Arc<AppState>>) -> Response {
    let settings = &state.settings;
    let config = serde_json::json!({
        "tiles": {
            "url": settings.tiles.url,
            "attribution": settings.tiles.attribution,
            "maxZoom": settings.tiles.max_zoom,
            "maxNativeZoom": settings.tiles.max_native_zoom,
            "fallbackUrl": settings.tiles.fallback_url,
            "fallbackAttribution": settings.tiles.fallback_attribution,
        },
        "camera": {
            "streamUrl": "/camera/stream",
            "maxStill": settings.camera.max_still,
            "snapshotDefault": settings.camera.default_still,
        },
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/javascript")],
        format!("window.PI_CONTROL_CONFIG={config};"),
    )
        .into_response()
}
