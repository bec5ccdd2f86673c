use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    config::Config,
    db::RailwayDb,
    railway::{
        RailwayError, RailwayService,
        types::{PageRequest, Signal, Track},
    },
};


#[derive(Clone)]
pub struct AppState {
    config: Config,
    service: RailwayService,
    db: Option<Arc<RailwayDb>>,
    store_driver: &'static str,
    started_at: chrono::DateTime<Utc>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: Config,
        service: RailwayService,
        db: Option<Arc<RailwayDb>>,
        store_driver: &'static str,
    ) -> Self {
        Self {
            config,
            service,
            db,
            store_driver,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    build_sha: String,
    store_driver: &'static str,
    uptime_seconds: i64,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    store_driver: &'static str,
    store_ready: bool,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<String>,
    page: Option<String>,
}

#[derive(Debug, Serialize)]
struct SignalsResponse {
    signals: Vec<Signal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_page: Option<u32>,
}

#[derive(Debug, Serialize)]
struct TracksResponse {
    tracks: Vec<Track>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_page: Option<u32>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_millis(state.config.request_timeout_ms);
    let load_max_body_bytes = state.config.load_max_body_bytes;

    Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(readiness))
        .route("/v1/signals", get(list_signals).post(create_signal))
        .route(
            "/v1/signals/:id",
            get(get_signal).put(update_signal).delete(delete_signal),
        )
        .route("/v1/signals/:id/tracks", get(list_signal_tracks))
        .route("/v1/tracks", get(list_tracks).post(create_track))
        .route(
            "/v1/tracks/load",
            post(load_track_signals).layer(DefaultBodyLimit::max(load_max_body_bytes)),
        )
        .route(
            "/v1/tracks/:id",
            get(get_track).put(update_track).delete(delete_track),
        )
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = (Utc::now() - state.started_at).num_seconds();
    Json(HealthResponse {
        status: "ok",
        service: state.config.service_name,
        build_sha: state.config.build_sha,
        store_driver: state.store_driver,
        uptime_seconds,
    })
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let store_ready = match state.db.as_ref() {
        Some(db) => match db.ping().await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(reason = %error, "railway store not ready");
                false
            }
        },
        None => true,
    };
    let status = if store_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            status: if store_ready { "ready" } else { "not_ready" },
            store_driver: state.store_driver,
            store_ready,
        }),
    )
}

async fn list_signals(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<SignalsResponse>, ApiError> {
    let request = page_request(&state.config, &query)?;
    let page = state
        .service
        .list_signals(request)
        .await
        .map_err(ApiError::from_railway)?;
    Ok(Json(SignalsResponse {
        signals: page.items,
        next_page: page.next_page,
    }))
}

async fn get_signal(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Signal>, ApiError> {
    let signal_id = parse_id(&raw_id, "signal")?;
    let signal = state
        .service
        .get_signal(signal_id)
        .await
        .map_err(ApiError::from_railway)?;
    Ok(Json(signal))
}

/// Responds with the stored signal, which for an existing id is the earlier
/// record rather than the submitted one.
async fn create_signal(
    State(state): State<AppState>,
    payload: Result<Json<Signal>, JsonRejection>,
) -> Result<(StatusCode, Json<Signal>), ApiError> {
    let Json(signal) = payload.map_err(ApiError::from_json_rejection)?;
    let signal = state
        .service
        .create_signal(signal)
        .await
        .map_err(ApiError::from_railway)?;
    Ok((StatusCode::CREATED, Json(signal)))
}

async fn update_signal(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<Signal>, JsonRejection>,
) -> Result<Json<Signal>, ApiError> {
    let signal_id = parse_id(&raw_id, "signal")?;
    let Json(mut signal) = payload.map_err(ApiError::from_json_rejection)?;
    signal.id = signal_id;
    let signal = state
        .service
        .update_signal(signal)
        .await
        .map_err(ApiError::from_railway)?;
    Ok(Json(signal))
}

async fn delete_signal(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let signal_id = parse_id(&raw_id, "signal")?;
    state
        .service
        .delete_signal(signal_id)
        .await
        .map_err(ApiError::from_railway)?;
    Ok(Json(MessageResponse {
        message: "deleted successfully",
    }))
}

async fn list_signal_tracks(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TracksResponse>, ApiError> {
    let signal_id = parse_id(&raw_id, "signal")?;
    let request = page_request(&state.config, &query)?;
    let page = state
        .service
        .list_signal_tracks(signal_id, request)
        .await
        .map_err(ApiError::from_railway)?;
    Ok(Json(TracksResponse {
        tracks: page.items,
        next_page: page.next_page,
    }))
}

async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TracksResponse>, ApiError> {
    let request = page_request(&state.config, &query)?;
    let page = state
        .service
        .list_tracks(request)
        .await
        .map_err(ApiError::from_railway)?;
    Ok(Json(TracksResponse {
        tracks: page.items,
        next_page: page.next_page,
    }))
}

async fn get_track(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Track>, ApiError> {
    let track_id = parse_id(&raw_id, "track")?;
    let track = state
        .service
        .get_track(track_id)
        .await
        .map_err(ApiError::from_railway)?;
    Ok(Json(track))
}

async fn create_track(
    State(state): State<AppState>,
    payload: Result<Json<Track>, JsonRejection>,
) -> Result<(StatusCode, Json<Track>), ApiError> {
    let Json(track) = payload.map_err(ApiError::from_json_rejection)?;
    let track = state
        .service
        .create_track(track)
        .await
        .map_err(ApiError::from_railway)?;
    Ok((StatusCode::CREATED, Json(track)))
}

async fn update_track(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<Track>, JsonRejection>,
) -> Result<Json<Track>, ApiError> {
    let track_id = parse_id(&raw_id, "track")?;
    let Json(mut track) = payload.map_err(ApiError::from_json_rejection)?;
    track.id = track_id;
    let track = state
        .service
        .update_track(track)
        .await
        .map_err(ApiError::from_railway)?;
    Ok(Json(track))
}

async fn delete_track(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let track_id = parse_id(&raw_id, "track")?;
    state
        .service
        .delete_track(track_id)
        .await
        .map_err(ApiError::from_railway)?;
    Ok(Json(MessageResponse {
        message: "deleted successfully",
    }))
}

async fn load_track_signals(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .load_json(&body)
        .await
        .map_err(ApiError::from_railway)?;
    Ok(StatusCode::CREATED)
}

fn parse_id(raw: &str, kind: &str) -> Result<i64, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::InvalidRequest(format!("empty {kind} id")));
    }
    raw.parse::<i64>()
        .map_err(|_| ApiError::InvalidRequest(format!("invalid {kind} id: {raw}")))
}

fn page_request(config: &Config, query: &PageQuery) -> Result<PageRequest, ApiError> {
    let limit = match query.limit.as_deref().map(str::trim) {
        None | Some("") => config.default_page_limit,
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            ApiError::InvalidRequest(format!("invalid pagination limit value: {raw}"))
        })?,
    };
    if limit > config.max_page_limit {
        return Err(ApiError::InvalidRequest(format!(
            "pagination limit must not exceed {}",
            config.max_page_limit
        )));
    }
    let page = match query.page.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            ApiError::InvalidRequest(format!("invalid pagination page value: {raw}"))
        })?,
    };
    Ok(PageRequest::new(limit, page))
}

#[derive(Debug)]
enum ApiError {
    InvalidRequest(String),
    NotFound(String),
    LoadFailed(String),
    Internal(String),
}

impl ApiError {
    fn from_railway(error: RailwayError) -> Self {
        let message = error.message();
        match error {
            RailwayError::InvalidRequest(_) => Self::InvalidRequest(message),
            RailwayError::NotFound(_) => Self::NotFound(message),
            RailwayError::Load(_) => Self::LoadFailed(message),
            RailwayError::Internal(_) => Self::Internal(message),
        }
    }

    fn from_json_rejection(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(format!(
            "invalid request payload: {}",
            rejection.body_text()
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match self {
            Self::InvalidRequest(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            Self::LoadFailed(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "load_failed", message)
            }
            Self::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        };
        (
            status,
            Json(serde_json::json!({
                "error": message,
                "code": code,
            })),
        )
            .into_response()
    }
}
