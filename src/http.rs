use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, error};

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_QUERY_PARAM_LEN;
use crate::model::{RoomReport, parse_instant, report};

/// Query string of `GET /api/freeRooms`.
#[derive(Debug, Default, Deserialize)]
pub struct FreeRoomsParams {
    pub date: Option<String>,
    #[serde(rename = "includeTeacherRooms")]
    pub include_teacher_rooms: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Engine(EngineError),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            ApiError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Upstream(_)) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Calendar day requested; absent means today in `tz`.
pub fn parse_date(raw: Option<&str>, tz: Tz) -> Result<NaiveDate, ApiError> {
    let Some(raw) = raw else {
        return Ok(Utc::now().with_timezone(&tz).date_naive());
    };
    if raw.len() > MAX_QUERY_PARAM_LEN {
        return Err(ApiError::BadRequest("date too long".into()));
    }
    parse_instant(raw, tz)
        .map(|instant| instant.date_naive())
        .ok_or_else(|| ApiError::BadRequest(format!("invalid date: {raw:?}")))
}

/// Strict boolean flag: `true/1/yes/on`, `false/0/no/off` or empty.
pub fn parse_flag(raw: Option<&str>) -> Result<bool, ApiError> {
    let Some(raw) = raw else { return Ok(false) };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ApiError::BadRequest(format!(
            "invalid includeTeacherRooms: {raw:?}"
        ))),
    }
}

async fn free_rooms(
    State(engine): State<Arc<Engine>>,
    query: Result<Query<FreeRoomsParams>, QueryRejection>,
) -> Result<Json<Vec<RoomReport>>, ApiError> {
    // Malformed query strings go through ApiError so they are counted.
    let Query(params) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let date = parse_date(params.date.as_deref(), engine.tz())?;
    let include_restricted = parse_flag(params.include_teacher_rooms.as_deref())?;
    debug!("free rooms request: date={date} restricted={include_restricted}");

    let availability = engine.free_rooms(date, include_restricted).await?;
    Ok(Json(report(&availability)))
}

/// Wraps the handler with request metrics and error logging.
async fn free_rooms_instrumented(
    state: State<Arc<Engine>>,
    query: Result<Query<FreeRoomsParams>, QueryRejection>,
) -> Response {
    let start = std::time::Instant::now();
    let response = match free_rooms(state, query).await {
        Ok(body) => body.into_response(),
        Err(e) => {
            if e.status().is_server_error() {
                error!("free rooms request failed: {e}");
            } else {
                debug!("rejected free rooms request: {e}");
            }
            e.into_response()
        }
    };
    let status = response.status().as_u16();
    metrics::counter!(
        crate::observability::REQUESTS_TOTAL,
        "status" => crate::observability::status_label(status)
    )
    .increment(1);
    metrics::histogram!(crate::observability::REQUEST_DURATION_SECONDS)
        .record(start.elapsed().as_secs_f64());
    response
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/api/freeRooms", get(free_rooms_instrumented))
        .route("/health", get(|| async { "ok" }))
        .with_state(engine)
}
