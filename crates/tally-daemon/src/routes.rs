//! Axum router and all HTTP handlers for tally-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers so tests can drive the bare router.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use tally_ingest::{AttendanceStore, Directory, IngestError, ReceiptView};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    api_types::{
        DownloadRequest, ErrorResponse, HealthResponse, PunchesResponse, RangeQuery,
        SessionView, SessionsResponse,
    },
    state::AppState,
};

/// Form fields a device may carry the event JSON in, in preference order.
const EVENT_FIELDS: [&str; 2] = ["AccessControllerEvent", "event_log"];

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/event", post(webhook))
        .route("/v1/events", post(webhook))
        .route("/v1/devices/:device_id/download", post(download))
        .route("/v1/employees/:employee_id/sessions", get(sessions))
        .route("/v1/employees/:employee_id/punches", get(punches))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message,
        }),
    )
        .into_response()
}

fn ingest_error_response(e: IngestError) -> Response {
    let status = match &e {
        IngestError::MalformedPayload(_) | IngestError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
        IngestError::UnknownDevice(_) => StatusCode::NOT_FOUND,
        IngestError::UnknownEmployee(_)
        | IngestError::NoCalendarAssigned { .. }
        | IngestError::InvalidDevice(_) => StatusCode::UNPROCESSABLE_ENTITY,
        IngestError::DeviceUnreachable(_) => StatusCode::BAD_GATEWAY,
        IngestError::Store(_) => {
            error!(error = %e, "store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, e.code(), e.to_string())
}

fn store_error_response(e: anyhow::Error) -> Response {
    ingest_error_response(IngestError::Store(e))
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            store: st.mode.as_str(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /event, POST /v1/events
// ---------------------------------------------------------------------------

/// Device push. The event JSON arrives in a multipart or urlencoded form
/// field, or as the raw JSON body.
pub(crate) async fn webhook(State(st): State<Arc<AppState>>, req: Request) -> Response {
    let raw = match extract_event_json(req).await {
        Ok(raw) => raw,
        Err(message) => {
            return ingest_error_response(IngestError::MalformedPayload(message));
        }
    };
    match st.ingestor.ingest_webhook_json(&raw).await {
        Ok(receipt) => (StatusCode::OK, Json(ReceiptView::from(&receipt))).into_response(),
        Err(e) => ingest_error_response(e),
    }
}

async fn extract_event_json(req: Request) -> Result<String, String> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| e.body_text())?;
        let mut fields = HashMap::new();
        while let Some(field) = multipart.next_field().await.map_err(|e| e.body_text())? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if EVENT_FIELDS.contains(&name.as_str()) {
                let text = field.text().await.map_err(|e| e.body_text())?;
                fields.insert(name, text);
            }
        }
        return pick_event_field(fields);
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(req, &())
            .await
            .map_err(|e| e.body_text())?;
        return pick_event_field(fields);
    }

    let body = Bytes::from_request(req, &())
        .await
        .map_err(|e| e.body_text())?;
    String::from_utf8(body.to_vec()).map_err(|_| "body is not UTF-8".to_string())
}

fn pick_event_field(mut fields: HashMap<String, String>) -> Result<String, String> {
    EVENT_FIELDS
        .iter()
        .find_map(|name| fields.remove(*name))
        .ok_or_else(|| "form carries no AccessControllerEvent or event_log field".to_string())
}

// ---------------------------------------------------------------------------
// POST /v1/devices/:device_id/download
// ---------------------------------------------------------------------------

pub(crate) async fn download(
    State(st): State<Arc<AppState>>,
    Path(device_id): Path<Uuid>,
    Json(body): Json<DownloadRequest>,
) -> Response {
    let device = match st.ingestor.directory().device_by_id(device_id).await {
        Ok(Some(d)) => d,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "UNKNOWN_DEVICE",
                format!("no device {device_id}"),
            )
        }
        Err(e) => return store_error_response(e),
    };

    info!(device = %device.name, from = %body.from, to = %body.to, "bulk download requested");
    match st
        .ingestor
        .download_from_device(&device, &st.secrets, body.from, body.to)
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => ingest_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/employees/:employee_id/{sessions,punches}
// ---------------------------------------------------------------------------

fn resolve_range(q: &RangeQuery) -> Result<(DateTime<Utc>, DateTime<Utc>), Response> {
    let to = q.to.unwrap_or_else(Utc::now);
    let from = q.from.unwrap_or(to - Duration::days(7));
    if from >= to {
        return Err(ingest_error_response(IngestError::InvalidRange { from, to }));
    }
    Ok((from, to))
}

pub(crate) async fn sessions(
    State(st): State<Arc<AppState>>,
    Path(employee_id): Path<Uuid>,
    Query(q): Query<RangeQuery>,
) -> Response {
    let (from, to) = match resolve_range(&q) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let employee = match st.ingestor.directory().employee_by_id(employee_id).await {
        Ok(Some(e)) => e,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "UNKNOWN_EMPLOYEE",
                format!("no employee {employee_id}"),
            )
        }
        Err(e) => return store_error_response(e),
    };
    let tz = st.ingestor.employee_tz(&employee);
    match st.ingestor.store().sessions_between(employee_id, from, to).await {
        Ok(rows) => (
            StatusCode::OK,
            Json(SessionsResponse {
                employee_id,
                timezone: tz.name().to_string(),
                sessions: rows.iter().map(|s| SessionView::from_session(s, tz)).collect(),
            }),
        )
            .into_response(),
        Err(e) => store_error_response(e),
    }
}

pub(crate) async fn punches(
    State(st): State<Arc<AppState>>,
    Path(employee_id): Path<Uuid>,
    Query(q): Query<RangeQuery>,
) -> Response {
    let (from, to) = match resolve_range(&q) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match st.ingestor.store().raw_between(employee_id, from, to).await {
        Ok(punches) => (
            StatusCode::OK,
            Json(PunchesResponse {
                employee_id,
                punches,
            }),
        )
            .into_response(),
        Err(e) => store_error_response(e),
    }
}
