//! Admin HTTP API
//!
//! `GET /health` is open. Everything under `/api/v1` requires the configured
//! API key as `Authorization: Bearer <key>` (or `X-API-Key: <key>`) when one
//! is set.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use libxbot::{ErrorKind, ReplyRecord, RunParams, XbotError, XbotService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<XbotService>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(service: Arc<XbotService>) -> Self {
        let api_key = service.config().admin_api_key().map(Arc::from);
        Self { service, api_key }
    }
}

/// Build the admin router
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/workflow/execute", post(execute_workflow))
        .route("/workflow/sync-following", post(sync_following))
        .route("/stats", get(stats))
        .route("/reply-logs", get(reply_logs))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response wrapper mapping `XbotError` kinds to status codes
pub struct ApiError(XbotError);

impl From<XbotError> for ApiError {
    fn from(err: XbotError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // A rejected API caller is a 401; upstream credential failures stay 502.
        let status = match self.0.kind() {
            _ if matches!(self.0, XbotError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::DailyLimitReached | ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Unauthorized | ErrorKind::ExternalService => StatusCode::BAD_GATEWAY,
            ErrorKind::Config | ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let headers = request.headers();
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()));

    if presented == Some(expected) {
        next.run(request).await
    } else {
        ApiError::from(XbotError::Unauthorized("missing or invalid API key".to_string()))
            .into_response()
    }
}

async fn health(State(state): State<AppState>) -> Response {
    match state.service.database().ping().await {
        Ok(()) => Json(json!({ "status": "ok", "database": "ok" })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "error" })),
            )
                .into_response()
        }
    }
}

/// Body is optional; an empty body runs with the defaults.
async fn execute_workflow(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        RunParams::default()
    } else {
        serde_json::from_slice::<RunParams>(&body)
            .map_err(|e| XbotError::InvalidInput(format!("invalid request body: {}", e)))?
    };

    tracing::info!(
        tweet_count = params.tweet_count,
        dry_run = params.dry_run,
        "workflow triggered via API"
    );
    let report = state.service.run(params).await?;
    Ok(Json(report).into_response())
}

async fn sync_following(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report = state.service.sync_following().await?;
    Ok(Json(report).into_response())
}

async fn stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state.service.stats().await?;
    Ok(Json(stats).into_response())
}

#[derive(Debug, Deserialize)]
struct ReplyLogsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ReplyLogsResponse {
    count: usize,
    records: Vec<ReplyRecord>,
}

async fn reply_logs(
    State(state): State<AppState>,
    Query(query): Query<ReplyLogsQuery>,
) -> Result<Response, ApiError> {
    let records = state.service.recent_records(query.limit).await?;
    Ok(Json(ReplyLogsResponse {
        count: records.len(),
        records,
    })
    .into_response())
}
