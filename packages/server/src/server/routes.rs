use std::convert::Infallible;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use lead_pipeline::{abort_pair, run_ingestion, RunOptions};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub campaign_id: String,
    pub sheet_name: String,
    #[serde(default)]
    pub opts: RunOptionsBody,
}

/// Request-level overrides on top of the run defaults.
#[derive(Debug, Default, Deserialize)]
pub struct RunOptionsBody {
    pub page_limit: Option<usize>,
    pub max_emails: Option<usize>,
    pub max_pages: Option<u32>,
    pub ai_interest_threshold: Option<f64>,
    pub emails_per_lead: Option<usize>,
    pub concurrency: Option<usize>,
    pub reply_delay_ms: Option<u64>,
}

impl RunOptionsBody {
    fn into_options(self) -> RunOptions {
        let defaults = RunOptions::default();
        RunOptions {
            page_limit: self.page_limit.unwrap_or(defaults.page_limit),
            max_rows: self.max_emails.unwrap_or(defaults.max_rows),
            max_pages: self.max_pages.unwrap_or(defaults.max_pages),
            ai_interest_threshold: self
                .ai_interest_threshold
                .unwrap_or(defaults.ai_interest_threshold),
            emails_per_lead: self.emails_per_lead.unwrap_or(defaults.emails_per_lead),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency).max(1),
            reply_delay_ms: self.reply_delay_ms.unwrap_or(defaults.reply_delay_ms),
        }
    }
}

/// Start an ingestion run and return its summary. At most one run may
/// be active at a time.
pub async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<StartRunRequest>,
) -> impl IntoResponse {
    let (handle, token) = abort_pair();
    let Some(guard) = state.run_control.try_start(handle).await else {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a run is already active" })),
        );
    };

    let opts = request.opts.into_options();
    let result = run_ingestion(
        &state.deps,
        &request.campaign_id,
        &request.sheet_name,
        &opts,
        token,
    )
    .await;
    guard.finish().await;

    match result {
        Ok(summary) => (StatusCode::OK, Json(json!(summary))),
        Err(e) => {
            tracing::error!(error = %e, campaign_id = %request.campaign_id, "Ingestion run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("{e:#}") })),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StopRunRequest {
    pub reason: Option<String>,
}

/// Signal the active run to stop at the next page boundary.
pub async fn stop_run(
    State(state): State<AppState>,
    Json(request): Json<StopRunRequest>,
) -> impl IntoResponse {
    let reason = request.reason.as_deref().unwrap_or("operator requested stop");
    if state.run_control.stop(reason).await {
        (StatusCode::OK, Json(json!({ "stopping": true })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no active run" })),
        )
    }
}

pub async fn list_campaigns(State(state): State<AppState>) -> impl IntoResponse {
    match state.campaign_api.list_campaigns().await {
        Ok(campaigns) => (
            StatusCode::OK,
            Json(json!({ "total": campaigns.len(), "campaigns": campaigns })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch campaigns");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to fetch campaigns" })),
            )
        }
    }
}

pub async fn list_logs(State(state): State<AppState>) -> impl IntoResponse {
    match state.audit.list_runs().await {
        Ok(logs) => (StatusCode::OK, Json(json!({ "logs": logs }))),
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch run logs");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to fetch run logs" })),
            )
        }
    }
}

/// SSE stream of progress snapshots for the active run.
pub async fn progress_stream(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.progress.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(snapshot) => {
            let data = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());
            Some(Ok::<_, Infallible>(Event::default().event("progress").data(data)))
        }
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(_)) => {
            Some(Ok(Event::default().event("lagged").data("{}")))
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Health check: database connectivity with a short timeout.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = matches!(
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sqlx::query("SELECT 1").execute(&state.db_pool),
        )
        .await,
        Ok(Ok(_))
    );

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if db_ok { "healthy" } else { "unhealthy" },
            "database": if db_ok { "ok" } else { "error" },
        })),
    )
}
