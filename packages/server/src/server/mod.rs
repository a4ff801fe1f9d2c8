pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use lead_pipeline::{AbortHandle, PipelineDeps, ProgressHub, RateGate, MIN_REQUEST_INTERVAL};

use crate::config::Config;
use crate::kernel::{CampaignApiClient, GoogleSheetsSink, LlmClient};
use crate::storage::{PostgresAuditSink, PostgresLedgerStore};

/// Guards the one-active-run-at-a-time invariant and carries the abort
/// handle for the stop endpoint.
#[derive(Default)]
pub struct RunControl {
    active: Mutex<Option<AbortHandle>>,
}

impl RunControl {
    /// Register a new run. `None` if one is already active.
    pub async fn try_start(&self, handle: AbortHandle) -> Option<RunGuard<'_>> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return None;
        }
        *active = Some(handle);
        Some(RunGuard { control: self })
    }

    /// Abort the active run, if any. True if a run was signalled.
    pub async fn stop(&self, reason: &str) -> bool {
        match self.active.lock().await.as_ref() {
            Some(handle) => {
                handle.abort(reason);
                true
            }
            None => false,
        }
    }

    async fn clear(&self) {
        *self.active.lock().await = None;
    }
}

/// Clears the active-run slot when the run finishes, on every exit path.
pub struct RunGuard<'a> {
    control: &'a RunControl,
}

impl RunGuard<'_> {
    pub async fn finish(self) {
        self.control.clear().await;
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub deps: PipelineDeps,
    pub campaign_api: Arc<CampaignApiClient>,
    pub audit: Arc<PostgresAuditSink>,
    pub progress: ProgressHub,
    pub run_control: Arc<RunControl>,
}

/// Wire the collaborators and build the axum application.
pub fn build_app(pool: PgPool, config: &Config) -> Router {
    let campaign_api = Arc::new(CampaignApiClient::new(
        config.campaign_api_base.clone(),
        config.campaign_api_key.clone(),
    ));
    let llm = Arc::new(LlmClient::openrouter(
        &config.openrouter_api_key,
        config.openrouter_model.clone(),
    ));
    let audit = Arc::new(PostgresAuditSink::new(pool.clone()));
    let progress = ProgressHub::new();

    let deps = PipelineDeps {
        lead_source: campaign_api.clone(),
        reply_source: campaign_api.clone(),
        extractor: llm.clone(),
        judge: llm.clone(),
        sheet_sink: Arc::new(GoogleSheetsSink::new(
            config.google_access_token.clone(),
            config.spreadsheet_id.clone(),
        )),
        audit_sink: audit.clone(),
        location_ai: llm,
        ledger_store: Arc::new(PostgresLedgerStore::new(pool.clone())),
        rate_gate: Arc::new(RateGate::new(MIN_REQUEST_INTERVAL)),
        progress: progress.clone(),
        agent_name: config.agent_name.clone(),
    };

    let state = AppState {
        db_pool: pool,
        deps,
        campaign_api,
        audit,
        progress,
        run_control: Arc::new(RunControl::default()),
    };

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/runs", post(routes::start_run))
        .route("/api/runs/stop", post(routes::stop_run))
        .route("/api/campaigns", get(routes::list_campaigns))
        .route("/api/logs", get(routes::list_logs))
        .route("/api/progress", get(routes::progress_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
