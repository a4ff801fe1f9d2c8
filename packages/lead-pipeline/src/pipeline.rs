//! Pipeline driver: the end-to-end paginated-fetch / dedup / classify /
//! extract / persist loop.
//!
//! Failure semantics: anything that goes wrong for a single reply or
//! lead is caught locally and treated as a skip for that unit. Only an
//! operator abort, a page-fetch error, or an unreachable ledger store
//! terminates the run early: the first as an "aborted" summary, the
//! other two as run failures propagated to the caller.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::abort::AbortToken;
use crate::classify::{is_genuinely_interested, is_interested_reply};
use crate::config::{RunOptions, PERSIST_BACKOFF_STEP, PERSIST_MAX_ATTEMPTS};
use crate::extract::{to_row, ExtractSkip};
use crate::ledger::{lead_key, Ledger};
use crate::location::{is_address_us_based, AddressFields};
use crate::progress::ProgressHub;
use crate::rate_gate::RateGate;
use crate::replies::fetch_replies_batch;
use crate::state::RunState;
use crate::traits::{
    AuditSink, InterestJudge, LeadSource, LedgerStore, ReplyExtractor, ReplySource, SheetSink,
    UsLocationAi,
};
use crate::types::{RunSummary, SheetRow};

/// Boundary collaborators for one run, injected by the caller.
#[derive(Clone)]
pub struct PipelineDeps {
    pub lead_source: Arc<dyn LeadSource>,
    pub reply_source: Arc<dyn ReplySource>,
    pub extractor: Arc<dyn ReplyExtractor>,
    pub judge: Arc<dyn InterestJudge>,
    pub sheet_sink: Arc<dyn SheetSink>,
    pub audit_sink: Arc<dyn AuditSink>,
    pub location_ai: Arc<dyn UsLocationAi>,
    pub ledger_store: Arc<dyn LedgerStore>,
    pub rate_gate: Arc<RateGate>,
    pub progress: ProgressHub,
    /// Stamped into every exported row.
    pub agent_name: String,
}

/// Run the ingestion pipeline for one campaign.
///
/// Pages are processed strictly in cursor order. The abort token is
/// polled at page boundaries only; in-flight per-lead work for the
/// current page finishes before an aborted exit. The returned summary
/// distinguishes completed / stopped-at-cap / aborted; fatal upstream
/// errors return `Err` instead.
pub async fn run_ingestion(
    deps: &PipelineDeps,
    campaign_id: &str,
    sheet_name: &str,
    opts: &RunOptions,
    abort: AbortToken,
) -> Result<RunSummary> {
    tracing::info!(
        campaign_id = %campaign_id,
        sheet_name = %sheet_name,
        max_rows = opts.max_rows,
        max_pages = opts.max_pages,
        threshold = opts.ai_interest_threshold,
        "Starting ingestion run"
    );

    let ledger = Ledger::seed(campaign_id, deps.ledger_store.clone()).await?;
    let mut state = RunState::new(ledger.len().await as u64, opts);
    deps.progress.publish(&state);

    let mut cursor: Option<String> = None;

    'pages: while state.should_continue() {
        state.advance_page();
        deps.progress.publish(&state);

        deps.rate_gate.acquire().await;
        let page = deps
            .lead_source
            .fetch_page(
                campaign_id,
                cursor.as_deref(),
                opts.page_limit,
                opts.ai_interest_threshold,
            )
            .await
            .with_context(|| format!("Failed to fetch lead page for campaign {campaign_id}"))?;
        cursor = page.next_cursor.clone();

        tracing::debug!(
            page = state.pages_fetched(),
            leads = page.leads.len(),
            has_next = cursor.is_some(),
            "Fetched lead page"
        );

        // Optimization checkpoint only: the authoritative claim happens
        // after a confirmed sink write, not here.
        let batch: Vec<_> = ledger
            .filter_new(&page.leads)
            .await
            .into_iter()
            .cloned()
            .collect();

        if !batch.is_empty() {
            let results = fetch_replies_batch(
                deps.reply_source.clone(),
                deps.rate_gate.clone(),
                batch,
                campaign_id,
                opts,
            )
            .await;

            'leads: for lead_replies in results {
                if state.at_row_cap() {
                    break 'leads;
                }
                state.advance_lead();
                deps.progress.publish(&state);

                let lead = lead_replies.lead;
                let Some(key) = lead_key(&lead) else {
                    tracing::debug!("Skipping lead without email or id");
                    continue;
                };
                if let Some(error) = &lead_replies.error {
                    tracing::warn!(lead_email = %lead.email, error = %error, "Skipping lead: reply fetch failed");
                    continue;
                }

                let interesting: Vec<_> = lead_replies
                    .emails
                    .iter()
                    .filter(|e| is_interested_reply(Some(e), opts.ai_interest_threshold))
                    .collect();
                if interesting.is_empty() {
                    continue;
                }

                let mut first_row_for_lead = true;
                for reply in interesting {
                    if state.at_row_cap() {
                        break 'leads;
                    }

                    let mut row = match to_row(&lead, reply, deps.extractor.as_ref()).await {
                        Ok(row) => row,
                        Err(e) => {
                            if let Some(skip) = e.downcast_ref::<ExtractSkip>() {
                                tracing::info!(lead_email = %lead.email, reason = %skip, "Skipping reply, claiming lead");
                            } else {
                                // A permanently bad record; claim it so the
                                // next run does not retry forever.
                                tracing::warn!(lead_email = %lead.email, error = %e, "Extraction failed, claiming lead");
                            }
                            ledger.mark(&key).await?;
                            continue;
                        }
                    };
                    row.agent = deps.agent_name.clone();

                    // Leads carrying address data must be US-based. Leads
                    // without any address fields pass through; the website
                    // check stays interface-only.
                    let address = AddressFields {
                        address: row.address.clone(),
                        city: row.city.clone(),
                        state: row.state.clone(),
                        zip: row.zip.clone(),
                        country: String::new(),
                    };
                    if !address.is_empty()
                        && !is_address_us_based(&address, deps.location_ai.as_ref()).await
                    {
                        tracing::info!(lead_email = %lead.email, "Skipping reply: address not US-based, claiming lead");
                        ledger.mark(&key).await?;
                        continue;
                    }

                    if !is_genuinely_interested(&row.email_reply, deps.judge.as_ref()).await {
                        tracing::debug!(lead_email = %lead.email, "Reply not genuinely interested");
                        continue;
                    }
                    state.note_llm_interested();

                    match persist_with_retry(deps.sheet_sink.as_ref(), sheet_name, &row).await {
                        Ok(newly_written) => {
                            if newly_written {
                                state.note_encoded();
                            }
                            state.collect_row(row, first_row_for_lead);
                            first_row_for_lead = false;
                            ledger
                                .mark(&key)
                                .await
                                .context("Ledger store unreachable while claiming lead")?;
                            deps.progress.publish(&state);
                        }
                        Err(e) => {
                            tracing::warn!(
                                lead_email = %lead.email,
                                error = %e,
                                "Persist failed after retries, claiming lead and skipping"
                            );
                            ledger.mark(&key).await?;
                        }
                    }
                }
            }
        }

        // Operator abort is polled at page boundaries only.
        if abort.is_aborted() {
            let reason = abort.reason().unwrap_or_else(|| "operator abort".to_string());
            state.abort(reason);
            break 'pages;
        }

        // A missing cursor means the source is exhausted.
        if cursor.is_none() {
            break 'pages;
        }
    }

    deps.progress.publish(&state);
    let summary = state.summarize();

    match deps.audit_sink.record_run(&summary).await {
        Ok(log_id) => tracing::info!(log_id, "Run summary persisted to audit log"),
        Err(e) => tracing::error!(error = %e, "Failed to persist run summary"),
    }

    tracing::info!(
        campaign_id = %campaign_id,
        rows = summary.total,
        pages = summary.pages_fetched,
        stopped_early = summary.stopped_early,
        abort_reason = ?summary.abort_reason,
        "Ingestion run finished"
    );
    Ok(summary)
}

/// Write one row to the sink with up to `PERSIST_MAX_ATTEMPTS` tries
/// and linear backoff between them.
async fn persist_with_retry(
    sink: &dyn SheetSink,
    sheet_name: &str,
    row: &SheetRow,
) -> Result<bool> {
    let mut last_err = None;
    for attempt in 1..=PERSIST_MAX_ATTEMPTS {
        match sink.append_row(sheet_name, row).await {
            Ok(newly_written) => return Ok(newly_written),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Sheet append failed");
                last_err = Some(e);
                if attempt < PERSIST_MAX_ATTEMPTS {
                    tokio::time::sleep(PERSIST_BACKOFF_STEP * attempt).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt was made"))
}
