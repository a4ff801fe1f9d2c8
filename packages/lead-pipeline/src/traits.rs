//! Boundary collaborator seams.
//!
//! The pipeline core only talks to the outside world through these
//! traits; concrete clients (HTTP, LLM providers, Postgres, Sheets)
//! live in the server package.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ExtractedReply, Lead, LeadPage, Reply, RunSummary, SheetRow};

/// Paginated campaign lead source.
///
/// Filtering (interest status below "interested", nonzero reply count,
/// AI score >= threshold) happens server-side; implementations pass the
/// filters through and do not re-filter locally. Errors propagate to
/// the caller; the orchestrator treats them as fatal for the run.
#[async_trait]
pub trait LeadSource: Send + Sync {
    async fn fetch_page(
        &self,
        campaign_id: &str,
        cursor: Option<&str>,
        page_limit: usize,
        ai_threshold: f64,
    ) -> Result<LeadPage>;
}

/// Per-lead reply source.
#[async_trait]
pub trait ReplySource: Send + Sync {
    async fn fetch_replies(
        &self,
        lead: &Lead,
        campaign_id: &str,
        per_lead_limit: usize,
    ) -> Result<Vec<Reply>>;
}

/// Text-extraction collaborator: turns a raw reply body into structured
/// fields. Implementations must default every missing field to an empty
/// string, never null.
#[async_trait]
pub trait ReplyExtractor: Send + Sync {
    async fn extract(&self, email_content: &str) -> Result<ExtractedReply>;
}

/// Outcome of the semantic interest check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestVerdict {
    Interested,
    NotInterested,
    /// The judge answered something other than a clear yes/no; callers
    /// fall back to the local rule-based check.
    Unclear,
}

/// LLM-backed semantic interest classifier.
#[async_trait]
pub trait InterestJudge: Send + Sync {
    async fn classify(&self, reply_text: &str) -> Result<InterestVerdict>;
}

/// Spreadsheet sink. Ensures a header exists, dedupes on the
/// (lead email, reply text) compound key, and appends.
/// Returns whether the row was newly written.
#[async_trait]
pub trait SheetSink: Send + Sync {
    async fn append_row(&self, sheet_name: &str, row: &SheetRow) -> Result<bool>;
}

/// Audit log sink for run summaries. Returns the persisted record id.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_run(&self, summary: &RunSummary) -> Result<i64>;
}

/// Backing store for the idempotency ledger: a named set per campaign
/// with atomic set-add semantics.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// All members of the named set.
    async fn members(&self, set_key: &str) -> Result<HashSet<String>>;

    /// Add a member; true iff it was newly added (first-writer-wins).
    async fn add(&self, set_key: &str, member: &str) -> Result<bool>;
}

/// Last-resort AI check used by the US-address classifier when the
/// regex precedence is inconclusive.
#[async_trait]
pub trait UsLocationAi: Send + Sync {
    async fn is_us(&self, address_text: &str) -> Result<bool>;
}
