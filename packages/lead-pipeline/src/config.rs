use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum spacing between outbound calls to the campaign API. The API
/// enforces roughly 20 requests/minute, so one call per 3 seconds.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(3);

/// Reply bodies longer than this many words are skipped, not extracted.
pub const MAX_REPLY_WORDS: usize = 500;

/// Sink writes are retried up to this many times with linear backoff.
pub const PERSIST_MAX_ATTEMPTS: u32 = 3;

/// Backoff between sink-write attempts is `attempt * this`.
pub const PERSIST_BACKOFF_STEP: Duration = Duration::from_millis(500);

/// Ledger set naming convention: `processed-emails:<campaignId>`.
pub const LEDGER_KEY_PREFIX: &str = "processed-emails:";

/// Per-run tunables for one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Leads requested per page.
    pub page_limit: usize,
    /// Cap on qualifying rows collected.
    pub max_rows: usize,
    /// Cap on pages fetched.
    pub max_pages: u32,
    /// AI interest score cutoff (0..1).
    pub ai_interest_threshold: f64,
    /// Replies requested per lead.
    pub emails_per_lead: usize,
    /// In-flight reply fetches. The production default is 1 (sequential
    /// with delay) to respect the external rate cap.
    pub concurrency: usize,
    /// Extra sleep after each reply fetch, as additional backpressure.
    pub reply_delay_ms: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            page_limit: 10,
            max_rows: 50,
            max_pages: 20,
            ai_interest_threshold: 0.7,
            emails_per_lead: 5,
            concurrency: 1,
            reply_delay_ms: 1_000,
        }
    }
}

impl RunOptions {
    pub fn with_caps(mut self, max_rows: usize, max_pages: u32) -> Self {
        self.max_rows = max_rows;
        self.max_pages = max_pages;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.ai_interest_threshold = threshold;
        self
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_reply_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reply_delay_ms = delay_ms;
        self
    }
}
