//! Run state machine: the single-owner control record for one pipeline
//! execution.
//!
//! Owned by the orchestrator and mutated only through the named
//! transition operations below, never through ambient shared fields on
//! a long-lived controller, so back-to-back runs on one process cannot
//! bleed counters into each other.

use chrono::Utc;

use crate::config::RunOptions;
use crate::types::{RunSummary, SheetRow};

#[derive(Debug)]
pub struct RunState {
    pages_fetched: u32,
    leads_processed: u32,
    distinct_leads_checked: u64,
    interested_lead_count: u32,
    llm_interested_count: u32,
    encoded_count: u32,
    rows: Vec<SheetRow>,
    aborted: bool,
    abort_reason: Option<String>,
    max_rows: usize,
    max_pages: u32,
    ai_interest_threshold: f64,
}

impl RunState {
    /// `seed_seen_count` comes from the ledger size at run start.
    pub fn new(seed_seen_count: u64, opts: &RunOptions) -> Self {
        Self {
            pages_fetched: 0,
            leads_processed: 0,
            distinct_leads_checked: seed_seen_count,
            interested_lead_count: 0,
            llm_interested_count: 0,
            encoded_count: 0,
            rows: Vec::new(),
            aborted: false,
            abort_reason: None,
            max_rows: opts.max_rows,
            max_pages: opts.max_pages,
            ai_interest_threshold: opts.ai_interest_threshold,
        }
    }

    /// Once per page fetched. No guard.
    pub fn advance_page(&mut self) {
        self.pages_fetched += 1;
    }

    /// Once per lead whose replies have been fetched.
    pub fn advance_lead(&mut self) {
        self.leads_processed += 1;
        self.distinct_leads_checked += 1;
    }

    /// Append a successfully persisted row.
    pub fn collect_row(&mut self, row: SheetRow, counts_as_new_interest: bool) {
        self.rows.push(row);
        if counts_as_new_interest {
            self.interested_lead_count += 1;
        }
    }

    pub fn note_llm_interested(&mut self) {
        self.llm_interested_count += 1;
    }

    pub fn note_encoded(&mut self) {
        self.encoded_count += 1;
    }

    /// Terminal for the loop; the state still supports summarization.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.aborted = true;
        self.abort_reason = Some(reason.into());
    }

    /// Loop-continuation predicate, re-evaluated once per page
    /// iteration (rows may overshoot slightly within a page before the
    /// next boundary check trips).
    pub fn should_continue(&self) -> bool {
        !self.aborted && self.rows.len() < self.max_rows && self.pages_fetched < self.max_pages
    }

    pub fn rows_collected(&self) -> usize {
        self.rows.len()
    }

    pub fn at_row_cap(&self) -> bool {
        self.rows.len() >= self.max_rows
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn leads_processed(&self) -> u32 {
        self.leads_processed
    }

    pub fn distinct_leads_checked(&self) -> u64 {
        self.distinct_leads_checked
    }

    pub fn interested_lead_count(&self) -> u32 {
        self.interested_lead_count
    }

    pub fn llm_interested_count(&self) -> u32 {
        self.llm_interested_count
    }

    pub fn encoded_count(&self) -> u32 {
        self.encoded_count
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    pub fn ai_interest_threshold(&self) -> f64 {
        self.ai_interest_threshold
    }

    /// `stopped_early` covers both cap hits and operator aborts, so a
    /// caller can tell "ran out of budget" from "completed the source".
    pub fn stopped_early(&self) -> bool {
        self.aborted || self.rows.len() >= self.max_rows
    }

    /// Consume into the terminal report.
    pub fn summarize(self) -> RunSummary {
        RunSummary {
            total: self.rows.len(),
            stopped_early: self.stopped_early(),
            pages_fetched: self.pages_fetched,
            leads_processed: self.leads_processed,
            distinct_leads_checked: self.distinct_leads_checked,
            interested_lead_count: self.interested_lead_count,
            llm_interested_count: self.llm_interested_count,
            encoded_count: self.encoded_count,
            abort_reason: self.abort_reason,
            max_rows_cap: self.max_rows,
            max_pages_cap: self.max_pages,
            ai_interest_threshold: self.ai_interest_threshold,
            rows: self.rows,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(max_rows: usize, max_pages: u32) -> RunOptions {
        RunOptions::default().with_caps(max_rows, max_pages)
    }

    #[test]
    fn should_continue_matches_boolean_formula_exactly() {
        // Exhaust rows x pages x aborted against the formula.
        for rows_collected in 0..4usize {
            for pages in 0..4u32 {
                for aborted in [false, true] {
                    let mut state = RunState::new(0, &opts(2, 2));
                    for _ in 0..rows_collected {
                        state.collect_row(SheetRow::default(), false);
                    }
                    for _ in 0..pages {
                        state.advance_page();
                    }
                    if aborted {
                        state.abort("test");
                    }
                    let expected = !aborted && rows_collected < 2 && pages < 2;
                    assert_eq!(
                        state.should_continue(),
                        expected,
                        "rows={rows_collected} pages={pages} aborted={aborted}"
                    );
                }
            }
        }
    }

    #[test]
    fn counters_advance_through_transitions() {
        let mut state = RunState::new(5, &opts(10, 10));
        state.advance_page();
        state.advance_lead();
        state.advance_lead();
        state.collect_row(SheetRow::default(), true);
        state.collect_row(SheetRow::default(), false);

        assert_eq!(state.pages_fetched(), 1);
        assert_eq!(state.leads_processed(), 2);
        assert_eq!(state.distinct_leads_checked(), 7);
        assert_eq!(state.rows_collected(), 2);
        assert_eq!(state.interested_lead_count(), 1);
    }

    #[test]
    fn summarize_reports_caps_and_abort_reason() {
        let mut state = RunState::new(0, &opts(3, 7));
        state.advance_page();
        state.abort("operator stop");

        let summary = state.summarize();
        assert!(summary.stopped_early);
        assert_eq!(summary.abort_reason.as_deref(), Some("operator stop"));
        assert_eq!(summary.max_rows_cap, 3);
        assert_eq!(summary.max_pages_cap, 7);
        assert_eq!(summary.pages_fetched, 1);
    }

    #[test]
    fn hitting_row_cap_sets_stopped_early() {
        let mut state = RunState::new(0, &opts(1, 10));
        state.collect_row(SheetRow::default(), false);
        assert!(state.at_row_cap());
        assert!(!state.should_continue());
        assert!(state.summarize().stopped_early);
    }

    #[test]
    fn normal_completion_is_not_stopped_early() {
        let state = RunState::new(0, &opts(10, 10));
        assert!(!state.summarize().stopped_early);
    }
}
