//! Progress snapshots and their fire-and-forget broadcast channel.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::state::RunState;

/// Point-in-time view of a run, pushed to any listening observers after
/// every state-changing step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub pages_fetched: u32,
    pub leads_processed: u32,
    pub rows_collected: usize,
    pub distinct_leads_checked: u64,
    pub interested_lead_count: u32,
    pub llm_interested_count: u32,
    pub encoded_count: u32,
    pub stopped_early: bool,
    pub max_rows_cap: usize,
    pub max_pages_cap: u32,
    pub ai_interest_threshold: f64,
    pub percent_complete: u32,
    pub timestamp_ms: i64,
}

impl ProgressSnapshot {
    pub fn from_state(state: &RunState) -> Self {
        let percent = if state.max_rows() == 0 {
            100
        } else {
            let ratio = state.rows_collected() as f64 / state.max_rows() as f64;
            ((ratio * 100.0).round() as u32).min(100)
        };
        Self {
            pages_fetched: state.pages_fetched(),
            leads_processed: state.leads_processed(),
            rows_collected: state.rows_collected(),
            distinct_leads_checked: state.distinct_leads_checked(),
            interested_lead_count: state.interested_lead_count(),
            llm_interested_count: state.llm_interested_count(),
            encoded_count: state.encoded_count(),
            stopped_early: state.stopped_early(),
            max_rows_cap: state.max_rows(),
            max_pages_cap: state.max_pages(),
            ai_interest_threshold: state.ai_interest_threshold(),
            percent_complete: percent,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

/// Clone-able broadcast hub for progress snapshots. Publishing with no
/// subscribers is a no-op, not an error.
#[derive(Clone)]
pub struct ProgressHub {
    tx: broadcast::Sender<ProgressSnapshot>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, state: &RunState) {
        let snapshot = ProgressSnapshot::from_state(state);
        tracing::debug!(
            pages = snapshot.pages_fetched,
            rows = snapshot.rows_collected,
            percent = snapshot.percent_complete,
            "Progress"
        );
        // No active receivers is fine.
        let _ = self.tx.send(snapshot);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}
