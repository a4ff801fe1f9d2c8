//! Ingestion pipeline core: turns a paginated campaign API into a
//! bounded, resumable, progress-reporting stream of qualified sheet
//! rows, with retry and abort semantics and a persisted idempotency
//! ledger.

pub mod abort;
pub mod classify;
pub mod config;
pub mod extract;
pub mod ledger;
pub mod location;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod rate_gate;
pub mod replies;
pub mod state;
pub mod traits;
pub mod types;

// Re-exports for clean API
pub use abort::{abort_pair, AbortHandle, AbortToken};
pub use config::{RunOptions, MAX_REPLY_WORDS, MIN_REQUEST_INTERVAL};
pub use ledger::{lead_key, normalize_key, Ledger, MemoryLedgerStore};
pub use pipeline::{run_ingestion, PipelineDeps};
pub use progress::{ProgressHub, ProgressSnapshot};
pub use rate_gate::RateGate;
pub use state::RunState;
pub use traits::{
    AuditSink, InterestJudge, InterestVerdict, LeadSource, LedgerStore, ReplyExtractor,
    ReplySource, SheetSink, UsLocationAi,
};
pub use types::{ExtractedReply, Lead, LeadPage, Reply, RunSummary, SheetRow};
