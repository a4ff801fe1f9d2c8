//! Operator abort signal.
//!
//! An explicit token threaded into the run instead of an ambient flag
//! on a shared controller: every run gets a fresh pair, so stale flags
//! cannot leak between runs and concurrent campaigns cannot race on one
//! shared field. The pipeline polls the token at page boundaries only;
//! in-flight per-lead work for the current page finishes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Shared {
    requested: AtomicBool,
    reason: Mutex<Option<String>>,
}

/// Read side, held by the pipeline.
#[derive(Clone, Default)]
pub struct AbortToken {
    shared: Arc<Shared>,
}

/// Write side, held by the operator-facing control surface.
#[derive(Clone)]
pub struct AbortHandle {
    shared: Arc<Shared>,
}

/// A fresh token/handle pair for one run.
pub fn abort_pair() -> (AbortHandle, AbortToken) {
    let shared = Arc::new(Shared::default());
    (
        AbortHandle {
            shared: shared.clone(),
        },
        AbortToken { shared },
    )
}

impl AbortHandle {
    pub fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::info!(reason = %reason, "Abort requested");
        *self.shared.reason.lock().expect("abort reason lock poisoned") = Some(reason);
        self.shared.requested.store(true, Ordering::SeqCst);
    }
}

impl AbortToken {
    pub fn is_aborted(&self) -> bool {
        self.shared.requested.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.shared
            .reason
            .lock()
            .expect("abort reason lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_reflects_handle_abort() {
        let (handle, token) = abort_pair();
        assert!(!token.is_aborted());
        assert_eq!(token.reason(), None);

        handle.abort("operator stop");
        assert!(token.is_aborted());
        assert_eq!(token.reason().as_deref(), Some("operator stop"));
    }

    #[test]
    fn pairs_are_independent_between_runs() {
        let (handle_a, token_a) = abort_pair();
        let (_handle_b, token_b) = abort_pair();

        handle_a.abort("stop a");
        assert!(token_a.is_aborted());
        assert!(!token_b.is_aborted());
    }
}
