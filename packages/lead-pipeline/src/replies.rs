//! Reply fetching shell: rate-gated, failure-isolated, optionally
//! bounded-concurrent.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::RunOptions;
use crate::rate_gate::RateGate;
use crate::traits::ReplySource;
use crate::types::{Lead, Reply};

/// Per-lead fetch result. `error` is populated instead of propagating,
/// so one lead's failure never aborts its siblings.
#[derive(Debug)]
pub struct LeadReplies {
    pub lead: Lead,
    pub emails: Vec<Reply>,
    pub error: Option<String>,
}

/// Fetch replies for one lead. Always acquires the rate gate before the
/// call and optionally sleeps afterward as extra backpressure. Never
/// returns an error.
pub async fn fetch_replies_for_lead(
    source: &dyn ReplySource,
    gate: &RateGate,
    lead: Lead,
    campaign_id: &str,
    opts: &RunOptions,
) -> LeadReplies {
    gate.acquire().await;

    let result = source
        .fetch_replies(&lead, campaign_id, opts.emails_per_lead)
        .await;

    if opts.reply_delay_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(opts.reply_delay_ms)).await;
    }

    match result {
        Ok(emails) => LeadReplies {
            lead,
            emails,
            error: None,
        },
        Err(e) => {
            tracing::warn!(
                lead_email = %lead.email,
                error = %e,
                "Reply fetch failed for lead, continuing batch"
            );
            LeadReplies {
                lead,
                emails: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

/// Fetch replies for a batch of leads with at most `opts.concurrency`
/// calls in flight. Output preserves input order; completion order is
/// arbitrary when concurrency > 1.
pub async fn fetch_replies_batch(
    source: Arc<dyn ReplySource>,
    gate: Arc<RateGate>,
    leads: Vec<Lead>,
    campaign_id: &str,
    opts: &RunOptions,
) -> Vec<LeadReplies> {
    let semaphore = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let mut handles = Vec::with_capacity(leads.len());

    for lead in leads {
        let source = source.clone();
        let gate = gate.clone();
        let semaphore = semaphore.clone();
        let campaign_id = campaign_id.to_string();
        let opts = opts.clone();
        let fallback = lead.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("reply-fetch semaphore closed");
            fetch_replies_for_lead(source.as_ref(), &gate, lead, &campaign_id, &opts).await
        });
        handles.push((fallback, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (fallback, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                // A panicked fetch task is still a per-lead failure; the
                // lead keeps its slot in the output.
                tracing::error!(error = %e, lead_email = %fallback.email, "Reply fetch task panicked");
                results.push(LeadReplies {
                    lead: fallback,
                    emails: Vec::new(),
                    error: Some(format!("reply fetch task panicked: {e}")),
                });
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedSource {
        // Leads with this email fail; everything else returns one reply.
        failing_email: &'static str,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(failing_email: &'static str) -> Self {
            Self {
                failing_email,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ReplySource for ScriptedSource {
        async fn fetch_replies(
            &self,
            lead: &Lead,
            _campaign_id: &str,
            _per_lead_limit: usize,
        ) -> Result<Vec<Reply>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if lead.email == self.failing_email {
                anyhow::bail!("boom");
            }
            Ok(vec![Reply::default()])
        }
    }

    fn lead(email: &str) -> Lead {
        Lead {
            email: email.to_string(),
            ..Default::default()
        }
    }

    fn fast_opts(concurrency: usize) -> RunOptions {
        RunOptions::default()
            .with_concurrency(concurrency)
            .with_reply_delay_ms(0)
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_isolated_per_lead_and_order_preserved() {
        let source = Arc::new(ScriptedSource::new("bad@example.com"));
        let gate = Arc::new(RateGate::new(Duration::ZERO));

        let leads = vec![lead("a@example.com"), lead("bad@example.com"), lead("c@example.com")];
        let results =
            fetch_replies_batch(source, gate, leads, "c1", &fast_opts(2)).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].lead.email, "a@example.com");
        assert_eq!(results[1].lead.email, "bad@example.com");
        assert_eq!(results[2].lead.email, "c@example.com");

        assert!(results[0].error.is_none());
        assert_eq!(results[0].emails.len(), 1);
        assert!(results[1].error.is_some());
        assert!(results[1].emails.is_empty());
        assert!(results[2].error.is_none());
    }

    struct PanickingSource {
        panicking_email: &'static str,
    }

    #[async_trait::async_trait]
    impl ReplySource for PanickingSource {
        async fn fetch_replies(
            &self,
            lead: &Lead,
            _campaign_id: &str,
            _per_lead_limit: usize,
        ) -> Result<Vec<Reply>> {
            if lead.email == self.panicking_email {
                panic!("fetch task blew up");
            }
            Ok(vec![Reply::default()])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicked_task_keeps_its_slot_in_the_output() {
        let source = Arc::new(PanickingSource {
            panicking_email: "boom@example.com",
        });
        let gate = Arc::new(RateGate::new(Duration::ZERO));

        let leads = vec![lead("a@example.com"), lead("boom@example.com"), lead("c@example.com")];
        let results = fetch_replies_batch(source, gate, leads, "c1", &fast_opts(1)).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[1].lead.email, "boom@example.com");
        assert!(results[1].error.is_some());
        assert!(results[1].emails.is_empty());
        assert!(results[0].error.is_none());
        assert!(results[2].error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_by_semaphore() {
        let source = Arc::new(ScriptedSource::new("none"));
        let gate = Arc::new(RateGate::new(Duration::ZERO));

        let leads: Vec<Lead> = (0..6).map(|i| lead(&format!("l{i}@example.com"))).collect();
        fetch_replies_batch(source.clone(), gate, leads, "c1", &fast_opts(2)).await;

        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 2);
    }
}
