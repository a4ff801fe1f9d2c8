//! Global rate gate for outbound calls to the campaign API.
//!
//! The API enforces a low-frequency limit (about 20 requests/minute).
//! Per-worker throttling under-throttles as soon as concurrency > 1, so
//! the gate keeps a single shared "next allowed" cursor: each acquire
//! reserves the slot strictly after the previous reservation, then
//! sleeps until its slot arrives. Callers queue in arrival order with
//! no cap and block until their turn.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateGate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Resolves once the caller may issue its next outbound request,
    /// keeping the configured minimum spacing across all concurrent
    /// callers.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(scheduled) if scheduled > now => scheduled,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        let now = Instant::now();
        if slot > now {
            tracing::trace!(wait_ms = (slot - now).as_millis() as u64, "Rate gate waiting");
            tokio::time::sleep_until(slot).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_are_spaced_by_interval() {
        let gate = Arc::new(RateGate::new(Duration::from_secs(3)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.acquire().await;
                Instant::now()
            }));
        }

        let mut times: Vec<Instant> = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        // First caller goes immediately; every later pair is >= 3s apart.
        assert!(times[0] - start < Duration::from_millis(10));
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_gate_does_not_accumulate_debt() {
        let gate = RateGate::new(Duration::from_secs(3));
        gate.acquire().await;

        // Wait far longer than the interval; the next acquire must not
        // be scheduled in the past or batched up.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let before = Instant::now();
        gate.acquire().await;
        assert!(Instant::now() - before < Duration::from_millis(10));

        // But the one after that is spaced again.
        let before = Instant::now();
        gate.acquire().await;
        assert!(Instant::now() - before >= Duration::from_secs(3));
    }
}
