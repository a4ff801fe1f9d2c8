//! Persisted idempotency ledger: the set of leads already handled for a
//! campaign.
//!
//! Keys are canonical lead emails (lowercased + trimmed), falling back
//! to the lead id when no email is present. A lead is claimed only
//! after its qualifying rows have been confirmed written, never before
//! the fetch, so a mid-run failure cannot silently drop a lead.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::config::LEDGER_KEY_PREFIX;
use crate::traits::LedgerStore;
use crate::types::Lead;

/// Canonicalize an email into a ledger key. `None` for empty input;
/// callers fall back to the lead identifier.
pub fn normalize_key(email: &str) -> Option<String> {
    let key = email.trim().to_lowercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// The canonical ledger key for a lead: email first, id fallback.
pub fn lead_key(lead: &Lead) -> Option<String> {
    normalize_key(&lead.email).or_else(|| lead.id.clone())
}

/// In-run view of the persisted dedup set for one campaign.
pub struct Ledger {
    set_key: String,
    seen: Mutex<HashSet<String>>,
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    /// Load all previously marked keys for a campaign.
    pub async fn seed(campaign_id: &str, store: Arc<dyn LedgerStore>) -> Result<Self> {
        let set_key = format!("{LEDGER_KEY_PREFIX}{campaign_id}");
        let members = store
            .members(&set_key)
            .await
            .with_context(|| format!("Failed to seed ledger for {set_key}"))?;

        tracing::info!(
            campaign_id = %campaign_id,
            seeded = members.len(),
            "Ledger seeded from store"
        );

        Ok(Self {
            set_key,
            seen: Mutex::new(members),
            store,
        })
    }

    /// Number of keys currently known, used to seed the
    /// distinct-leads-checked counter.
    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }

    /// Membership check: in-memory set first, then the backing store.
    pub async fn is_marked(&self, key: &str) -> Result<bool> {
        if self.seen.lock().await.contains(key) {
            return Ok(true);
        }
        let members = self
            .store
            .members(&self.set_key)
            .await
            .context("Ledger store unreachable during membership check")?;
        Ok(members.contains(key))
    }

    /// Claim a key. True only if newly added (first-writer-wins).
    ///
    /// A store failure propagates loudly; treating the key as new on an
    /// outage would let duplicate downstream writes mask the outage.
    pub async fn mark(&self, key: &str) -> Result<bool> {
        {
            let seen = self.seen.lock().await;
            if seen.contains(key) {
                tracing::debug!(key = %key, "Ledger skip: already in memory");
                return Ok(false);
            }
        }

        let added = self
            .store
            .add(&self.set_key, key)
            .await
            .with_context(|| format!("Failed to mark {key} in ledger store"))?;

        // Keep the local set in sync either way so later checks short-circuit.
        self.seen.lock().await.insert(key.to_string());

        if added {
            tracing::debug!(key = %key, "Ledger claim: newly added");
        } else {
            tracing::debug!(key = %key, "Ledger skip: already in store");
        }
        Ok(added)
    }

    /// Drop leads whose key is already claimed. An optimization-only
    /// checkpoint; the authoritative claim happens after a successful
    /// sink write.
    pub async fn filter_new<'a>(&self, leads: &'a [Lead]) -> Vec<&'a Lead> {
        let seen = self.seen.lock().await;
        leads
            .iter()
            .filter(|lead| match lead_key(lead) {
                Some(key) => !seen.contains(&key),
                None => false,
            })
            .collect()
    }
}

/// In-memory ledger store, used in tests and single-process runs.
#[derive(Default)]
pub struct MemoryLedgerStore {
    sets: Mutex<std::collections::HashMap<String, HashSet<String>>>,
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn members(&self, set_key: &str) -> Result<HashSet<String>> {
        Ok(self
            .sets
            .lock()
            .await
            .get(set_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn add(&self, set_key: &str, member: &str) -> Result<bool> {
        Ok(self
            .sets
            .lock()
            .await
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string()))
    }
}
