//! Postgres-backed ledger store and audit log.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};

use lead_pipeline::{AuditSink, LedgerStore, RunSummary};

/// Idempotency ledger on a plain table with a unique (set_key, member)
/// pair; `ON CONFLICT DO NOTHING` gives the atomic first-writer-wins
/// add.
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn members(&self, set_key: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT member FROM processed_keys WHERE set_key = $1")
            .bind(set_key)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load ledger members")?;

        Ok(rows.into_iter().map(|r| r.get("member")).collect())
    }

    async fn add(&self, set_key: &str, member: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_keys (set_key, member)
            VALUES ($1, $2)
            ON CONFLICT (set_key, member) DO NOTHING
            "#,
        )
        .bind(set_key)
        .bind(member)
        .execute(&self.pool)
        .await
        .context("Failed to add ledger member")?;

        Ok(result.rows_affected() == 1)
    }
}

/// One persisted run record, as returned to the logs endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RunLog {
    pub id: i64,
    pub total_processed: i64,
    pub pages_fetched: i64,
    pub leads_processed: i64,
    pub distinct_leads_checked: i64,
    pub interested_lead_count: i64,
    pub stopped_early: bool,
    pub abort_reason: Option<String>,
    pub max_rows_cap: i64,
    pub max_pages_cap: i64,
    pub ai_interest_threshold: f64,
    pub encoded_count: i64,
    pub created_at: DateTime<Utc>,
}

pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All run records, newest first.
    pub async fn list_runs(&self) -> Result<Vec<RunLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, total_processed, pages_fetched, leads_processed,
                   distinct_leads_checked, interested_lead_count, stopped_early,
                   abort_reason, max_rows_cap, max_pages_cap,
                   ai_interest_threshold, encoded_count, created_at
            FROM ingestion_runs
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ingestion runs")?;

        Ok(rows
            .into_iter()
            .map(|r| RunLog {
                id: r.get("id"),
                total_processed: r.get("total_processed"),
                pages_fetched: r.get("pages_fetched"),
                leads_processed: r.get("leads_processed"),
                distinct_leads_checked: r.get("distinct_leads_checked"),
                interested_lead_count: r.get("interested_lead_count"),
                stopped_early: r.get("stopped_early"),
                abort_reason: r.get("abort_reason"),
                max_rows_cap: r.get("max_rows_cap"),
                max_pages_cap: r.get("max_pages_cap"),
                ai_interest_threshold: r.get("ai_interest_threshold"),
                encoded_count: r.get("encoded_count"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn record_run(&self, summary: &RunSummary) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO ingestion_runs (
                total_processed, pages_fetched, leads_processed,
                distinct_leads_checked, interested_lead_count, stopped_early,
                abort_reason, max_rows_cap, max_pages_cap,
                ai_interest_threshold, encoded_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(summary.total as i64)
        .bind(summary.pages_fetched as i64)
        .bind(summary.leads_processed as i64)
        .bind(summary.distinct_leads_checked as i64)
        .bind(summary.interested_lead_count as i64)
        .bind(summary.stopped_early)
        .bind(&summary.abort_reason)
        .bind(summary.max_rows_cap as i64)
        .bind(summary.max_pages_cap as i64)
        .bind(summary.ai_interest_threshold)
        .bind(summary.encoded_count as i64)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert run summary")?;

        Ok(row.get("id"))
    }
}
