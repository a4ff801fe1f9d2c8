//! Google Sheets sink via the spreadsheets.values REST API.
//!
//! Ensures the destination tab has a header row, dedupes on the lead
//! email and on the (lead email, reply text) compound key, and appends
//! rows aligned to the header order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use lead_pipeline::{SheetRow, SheetSink};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Column order for exported rows. Every absent value is already an
/// empty string on the row itself, so alignment is stable.
const HEADERS: &[&str] = &[
    "Agent",
    "sales person",
    "sales person email",
    "company",
    "company phone#",
    "phone#from email",
    "lead first name",
    "lead last name",
    "lead email",
    "email reply",
    "phone 1",
    "phone2",
    "address",
    "city",
    "state",
    "zip",
    "details",
    "Email Signature",
    "_email_id",
    "_lead_id",
    "_thread_id",
    "_timestamp_email",
];

fn row_values(row: &SheetRow) -> Vec<String> {
    vec![
        row.agent.clone(),
        row.sales_person.clone(),
        row.sales_person_email.clone(),
        row.company.clone(),
        row.company_phone.clone(),
        row.phone_from_email.clone(),
        row.lead_first_name.clone(),
        row.lead_last_name.clone(),
        row.lead_email.clone(),
        row.email_reply.clone(),
        row.phone1.clone(),
        row.phone2.clone(),
        row.address.clone(),
        row.city.clone(),
        row.state.clone(),
        row.zip.clone(),
        row.details.clone(),
        row.email_signature.clone(),
        row.email_id.clone(),
        row.lead_id.clone(),
        row.thread_id.clone(),
        row.email_timestamp.clone(),
    ]
}

pub struct GoogleSheetsSink {
    http: reqwest::Client,
    access_token: String,
    spreadsheet_id: String,
}

impl GoogleSheetsSink {
    pub fn new(access_token: String, spreadsheet_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token,
            spreadsheet_id,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    async fn read_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = format!("{SHEETS_API_BASE}/{}/values/{range}", self.spreadsheet_id);
        let response: Value = self
            .http
            .get(&url)
            .header("Authorization", self.bearer())
            .send()
            .await
            .context("Failed to read sheet values")?
            .error_for_status()
            .context("Sheet read returned an error status")?
            .json()
            .await
            .context("Failed to parse sheet values")?;

        let rows = response
            .get("values")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|row| {
                row.as_array()
                    .map(|cells| {
                        cells
                            .iter()
                            .map(|c| c.as_str().unwrap_or_default().to_string())
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect())
    }

    async fn write_header(&self, sheet_name: &str) -> Result<()> {
        let url = format!(
            "{SHEETS_API_BASE}/{}/values/{sheet_name}!A1?valueInputOption=RAW",
            self.spreadsheet_id
        );
        self.http
            .put(&url)
            .header("Authorization", self.bearer())
            .json(&json!({ "values": [HEADERS] }))
            .send()
            .await
            .context("Failed to write header row")?
            .error_for_status()
            .context("Header write returned an error status")?;
        Ok(())
    }

    async fn append_values(&self, sheet_name: &str, values: Vec<String>) -> Result<()> {
        let url = format!(
            "{SHEETS_API_BASE}/{}/values/{sheet_name}!A:A:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.spreadsheet_id
        );
        self.http
            .post(&url)
            .header("Authorization", self.bearer())
            .json(&json!({ "values": [values] }))
            .send()
            .await
            .context("Failed to append sheet row")?
            .error_for_status()
            .context("Sheet append returned an error status")?;
        Ok(())
    }
}

fn canonical(text: &str) -> String {
    text.trim().to_lowercase()
}

#[async_trait]
impl SheetSink for GoogleSheetsSink {
    async fn append_row(&self, sheet_name: &str, row: &SheetRow) -> Result<bool> {
        let existing = self.read_values(sheet_name).await?;

        // Missing or mismatched header means a fresh or stale tab.
        let has_header = existing
            .first()
            .is_some_and(|header| header.len() == HEADERS.len());
        if !has_header {
            self.write_header(sheet_name).await?;
        }

        let lead_idx = HEADERS.iter().position(|h| *h == "lead email").expect("known header");
        let reply_idx = HEADERS.iter().position(|h| *h == "email reply").expect("known header");

        let new_email = canonical(&row.lead_email);
        let new_reply = canonical(&row.email_reply);

        for data_row in existing.iter().skip(1) {
            let email = canonical(data_row.get(lead_idx).map(String::as_str).unwrap_or_default());
            let reply = canonical(data_row.get(reply_idx).map(String::as_str).unwrap_or_default());
            if !email.is_empty() && email == new_email {
                if reply == new_reply {
                    tracing::info!(lead_email = %new_email, sheet = %sheet_name, "Skipping row: exact pair already exported");
                } else {
                    tracing::info!(lead_email = %new_email, sheet = %sheet_name, "Skipping row: lead already exported");
                }
                return Ok(false);
            }
        }

        self.append_values(sheet_name, row_values(row)).await?;
        tracing::info!(lead_email = %new_email, sheet = %sheet_name, "Appended row");
        Ok(true)
    }
}
