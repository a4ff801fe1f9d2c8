use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn str_at<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| value.get(k).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
}

/// One contact record from the campaign source.
///
/// The source schema varies by campaign, so everything beyond the email
/// is optional and the raw payload is kept for defensive reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lead {
    pub id: Option<String>,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub payload: Value,
}

impl Lead {
    /// Lenient construction from whatever shape the source returns.
    /// Unknown shapes degrade to defaults; this never panics.
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: str_at(value, &["id", "lead_id"]).map(str::to_string),
            email: str_at(value, &["email", "lead"]).unwrap_or_default().to_string(),
            first_name: str_at(value, &["first_name"]).map(str::to_string),
            last_name: str_at(value, &["last_name"]).map(str::to_string),
            user_name: str_at(value, &["user_name"]).map(str::to_string),
            company: str_at(value, &["company_name", "company"]).map(str::to_string),
            phone: str_at(value, &["phone"]).map(str::to_string),
            website: str_at(value, &["website", "details"]).map(str::to_string),
            payload: value.get("payload").cloned().unwrap_or(Value::Null),
        }
    }

    /// Read a free-form field from the lead payload, falling back to the
    /// top-level record.
    pub fn payload_str(&self, key: &str) -> Option<String> {
        self.payload
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// One inbound message associated with a lead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reply {
    pub id: Option<String>,
    pub thread_id: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    /// Explicit "marked interested" status flag from the source.
    pub interest_status: Option<i64>,
    /// AI interest score in 0..1.
    pub ai_interest: Option<f64>,
    /// Message-type tag, e.g. "received" for inbound mail.
    pub email_type: Option<String>,
    pub ue_type: Option<i64>,
    pub from_address: Vec<Mailbox>,
    pub to_address: Vec<Mailbox>,
    pub timestamp: Option<String>,
}

/// A (display name, address) pair from a structured address list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mailbox {
    pub name: String,
    pub address: String,
}

impl Reply {
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: str_at(value, &["id", "message_id"]).map(str::to_string),
            thread_id: str_at(value, &["thread_id"]).map(str::to_string),
            body_text: value
                .get("body")
                .and_then(|b| b.get("text"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            body_html: value
                .get("body")
                .and_then(|b| b.get("html"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            interest_status: value.get("i_status").and_then(|v| v.as_i64()),
            ai_interest: value.get("ai_interest_value").and_then(|v| v.as_f64()),
            email_type: str_at(value, &["email_type"]).map(str::to_string),
            ue_type: value.get("ue_type").and_then(|v| v.as_i64()),
            from_address: parse_address_list(value.get("from_address_json")),
            to_address: parse_address_list(value.get("to_address_json")),
            timestamp: str_at(value, &["timestamp_email", "timestamp_created"])
                .map(str::to_string),
        }
    }

    /// Plain text preferred over HTML.
    pub fn body(&self) -> &str {
        self.body_text
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.body_html.as_deref())
            .unwrap_or_default()
    }
}

fn parse_address_list(value: Option<&Value>) -> Vec<Mailbox> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .map(|e| Mailbox {
            name: str_at(e, &["name"]).unwrap_or_default().to_string(),
            address: str_at(e, &["address", "email"]).unwrap_or_default().to_string(),
        })
        .collect()
}

/// One normalized page of leads from the source.
#[derive(Debug, Clone, Default)]
pub struct LeadPage {
    pub leads: Vec<Lead>,
    pub next_cursor: Option<String>,
}

/// Structured fields pulled out of a free-text reply by the
/// text-extraction collaborator. Every field defaults to empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedReply {
    pub reply: String,
    pub sender_first_name: String,
    pub sender_last_name: String,
    pub sales_person: String,
    pub sales_person_email: String,
    pub signature: String,
    pub original: String,
}

/// The exported flattened record: one row per qualifying reply.
///
/// Every field is a string; absent data is the empty string, except the
/// two phone-like fields, which fall back to the literal "none". The
/// asymmetry matches what the downstream sheet consumers expect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetRow {
    pub agent: String,
    pub sales_person: String,
    pub sales_person_email: String,
    pub company: String,
    pub company_phone: String,
    pub phone_from_email: String,
    pub lead_first_name: String,
    pub lead_last_name: String,
    pub lead_email: String,
    pub email_reply: String,
    pub phone1: String,
    pub phone2: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub details: String,
    pub email_signature: String,
    // Source identifiers for traceability.
    pub email_id: String,
    pub lead_id: String,
    pub thread_id: String,
    pub email_timestamp: String,
}

/// Terminal report for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub rows: Vec<SheetRow>,
    pub pages_fetched: u32,
    pub leads_processed: u32,
    pub distinct_leads_checked: u64,
    pub interested_lead_count: u32,
    pub llm_interested_count: u32,
    pub encoded_count: u32,
    pub stopped_early: bool,
    pub abort_reason: Option<String>,
    pub max_rows_cap: usize,
    pub max_pages_cap: u32,
    pub ai_interest_threshold: f64,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lead_from_value_reads_known_fields() {
        let lead = Lead::from_value(&json!({
            "id": "l1",
            "email": "Jane@Example.com",
            "company_name": "Acme",
            "payload": { "city": "Boston", "phone2": "555-0102" }
        }));
        assert_eq!(lead.id.as_deref(), Some("l1"));
        assert_eq!(lead.email, "Jane@Example.com");
        assert_eq!(lead.company.as_deref(), Some("Acme"));
        assert_eq!(lead.payload_str("city").as_deref(), Some("Boston"));
        assert_eq!(lead.payload_str("missing"), None);
    }

    #[test]
    fn lead_from_degenerate_value_defaults() {
        let lead = Lead::from_value(&json!("not an object"));
        assert_eq!(lead.id, None);
        assert_eq!(lead.email, "");
    }

    #[test]
    fn reply_prefers_plain_text_body() {
        let reply = Reply::from_value(&json!({
            "id": "e1",
            "body": { "text": "plain", "html": "<p>rich</p>" }
        }));
        assert_eq!(reply.body(), "plain");

        let html_only = Reply::from_value(&json!({
            "body": { "html": "<p>rich</p>" }
        }));
        assert_eq!(html_only.body(), "<p>rich</p>");
    }

    #[test]
    fn reply_parses_address_lists() {
        let reply = Reply::from_value(&json!({
            "from_address_json": [{ "name": "Jane Q Doe", "address": "jane@x.com" }],
            "to_address_json": [{ "name": "Sam Rep", "email": "sam@us.com" }]
        }));
        assert_eq!(reply.from_address[0].name, "Jane Q Doe");
        assert_eq!(reply.to_address[0].address, "sam@us.com");
    }
}
