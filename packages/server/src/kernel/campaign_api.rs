//! HTTP client for the campaign platform (Instantly-compatible API):
//! paginated lead listing, per-lead reply listing, and campaign
//! enumeration. Response shapes are normalized by the pipeline's shared
//! utilities; this client never branches on provider shape beyond that.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use lead_pipeline::normalize::{next_cursor, records_array};
use lead_pipeline::{Lead, LeadPage, LeadSource, Reply, ReplySource};

const LEADS_LIST_PATH: &str = "/api/v2/leads/list";
const EMAILS_PATH: &str = "/api/v2/emails";
const CAMPAIGNS_PATH: &str = "/api/v2/campaigns";
const CAMPAIGNS_PAGE_SIZE: usize = 10;

pub struct CampaignApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CampaignApiClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Enumerate all campaigns, following the cursor until exhausted.
    pub async fn list_campaigns(&self) -> Result<Vec<Value>> {
        let mut campaigns = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}{}", self.base_url, CAMPAIGNS_PATH))
                .header("Authorization", self.bearer())
                .query(&[("limit", CAMPAIGNS_PAGE_SIZE.to_string())]);
            if let Some(cursor) = &cursor {
                request = request.query(&[("starting_after", cursor.as_str())]);
            }

            let response: Value = request
                .send()
                .await
                .context("Failed to fetch campaigns")?
                .error_for_status()
                .context("Campaign listing returned an error status")?
                .json()
                .await
                .context("Failed to parse campaign listing")?;

            campaigns.extend(records_array(&response));
            cursor = response
                .get("next_starting_after")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        tracing::info!(total = campaigns.len(), "Fetched all campaigns");
        Ok(campaigns)
    }
}

#[async_trait]
impl LeadSource for CampaignApiClient {
    async fn fetch_page(
        &self,
        campaign_id: &str,
        cursor: Option<&str>,
        page_limit: usize,
        ai_threshold: f64,
    ) -> Result<LeadPage> {
        // Filtering happens server-side: interest status below
        // "interested", nonzero reply count, AI score >= threshold.
        let mut body = json!({
            "filters": {
                "lt_interest_status": 1,
                "email_reply_count": { "gt": 0 },
                "ai_interest_value": { "gte": ai_threshold },
                "campaign": campaign_id,
            },
            "limit": page_limit,
        });
        if let Some(cursor) = cursor {
            body["starting_after"] = json!(cursor);
        }

        let response: Value = self
            .http
            .post(format!("{}{}", self.base_url, LEADS_LIST_PATH))
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await
            .context("Failed to fetch lead page")?
            .error_for_status()
            .context("Lead listing returned an error status")?
            .json()
            .await
            .context("Failed to parse lead page")?;

        Ok(LeadPage {
            leads: records_array(&response).iter().map(Lead::from_value).collect(),
            next_cursor: next_cursor(&response),
        })
    }
}

#[async_trait]
impl ReplySource for CampaignApiClient {
    async fn fetch_replies(
        &self,
        lead: &Lead,
        campaign_id: &str,
        per_lead_limit: usize,
    ) -> Result<Vec<Reply>> {
        let mut query: Vec<(&str, String)> = vec![
            ("campaign_id", campaign_id.to_string()),
            ("email_type", "received".to_string()),
            ("sort_order", "desc".to_string()),
            ("i_status", "1".to_string()),
            ("is_unread", "true".to_string()),
            ("limit", per_lead_limit.to_string()),
        ];
        match &lead.id {
            Some(id) => query.push(("lead_id", id.clone())),
            None => query.push(("lead", lead.email.clone())),
        }

        let response: Value = self
            .http
            .get(format!("{}{}", self.base_url, EMAILS_PATH))
            .header("Authorization", self.bearer())
            .query(&query)
            .send()
            .await
            .context("Failed to fetch replies for lead")?
            .error_for_status()
            .context("Reply listing returned an error status")?
            .json()
            .await
            .context("Failed to parse reply listing")?;

        Ok(records_array(&response).iter().map(Reply::from_value).collect())
    }
}
