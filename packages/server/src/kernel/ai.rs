//! LLM collaborators built on rig.rs against an OpenAI-compatible
//! endpoint (OpenRouter by default).
//!
//! All provider-specific parsing lives here, behind the pipeline's
//! traits; the core never sees prompt or response shapes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::providers::openai;

use lead_pipeline::{ExtractedReply, InterestJudge, InterestVerdict, ReplyExtractor, UsLocationAi};

const INTEREST_PREAMBLE: &str = "Classify whether the following email reply from a prospect shows genuine interest:\n\
asking for pricing, next steps, scheduling, or more info.\n\
Ignore promotional pitches and auto-replies.\n\
Answer strictly \"true\" or \"false\".";

const EXTRACT_PREAMBLE: &str = "You are an expert email parsing and extraction system. Analyze the provided email thread and return only a valid JSON object with no surrounding text and no markdown code blocks.\n\
Extract these fields:\n\
- reply: the most recent, main reply of the latest email, excluding quoted emails, signatures, and footers.\n\
- senderFirstName / senderLastName: the name of the person who wrote the most recent reply.\n\
- original: the full raw content of the thread as provided.\n\
- salesPerson / salesPersonEmail: the internal sales representative mentioned in the thread, if any.\n\
- signature: the full text of the sender's email signature.\n\
If a field cannot be definitively extracted, its value must be an empty string, not null.\n\
Output exactly this JSON structure and nothing else:\n\
{\"reply\": \"string\", \"senderFirstName\": \"string\", \"senderLastName\": \"string\", \"original\": \"string\", \"salesPerson\": \"string\", \"salesPersonEmail\": \"string\", \"signature\": \"string\"}";

const US_LOCATION_PREAMBLE: &str = "Return only \"true\" or \"false\".\n\
Reply \"true\" if the input text clearly describes a location in the United States: \
US states (abbreviations or full names), recognizable US cities or ZIP code formats, \
or mentions of USA / U.S.A. / United States.\n\
Reply \"false\" if the location is outside the United States or unclear.\n\
Output must be exactly \"true\" or \"false\". No explanations, no extra text.";

/// OpenAI-compatible client for interest judging, reply extraction, and
/// the US-location last resort.
pub struct LlmClient {
    client: openai::Client,
    model: String,
}

impl LlmClient {
    pub fn openrouter(api_key: &str, model: String) -> Self {
        Self {
            client: openai::Client::from_url(api_key, "https://openrouter.ai/api/v1"),
            model,
        }
    }

    async fn prompt_with(&self, preamble: &str, input: &str) -> Result<String> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(preamble)
            .temperature(0.0)
            .build();

        let response = agent
            .prompt(input)
            .await
            .with_context(|| format!("LLM call failed (model {})", self.model))?;
        Ok(response)
    }
}

#[async_trait]
impl InterestJudge for LlmClient {
    async fn classify(&self, reply_text: &str) -> Result<InterestVerdict> {
        let out = self.prompt_with(INTEREST_PREAMBLE, reply_text).await?;
        Ok(parse_verdict(&out))
    }
}

#[async_trait]
impl ReplyExtractor for LlmClient {
    async fn extract(&self, email_content: &str) -> Result<ExtractedReply> {
        let out = self.prompt_with(EXTRACT_PREAMBLE, email_content).await?;
        Ok(parse_extraction(&out))
    }
}

#[async_trait]
impl UsLocationAi for LlmClient {
    async fn is_us(&self, address_text: &str) -> Result<bool> {
        let out = self.prompt_with(US_LOCATION_PREAMBLE, address_text).await?;
        Ok(out.trim().to_lowercase() == "true")
    }
}

fn parse_verdict(model_out: &str) -> InterestVerdict {
    match model_out.trim().to_lowercase().as_str() {
        "true" | "yes" | "interested" => InterestVerdict::Interested,
        "false" | "no" | "not interested" => InterestVerdict::NotInterested,
        other => {
            tracing::warn!(output = %other, "Unexpected interest verdict from model");
            InterestVerdict::Unclear
        }
    }
}

/// Parse the extraction JSON out of the raw model output: strip code
/// fences, match the outermost braces, and default every missing field
/// to an empty string. Unparseable output degrades to all-empty rather
/// than erroring.
fn parse_extraction(model_out: &str) -> ExtractedReply {
    let mut cleaned = model_out.trim();
    cleaned = cleaned
        .strip_prefix("```json")
        .or_else(|| cleaned.strip_prefix("```"))
        .unwrap_or(cleaned);
    cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    let braced = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };

    let Ok(value) = serde_json::from_str::<serde_json::Value>(braced) else {
        tracing::warn!("Failed to parse extraction output as JSON");
        return ExtractedReply::default();
    };

    let field = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    ExtractedReply {
        reply: field("reply"),
        sender_first_name: field("senderFirstName"),
        sender_last_name: field("senderLastName"),
        sales_person: field("salesPerson"),
        sales_person_email: field("salesPersonEmail"),
        signature: field("signature"),
        original: field("original"),
    }
}
