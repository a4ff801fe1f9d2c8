//! Row extraction: turn a (lead, reply) pair into a flat sheet row.
//!
//! Free-text parsing is delegated to the text-extraction collaborator;
//! phone and name fallbacks are regex/heuristic and deterministic.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::config::MAX_REPLY_WORDS;
use crate::traits::ReplyExtractor;
use crate::types::{Lead, Reply, SheetRow};

/// Signaled skip conditions: the caller marks the lead as handled and
/// writes no row. Distinct from an extraction failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractSkip {
    #[error("reply body is empty")]
    EmptyBody,
    #[error("reply body has {0} words, over the {MAX_REPLY_WORDS}-word limit")]
    TooManyWords(usize),
}

lazy_static! {
    static ref PHONE: Regex = Regex::new(
        r"(\+?\d{1,3}[-.\s]?)?(\(\d{2,4}\)|\d{2,4})[-.\s]?\d{3,4}[-.\s]?\d{3,4}"
    )
    .unwrap();
    static ref BLANK_LINE: Regex = Regex::new(r"\r?\n\r?\n").unwrap();
}

/// First phone-shaped substring in the text, if any.
pub fn extract_phone(text: &str) -> Option<String> {
    PHONE.find(text).map(|m| m.as_str().to_string())
}

/// Split on blank lines (paragraph blocks).
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    BLANK_LINE.split(text).collect()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Lead name: explicit first/last fields, else a combined "user name"
/// split on whitespace, else the from-address display name (first token
/// is the first name, the remainder the last name).
fn derive_name(lead: &Lead, reply: &Reply) -> (String, String) {
    if lead.first_name.is_some() || lead.last_name.is_some() {
        return (
            lead.first_name.clone().unwrap_or_default(),
            lead.last_name.clone().unwrap_or_default(),
        );
    }
    let combined = lead
        .user_name
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            reply
                .from_address
                .first()
                .map(|m| m.name.clone())
                .filter(|s| !s.trim().is_empty())
        });
    match combined {
        Some(name) => {
            let mut tokens = name.split_whitespace();
            let first = tokens.next().unwrap_or_default().to_string();
            let rest = tokens.collect::<Vec<_>>().join(" ");
            (first, rest)
        }
        None => (String::new(), String::new()),
    }
}

/// Lead phones: a single phone field split on comma into up to two
/// numbers, else separate phone/phone2 payload fields.
fn derive_phones(lead: &Lead) -> (String, String) {
    if let Some(phone) = lead.phone.as_deref().filter(|s| !s.trim().is_empty()) {
        let mut parts = phone.splitn(2, ',').map(|p| p.trim().to_string());
        let first = parts.next().unwrap_or_default();
        let second = parts.next().unwrap_or_default();
        if !second.is_empty() {
            return (first, second);
        }
        return (first, lead.payload_str("phone2").unwrap_or_default());
    }
    (
        lead.payload_str("phone1")
            .or_else(|| lead.payload_str("phone_1"))
            .unwrap_or_default(),
        lead.payload_str("phone2").unwrap_or_default(),
    )
}

/// Convert one qualifying (lead, reply) pair into a sheet row.
///
/// Preconditions: the reply body must be non-empty and at most
/// `MAX_REPLY_WORDS` words (boundary inclusive); otherwise a skip is
/// signaled and no row is produced. An extractor error propagates as a
/// normal error; callers treat it as a per-unit failure.
pub async fn to_row(
    lead: &Lead,
    reply: &Reply,
    extractor: &dyn ReplyExtractor,
) -> Result<SheetRow, anyhow::Error> {
    let body = reply.body();
    if body.trim().is_empty() {
        return Err(ExtractSkip::EmptyBody.into());
    }
    let words = word_count(body);
    if words > MAX_REPLY_WORDS {
        return Err(ExtractSkip::TooManyWords(words).into());
    }

    let extracted = extractor.extract(body).await?;

    let (first_name, last_name) = derive_name(lead, reply);
    let (phone1, phone2) = derive_phones(lead);

    let signature = if !extracted.signature.is_empty() {
        extracted.signature.clone()
    } else if !extracted.reply.is_empty() {
        let paragraphs = split_paragraphs(&extracted.reply);
        let tail = paragraphs.len().saturating_sub(2);
        paragraphs[tail..].join("\n\n")
    } else {
        String::new()
    };

    let (sales_person, sales_person_email) = if !extracted.sales_person.is_empty()
        || !extracted.sales_person_email.is_empty()
    {
        (extracted.sales_person.clone(), extracted.sales_person_email.clone())
    } else {
        match reply.to_address.first() {
            Some(mailbox) => (mailbox.name.clone(), mailbox.address.clone()),
            None => (String::new(), String::new()),
        }
    };

    let company_phone = lead
        .phone
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| Some(phone1.clone()).filter(|s| !s.is_empty()))
        .or_else(|| Some(phone2.clone()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "none".to_string());
    let phone_from_email =
        extract_phone(&extracted.reply).unwrap_or_else(|| "none".to_string());

    Ok(SheetRow {
        agent: String::new(),
        sales_person,
        sales_person_email,
        company: lead.company.clone().unwrap_or_default(),
        company_phone,
        phone_from_email,
        lead_first_name: first_name,
        lead_last_name: last_name,
        lead_email: lead.email.clone(),
        email_reply: extracted.reply.clone(),
        phone1,
        phone2,
        address: lead.payload_str("address").unwrap_or_default(),
        city: lead.payload_str("city").unwrap_or_default(),
        state: lead.payload_str("state").unwrap_or_default(),
        zip: lead.payload_str("zip").unwrap_or_default(),
        details: lead
            .payload_str("details")
            .or_else(|| lead.website.clone())
            .unwrap_or_default(),
        email_signature: signature,
        email_id: reply.id.clone().unwrap_or_default(),
        lead_id: lead.id.clone().unwrap_or_default(),
        thread_id: reply.thread_id.clone().unwrap_or_default(),
        email_timestamp: reply.timestamp.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExtractedReply, Mailbox};
    use anyhow::Result;

    struct StubExtractor(ExtractedReply);

    #[async_trait::async_trait]
    impl ReplyExtractor for StubExtractor {
        async fn extract(&self, _email_content: &str) -> Result<ExtractedReply> {
            Ok(self.0.clone())
        }
    }

    fn reply_with_body(body: &str) -> Reply {
        Reply {
            body_text: Some(body.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_body_signals_skip() {
        let err = to_row(&Lead::default(), &reply_with_body("  "), &StubExtractor(Default::default()))
            .await
            .unwrap_err();
        assert_eq!(err.downcast::<ExtractSkip>().unwrap(), ExtractSkip::EmptyBody);
    }

    #[tokio::test]
    async fn word_limit_is_boundary_inclusive() {
        let extractor = StubExtractor(ExtractedReply {
            reply: "ok".into(),
            ..Default::default()
        });

        let at_limit = vec!["word"; 500].join(" ");
        assert!(to_row(&Lead::default(), &reply_with_body(&at_limit), &extractor)
            .await
            .is_ok());

        let over_limit = vec!["word"; 501].join(" ");
        let err = to_row(&Lead::default(), &reply_with_body(&over_limit), &extractor)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast::<ExtractSkip>().unwrap(),
            ExtractSkip::TooManyWords(501)
        );
    }

    #[tokio::test]
    async fn name_falls_back_through_user_name_then_from_address() {
        let extractor = StubExtractor(ExtractedReply {
            reply: "ok".into(),
            ..Default::default()
        });

        let mut lead = Lead {
            email: "jane@x.com".into(),
            user_name: Some("Jane Q Doe".into()),
            ..Default::default()
        };
        let row = to_row(&lead, &reply_with_body("hello"), &extractor).await.unwrap();
        assert_eq!(row.lead_first_name, "Jane");
        assert_eq!(row.lead_last_name, "Q Doe");

        lead.user_name = None;
        let mut reply = reply_with_body("hello");
        reply.from_address = vec![Mailbox {
            name: "Sam Smith".into(),
            address: "sam@x.com".into(),
        }];
        let row = to_row(&lead, &reply, &extractor).await.unwrap();
        assert_eq!(row.lead_first_name, "Sam");
        assert_eq!(row.lead_last_name, "Smith");
    }

    #[tokio::test]
    async fn comma_separated_phone_splits_into_two() {
        let extractor = StubExtractor(ExtractedReply {
            reply: "ok".into(),
            ..Default::default()
        });
        let lead = Lead {
            email: "j@x.com".into(),
            phone: Some("555-0101, 555-0102".into()),
            ..Default::default()
        };
        let row = to_row(&lead, &reply_with_body("hello"), &extractor).await.unwrap();
        assert_eq!(row.phone1, "555-0101");
        assert_eq!(row.phone2, "555-0102");
    }

    #[tokio::test]
    async fn phone_like_fields_fall_back_to_none() {
        let extractor = StubExtractor(ExtractedReply {
            reply: "no numbers here".into(),
            ..Default::default()
        });
        let row = to_row(&Lead::default(), &reply_with_body("hello"), &extractor)
            .await
            .unwrap();
        assert_eq!(row.company_phone, "none");
        assert_eq!(row.phone_from_email, "none");
        // All other absences stay empty strings.
        assert_eq!(row.company, "");
        assert_eq!(row.address, "");
    }

    #[tokio::test]
    async fn phone_from_email_is_regex_extracted() {
        let extractor = StubExtractor(ExtractedReply {
            reply: "call me at 555-123-4567 tomorrow".into(),
            ..Default::default()
        });
        let row = to_row(&Lead::default(), &reply_with_body("hello"), &extractor)
            .await
            .unwrap();
        assert_eq!(row.phone_from_email, "555-123-4567");
    }

    #[tokio::test]
    async fn signature_defaults_to_last_two_paragraphs() {
        let extractor = StubExtractor(ExtractedReply {
            reply: "Sounds good.\n\nBest,\n\nJane Doe\nAcme Corp".into(),
            ..Default::default()
        });
        let row = to_row(&Lead::default(), &reply_with_body("hello"), &extractor)
            .await
            .unwrap();
        assert_eq!(row.email_signature, "Best,\n\nJane Doe\nAcme Corp");
    }

    #[tokio::test]
    async fn salesperson_falls_back_to_first_to_address() {
        let extractor = StubExtractor(ExtractedReply {
            reply: "ok".into(),
            ..Default::default()
        });
        let mut reply = reply_with_body("hello");
        reply.to_address = vec![Mailbox {
            name: "Rep One".into(),
            address: "rep@us.com".into(),
        }];
        let row = to_row(&Lead::default(), &reply, &extractor).await.unwrap();
        assert_eq!(row.sales_person, "Rep One");
        assert_eq!(row.sales_person_email, "rep@us.com");
    }
}
