//! Interest classification.
//!
//! Two layers: a cheap, pure server-hint filter over the reply metadata
//! (`is_interested_reply`), and the heavier semantic check used before
//! committing a row (`is_genuinely_interested`) which asks the LLM
//! judge and falls back to precompiled keyword rules when the judge is
//! unavailable or ambiguous.

use lazy_static::lazy_static;
use regex::Regex;

use crate::traits::{InterestJudge, InterestVerdict};
use crate::types::Reply;

/// Cheap server-hint filter. Pure and total; `None` is not interested.
///
/// Decision order, first match wins:
/// 1. explicit "interested" status flag,
/// 2. AI interest score >= threshold,
/// 3. message tagged as inbound ("received" type or ue_type 2).
pub fn is_interested_reply(reply: Option<&Reply>, threshold: f64) -> bool {
    let Some(reply) = reply else {
        return false;
    };
    if reply.interest_status == Some(1) {
        return true;
    }
    if reply.ai_interest.is_some_and(|score| score >= threshold) {
        return true;
    }
    reply.email_type.as_deref() == Some("received") || reply.ue_type == Some(2)
}

/// Strip HTML tags, quoted `>` lines, the `-- ` signature block, and
/// normalize line endings; lowercase + trim.
pub fn normalize_reply_text(text: &str) -> String {
    lazy_static! {
        static ref TAGS: Regex = Regex::new(r"<[^>]+>").unwrap();
        static ref QUOTED: Regex = Regex::new(r"(?m)^>.*$").unwrap();
        static ref SIG_BLOCK: Regex = Regex::new(r"(?s)-- \r?\n.*$").unwrap();
    }
    let text = TAGS.replace_all(text, "");
    let text = QUOTED.replace_all(&text, "");
    let text = SIG_BLOCK.replace_all(&text, "");
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim()
        .to_lowercase()
}

lazy_static! {
    static ref AUTO_REPLY: Vec<Regex> = [
        r"out of office",
        r"auto-?reply",
        r"thank you for (your )?email",
        r"i am (currently|on).+(holiday|vacation)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();

    static ref PROMOTIONAL: Vec<Regex> = [
        r"\bwe (offer|provide)\b",
        r"\bcheck out our\b",
        r"visit our website",
        r"our services include",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();

    static ref DECLINE: Regex = Regex::new(r"no thanks|\bnot interested\b").unwrap();

    static ref POSITIVE_INTENT: Vec<Regex> = [
        r"\bmore details\b",
        r"\bhow does\b",
        r"\blet['’]?s schedule\b",
        r"\bwhen can you\b",
        r"\bpricing\b",
        r"\bi would like\b",
        r"\bwe need\b",
        r"\bagree to\b",
        r"\bwhat services do you provide\??",
        r"\b(?:yes[:,]?\s*)?interested\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
}

/// Local keyword fallback over normalized text.
///
/// Rejects immediately on any auto-reply, promotional, or explicit
/// decline match; otherwise accepts only if at least one positive
/// intent pattern matches.
pub fn rule_based_interest(text: &str) -> bool {
    if AUTO_REPLY.iter().any(|rx| rx.is_match(text))
        || PROMOTIONAL.iter().any(|rx| rx.is_match(text))
        || DECLINE.is_match(text)
    {
        return false;
    }
    POSITIVE_INTENT.iter().any(|rx| rx.is_match(text))
}

/// The heavier interest determination run before committing a row:
/// LLM judge first, keyword rules when the judge errors or is unclear.
pub async fn is_genuinely_interested(reply_text: &str, judge: &dyn InterestJudge) -> bool {
    if reply_text.trim().is_empty() {
        return false;
    }
    let text = normalize_reply_text(reply_text);

    match judge.classify(&text).await {
        Ok(InterestVerdict::Interested) => true,
        Ok(InterestVerdict::NotInterested) => false,
        Ok(InterestVerdict::Unclear) => {
            tracing::debug!("Interest judge unclear, using rule-based fallback");
            rule_based_interest(&text)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Interest judge failed, using rule-based fallback");
            rule_based_interest(&text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn reply(
        interest_status: Option<i64>,
        ai_interest: Option<f64>,
        email_type: Option<&str>,
    ) -> Reply {
        Reply {
            interest_status,
            ai_interest,
            email_type: email_type.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn interested_flag_wins_regardless_of_threshold() {
        let r = reply(Some(1), Some(0.0), None);
        assert!(is_interested_reply(Some(&r), 0.99));
    }

    #[test]
    fn ai_score_meets_threshold() {
        let r = reply(None, Some(0.9), None);
        assert!(is_interested_reply(Some(&r), 0.8));
        assert!(!is_interested_reply(Some(&r), 0.95));
    }

    #[test]
    fn received_type_is_fallback() {
        let r = reply(None, Some(0.1), Some("received"));
        assert!(is_interested_reply(Some(&r), 0.8));
    }

    #[test]
    fn none_is_not_interested() {
        assert!(!is_interested_reply(None, 0.5));
    }

    #[test]
    fn normalize_strips_markup_and_quotes() {
        let text = "Sounds <b>Great</b>!\r\n> earlier message\r\n-- \r\nJane\nAcme";
        assert_eq!(normalize_reply_text(text), "sounds great!");
    }

    #[test]
    fn rule_based_rejects_auto_replies_even_with_intent() {
        assert!(!rule_based_interest("out of office, but send pricing"));
        assert!(!rule_based_interest("we offer similar pricing plans"));
        assert!(!rule_based_interest("no thanks, not interested"));
    }

    #[test]
    fn rule_based_requires_positive_intent() {
        assert!(rule_based_interest("could you share pricing?"));
        assert!(rule_based_interest("yes, interested"));
        assert!(!rule_based_interest("please remove me from this list"));
    }

    struct FixedJudge(InterestVerdict);

    #[async_trait::async_trait]
    impl InterestJudge for FixedJudge {
        async fn classify(&self, _reply_text: &str) -> Result<InterestVerdict> {
            Ok(self.0)
        }
    }

    struct FailingJudge;

    #[async_trait::async_trait]
    impl InterestJudge for FailingJudge {
        async fn classify(&self, _reply_text: &str) -> Result<InterestVerdict> {
            anyhow::bail!("judge offline")
        }
    }

    #[tokio::test]
    async fn judge_verdict_is_authoritative() {
        assert!(is_genuinely_interested("tell me more", &FixedJudge(InterestVerdict::Interested)).await);
        assert!(
            !is_genuinely_interested("send me pricing", &FixedJudge(InterestVerdict::NotInterested))
                .await
        );
    }

    #[tokio::test]
    async fn unclear_and_errors_fall_back_to_rules() {
        assert!(is_genuinely_interested("what is the pricing?", &FixedJudge(InterestVerdict::Unclear)).await);
        assert!(is_genuinely_interested("what is the pricing?", &FailingJudge).await);
        assert!(!is_genuinely_interested("lovely weather today", &FailingJudge).await);
    }

    #[tokio::test]
    async fn empty_reply_short_circuits() {
        assert!(!is_genuinely_interested("   ", &FixedJudge(InterestVerdict::Interested)).await);
    }
}
