//! US-address heuristic classifier.
//!
//! A fixed precedence of regex checks over the structured address
//! fields, with an AI collaborator as the last resort when every rule
//! is inconclusive. Total: classification errors degrade to `false`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::traits::UsLocationAi;

/// Structured address fields as read from a lead.
#[derive(Debug, Clone, Default)]
pub struct AddressFields {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

impl AddressFields {
    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }

    fn values(&self) -> impl Iterator<Item = &str> {
        [
            self.address.as_str(),
            self.city.as_str(),
            self.state.as_str(),
            self.zip.as_str(),
            self.country.as_str(),
        ]
        .into_iter()
        .filter(|v| !v.trim().is_empty())
    }

    fn combined(&self) -> String {
        format!("{} {} {}", self.address, self.city, self.state)
            .trim()
            .to_string()
    }

    fn full_text(&self) -> String {
        self.values().collect::<Vec<_>>().join(" ")
    }
}

lazy_static! {
    static ref COUNTRY_USA: Regex =
        Regex::new(r"(?i)\b(usa|u\.s\.a\.|u\.s\.|united states)\b").unwrap();
    static ref STATE_ABBREV: Regex = Regex::new(
        r"\b(AL|AK|AZ|AR|CA|CO|CT|DE|FL|GA|HI|ID|IL|IN|IA|KS|KY|LA|ME|MD|MA|MI|MN|MS|MO|MT|NE|NV|NH|NJ|NM|NY|NC|ND|OH|OK|OR|PA|RI|SC|SD|TN|TX|UT|VT|VA|WA|WV|WI|WY|DC)\b"
    )
    .unwrap();
    static ref STATE_FULL: Regex = Regex::new(
        r"(?i)\b(alabama|alaska|arizona|arkansas|california|colorado|connecticut|delaware|florida|georgia|hawaii|idaho|illinois|indiana|iowa|kansas|kentucky|louisiana|maine|maryland|massachusetts|michigan|minnesota|mississippi|missouri|montana|nebraska|nevada|new hampshire|new jersey|new mexico|new york|north carolina|north dakota|ohio|oklahoma|oregon|pennsylvania|rhode island|south carolina|south dakota|tennessee|texas|utah|vermont|virginia|washington|west virginia|wisconsin|wyoming)\b"
    )
    .unwrap();
    static ref ZIP: Regex = Regex::new(r"\b\d{5}(-\d{4})?\b").unwrap();
    static ref US_CITY: Regex = Regex::new(
        r"(?i)\b(new york|los angeles|chicago|houston|phoenix|philadelphia|san antonio|san diego|dallas|austin|seattle|denver|boston|miami|atlanta|minneapolis|detroit|portland|nashville|charlotte)\b"
    )
    .unwrap();
    static ref CITY_STATE_COMBO: Regex =
        Regex::new(r"(?i)\b[a-z .'-]+,\s*[A-Za-z]{2}\b").unwrap();
}

/// Regex precedence: explicit country, state abbreviation or full name,
/// ZIP, well-known city, "City, ST" combo, then the combined
/// address+city+state string, then the AI last resort.
pub async fn is_address_us_based(fields: &AddressFields, ai: &dyn UsLocationAi) -> bool {
    let values: Vec<&str> = fields.values().collect();

    if values.iter().any(|v| COUNTRY_USA.is_match(v)) {
        return true;
    }
    if values
        .iter()
        .any(|v| STATE_ABBREV.is_match(v) || STATE_FULL.is_match(v))
    {
        return true;
    }
    if values.iter().any(|v| ZIP.is_match(v)) {
        return true;
    }
    if values.iter().any(|v| US_CITY.is_match(v)) {
        return true;
    }
    if values.iter().any(|v| CITY_STATE_COMBO.is_match(v)) {
        return true;
    }

    let combined = fields.combined();
    if STATE_ABBREV.is_match(&combined) || STATE_FULL.is_match(&combined) || ZIP.is_match(&combined)
    {
        return true;
    }

    let full_text = fields.full_text();
    if full_text.is_empty() {
        return false;
    }
    tracing::debug!("Address regexes inconclusive, asking AI classifier");
    match ai.is_us(&full_text).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "US-address AI classification failed");
            false
        }
    }
}
