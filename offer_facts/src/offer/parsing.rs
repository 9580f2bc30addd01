//! Fact extraction from offer text.
//!
//! Every extractor here is explicit-only: it returns `None` unless the text states
//! the fact outright. Nothing is defaulted, so callers must render fallback language
//! ("see full terms") for missing facts instead of assuming a value.

use regex::Regex;
use std::sync::LazyLock;

use super::{parse_states, extract_states, Offer, OfferId, RawOffer, ValidationError};

static EXPIRATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bexpire[sd]?\s+(?:in|within)\s+(\d+)\s+days?\b",
        r"(?i)\bvalid\s+for\s+(\d+)\s+days?\b",
        r"(?i)\bmust\s+be\s+used\s+within\s+(\d+)\s+days?\b",
        r"(?i)\b(\d+)[-\s]day\s+expiration\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid expiration regex"))
    .collect()
});

static MINIMUM_ODDS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bminimum\s+odds\s+(?:of\s+)?([+-]?\d+)",
        r"(?i)\bodds\s+of\s+([+-]?\d+)\s+or\s+(?:longer|better|higher)",
        r"(?i)([+-]\d+)\s+odds\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid odds regex"))
    .collect()
});

static WAGERING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(\d+)x\s+(?:playthrough|rollover|wagering)",
        r"(?i)\b(?:playthrough|rollover|wagering)\s+(?:requirement\s+of\s+)?(\d+)x\b",
        r"(?i)\bmust\s+be\s+wagered\s+(\d+)\s+times?\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid wagering regex"))
    .collect()
});

static DOLLAR_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+(?:,\d{3})*(?:\.\d+)?)").expect("valid amount regex"));
static WORD_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+(?:,\d{3})*)\s+(?:dollars?|bucks)\b").expect("valid amount regex")
});

/// Parse a raw feed record into an [`Offer`].
///
/// Fails when the brand or the bonus code is missing or blank.
pub fn parse_offer(raw: RawOffer) -> Result<Offer, ValidationError> {
    let brand = non_blank(raw.brand).ok_or(ValidationError::MissingField("brand"))?;
    let code = non_blank(raw.bonus_code).ok_or(ValidationError::MissingField("code"))?;

    let id = non_blank(raw.id)
        .map(OfferId::new)
        .unwrap_or_else(OfferId::generate);
    let bonus = non_blank(raw.offer_text)
        .or_else(|| non_blank(raw.affiliate_offer))
        .unwrap_or_default();
    let terms = raw.terms.unwrap_or_default();

    let mut states = raw.states.as_ref().map(parse_states).unwrap_or_default();
    if states.is_empty() {
        states = extract_states(&terms);
    }

    Ok(Offer::new(id, brand, code)
        .with_states(states)
        .with_bonus(bonus)
        .with_terms(terms)
        .with_source_url(non_blank(raw.source_url).unwrap_or_default()))
}

/// Parse a JSON feed record into an [`Offer`].
pub fn parse_offer_json(json: &str) -> Result<Offer, ValidationError> {
    parse_offer(RawOffer::from_json(json)?)
}

/// Extract the bonus expiration window in days.
///
/// Only explicit day-count statements match ("expires in 30 days", "valid for 7
/// days", "must be used within 14 days", "7-day expiration").
pub fn extract_expiration_days(text: &str) -> Option<u32> {
    EXPIRATION_PATTERNS
        .iter()
        .find_map(|re| re.captures(text)?.get(1)?.as_str().parse().ok())
}

/// Extract a minimum odds requirement such as `-500`.
pub fn extract_minimum_odds(text: &str) -> Option<String> {
    first_capture(&MINIMUM_ODDS_PATTERNS, text)
}

/// Extract a wagering requirement, normalised to `Nx`.
pub fn extract_wagering_requirement(text: &str) -> Option<String> {
    first_capture(&WAGERING_PATTERNS, text).map(|n| format!("{}x", n))
}

/// Extract the first dollar amount mentioned in a bonus description.
pub fn extract_bonus_amount(text: &str) -> Option<String> {
    DOLLAR_AMOUNT
        .captures(text)
        .or_else(|| WORD_AMOUNT.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| format!("${}", m.as_str().replace(',', "")))
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(text)?.get(1).map(|m| m.as_str().to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiration_requires_explicit_day_count() {
        assert_eq!(extract_expiration_days("Terms apply"), None);
        assert_eq!(extract_expiration_days("Bonus bets expire soon."), None);
        assert_eq!(extract_expiration_days("Offer ends in 30 minutes"), None);
        assert_eq!(extract_expiration_days(""), None);
    }

    #[test]
    fn test_expiration_phrasings() {
        assert_eq!(extract_expiration_days("expires within 30 days of signup"), Some(30));
        assert_eq!(extract_expiration_days("Bonus Bets expire in 7 days."), Some(7));
        assert_eq!(extract_expiration_days("Credits are valid for 14 days"), Some(14));
        assert_eq!(extract_expiration_days("must be used within 1 day"), Some(1));
        assert_eq!(extract_expiration_days("Subject to a 7-day expiration."), Some(7));
    }

    #[test]
    fn test_minimum_odds() {
        assert_eq!(
            extract_minimum_odds("Minimum odds of -200 apply.").as_deref(),
            Some("-200")
        );
        assert_eq!(
            extract_minimum_odds("Place a bet at odds of +100 or longer").as_deref(),
            Some("+100")
        );
        assert_eq!(extract_minimum_odds("No odds restrictions mentioned"), None);
    }

    #[test]
    fn test_wagering_requirement() {
        assert_eq!(
            extract_wagering_requirement("Subject to 10x playthrough").as_deref(),
            Some("10x")
        );
        assert_eq!(
            extract_wagering_requirement("Bonus must be wagered 5 times").as_deref(),
            Some("5x")
        );
        assert_eq!(extract_wagering_requirement("Terms apply"), None);
    }

    #[test]
    fn test_bonus_amount() {
        assert_eq!(
            extract_bonus_amount("Get $1,000 back in bonus bets").as_deref(),
            Some("$1000")
        );
        assert_eq!(extract_bonus_amount("Get 50 dollars free").as_deref(), Some("$50"));
        assert_eq!(extract_bonus_amount("Free spins"), None);
    }

    #[test]
    fn test_parse_offer_requires_brand_and_code() {
        let missing_brand = RawOffer {
            bonus_code: Some("CODE".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            parse_offer(missing_brand),
            Err(ValidationError::MissingField("brand"))
        ));

        let blank_code = RawOffer {
            brand: Some("DraftKings".to_string()),
            bonus_code: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            parse_offer(blank_code),
            Err(ValidationError::MissingField("code"))
        ));
    }

    #[test]
    fn test_parse_offer_json() {
        let offer = parse_offer_json(
            r#"{
                "id": "dk-200",
                "brand": "DraftKings",
                "bonus_code": "DKBONUS",
                "offer_text": "Bet $5, Get $200 in Bonus Bets",
                "terms": "21+. New customers in NJ, PA only. Bonus bets expire in 7 days.",
                "switchboard_link": "https://go.example.org/dk",
                "states": "NJ, PA"
            }"#,
        )
        .unwrap();

        assert_eq!(offer.id, OfferId::new("dk-200"));
        assert_eq!(offer.brand(), "DraftKings");
        assert_eq!(offer.code(), "DKBONUS");
        assert_eq!(offer.expiration_days(), Some(7));
        assert_eq!(offer.states, vec!["NJ", "PA"]);
        assert_eq!(offer.source_url, "https://go.example.org/dk");
    }

    #[test]
    fn test_parse_offer_generates_missing_id() {
        let offer = parse_offer(RawOffer {
            brand: Some("Fanatics".to_string()),
            bonus_code: Some("FAN".to_string()),
            affiliate_offer: Some("Up to $1,000 in bonus bets".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert!(!offer.id.as_str().is_empty());
        assert_eq!(offer.bonus(), "Up to $1,000 in bonus bets");
        assert_eq!(offer.expiration_days(), None);
    }
}
