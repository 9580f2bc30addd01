//! Offer definitions - the promotional records every article is grounded on.

mod parsing;
mod states;

pub use parsing::*;
pub use states::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for offers.
///
/// Ids are assigned by the upstream offer feed, so they are opaque strings rather
/// than UUIDs. Records arriving without one get a generated UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(pub String);

impl OfferId {
    /// Create an offer ID from an upstream identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random offer ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OfferId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A brand and its bonus code, kept as a single value.
///
/// The pair is only ever constructed together and has no setters, so a code can
/// never end up attributed to another brand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrandCode {
    brand: String,
    code: String,
}

impl BrandCode {
    pub fn new(brand: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            code: code.into(),
        }
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl std::fmt::Display for BrandCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.brand, self.code)
    }
}

/// Errors raised while turning raw records into offers.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("offer record is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("offer record is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown offer id `{0}`")]
    UnknownOffer(OfferId),
}

/// An offer record as it arrives from the offer feed.
///
/// Every field is optional here; [`parse_offer`] decides what is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawOffer {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub brand: Option<String>,

    #[serde(default, alias = "code")]
    pub bonus_code: Option<String>,

    /// Headline bonus description.
    #[serde(default)]
    pub offer_text: Option<String>,

    /// Older feeds put the bonus description here instead of `offer_text`.
    #[serde(default)]
    pub affiliate_offer: Option<String>,

    #[serde(default)]
    pub terms: Option<String>,

    /// Tracking link for the offer.
    #[serde(default, alias = "switchboard_link")]
    pub source_url: Option<String>,

    /// Eligible states, either a list or a delimited string.
    #[serde(default)]
    pub states: Option<serde_json::Value>,
}

impl RawOffer {
    /// Deserialize a raw record from JSON.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A parsed offer with its explicitly stated facts.
///
/// Derived facts (`expiration_days`, `minimum_odds`, ...) are only ever filled from
/// explicit statements in the offer's own text. A missing fact stays `None`. The
/// text and the facts derived from it are private, so they only change together
/// through [`Offer::with_bonus`] and [`Offer::with_terms`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,

    pub pairing: BrandCode,

    /// Bonus description, e.g. "Bet $5, Get $200 in Bonus Bets".
    bonus: String,

    /// Days until the bonus expires, only when the text says so.
    expiration_days: Option<u32>,

    /// Legal terms, verbatim from the feed.
    terms_text: String,

    pub source_url: String,

    /// Eligible state codes; `["ALL"]` for nationwide, empty when unknown.
    pub states: Vec<String>,

    minimum_odds: Option<String>,

    /// Wagering requirement in `Nx` form.
    wagering_requirement: Option<String>,

    bonus_amount: Option<String>,
}

impl Offer {
    /// Create a new offer for a brand/code pair.
    pub fn new(id: OfferId, brand: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id,
            pairing: BrandCode::new(brand, code),
            bonus: String::new(),
            expiration_days: None,
            terms_text: String::new(),
            source_url: String::new(),
            states: Vec::new(),
            minimum_odds: None,
            wagering_requirement: None,
            bonus_amount: None,
        }
    }

    /// Set the bonus description and re-derive facts.
    pub fn with_bonus(mut self, bonus: impl Into<String>) -> Self {
        self.bonus = bonus.into();
        self.refresh_facts();
        self
    }

    /// Set the terms text and re-derive facts.
    pub fn with_terms(mut self, terms: impl Into<String>) -> Self {
        self.terms_text = terms.into();
        self.refresh_facts();
        self
    }

    /// Set the tracking link.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    /// Set the eligible states explicitly.
    pub fn with_states(mut self, states: Vec<String>) -> Self {
        self.states = states;
        self
    }

    pub fn brand(&self) -> &str {
        self.pairing.brand()
    }

    pub fn bonus(&self) -> &str {
        &self.bonus
    }

    pub fn terms_text(&self) -> &str {
        &self.terms_text
    }

    pub fn expiration_days(&self) -> Option<u32> {
        self.expiration_days
    }

    pub fn minimum_odds(&self) -> Option<&str> {
        self.minimum_odds.as_deref()
    }

    pub fn wagering_requirement(&self) -> Option<&str> {
        self.wagering_requirement.as_deref()
    }

    pub fn bonus_amount(&self) -> Option<&str> {
        self.bonus_amount.as_deref()
    }

    pub fn code(&self) -> &str {
        self.pairing.code()
    }

    /// Check whether the offer is available nationwide.
    pub fn is_nationwide(&self) -> bool {
        self.states.iter().any(|s| s == "ALL")
    }

    /// Re-derive every text-backed fact from the current bonus and terms text.
    fn refresh_facts(&mut self) {
        self.expiration_days = extract_expiration_days(&self.terms_text)
            .or_else(|| extract_expiration_days(&self.bonus));
        self.minimum_odds = extract_minimum_odds(&self.terms_text);
        self.wagering_requirement = extract_wagering_requirement(&self.terms_text);
        self.bonus_amount = extract_bonus_amount(&self.bonus);
        if self.states.is_empty() {
            self.states = extract_states(&self.terms_text);
        }
    }
}
