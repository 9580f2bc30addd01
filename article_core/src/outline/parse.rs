//! Parser for the line-based outline format.
//!
//! ```text
//! [INTRO]
//! > talking point
//! [SHORTCODE]            offer card for the main offer
//! [SHORTCODE_1]          offer card for the offer at selection position 1
//! [H2: Heading]
//! ! Avoid: topic, topic
//! + offer: offer-id
//! [H3: Subheading]
//! [TERMS]
//! ```
//!
//! Lines that match no rule are ignored so chatty model output still parses.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use offer_facts::OfferId;

use super::{HeadingLevel, SectionKind};
use crate::error::PlanningError;

/// Default heading for a `[TERMS]` section without a title.
pub const DEFAULT_TERMS_HEADING: &str = "Terms & Conditions";

static SECTION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\[\s*(INTRO|SHORTCODE(?:_\w+)?|OFFER|TERMS|H2|H3)\s*(?::(.*))?\]$")
        .expect("valid section token regex")
});

static BARE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(H2|H3)\s*:(.*)$").expect("valid heading regex"));

static AVOID_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!\s*avoid\s*:(.*)$").expect("valid avoid regex"));

static OFFER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\+\s*offers?\s*:(.*)$").expect("valid offer regex"));

static TERMS_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(terms|conditions|fine print)\b").expect("valid terms heading regex")
});

/// How a parsed section points at an offer before it is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferRef {
    /// Position in the selection, 0 being the main offer.
    Position(usize),
    Id(OfferId),
}

/// A section as written, before offer references are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSection {
    pub kind: SectionKind,
    pub heading: String,
    pub talking_points: Vec<String>,
    pub avoid: Vec<String>,
    pub offer_refs: Vec<OfferRef>,
}

impl ParsedSection {
    fn new(kind: SectionKind, heading: String) -> Self {
        Self {
            kind,
            heading,
            talking_points: Vec::new(),
            avoid: Vec::new(),
            offer_refs: Vec::new(),
        }
    }
}

/// Parse outline text into sections.
///
/// Fails on an empty heading, a repeated heading, or text with no sections.
pub fn parse_outline_text(text: &str) -> Result<Vec<ParsedSection>, PlanningError> {
    let mut sections: Vec<ParsedSection> = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim().trim_matches('*').trim();
        if line.is_empty() {
            continue;
        }

        if let Some(section) = parse_section_line(line, sections.len() + 1)? {
            sections.push(section);
            continue;
        }

        let Some(current) = sections.last_mut() else {
            continue;
        };

        if let Some(point) = line.strip_prefix('>') {
            let point = point.trim();
            if !point.is_empty() {
                current.talking_points.push(point.to_string());
            }
        } else if let Some(caps) = AVOID_LINE.captures(line) {
            current.avoid.extend(split_list(caps.get(1).map_or("", |m| m.as_str())));
        } else if let Some(caps) = OFFER_LINE.captures(line) {
            current.offer_refs.extend(
                split_list(caps.get(1).map_or("", |m| m.as_str()))
                    .into_iter()
                    .map(|id| OfferRef::Id(OfferId::new(id))),
            );
        }
    }

    if sections.is_empty() {
        return Err(PlanningError::Malformed("outline has no sections".to_string()));
    }

    let mut headings = HashSet::new();
    for section in &sections {
        if !matches!(section.kind, SectionKind::Heading(_) | SectionKind::Terms) {
            continue;
        }
        if !headings.insert(section.heading.to_lowercase()) {
            return Err(PlanningError::Malformed(format!(
                "duplicate heading '{}'",
                section.heading
            )));
        }
    }

    Ok(sections)
}

/// Check whether a heading names a terms section.
pub fn is_terms_heading(heading: &str) -> bool {
    TERMS_HEADING.is_match(heading)
}

fn parse_section_line(line: &str, position: usize) -> Result<Option<ParsedSection>, PlanningError> {
    if let Some(caps) = SECTION_TOKEN.captures(line) {
        let token = caps.get(1).map_or("", |m| m.as_str()).to_uppercase();
        let title = caps.get(2).map(|m| m.as_str().trim().to_string());

        let section = match token.as_str() {
            "INTRO" => ParsedSection::new(SectionKind::Intro, "Introduction".to_string()),
            "TERMS" => ParsedSection::new(
                SectionKind::Terms,
                title
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| DEFAULT_TERMS_HEADING.to_string()),
            ),
            "OFFER" => {
                let mut section = ParsedSection::new(SectionKind::Offer, String::new());
                if let Some(id) = title.filter(|t| !t.is_empty()) {
                    section.offer_refs.push(OfferRef::Id(OfferId::new(id)));
                }
                section
            }
            "H2" => heading_section(HeadingLevel::H2, title.unwrap_or_default(), position)?,
            "H3" => heading_section(HeadingLevel::H3, title.unwrap_or_default(), position)?,
            shortcode => {
                let mut section = ParsedSection::new(SectionKind::Offer, String::new());
                section.offer_refs.push(OfferRef::Position(shortcode_position(shortcode)));
                section
            }
        };
        return Ok(Some(section));
    }

    if let Some(caps) = BARE_HEADING.captures(line) {
        let level = match caps.get(1).map_or("", |m| m.as_str()).to_uppercase().as_str() {
            "H3" => HeadingLevel::H3,
            _ => HeadingLevel::H2,
        };
        let title = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
        return heading_section(level, title, position).map(Some);
    }

    Ok(None)
}

fn heading_section(
    level: HeadingLevel,
    title: String,
    position: usize,
) -> Result<ParsedSection, PlanningError> {
    let title = title.trim().trim_matches('*').trim().to_string();
    if title.is_empty() {
        return Err(PlanningError::Malformed(format!(
            "section {} has an empty heading",
            position
        )));
    }
    let kind = if is_terms_heading(&title) {
        SectionKind::Terms
    } else {
        SectionKind::Heading(level)
    };
    Ok(ParsedSection::new(kind, title))
}

/// `SHORTCODE` and `SHORTCODE_MAIN` are the main offer; `SHORTCODE_<n>` is position n.
fn shortcode_position(token: &str) -> usize {
    token
        .strip_prefix("SHORTCODE_")
        .and_then(|suffix| suffix.parse().ok())
        .unwrap_or(0)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
