//! Outlines - the ordered section plan an article is drafted from.

mod parse;
mod planner;

pub use parse::*;
pub use planner::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use offer_facts::OfferId;

/// Heading depth for body sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingLevel {
    H2,
    H3,
}

impl HeadingLevel {
    /// Markdown/HTML heading depth.
    pub fn depth(&self) -> u8 {
        match self {
            HeadingLevel::H2 => 2,
            HeadingLevel::H3 => 3,
        }
    }

    fn token(&self) -> &'static str {
        match self {
            HeadingLevel::H2 => "H2",
            HeadingLevel::H3 => "H3",
        }
    }
}

/// What a section is and how it gets drafted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Opening paragraphs, no heading.
    Intro,
    /// Promo cards for the referenced offers, rendered without generation.
    Offer,
    /// Generated body section under a heading.
    Heading(HeadingLevel),
    /// Terms for every referenced offer, rendered without generation.
    Terms,
}

impl SectionKind {
    /// Check whether this kind streams text from the generator.
    pub fn is_generated(&self) -> bool {
        matches!(self, SectionKind::Intro | SectionKind::Heading(_))
    }

    /// Heading depth when the section is rendered with a heading.
    pub fn heading_depth(&self) -> Option<u8> {
        match self {
            SectionKind::Heading(level) => Some(level.depth()),
            SectionKind::Terms => Some(2),
            SectionKind::Intro | SectionKind::Offer => None,
        }
    }
}

/// One planned section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub kind: SectionKind,

    pub heading: String,

    /// Points the section should cover.
    #[serde(default)]
    pub talking_points: Vec<String>,

    /// Topics the section must stay away from.
    #[serde(default)]
    pub avoid: Vec<String>,

    /// Target length in words.
    pub target_words: u32,

    /// Offers this section may mention.
    #[serde(default)]
    pub offer_refs: Vec<OfferId>,
}

impl OutlineSection {
    pub fn new(kind: SectionKind, heading: impl Into<String>) -> Self {
        Self {
            kind,
            heading: heading.into(),
            talking_points: Vec::new(),
            avoid: Vec::new(),
            target_words: 0,
            offer_refs: Vec::new(),
        }
    }

    pub fn intro() -> Self {
        Self::new(SectionKind::Intro, "Introduction")
    }

    pub fn with_points(mut self, points: Vec<String>) -> Self {
        self.talking_points = points;
        self
    }

    pub fn with_avoid(mut self, avoid: Vec<String>) -> Self {
        self.avoid = avoid;
        self
    }

    pub fn with_offers(mut self, offers: Vec<OfferId>) -> Self {
        self.offer_refs = offers;
        self
    }

    pub fn with_target_words(mut self, words: u32) -> Self {
        self.target_words = words;
        self
    }

    /// Check whether this section references the offer.
    pub fn references(&self, id: &OfferId) -> bool {
        self.offer_refs.contains(id)
    }
}

/// An ordered list of sections.
///
/// Outlines produced by [`OutlinePlanner`] reference every selected offer at least
/// once and no offer outside the selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    sections: Vec<OutlineSection>,
}

impl Outline {
    pub fn new(sections: Vec<OutlineSection>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[OutlineSection] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> Option<&OutlineSection> {
        self.sections.get(index)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Every offer id referenced by any section.
    pub fn referenced_offers(&self) -> HashSet<&OfferId> {
        self.sections
            .iter()
            .flat_map(|section| section.offer_refs.iter())
            .collect()
    }

    /// Selected offers that no section references, in selection order.
    pub fn uncovered(&self, selected: &[OfferId]) -> Vec<OfferId> {
        let referenced = self.referenced_offers();
        selected
            .iter()
            .filter(|id| !referenced.contains(id))
            .cloned()
            .collect()
    }

    /// Editorial lint for the outline. Warnings never block drafting.
    pub fn warnings(&self, keyword: &str) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.sections.iter().any(|s| s.kind == SectionKind::Intro) {
            warnings.push("Missing intro section".to_string());
        }

        let h2_titles: Vec<String> = self
            .sections
            .iter()
            .filter(|s| s.kind == SectionKind::Heading(HeadingLevel::H2))
            .map(|s| s.heading.to_lowercase())
            .collect();
        if h2_titles.len() < 3 {
            warnings.push(format!("Only {} H2 sections (recommend 4-5)", h2_titles.len()));
        } else if h2_titles.len() > 6 {
            warnings.push(format!(
                "Too many H2 sections ({}), recommend at most 5",
                h2_titles.len()
            ));
        }

        let offer_sections = self.sections.iter().filter(|s| s.kind == SectionKind::Offer).count();
        if offer_sections < 2 {
            warnings.push("Consider adding more offer card placements for CTAs".to_string());
        }

        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() {
            if let Some(first) = h2_titles.first() {
                if !first.contains(&keyword) {
                    warnings.push(format!("First H2 should contain keyword '{}'", keyword));
                }
            }
            let with_keyword = h2_titles.iter().filter(|t| t.contains(&keyword)).count();
            if with_keyword < 2 {
                warnings.push(format!(
                    "Keyword '{}' only in {} H2 titles (recommend 3+)",
                    keyword, with_keyword
                ));
            }
        }

        for section in &self.sections {
            if matches!(section.kind, SectionKind::Heading(_)) && section.talking_points.len() < 2 {
                warnings.push(format!(
                    "Section '{}' has too few talking points",
                    section.heading
                ));
            }
        }

        warnings
    }

    /// Render the outline in its editable line format.
    ///
    /// The output parses back with [`parse_outline_text`].
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        for section in &self.sections {
            match section.kind {
                SectionKind::Intro => lines.push("[INTRO]".to_string()),
                SectionKind::Offer => lines.push("[SHORTCODE]".to_string()),
                SectionKind::Heading(level) => {
                    lines.push(format!("[{}: {}]", level.token(), section.heading))
                }
                SectionKind::Terms => lines.push(format!("[TERMS: {}]", section.heading)),
            }
            for point in &section.talking_points {
                lines.push(format!("> {}", point));
            }
            if !section.avoid.is_empty() {
                lines.push(format!("! Avoid: {}", section.avoid.join(", ")));
            }
            if !section.offer_refs.is_empty() {
                let ids: Vec<&str> = section.offer_refs.iter().map(|id| id.as_str()).collect();
                lines.push(format!("+ offer: {}", ids.join(", ")));
            }
            lines.push(String::new());
        }
        lines.join("\n").trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h2(title: &str, points: usize) -> OutlineSection {
        OutlineSection::new(SectionKind::Heading(HeadingLevel::H2), title)
            .with_points((0..points).map(|i| format!("point {}", i)).collect())
    }

    #[test]
    fn test_uncovered_offers() {
        let outline = Outline::new(vec![
            OutlineSection::intro().with_offers(vec![OfferId::new("a")]),
            h2("Body", 2),
        ]);
        let selected = vec![OfferId::new("a"), OfferId::new("b")];
        assert_eq!(outline.uncovered(&selected), vec![OfferId::new("b")]);
    }

    #[test]
    fn test_warnings_for_thin_outline() {
        let outline = Outline::new(vec![h2("Promo code basics", 1)]);
        let warnings = outline.warnings("bonus code");

        assert!(warnings.iter().any(|w| w.contains("Missing intro")));
        assert!(warnings.iter().any(|w| w.contains("Only 1 H2")));
        assert!(warnings.iter().any(|w| w.contains("First H2 should contain")));
        assert!(warnings.iter().any(|w| w.contains("too few talking points")));
    }

    #[test]
    fn test_warnings_quiet_for_complete_outline() {
        let outline = Outline::new(vec![
            OutlineSection::intro(),
            OutlineSection::new(SectionKind::Offer, "FanDuel Offer"),
            h2("FanDuel bonus code overview", 2),
            h2("How to claim the FanDuel bonus code", 3),
            h2("FanDuel bonus code terms explained", 2),
            OutlineSection::new(SectionKind::Offer, "FanDuel Offer"),
            h2("Other promos", 2),
        ]);
        assert!(outline.warnings("FanDuel bonus code").is_empty());
    }

    #[test]
    fn test_to_text_format() {
        let outline = Outline::new(vec![
            OutlineSection::intro().with_points(vec!["Hook the reader".to_string()]),
            OutlineSection::new(SectionKind::Offer, "FanDuel Offer").with_offers(vec![OfferId::new("fd")]),
            h2("How to claim", 1).with_avoid(vec!["guarantees".to_string(), "odds".to_string()]),
            OutlineSection::new(SectionKind::Terms, "Terms & Conditions"),
        ]);

        assert_eq!(
            outline.to_text(),
            "[INTRO]\n> Hook the reader\n\n[SHORTCODE]\n+ offer: fd\n\n[H2: How to claim]\n> point 0\n! Avoid: guarantees, odds\n\n[TERMS: Terms & Conditions]"
        );
    }
}
