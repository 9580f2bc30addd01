//! The assembled article handed back by a generation session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use offer_facts::{disclaimer_for_state, Offer, TermsBlock};

use crate::compliance::{ComplianceIssue, ComplianceReport};
use crate::draft::{count_words, SectionStatus};
use crate::outline::{Outline, SectionKind};

/// One drafted section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSection {
    /// Position in the outline.
    pub index: usize,
    pub kind: SectionKind,
    pub heading: String,
    pub content: String,
    pub status: SectionStatus,
    pub word_count: usize,
    /// Terms rendered for the offers this section references.
    pub terms: Vec<TermsBlock>,
}

/// A drafted article with its offers, outline and compliance result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub topic: String,
    /// Target state code, `ALL` for national.
    pub state: String,
    /// Offers featured in the article, in selection order.
    pub offers: Vec<Offer>,
    pub outline: Outline,
    /// Drafted sections in outline order. Cancelled sessions hold a prefix.
    pub sections: Vec<DraftSection>,
    /// Responsible-gaming footer.
    pub footer: String,
    /// Set by the last compliance run; cleared by edits.
    pub compliance: Option<ComplianceReport>,
    /// Bumped on every edit.
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        topic: impl Into<String>,
        state: impl Into<String>,
        offers: Vec<Offer>,
        outline: Outline,
    ) -> Self {
        let state = state.into();
        Self {
            title: title.into(),
            topic: topic.into(),
            footer: disclaimer_for_state(&state).to_string(),
            state,
            offers,
            outline,
            sections: Vec::new(),
            compliance: None,
            version: 1,
            created_at: Utc::now(),
        }
    }

    pub fn push_section(&mut self, section: DraftSection) {
        self.sections.push(section);
    }

    /// Replace a section's content. Returns false when the index is out of range.
    ///
    /// The edit bumps the version and clears the compliance result, so the article
    /// is not publish-ready until it is validated again.
    pub fn edit_section(&mut self, index: usize, content: impl Into<String>) -> bool {
        let Some(section) = self.sections.iter_mut().find(|s| s.index == index) else {
            return false;
        };
        section.content = content.into();
        section.word_count =
            count_words(&section.content) + section.terms.iter().map(|t| count_words(&t.text())).sum::<usize>();
        self.version += 1;
        self.compliance = None;
        true
    }

    /// Every terms block, in section order.
    pub fn terms_blocks(&self) -> impl Iterator<Item = &TermsBlock> {
        self.sections.iter().flat_map(|section| section.terms.iter())
    }

    /// Issues from the last compliance run.
    pub fn issues(&self) -> &[ComplianceIssue] {
        self.compliance
            .as_ref()
            .map(|report| report.issues.as_slice())
            .unwrap_or_default()
    }

    pub fn word_count(&self) -> usize {
        self.sections.iter().map(|s| s.word_count).sum()
    }

    /// Check whether every outline section was drafted to completion.
    pub fn is_complete(&self) -> bool {
        self.sections.len() == self.outline.len()
            && self.sections.iter().all(|s| s.status == SectionStatus::Done)
    }

    /// Validated, free of blocking issues, and fully drafted.
    pub fn is_publish_ready(&self) -> bool {
        self.is_complete()
            && self
                .compliance
                .as_ref()
                .is_some_and(|report| !report.has_blocking())
    }

    /// Render the article as Markdown.
    pub fn to_markdown(&self) -> String {
        let mut parts = vec![format!("# {}", self.title)];

        for section in &self.sections {
            if let Some(depth) = section.kind.heading_depth() {
                parts.push(format!("{} {}", "#".repeat(depth as usize), section.heading));
            }
            if !section.content.trim().is_empty() {
                parts.push(section.content.trim().to_string());
            }
            for block in &section.terms {
                parts.push(format!("*{} terms: {}*", block.brand, block.text()));
            }
        }

        if !self.footer.is_empty() {
            parts.push("---".to_string());
            parts.push(format!("*{}*", self.footer));
        }

        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::{HeadingLevel, OutlineSection};
    use offer_facts::{OfferId, TermsRenderer};

    fn article() -> Article {
        let offer = Offer::new(OfferId::new("fd"), "FanDuel", "FDBONUS").with_terms("21+. Terms apply.");
        let outline = Outline::new(vec![
            OutlineSection::intro(),
            OutlineSection::new(SectionKind::Heading(HeadingLevel::H2), "How to Claim")
                .with_offers(vec![offer.id.clone()]),
        ]);
        let terms = TermsRenderer::new().render_block(&offer);

        let mut article = Article::new("FanDuel Promo Code", "fanduel promo", "NY", vec![offer], outline);
        article.push_section(DraftSection {
            index: 0,
            kind: SectionKind::Intro,
            heading: "Introduction".to_string(),
            content: "Welcome to the guide.".to_string(),
            status: SectionStatus::Done,
            word_count: 4,
            terms: Vec::new(),
        });
        article.push_section(DraftSection {
            index: 1,
            kind: SectionKind::Heading(HeadingLevel::H2),
            heading: "How to Claim".to_string(),
            content: "Use code FDBONUS.".to_string(),
            status: SectionStatus::Done,
            word_count: 6,
            terms: vec![terms],
        });
        article
    }

    #[test]
    fn test_markdown_export() {
        let markdown = article().to_markdown();
        assert!(markdown.starts_with("# FanDuel Promo Code\n\nWelcome to the guide."));
        assert!(markdown.contains("## How to Claim\n\nUse code FDBONUS.\n\n*FanDuel terms: 21+. Terms apply.*"));
        assert!(markdown.ends_with("*21+. Gambling problem? Call 877-8-HOPENY or text HOPENY (467369).*"));
    }

    #[test]
    fn test_not_publish_ready_until_validated() {
        let article = article();
        assert!(article.is_complete());
        assert!(!article.is_publish_ready());
        assert!(article.issues().is_empty());
    }

    #[test]
    fn test_edit_bumps_version() {
        let mut article = article();
        assert!(article.edit_section(0, "A new opening paragraph here."));
        assert_eq!(article.version, 2);
        assert_eq!(article.sections[0].word_count, 5);
        assert!(!article.edit_section(9, "missing"));
        assert_eq!(article.terms_blocks().count(), 1);
    }
}
