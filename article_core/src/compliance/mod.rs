//! Compliance validation - the publish gate for drafted articles.
//!
//! Validation is a pure function of the article and a rule set: no network, no
//! generation, same answer every run. Blocking issues withhold publish-readiness;
//! advisory issues are reported and otherwise ignored.

mod document;
mod rules;
mod validator;

pub use document::*;
pub use rules::*;
pub use validator::*;

use serde::{Deserialize, Serialize};

/// Whether an issue stops publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Advisory,
}

/// What a compliance issue is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    PlaceholderLink,
    MissingTerms,
    BannedPhrase,
    MissingDisclosure,
    MissingCta,
    ShortAnchor,
    ExternalLink,
    HeadingLink,
    LongParagraph,
    LinkDensity,
    HeadingSkip,
}

impl IssueKind {
    /// Default severity for this kind of issue.
    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::PlaceholderLink
            | IssueKind::MissingTerms
            | IssueKind::BannedPhrase
            | IssueKind::MissingDisclosure => Severity::Blocking,
            _ => Severity::Advisory,
        }
    }
}

/// Where in the document an issue was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLocation {
    /// Outline section index.
    pub section: Option<usize>,
    /// Block index in the compliance document.
    pub block: Option<usize>,
    /// The offending text.
    pub excerpt: Option<String>,
}

impl IssueLocation {
    pub fn document() -> Self {
        Self::default()
    }

    pub fn block(block: &Block, index: usize) -> Self {
        Self {
            section: block.section,
            block: Some(index),
            excerpt: None,
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }
}

impl std::fmt::Display for IssueLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.section, self.block) {
            (Some(section), Some(block)) => write!(f, "section {}, block {}", section, block)?,
            (None, Some(block)) => write!(f, "block {}", block)?,
            _ => write!(f, "document")?,
        }
        if let Some(excerpt) = &self.excerpt {
            write!(f, ": '{}'", excerpt)?;
        }
        Ok(())
    }
}

/// A single compliance finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub location: IssueLocation,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ComplianceIssue {
    pub fn new(kind: IssueKind, location: IssueLocation, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            location,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

/// Result of one compliance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub issues: Vec<ComplianceIssue>,
    pub word_count: usize,
    /// 100 minus 15 per blocking and 5 per advisory issue, floored at 0.
    pub score: u32,
}

impl ComplianceReport {
    pub fn new(issues: Vec<ComplianceIssue>, word_count: usize) -> Self {
        let blocking = issues.iter().filter(|i| i.is_blocking()).count() as u32;
        let advisory = issues.len() as u32 - blocking;
        let score = 100u32.saturating_sub(blocking * 15 + advisory * 5);
        Self {
            issues,
            word_count,
            score,
        }
    }

    pub fn has_blocking(&self) -> bool {
        self.issues.iter().any(ComplianceIssue::is_blocking)
    }

    pub fn blocking(&self) -> impl Iterator<Item = &ComplianceIssue> {
        self.issues.iter().filter(|i| i.is_blocking())
    }

    pub fn advisory(&self) -> impl Iterator<Item = &ComplianceIssue> {
        self.issues.iter().filter(|i| !i.is_blocking())
    }
}
