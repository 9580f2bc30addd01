//! Rule evaluation over a compliance document.

use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use tracing::debug;

use offer_facts::OfferId;

use super::{
    BlockKind, ComplianceIssue, ComplianceReport, ComplianceRules, Document, IssueKind, IssueLocation,
};
use crate::article::Article;
use crate::draft::count_words;
use crate::error::ConfigError;

const CTA_WORDS: &[&str] = &["claim", "sign up", "bet now", "get offer", "join"];

struct CompiledPhrase {
    pattern: Regex,
    message: String,
    allowed_before: Option<String>,
}

/// Checks articles against a compiled rule set.
pub struct ComplianceValidator {
    rules: ComplianceRules,
    banned: Vec<CompiledPhrase>,
    triggers: Vec<Regex>,
}

impl ComplianceValidator {
    /// Compile a rule set. Fails when a configured pattern is not a valid regex.
    pub fn new(rules: ComplianceRules) -> Result<Self, ConfigError> {
        let banned = rules
            .banned_phrases
            .iter()
            .map(|phrase| -> Result<CompiledPhrase, ConfigError> {
                Ok(CompiledPhrase {
                    pattern: compile(&phrase.pattern)?,
                    message: phrase.message.clone(),
                    allowed_before: phrase.allowed_before.as_ref().map(|s| s.to_lowercase()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let triggers = rules
            .bet_triggers
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            rules,
            banned,
            triggers,
        })
    }

    /// Create a validator with the built-in rules.
    pub fn with_defaults() -> Self {
        Self::new(ComplianceRules::default()).expect("valid built-in compliance patterns")
    }

    pub fn rules(&self) -> &ComplianceRules {
        &self.rules
    }

    /// Run every check against an article.
    pub fn validate(&self, article: &Article) -> Vec<ComplianceIssue> {
        self.validate_document(&Document::from_article(article))
    }

    /// Run every check and summarise the result.
    pub fn report(&self, article: &Article) -> ComplianceReport {
        let document = Document::from_article(article);
        let issues = self.validate_document(&document);
        let report = ComplianceReport::new(issues, document_word_count(&document));
        debug!(
            issues = report.issues.len(),
            blocking = report.blocking().count(),
            score = report.score,
            "compliance report ready"
        );
        report
    }

    /// Run every check against a prepared document.
    pub fn validate_document(&self, document: &Document) -> Vec<ComplianceIssue> {
        let mut issues = Vec::new();
        self.check_links(document, &mut issues);
        self.check_terms_adjacency(document, &mut issues);
        self.check_banned_phrases(document, &mut issues);
        self.check_disclosure(document, &mut issues);
        self.check_cta(document, &mut issues);
        self.check_paragraphs(document, &mut issues);
        self.check_link_density(document, &mut issues);
        self.check_heading_levels(document, &mut issues);
        issues
    }

    fn check_links(&self, document: &Document, issues: &mut Vec<ComplianceIssue>) {
        for (index, block) in document.blocks.iter().enumerate() {
            for link in &block.links {
                let location = IssueLocation::block(block, index).with_excerpt(link.anchor.clone());

                if self.rules.is_placeholder_target(&link.target) {
                    issues.push(
                        ComplianceIssue::new(
                            IssueKind::PlaceholderLink,
                            location,
                            format!("Link '{}' has an empty or placeholder target", link.anchor),
                        )
                        .with_suggestion("Point the link at the real offer or article URL"),
                    );
                    continue;
                }

                if matches!(block.kind, BlockKind::Heading | BlockKind::Title) {
                    issues.push(
                        ComplianceIssue::new(IssueKind::HeadingLink, location.clone(), "Link inside a heading")
                            .with_suggestion("Move the link into the body text"),
                    );
                }

                if block.kind == BlockKind::Paragraph
                    && link.anchor.split_whitespace().count() < self.rules.min_anchor_words
                {
                    issues.push(
                        ComplianceIssue::new(
                            IssueKind::ShortAnchor,
                            location.clone(),
                            format!("Anchor text '{}' is too short to be descriptive", link.anchor),
                        )
                        .with_suggestion(format!(
                            "Use at least {} words of anchor text",
                            self.rules.min_anchor_words
                        )),
                    );
                }

                if self.rules.is_external(&link.target) {
                    issues.push(ComplianceIssue::new(
                        IssueKind::ExternalLink,
                        location,
                        format!("Link points outside the allowed domains: {}", link.target),
                    ));
                }
            }
        }
    }

    /// Every offer mention needs that offer's terms block in the same section.
    fn check_terms_adjacency(&self, document: &Document, issues: &mut Vec<ComplianceIssue>) {
        let terms: HashSet<(Option<usize>, &OfferId)> = document
            .blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Terms)
            .filter_map(|b| b.offer_id.as_ref().map(|id| (b.section, id)))
            .collect();

        let mut reported = HashSet::new();
        for (index, block) in document.blocks.iter().enumerate() {
            for offer_id in document.mentioned_offers(block) {
                if terms.contains(&(block.section, &offer_id)) || !reported.insert((block.section, offer_id.clone())) {
                    continue;
                }
                let brand = document
                    .offers
                    .iter()
                    .find(|o| o.id == offer_id)
                    .map_or(offer_id.as_str(), |o| o.brand.as_str());
                issues.push(
                    ComplianceIssue::new(
                        IssueKind::MissingTerms,
                        IssueLocation::block(block, index).with_excerpt(brand),
                        format!("{} is mentioned without its terms in the same section", brand),
                    )
                    .with_suggestion("Render the offer's terms block next to the mention"),
                );
            }
        }
    }

    fn check_banned_phrases(&self, document: &Document, issues: &mut Vec<ComplianceIssue>) {
        for (index, block) in document.blocks.iter().enumerate() {
            if matches!(block.kind, BlockKind::Terms | BlockKind::Disclaimer) {
                continue;
            }
            for phrase in &self.banned {
                for found in phrase.pattern.find_iter(&block.text) {
                    // Offsets index the original text, so only the remainder is lowercased.
                    let rest = &block.text[found.end()..];
                    let allowed = phrase
                        .allowed_before
                        .as_ref()
                        .is_some_and(|suffix| rest.to_lowercase().starts_with(&suffix.to_lowercase()));
                    if allowed {
                        continue;
                    }
                    issues.push(
                        ComplianceIssue::new(
                            IssueKind::BannedPhrase,
                            IssueLocation::block(block, index).with_excerpt(found.as_str()),
                            phrase.message.clone(),
                        )
                        .with_suggestion("Remove or rephrase this term"),
                    );
                }
            }
        }
    }

    fn check_disclosure(&self, document: &Document, issues: &mut Vec<ComplianceIssue>) {
        let text = document.full_text_lower();
        let has_offers = document.blocks.iter().any(|b| b.kind == BlockKind::OfferCard) || !document.offers.is_empty();
        let is_gambling_copy = has_offers || self.triggers.iter().any(|t| t.is_match(&text));
        if !is_gambling_copy {
            return;
        }

        let disclosed = self
            .rules
            .disclosure_markers
            .iter()
            .any(|marker| text.contains(&marker.to_lowercase()));
        if !disclosed {
            issues.push(
                ComplianceIssue::new(
                    IssueKind::MissingDisclosure,
                    IssueLocation::document(),
                    "Betting content lacks an age or responsible gaming disclosure",
                )
                .with_suggestion("Add '21+' and the responsible gaming disclaimer"),
            );
        }
    }

    fn check_cta(&self, document: &Document, issues: &mut Vec<ComplianceIssue>) {
        if document.offers.is_empty() {
            return;
        }
        let has_cta = document.blocks.iter().flat_map(|b| b.links.iter()).any(|link| {
            let anchor = link.anchor.to_lowercase();
            !self.rules.is_placeholder_target(&link.target) && CTA_WORDS.iter().any(|w| anchor.contains(w))
        });
        if !has_cta {
            issues.push(
                ComplianceIssue::new(IssueKind::MissingCta, IssueLocation::document(), "No call-to-action link found")
                    .with_suggestion("Add a claim link to at least one offer card"),
            );
        }
    }

    fn check_paragraphs(&self, document: &Document, issues: &mut Vec<ComplianceIssue>) {
        for (index, block) in document.blocks.iter().enumerate() {
            if block.kind != BlockKind::Paragraph {
                continue;
            }
            let words = count_words(&block.text);
            if words > self.rules.max_paragraph_words {
                issues.push(
                    ComplianceIssue::new(
                        IssueKind::LongParagraph,
                        IssueLocation::block(block, index),
                        format!(
                            "Paragraph has {} words (max {})",
                            words, self.rules.max_paragraph_words
                        ),
                    )
                    .with_suggestion("Split it into shorter paragraphs"),
                );
            }
        }
    }

    fn check_link_density(&self, document: &Document, issues: &mut Vec<ComplianceIssue>) {
        let links = document
            .blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Paragraph)
            .map(|b| b.links.len())
            .sum::<usize>();
        let words = document_word_count(document);
        if links == 0 || self.rules.words_per_link == 0 {
            return;
        }
        if links * self.rules.words_per_link > words {
            issues.push(ComplianceIssue::new(
                IssueKind::LinkDensity,
                IssueLocation::document(),
                format!(
                    "{} body links for {} words (at most one per {} words)",
                    links, words, self.rules.words_per_link
                ),
            ));
        }
    }

    fn check_heading_levels(&self, document: &Document, issues: &mut Vec<ComplianceIssue>) {
        let mut previous = None;
        for (index, block) in document.blocks.iter().enumerate() {
            let Some(level) = block.level else {
                continue;
            };
            if let Some(prev) = previous {
                if level > prev + 1 {
                    issues.push(
                        ComplianceIssue::new(
                            IssueKind::HeadingSkip,
                            IssueLocation::block(block, index).with_excerpt(block.text.clone()),
                            format!("Heading jumps from H{} to H{}", prev, level),
                        )
                        .with_suggestion(format!("Use H{} here", prev + 1)),
                    );
                }
            }
            previous = Some(level);
        }
    }
}

impl Default for ComplianceValidator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| ConfigError::Invalid(format!("compliance pattern `{}`: {}", pattern, err)))
}

fn document_word_count(document: &Document) -> usize {
    document
        .blocks
        .iter()
        .filter(|b| matches!(b.kind, BlockKind::Paragraph | BlockKind::OfferCard | BlockKind::Terms))
        .map(|b| count_words(&b.text))
        .sum()
}
