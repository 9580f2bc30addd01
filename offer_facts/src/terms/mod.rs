//! Terms rendering - legal text built from offer facts only.
//!
//! Nothing in this module paraphrases. Terms output is made of sentences copied from
//! the offer's own terms text, or a single fixed fallback sentence when the offer
//! carries no terms at all.

mod card;
mod disclaimer;

pub use card::*;
pub use disclaimer::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::offer::{Offer, OfferId};

/// Sentence emitted when an offer has no terms text to render.
pub const FALLBACK_TERMS_SENTENCE: &str =
    "Full terms and conditions apply; see the operator's offer page for complete details.";

/// Rendered terms for one offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsBlock {
    pub offer_id: OfferId,
    pub brand: String,
    pub sentences: Vec<String>,
    /// True when the block is the fallback sentence rather than offer terms.
    pub is_fallback: bool,
}

impl TermsBlock {
    /// Join the sentences into a single paragraph.
    pub fn text(&self) -> String {
        self.sentences.join(" ")
    }
}

/// Deterministic renderer for offer terms.
#[derive(Debug, Clone, Default)]
pub struct TermsRenderer;

impl TermsRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render an offer's terms as plain text.
    pub fn render(&self, offer: &Offer) -> String {
        self.render_block(offer).text()
    }

    /// Render an offer's terms as a structured block.
    ///
    /// When `terms_text` is empty the block is the fallback sentence, whatever
    /// other facts the offer has.
    pub fn render_block(&self, offer: &Offer) -> TermsBlock {
        let sentences = split_sentences(offer.terms_text());
        let is_fallback = sentences.is_empty();
        TermsBlock {
            offer_id: offer.id.clone(),
            brand: offer.brand().to_string(),
            sentences: if is_fallback {
                vec![FALLBACK_TERMS_SENTENCE.to_string()]
            } else {
                sentences
            },
            is_fallback,
        }
    }
}

/// Split terms text into whitespace-normalised, de-duplicated sentences.
///
/// Line breaks (including literal `\n` sequences from feeds) end a sentence, as does
/// `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let cleaned = text.replace("\\n", "\n");
    let mut sentences = Vec::new();
    let mut seen = HashSet::new();

    for line in cleaned.lines() {
        let normalized = line.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut current = String::new();
        let mut chars = normalized.chars().peekable();

        while let Some(c) = chars.next() {
            current.push(c);
            let ends_sentence =
                matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |next| *next == ' ');
            if ends_sentence {
                push_sentence(&mut sentences, &mut seen, &current);
                current.clear();
            }
        }
        push_sentence(&mut sentences, &mut seen, &current);
    }

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, seen: &mut HashSet<String>, raw: &str) {
    let sentence = raw.trim();
    if !sentence.is_empty() && seen.insert(sentence.to_string()) {
        sentences.push(sentence.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer_with_terms(terms: &str) -> Offer {
        Offer::new(OfferId::new("o-1"), "BetMGM", "MGM1500").with_terms(terms)
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("21+ only.  New customers in NJ.\\nBonus bets expire in 7 days! T&Cs apply");
        assert_eq!(
            sentences,
            vec![
                "21+ only.",
                "New customers in NJ.",
                "Bonus bets expire in 7 days!",
                "T&Cs apply",
            ]
        );
    }

    #[test]
    fn test_split_keeps_decimal_amounts_together() {
        let sentences = split_sentences("Get $1,500.00 back as bonus bets. Terms apply.");
        assert_eq!(sentences, vec!["Get $1,500.00 back as bonus bets.", "Terms apply."]);
    }

    #[test]
    fn test_render_uses_terms_sentences() {
        let renderer = TermsRenderer::new();
        let offer = offer_with_terms("Must be 21+. Bonus bets expire in 7 days.");
        assert_eq!(
            renderer.render(&offer),
            "Must be 21+. Bonus bets expire in 7 days."
        );
    }

    #[test]
    fn test_render_fallback_when_terms_and_expiration_missing() {
        let renderer = TermsRenderer::new();
        let offer = offer_with_terms("");
        assert_eq!(offer.expiration_days(), None);

        let block = renderer.render_block(&offer);
        assert!(block.is_fallback);
        assert_eq!(renderer.render(&offer), FALLBACK_TERMS_SENTENCE);
    }

    #[test]
    fn test_render_fallback_when_only_bonus_states_expiration() {
        let renderer = TermsRenderer::new();
        let offer = offer_with_terms("").with_bonus("Bonus valid for 7 days");
        assert_eq!(offer.expiration_days(), Some(7));
        assert_eq!(renderer.render(&offer), FALLBACK_TERMS_SENTENCE);
    }

    #[test]
    fn test_render_is_subset_of_terms_or_fallback() {
        let renderer = TermsRenderer::new();
        let inputs = [
            "Terms apply",
            "",
            "   ",
            "21+. Gambling problem? Call 1-800-GAMBLER. 21+.",
            "New users only.\nOne per customer.\\nMinimum odds of -200 or longer.",
            "Bonus bets expire within 14 days of issue. Not available in NY.",
        ];

        for terms in inputs {
            let offer = offer_with_terms(terms);
            let allowed: HashSet<String> = split_sentences(terms)
                .into_iter()
                .chain(std::iter::once(FALLBACK_TERMS_SENTENCE.to_string()))
                .collect();

            for sentence in renderer.render_block(&offer).sentences {
                assert!(
                    allowed.contains(&sentence),
                    "rendered sentence {:?} not found in terms {:?}",
                    sentence,
                    terms
                );
            }
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = TermsRenderer::new();
        let offer = offer_with_terms("One. Two. Three.");
        assert_eq!(renderer.render(&offer), renderer.render(&offer));
    }
}
