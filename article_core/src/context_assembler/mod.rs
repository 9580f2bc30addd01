//! Context Assembler - builds the immutable context every prompt is rendered from.
//!
//! Assembly works as follows:
//! 1. **Offers**: Keep selected offers in selection order, first occurrence wins
//! 2. **Ranking**: Order retrieved passages by score, then recency
//! 3. **Dedup**: Drop passages nearly identical to a preferred one
//! 4. **Budget**: Keep passages greedily until the token budget is spent
//! 5. **Assembly**: Freeze everything into a [`GenerationContext`]

mod dedup;

pub use dedup::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use offer_facts::{BrandCode, Offer, OfferId};

use crate::collaborators::RetrievedPassage;

/// Text rendered in place of any fact the offer does not state.
pub const MISSING_FACT: &str = "see full terms";

/// Configuration for context assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Passages more similar than this (word-set Jaccard) count as duplicates.
    pub similarity_threshold: f32,

    /// Estimated token budget for retrieved passages.
    pub token_budget: usize,

    /// How many passages to ask the retriever for.
    pub retrieval_k: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            token_budget: 1500,
            retrieval_k: 8,
        }
    }
}

/// Builds generation contexts from offers and retrieved passages.
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    /// Create a new context assembler with the given configuration.
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Create a context assembler with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ContextConfig::default())
    }

    /// Assemble the context for one article.
    pub fn assemble(
        &self,
        offers: &[Offer],
        passages: Vec<RetrievedPassage>,
        topic: &str,
    ) -> GenerationContext {
        let mut seen = HashSet::new();
        let offers: Vec<Offer> = offers
            .iter()
            .filter(|offer| seen.insert(offer.id.clone()))
            .cloned()
            .collect();

        let retrieved = passages.len();
        let selection = select_passages(
            passages,
            self.config.similarity_threshold,
            self.config.token_budget,
        );
        debug!(
            retrieved,
            kept = selection.kept.len(),
            duplicates = selection.duplicates,
            over_budget = selection.over_budget,
            tokens = selection.tokens,
            "assembled generation context"
        );

        GenerationContext {
            topic: topic.trim().to_string(),
            offers,
            passages: selection.kept,
            passage_tokens: selection.tokens,
            dropped_duplicates: selection.duplicates,
            dropped_over_budget: selection.over_budget,
        }
    }
}

/// The frozen input to every prompt in a session.
///
/// Fields are private; the context is built once by [`ContextAssembler`] and then
/// shared read-only behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationContext {
    topic: String,
    offers: Vec<Offer>,
    passages: Vec<RetrievedPassage>,
    passage_tokens: usize,
    dropped_duplicates: usize,
    dropped_over_budget: usize,
}

impl GenerationContext {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Selected offers, in selection order.
    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    pub fn passages(&self) -> &[RetrievedPassage] {
        &self.passages
    }

    /// Estimated tokens used by the kept passages.
    pub fn passage_tokens(&self) -> usize {
        self.passage_tokens
    }

    pub fn dropped_duplicates(&self) -> usize {
        self.dropped_duplicates
    }

    pub fn dropped_over_budget(&self) -> usize {
        self.dropped_over_budget
    }

    pub fn offer(&self, id: &OfferId) -> Option<&Offer> {
        self.offers.iter().find(|offer| &offer.id == id)
    }

    /// The offer at a selection position.
    pub fn offer_at(&self, position: usize) -> Option<&Offer> {
        self.offers.get(position)
    }

    pub fn offer_ids(&self) -> Vec<OfferId> {
        self.offers.iter().map(|offer| offer.id.clone()).collect()
    }

    pub fn is_selected(&self, id: &OfferId) -> bool {
        self.offer(id).is_some()
    }

    /// Brand/code pairs in selection order.
    pub fn pairings(&self) -> Vec<&BrandCode> {
        self.offers.iter().map(|offer| &offer.pairing).collect()
    }

    /// Render the source-of-truth block for a subset of offers.
    pub fn facts_prompt(&self, ids: &[OfferId]) -> String {
        let mut prompt = String::new();
        for (position, offer) in self.offers.iter().enumerate() {
            if ids.contains(&offer.id) {
                prompt.push_str(&offer_fact_block(position, offer));
            }
        }
        prompt
    }

    /// Render the retrieved passages as style references.
    pub fn passages_prompt(&self) -> String {
        let mut prompt = String::new();
        for passage in &self.passages {
            prompt.push_str(&format!("- ({}) {}\n", passage.source_url, passage.text.trim()));
        }
        prompt
    }

    /// Format the whole context as a prompt string.
    pub fn to_prompt_string(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str("## Topic\n");
        prompt.push_str(&self.topic);
        prompt.push_str("\n\n");

        if !self.offers.is_empty() {
            prompt.push_str("## Source of Truth\n");
            prompt.push_str(
                "Use these offer facts exactly. Never move a bonus code to another brand. \
                 If a fact is not listed, write \"see full terms\".\n\n",
            );
            prompt.push_str(&self.facts_prompt(&self.offer_ids()));
        }

        if !self.passages.is_empty() {
            prompt.push_str("## Reference Passages\n");
            prompt.push_str("Tone and background only. Offer facts come from the Source of Truth.\n");
            prompt.push_str(&self.passages_prompt());
            prompt.push('\n');
        }

        prompt
    }
}

fn offer_fact_block(position: usize, offer: &Offer) -> String {
    let or_missing = |value: Option<String>| value.unwrap_or_else(|| MISSING_FACT.to_string());
    let states = if offer.states.is_empty() {
        MISSING_FACT.to_string()
    } else if offer.is_nationwide() {
        "nationwide".to_string()
    } else {
        offer.states.join(", ")
    };
    let bonus = if offer.bonus().trim().is_empty() {
        MISSING_FACT
    } else {
        offer.bonus().trim()
    };

    let mut block = format!("### Offer {} (id: {})\n", position, offer.id);
    block.push_str(&format!("- Brand / code: {} / {}\n", offer.brand(), offer.code()));
    block.push_str(&format!("- Bonus: {}\n", bonus));
    block.push_str(&format!("- Bonus amount: {}\n", or_missing(offer.bonus_amount().map(str::to_string))));
    block.push_str(&format!(
        "- Expiration: {}\n",
        or_missing(offer.expiration_days().map(|days| format!("{} days", days)))
    ));
    block.push_str(&format!("- Minimum odds: {}\n", or_missing(offer.minimum_odds().map(str::to_string))));
    block.push_str(&format!(
        "- Wagering requirement: {}\n",
        or_missing(offer.wagering_requirement().map(str::to_string))
    ));
    block.push_str(&format!("- Eligible states: {}\n", states));
    if !offer.terms_text().trim().is_empty() {
        block.push_str(&format!("- Terms: {}\n", offer.terms_text().trim()));
    }
    block.push('\n');
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offers() -> Vec<Offer> {
        vec![
            Offer::new(OfferId::new("fd"), "FanDuel", "FDBONUS")
                .with_bonus("Bet $5, Get $200 in Bonus Bets")
                .with_terms("21+. Bonus bets expire in 7 days."),
            Offer::new(OfferId::new("dk"), "DraftKings", "DKCODE")
                .with_bonus("Bet $5, Get $150")
                .with_terms("Terms apply."),
            Offer::new(OfferId::new("mgm"), "BetMGM", "MGM1500"),
        ]
    }

    #[test]
    fn test_brand_code_pairs_match_offers() {
        let assembler = ContextAssembler::with_defaults();
        for n in 1..=3 {
            let selected = &offers()[..n];
            let context = assembler.assemble(selected, Vec::new(), "NFL promos");

            assert_eq!(context.offers().len(), n);
            for (offer, pairing) in selected.iter().zip(context.pairings()) {
                assert_eq!(pairing, &offer.pairing);
                assert_eq!(context.offer(&offer.id).unwrap().code(), offer.code());
            }
        }
    }

    #[test]
    fn test_duplicate_offer_ids_keep_first() {
        let mut selected = offers();
        selected.push(Offer::new(OfferId::new("fd"), "Imposter", "FAKE"));

        let context = ContextAssembler::with_defaults().assemble(&selected, Vec::new(), "topic");
        assert_eq!(context.offers().len(), 3);
        assert_eq!(context.offer(&OfferId::new("fd")).unwrap().brand(), "FanDuel");
        assert_eq!(
            context.offer_ids(),
            vec![OfferId::new("fd"), OfferId::new("dk"), OfferId::new("mgm")]
        );
    }

    #[test]
    fn test_prompt_renders_missing_facts_as_fallback() {
        let context = ContextAssembler::with_defaults().assemble(&offers(), Vec::new(), "topic");
        let prompt = context.to_prompt_string();

        assert!(prompt.contains("- Brand / code: FanDuel / FDBONUS"));
        assert!(prompt.contains("- Expiration: 7 days"));
        // DraftKings terms state no day count.
        let dk_block = context.facts_prompt(&[OfferId::new("dk")]);
        assert!(dk_block.contains("- Expiration: see full terms"));
        assert!(!dk_block.contains("FanDuel"));
        // BetMGM has no bonus text at all.
        assert!(context
            .facts_prompt(&[OfferId::new("mgm")])
            .contains("- Bonus: see full terms"));
    }

    #[test]
    fn test_passages_are_deduplicated_and_budgeted() {
        let config = ContextConfig {
            token_budget: 20,
            ..Default::default()
        };
        let passages = vec![
            RetrievedPassage::new("Week one lines moved sharply", "https://a.example.org", 0.9),
            RetrievedPassage::new("Week one lines moved sharply.", "https://b.example.org", 0.8),
            RetrievedPassage::new("word ".repeat(40), "https://c.example.org", 0.7),
        ];

        let context = ContextAssembler::new(config).assemble(&offers(), passages, " NFL ");
        assert_eq!(context.topic(), "NFL");
        assert_eq!(context.passages().len(), 1);
        assert_eq!(context.dropped_duplicates(), 1);
        assert_eq!(context.dropped_over_budget(), 1);
        assert!(context.to_prompt_string().contains("## Reference Passages"));
    }
}
