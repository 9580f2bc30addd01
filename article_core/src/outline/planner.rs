//! Outline planning against the generation collaborator.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use offer_facts::OfferId;

use super::{parse_outline_text, HeadingLevel, OfferRef, Outline, OutlineSection, ParsedSection, SectionKind};
use crate::collaborators::{collect_completion, CompletionRequest, Generator, RequestPurpose};
use crate::context_assembler::GenerationContext;
use crate::error::PlanningError;

const PLANNER_SYSTEM_PROMPT: &str = "You plan promotional sportsbook articles. \
Reply with the outline only, one token or note per line, using the format described. \
Never invent offers, bonus codes or terms.";

/// Configuration for outline planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Extra attempts after a failed one.
    pub max_retries: u32,

    pub max_tokens: u32,

    pub temperature: f32,

    /// Target words for the intro.
    pub intro_words: u32,

    /// Target words for H2 sections.
    pub heading_words: u32,

    /// Target words for H3 sections.
    pub subheading_words: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            max_tokens: 1200,
            temperature: 0.4,
            intro_words: 150,
            heading_words: 250,
            subheading_words: 150,
        }
    }
}

/// Plans article outlines from a generation context.
pub struct OutlinePlanner {
    generator: Arc<dyn Generator>,
    model: String,
    config: PlannerConfig,
}

impl OutlinePlanner {
    pub fn new(generator: Arc<dyn Generator>, model: impl Into<String>, config: PlannerConfig) -> Self {
        Self {
            generator,
            model: model.into(),
            config,
        }
    }

    /// Plan an outline, retrying failed attempts with stricter instructions.
    pub async fn plan(&self, context: &GenerationContext) -> Result<Outline, PlanningError> {
        let attempts = self.config.max_retries + 1;
        let mut last = PlanningError::Malformed("no planning attempt was made".to_string());

        for attempt in 1..=attempts {
            let previous = (attempt > 1).then(|| last.to_string());
            match self.plan_once(context, attempt, previous.as_deref()).await {
                Ok(outline) => {
                    info!(attempt, sections = outline.len(), "outline planned");
                    return Ok(outline);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "outline attempt failed");
                    last = err;
                }
            }
        }

        Err(PlanningError::Exhausted {
            attempts,
            last: Box::new(last),
        })
    }

    async fn plan_once(
        &self,
        context: &GenerationContext,
        attempt: u32,
        previous_error: Option<&str>,
    ) -> Result<Outline, PlanningError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: PLANNER_SYSTEM_PROMPT.to_string(),
            prompt: self.build_prompt(context, previous_error),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            streaming: false,
            purpose: RequestPurpose::Outline { attempt },
        };

        let stream = self.generator.complete(request).await?;
        let text = collect_completion(stream).await?;
        debug!(attempt, chars = text.len(), "outline response received");

        let parsed = parse_outline_text(&text)?;
        resolve_outline(parsed, context, &self.config)
    }

    fn build_prompt(&self, context: &GenerationContext, previous_error: Option<&str>) -> String {
        let mut prompt = context.to_prompt_string();

        prompt.push_str("## Offers\n");
        for (position, offer) in context.offers().iter().enumerate() {
            let role = if position == 0 { "main" } else { "alternative" };
            prompt.push_str(&format!(
                "- Position {} ({}): {} / {} (id: {})\n",
                position,
                role,
                offer.brand(),
                offer.code(),
                offer.id
            ));
        }

        prompt.push_str(
            "\n## Format\n\
             [INTRO] opening section\n\
             [SHORTCODE] offer card for the main offer; [SHORTCODE_<n>] for position n\n\
             [H2: Title] or [H3: Title] body sections with unique, non-empty titles\n\
             [TERMS] terms section\n\
             > talking point (under the section it belongs to)\n\
             ! Avoid: topic, topic\n\
             + offer: <id> (offers a body section may mention)\n",
        );

        if let Some(error) = previous_error {
            prompt.push_str(&format!(
                "\n## Correction\nYour previous outline could not be used: {}.\n\
                 Follow the format exactly. Every heading line must look like [H2: Title] \
                 with a unique, non-empty title. Output nothing but outline lines.\n",
                error
            ));
        }

        prompt
    }
}

/// Resolve parsed sections against the selected offers.
///
/// Positional offer references map onto the selection (out of range falls back to
/// the main offer). References to unselected ids are dropped. Terms sections cover
/// every selected offer, and offers no section references get an injected offer
/// section after the intro.
pub fn resolve_outline(
    parsed: Vec<ParsedSection>,
    context: &GenerationContext,
    config: &PlannerConfig,
) -> Result<Outline, PlanningError> {
    let selected = context.offer_ids();
    let mut sections = Vec::new();

    for section in parsed {
        let has_explicit = section.offer_refs.iter().any(|r| matches!(r, OfferRef::Id(_)));
        let mut refs: Vec<OfferId> = Vec::new();

        for reference in section.offer_refs {
            let resolved = match reference {
                OfferRef::Position(_) if has_explicit && section.kind == SectionKind::Offer => None,
                OfferRef::Position(position) => context
                    .offer_at(position)
                    .or_else(|| context.offer_at(0))
                    .map(|offer| offer.id.clone()),
                OfferRef::Id(id) if context.is_selected(&id) => Some(id),
                OfferRef::Id(id) => {
                    warn!(offer = %id, section = %section.heading, "dropping reference to unselected offer");
                    None
                }
            };
            if let Some(id) = resolved {
                if !refs.contains(&id) {
                    refs.push(id);
                }
            }
        }

        let (heading, target_words) = match section.kind {
            SectionKind::Offer => {
                if refs.is_empty() {
                    warn!("dropping offer section with no selected offer");
                    continue;
                }
                (offer_heading(context, &refs), 0)
            }
            SectionKind::Terms => {
                refs = selected.clone();
                (section.heading, 0)
            }
            SectionKind::Intro => (section.heading, config.intro_words),
            SectionKind::Heading(HeadingLevel::H2) => (section.heading, config.heading_words),
            SectionKind::Heading(HeadingLevel::H3) => (section.heading, config.subheading_words),
        };

        sections.push(
            OutlineSection::new(section.kind, heading)
                .with_points(section.talking_points)
                .with_avoid(section.avoid)
                .with_offers(refs)
                .with_target_words(target_words),
        );
    }

    if sections.is_empty() {
        return Err(PlanningError::Malformed(
            "outline has no usable sections".to_string(),
        ));
    }

    let mut outline = Outline::new(sections);
    let uncovered = outline.uncovered(&selected);
    if !uncovered.is_empty() {
        info!(count = uncovered.len(), "injecting offer section for uncovered offers");
        let position = match outline.sections.first() {
            Some(first) if first.kind == SectionKind::Intro => 1,
            _ => 0,
        };
        let injected =
            OutlineSection::new(SectionKind::Offer, offer_heading(context, &uncovered)).with_offers(uncovered);
        outline.sections.insert(position, injected);
    }

    Ok(outline)
}

fn offer_heading(context: &GenerationContext, ids: &[OfferId]) -> String {
    let brands: Vec<&str> = ids
        .iter()
        .filter_map(|id| context.offer(id))
        .map(|offer| offer.brand())
        .collect();
    match brands.len() {
        1 => format!("{} Offer", brands[0]),
        _ => format!("{} Offers", brands.join(" & ")),
    }
}
