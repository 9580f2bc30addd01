//! Draft expansion - turns outline sections into streamed content fragments.
//!
//! Each section produces a finite fragment sequence:
//! 1. **Status**: the section started (and again on each retry)
//! 2. **Content**: generated text deltas, or deterministic offer cards
//! 3. **Content**: terms for every offer the section references
//! 4. **SectionDone**: final text, word count and completion status
//!
//! Sections run concurrently on a bounded pool. [`Resequencer`] restores outline
//! order before anything reaches a subscriber.

mod resequencer;

pub use resequencer::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use offer_facts::{render_offer_card, TermsBlock, TermsRenderer};

use crate::cancel::CancelSignal;
use crate::collaborators::{CompletionRequest, Generator, RequestPurpose};
use crate::context_assembler::GenerationContext;
use crate::error::GenerationError;
use crate::outline::{Outline, OutlineSection, SectionKind};

const SECTION_SYSTEM_PROMPT: &str = "You write one section of a promotional sportsbook article \
as plain Markdown paragraphs. Use only the offer facts you are given and never invent bonus \
codes, amounts, dates or eligibility. Never describe an offer as guaranteed or risk-free. \
Do not write headings, links or terms; those are added separately.";

/// Configuration for draft expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    /// Sections expanded at the same time.
    pub max_concurrency: usize,

    /// Automatic retries of a section whose stream was interrupted.
    pub transport_retries: u32,

    pub max_tokens: u32,

    pub temperature: f32,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            transport_retries: 1,
            max_tokens: 800,
            temperature: 0.7,
        }
    }
}

/// Completion status of a drafted section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Pending,
    Streaming,
    Done,
    /// Stopped early by cancellation or a repeated stream failure.
    Partial,
}

/// Where a piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentOrigin {
    Generated,
    OfferCard,
    Terms,
}

/// One unit of section output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fragment {
    Status {
        message: String,
    },
    Content {
        delta: String,
        /// Generation attempt the text belongs to, starting at 1.
        attempt: u32,
        origin: ContentOrigin,
    },
    SectionDone {
        /// Final section body, without terms.
        text: String,
        word_count: usize,
        status: SectionStatus,
        terms: Vec<TermsBlock>,
    },
}

impl Fragment {
    pub fn is_done(&self) -> bool {
        matches!(self, Fragment::SectionDone { .. })
    }
}

/// A fragment tagged with the index of the section that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionFragment {
    pub section: usize,
    pub fragment: Fragment,
}

/// Returned internally when the sink is gone or cancellation was requested.
struct Halted;

/// Expands outline sections into fragments.
pub struct DraftExpander {
    generator: Arc<dyn Generator>,
    model: String,
    config: DraftConfig,
    renderer: TermsRenderer,
}

impl DraftExpander {
    pub fn new(generator: Arc<dyn Generator>, model: impl Into<String>, config: DraftConfig) -> Self {
        Self {
            generator,
            model: model.into(),
            config,
            renderer: TermsRenderer::new(),
        }
    }

    pub fn config(&self) -> &DraftConfig {
        &self.config
    }

    /// Expand one section, sending its fragments to `sink`.
    ///
    /// Cancellation is checked before every fragment. A halted section reports
    /// `Partial` and sends nothing further.
    pub async fn expand_section(
        &self,
        index: usize,
        section: &OutlineSection,
        context: &GenerationContext,
        sink: &mpsc::Sender<SectionFragment>,
        cancel: &CancelSignal,
    ) -> SectionStatus {
        match self.expand_inner(index, section, context, sink, cancel).await {
            Ok(status) => status,
            Err(Halted) => {
                debug!(index, "section expansion halted");
                SectionStatus::Partial
            }
        }
    }

    async fn expand_inner(
        &self,
        index: usize,
        section: &OutlineSection,
        context: &GenerationContext,
        sink: &mpsc::Sender<SectionFragment>,
        cancel: &CancelSignal,
    ) -> Result<SectionStatus, Halted> {
        let send = |fragment: Fragment| emit(sink, cancel, index, fragment);

        send(Fragment::Status {
            message: format!("drafting section {}: {}", index + 1, section.heading),
        })
        .await?;

        let (body, status, attempt) = match section.kind {
            SectionKind::Offer => {
                let mut cards = Vec::new();
                for offer in section.offer_refs.iter().filter_map(|id| context.offer(id)) {
                    let card = render_offer_card(offer);
                    send(Fragment::Content {
                        delta: card.clone(),
                        attempt: 1,
                        origin: ContentOrigin::OfferCard,
                    })
                    .await?;
                    cards.push(card);
                }
                (cards.join("\n\n"), SectionStatus::Done, 1)
            }
            SectionKind::Terms => (String::new(), SectionStatus::Done, 1),
            SectionKind::Intro | SectionKind::Heading(_) => {
                self.generate_body(index, section, context, sink, cancel).await?
            }
        };

        let mut terms = Vec::new();
        for offer in section.offer_refs.iter().filter_map(|id| context.offer(id)) {
            let block = self.renderer.render_block(offer);
            send(Fragment::Content {
                delta: block.text(),
                attempt,
                origin: ContentOrigin::Terms,
            })
            .await?;
            terms.push(block);
        }

        let word_count = count_words(&body) + terms.iter().map(|b| count_words(&b.text())).sum::<usize>();
        send(Fragment::SectionDone {
            text: body,
            word_count,
            status,
            terms,
        })
        .await?;

        Ok(status)
    }

    /// Stream a generated body, retrying once per configured retry on transport errors.
    async fn generate_body(
        &self,
        index: usize,
        section: &OutlineSection,
        context: &GenerationContext,
        sink: &mpsc::Sender<SectionFragment>,
        cancel: &CancelSignal,
    ) -> Result<(String, SectionStatus, u32), Halted> {
        let max_attempts = self.config.transport_retries + 1;
        let mut text = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                emit(
                    sink,
                    cancel,
                    index,
                    Fragment::Status {
                        message: format!(
                            "retrying section {} after an interrupted stream (attempt {})",
                            index + 1,
                            attempt
                        ),
                    },
                )
                .await?;
            }
            text.clear();

            let request = self.section_request(index, section, context, attempt);
            let mut stream = match self.generator.complete(request).await {
                Ok(stream) => stream,
                Err(GenerationError::Transport(reason)) => {
                    warn!(index, attempt, %reason, "section request interrupted");
                    continue;
                }
                Err(err) => {
                    warn!(index, attempt, error = %err, "section generation unavailable");
                    return Ok((text, SectionStatus::Partial, attempt));
                }
            };

            let mut completed = false;
            loop {
                match stream.recv().await {
                    Some(Ok(chunk)) => {
                        if !chunk.text.is_empty() {
                            text.push_str(&chunk.text);
                            emit(
                                sink,
                                cancel,
                                index,
                                Fragment::Content {
                                    delta: chunk.text,
                                    attempt,
                                    origin: ContentOrigin::Generated,
                                },
                            )
                            .await?;
                        }
                        if chunk.is_final {
                            completed = true;
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(index, attempt, error = %err, "section stream interrupted");
                        break;
                    }
                    None => {
                        warn!(index, attempt, "section stream closed before the final chunk");
                        break;
                    }
                }
            }

            if completed {
                return Ok((text.trim().to_string(), SectionStatus::Done, attempt));
            }
        }

        warn!(index, attempts = max_attempts, "section left partial after retries");
        Ok((text.trim().to_string(), SectionStatus::Partial, max_attempts))
    }

    fn section_request(
        &self,
        index: usize,
        section: &OutlineSection,
        context: &GenerationContext,
        attempt: u32,
    ) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            system: SECTION_SYSTEM_PROMPT.to_string(),
            prompt: section_prompt(section, context),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            streaming: true,
            purpose: RequestPurpose::Section {
                index,
                heading: section.heading.clone(),
                attempt,
            },
        }
    }
}

/// Spawn one worker per outline section, at most `max_concurrency` running at once.
///
/// Workers send into `sink` in whatever order they progress; feed the receiver
/// through a [`Resequencer`] before delivery.
pub fn spawn_sections(
    expander: Arc<DraftExpander>,
    outline: &Outline,
    context: Arc<GenerationContext>,
    sink: mpsc::Sender<SectionFragment>,
    cancel: CancelSignal,
) -> JoinSet<SectionStatus> {
    let semaphore = Arc::new(Semaphore::new(expander.config.max_concurrency.max(1)));
    let mut workers = JoinSet::new();

    for (index, section) in outline.sections().iter().cloned().enumerate() {
        let expander = Arc::clone(&expander);
        let context = Arc::clone(&context);
        let semaphore = Arc::clone(&semaphore);
        let sink = sink.clone();
        let cancel = cancel.clone();

        workers.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return SectionStatus::Pending;
            };
            if cancel.is_cancelled() {
                return SectionStatus::Pending;
            }
            expander
                .expand_section(index, &section, &context, &sink, &cancel)
                .await
        });
    }

    workers
}

/// Count words the way the compliance report does.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .count()
}

async fn emit(
    sink: &mpsc::Sender<SectionFragment>,
    cancel: &CancelSignal,
    section: usize,
    fragment: Fragment,
) -> Result<(), Halted> {
    if cancel.is_cancelled() {
        return Err(Halted);
    }
    sink.send(SectionFragment { section, fragment })
        .await
        .map_err(|_| Halted)
}

fn section_prompt(section: &OutlineSection, context: &GenerationContext) -> String {
    let mut prompt = String::new();

    prompt.push_str("## Topic\n");
    prompt.push_str(context.topic());
    prompt.push_str("\n\n");

    match section.kind {
        SectionKind::Intro => prompt.push_str("## Section: Introduction\nOpen the article without a heading.\n"),
        _ => prompt.push_str(&format!("## Section: {}\n", section.heading)),
    }
    if section.target_words > 0 {
        prompt.push_str(&format!("Target length: about {} words.\n", section.target_words));
    }
    prompt.push('\n');

    if !section.talking_points.is_empty() {
        prompt.push_str("## Talking Points\n");
        for point in &section.talking_points {
            prompt.push_str(&format!("- {}\n", point));
        }
        prompt.push('\n');
    }

    if !section.avoid.is_empty() {
        prompt.push_str("## Avoid\n");
        for topic in &section.avoid {
            prompt.push_str(&format!("- {}\n", topic));
        }
        prompt.push('\n');
    }

    prompt.push_str("## Source of Truth\n");
    if section.offer_refs.is_empty() {
        prompt.push_str("No offer is attached to this section. Do not mention bonus codes or offer terms.\n\n");
    } else {
        prompt.push_str("If a fact is not listed, write \"see full terms\".\n\n");
        prompt.push_str(&context.facts_prompt(&section.offer_refs));
    }

    if !context.passages().is_empty() {
        prompt.push_str("## Reference Passages\nTone and background only.\n");
        prompt.push_str(&context.passages_prompt());
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ScriptedGenerator, SectionScript};
    use crate::context_assembler::ContextAssembler;
    use crate::outline::HeadingLevel;
    use offer_facts::{Offer, OfferId};
    use std::time::Duration;

    fn context() -> Arc<GenerationContext> {
        let offers = vec![
            Offer::new(OfferId::new("fd"), "FanDuel", "FDBONUS")
                .with_bonus("Bet $5, Get $200")
                .with_terms("21+. Bonus bets expire in 7 days.")
                .with_source_url("https://go.example.org/fd"),
            Offer::new(OfferId::new("dk"), "DraftKings", "DKCODE").with_terms(""),
        ];
        Arc::new(ContextAssembler::with_defaults().assemble(&offers, Vec::new(), "NFL promos"))
    }

    fn h2(title: &str) -> OutlineSection {
        OutlineSection::new(SectionKind::Heading(HeadingLevel::H2), title)
    }

    async fn run_section(
        generator: Arc<ScriptedGenerator>,
        section: OutlineSection,
    ) -> (SectionStatus, Vec<Fragment>) {
        let expander = DraftExpander::new(generator, "scripted", DraftConfig::default());
        let (tx, mut rx) = mpsc::channel(64);
        let status = expander
            .expand_section(0, &section, &context(), &tx, &CancelSignal::new())
            .await;
        drop(tx);

        let mut fragments = Vec::new();
        while let Some(item) = rx.recv().await {
            fragments.push(item.fragment);
        }
        (status, fragments)
    }

    fn generated_text(fragments: &[Fragment], attempt: u32) -> String {
        fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Content {
                    delta,
                    attempt: a,
                    origin: ContentOrigin::Generated,
                } if *a == attempt => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_generated_section_with_terms() {
        let generator = Arc::new(
            ScriptedGenerator::new().with_section("Claiming", SectionScript::new("Sign up and enter the code.")),
        );
        let section = h2("Claiming").with_offers(vec![OfferId::new("fd")]);
        let (status, fragments) = run_section(generator, section).await;

        assert_eq!(status, SectionStatus::Done);
        assert!(matches!(fragments.first(), Some(Fragment::Status { .. })));
        assert_eq!(generated_text(&fragments, 1), "Sign up and enter the code.");

        match fragments.last() {
            Some(Fragment::SectionDone {
                text,
                status,
                terms,
                word_count,
            }) => {
                assert_eq!(text, "Sign up and enter the code.");
                assert_eq!(*status, SectionStatus::Done);
                assert_eq!(terms.len(), 1);
                assert_eq!(terms[0].text(), "21+. Bonus bets expire in 7 days.");
                assert_eq!(*word_count, 6 + 7);
            }
            other => panic!("expected done fragment, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_retries_once() {
        let generator = Arc::new(ScriptedGenerator::new().with_section(
            "Flaky",
            SectionScript::new("one two three four five six").interrupted(1),
        ));
        let (status, fragments) = run_section(generator.clone(), h2("Flaky")).await;

        assert_eq!(status, SectionStatus::Done);
        assert_eq!(generator.calls().len(), 2);
        assert_eq!(generated_text(&fragments, 1), "one two three ");
        assert_eq!(generated_text(&fragments, 2), "one two three four five six");
        assert!(fragments.iter().any(
            |f| matches!(f, Fragment::Status { message } if message.contains("retrying"))
        ));
    }

    #[tokio::test]
    async fn test_repeated_transport_error_marks_partial() {
        let generator = Arc::new(ScriptedGenerator::new().with_section(
            "Broken",
            SectionScript::new("alpha beta gamma delta").interrupted(2),
        ));
        let (status, fragments) = run_section(generator.clone(), h2("Broken")).await;

        assert_eq!(status, SectionStatus::Partial);
        assert_eq!(generator.calls().len(), 2);
        assert!(matches!(
            fragments.last(),
            Some(Fragment::SectionDone { status: SectionStatus::Partial, text, .. }) if text == "alpha beta"
        ));
    }

    #[tokio::test]
    async fn test_offer_and_terms_sections_skip_generation() {
        let generator = Arc::new(ScriptedGenerator::new());

        let offer_section = OutlineSection::new(SectionKind::Offer, "FanDuel Offer")
            .with_offers(vec![OfferId::new("fd")]);
        let (_, fragments) = run_section(generator.clone(), offer_section).await;
        assert!(fragments.iter().any(|f| matches!(
            f,
            Fragment::Content { origin: ContentOrigin::OfferCard, delta, .. } if delta.contains("`FDBONUS`")
        )));

        let terms_section = OutlineSection::new(SectionKind::Terms, "Terms & Conditions")
            .with_offers(vec![OfferId::new("fd"), OfferId::new("dk")]);
        let (_, fragments) = run_section(generator.clone(), terms_section).await;
        match fragments.last() {
            Some(Fragment::SectionDone { terms, text, .. }) => {
                assert!(text.is_empty());
                assert_eq!(terms.len(), 2);
                assert!(terms[1].is_fallback);
            }
            other => panic!("expected done fragment, got {:?}", other),
        }

        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_section_sends_nothing() {
        let expander = DraftExpander::new(Arc::new(ScriptedGenerator::new()), "scripted", DraftConfig::default());
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancelSignal::new();
        cancel.cancel();

        let status = expander.expand_section(0, &h2("Anything"), &context(), &tx, &cancel).await;
        drop(tx);

        assert_eq!(status, SectionStatus::Partial);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_sections_are_resequenced() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .with_section(
                    "First",
                    SectionScript::new("slow words arrive one by one").with_delay(Duration::from_millis(40)),
                )
                .with_section("Second", SectionScript::new("medium").with_delay(Duration::from_millis(10)))
                .with_section("Third", SectionScript::new("fast")),
        );
        let outline = Outline::new(vec![h2("First"), h2("Second"), h2("Third")]);
        let expander = Arc::new(DraftExpander::new(generator, "scripted", DraftConfig::default()));
        let (tx, mut rx) = mpsc::channel(64);

        let mut workers = spawn_sections(expander, &outline, context(), tx, CancelSignal::new());

        let mut raw_done_order = Vec::new();
        let mut delivered = Vec::new();
        let mut reseq = Resequencer::new(outline.len());
        while let Some(item) = rx.recv().await {
            if item.fragment.is_done() {
                raw_done_order.push(item.section);
            }
            delivered.extend(reseq.push(item));
        }
        while workers.join_next().await.is_some() {}

        // The third section really did finish before the first.
        let third = raw_done_order.iter().position(|s| *s == 2).unwrap();
        let first = raw_done_order.iter().position(|s| *s == 0).unwrap();
        assert!(third < first);

        // Delivery is in outline order regardless.
        let sections: Vec<usize> = delivered.iter().map(|item| item.section).collect();
        assert!(sections.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(delivered.iter().filter(|item| item.fragment.is_done()).count(), 3);
        assert!(reseq.is_finished());
    }
}
