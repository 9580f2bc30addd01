//! The orchestrator that drives one session through its states.
//!
//! 1. **Planning**: select offers, retrieve passages, assemble the context, plan
//! 2. **Drafting**: expand sections concurrently, resequence, publish fragments
//! 3. **Validating**: run compliance over the drafted article
//! 4. **Complete**, or **Cancelled** / **Failed** from any earlier step

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use offer_facts::{OfferCorpus, ValidationError};

use super::{
    EventBus, EventPayload, EventSubscription, GenerationRequest, GenerationSession, SessionReport,
    SessionState, StatusUpdate,
};
use crate::article::{Article, DraftSection};
use crate::cancel::CancelSignal;
use crate::collaborators::{Generator, Retriever};
use crate::compliance::ComplianceValidator;
use crate::config::GenerationConfig;
use crate::context_assembler::{ContextAssembler, GenerationContext};
use crate::draft::{
    count_words, spawn_sections, ContentOrigin, DraftExpander, Fragment, Resequencer, SectionFragment,
    SectionStatus,
};
use crate::error::{ConfigError, PlanningError, SessionError};
use crate::outline::{Outline, OutlinePlanner, SectionKind};

/// Fragments buffered between section workers and the orchestrator.
const FRAGMENT_BUFFER: usize = 64;

/// Shared collaborators and configuration for starting sessions.
///
/// Sessions started from one pipeline share only the read-only offer corpus and the
/// collaborators; each runs on its own task.
pub struct ArticlePipeline {
    corpus: Arc<OfferCorpus>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    config: Arc<GenerationConfig>,
    validator: Arc<ComplianceValidator>,
}

impl ArticlePipeline {
    /// Create a pipeline. Fails when the config is invalid or a compliance pattern
    /// does not compile.
    pub fn new(
        corpus: Arc<OfferCorpus>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        config: GenerationConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let validator = ComplianceValidator::new(config.compliance.clone())?;
        Ok(Self {
            corpus,
            retriever,
            generator,
            config: Arc::new(config),
            validator: Arc::new(validator),
        })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Start a session on a new task and return a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: GenerationRequest) -> SessionHandle {
        let session = GenerationSession::new(request, self.config.events.clone());
        let id = session.id();
        let events = session.events().clone();
        let state = session.watch_state();
        let cancel = CancelSignal::new();

        let orchestrator = Orchestrator {
            session,
            corpus: Arc::clone(&self.corpus),
            retriever: Arc::clone(&self.retriever),
            generator: Arc::clone(&self.generator),
            config: Arc::clone(&self.config),
            validator: Arc::clone(&self.validator),
            cancel: cancel.clone(),
        };
        debug!(session = %id, "starting generation session");
        let task = tokio::spawn(orchestrator.run());

        SessionHandle {
            id,
            events,
            cancel,
            state,
            task,
        }
    }

    /// Run a session to the end without observing it.
    pub async fn generate(&self, request: GenerationRequest) -> Result<SessionReport, SessionError> {
        self.start(request).wait().await
    }
}

/// Caller-side handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    events: EventBus,
    cancel: CancelSignal,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Attach an observer. Earlier events are replayed first.
    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    /// Request cancellation. The session acknowledges with a transition to
    /// `Cancelled`, which is its last event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Latest state reported by the session.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait for the session to end.
    pub async fn wait(self) -> Result<SessionReport, SessionError> {
        self.task
            .await
            .map_err(|err| SessionError::Aborted(err.to_string()))
    }
}

/// Why `drive` stopped early.
enum Stop {
    Cancelled,
    Failed(SessionError),
}

impl From<SessionError> for Stop {
    fn from(err: SessionError) -> Self {
        Stop::Failed(err)
    }
}

impl From<ValidationError> for Stop {
    fn from(err: ValidationError) -> Self {
        Stop::Failed(err.into())
    }
}

impl From<PlanningError> for Stop {
    fn from(err: PlanningError) -> Self {
        Stop::Failed(err.into())
    }
}

/// Run `future` unless cancellation is requested first.
async fn unless_cancelled<F: Future>(cancel: &CancelSignal, future: F) -> Result<F::Output, Stop> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Stop::Cancelled),
        output = future => Ok(output),
    }
}

struct Orchestrator {
    session: GenerationSession,
    corpus: Arc<OfferCorpus>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    config: Arc<GenerationConfig>,
    validator: Arc<ComplianceValidator>,
    cancel: CancelSignal,
}

impl Orchestrator {
    async fn run(mut self) -> SessionReport {
        let error = match self.drive().await {
            Ok(()) => None,
            Err(Stop::Cancelled) => {
                if let Err(err) = self.session.transition(SessionState::Cancelled, "cancelled on request") {
                    warn!(session = %self.session.id(), error = %err, "could not acknowledge cancellation");
                }
                None
            }
            Err(Stop::Failed(err)) => {
                warn!(session = %self.session.id(), error = %err, "generation session failed");
                self.session.publish(EventPayload::Error {
                    section: None,
                    message: err.to_string(),
                });
                if let Err(transition) = self.session.transition(SessionState::Failed, err.to_string()) {
                    warn!(session = %self.session.id(), error = %transition, "could not record failure");
                }
                Some(err)
            }
        };
        self.session.into_report(error)
    }

    async fn drive(&mut self) -> Result<(), Stop> {
        let cancel = self.cancel.clone();
        let request = self.session.request().clone();

        self.session.transition(SessionState::Planning, "planning outline")?;
        request.validate()?;
        self.check_cancelled()?;

        let offers = self.corpus.select(&request.offer_ids)?;
        self.session.set_offers(offers.clone());

        let retrieval_k = self.config.context.retrieval_k;
        let passages = match unless_cancelled(&cancel, self.retriever.retrieve(&request.topic, retrieval_k)).await? {
            Ok(passages) => passages,
            Err(err) => {
                warn!(session = %self.session.id(), error = %err, "retrieval failed, continuing without passages");
                Vec::new()
            }
        };

        let context = Arc::new(
            ContextAssembler::new(self.config.context.clone()).assemble(&offers, passages, &request.topic),
        );
        self.session.set_context(Arc::clone(&context));
        self.session.publish(EventPayload::Status(StatusUpdate::Progress {
            section: None,
            message: format!(
                "context ready: {} offers, {} passages",
                context.offers().len(),
                context.passages().len()
            ),
        }));

        let planner = OutlinePlanner::new(
            Arc::clone(&self.generator),
            self.config.model.model.clone(),
            self.config.planner.clone(),
        );
        let outline = unless_cancelled(&cancel, planner.plan(&context)).await??;
        self.check_cancelled()?;

        self.session.set_outline(outline.clone());
        self.session.set_article(Article::new(
            request.title.clone(),
            request.topic.clone(),
            request.state.clone(),
            context.offers().to_vec(),
            outline.clone(),
        ));
        self.session.transition(
            SessionState::Drafting,
            format!("drafting {} sections", outline.len()),
        )?;

        self.draft(&outline, context).await?;
        self.check_cancelled()?;

        self.session.transition(SessionState::Validating, "validating compliance")?;
        let validator = Arc::clone(&self.validator);
        let Some(article) = self.session.article_mut() else {
            return Err(Stop::Failed(SessionError::Aborted(
                "no article to validate".to_string(),
            )));
        };
        let report = validator.report(article);
        let summary = format!(
            "{} sections, {} words, {} blocking and {} advisory issues",
            article.sections.len(),
            report.word_count,
            report.blocking().count(),
            report.advisory().count()
        );
        info!(score = report.score, "{}", summary);
        article.compliance = Some(report);

        self.session.transition(SessionState::Complete, summary)?;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), Stop> {
        if self.cancel.is_cancelled() {
            Err(Stop::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Expand every section and publish fragments in outline order.
    async fn draft(&mut self, outline: &Outline, context: Arc<GenerationContext>) -> Result<(), Stop> {
        let expander = Arc::new(DraftExpander::new(
            Arc::clone(&self.generator),
            self.config.model.model.clone(),
            self.config.drafting.clone(),
        ));
        let cancel = self.cancel.clone();
        let (tx, mut rx) = mpsc::channel(FRAGMENT_BUFFER);
        let mut workers = spawn_sections(expander, outline, context, tx, cancel.clone());
        let mut resequencer = Resequencer::new(outline.len());
        let mut in_flight = InFlight::default();

        let outcome = loop {
            if resequencer.is_finished() {
                break Ok(());
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(Stop::Cancelled),
                received = rx.recv() => {
                    let (ready, closed) = match received {
                        Some(item) => (resequencer.push(item), false),
                        None => (resequencer.flush(), true),
                    };
                    if !self.deliver_all(outline, ready, &mut in_flight) {
                        break Err(Stop::Cancelled);
                    }
                    if closed {
                        break Ok(());
                    }
                }
            }
        };

        if outcome.is_err() {
            workers.abort_all();
            if let Some((index, body)) = in_flight.take() {
                self.session.push_section(partial_section(outline, index, body));
            }
            return outcome;
        }

        if let Some((index, body)) = in_flight.take() {
            self.keep_unfinished(outline, index, body);
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                warn!(session = %self.session.id(), error = %err, "section worker stopped");
            }
        }

        let drafted = self.session.article().map_or(0, |article| article.sections.len());
        if drafted < outline.len() {
            self.session.publish(EventPayload::Error {
                section: None,
                message: format!("{} of {} sections were not drafted", outline.len() - drafted, outline.len()),
            });
        }
        Ok(())
    }

    /// Publish a batch of resequenced fragments. Returns false once cancellation is
    /// requested; nothing after that point is published.
    fn deliver_all(&mut self, outline: &Outline, ready: Vec<SectionFragment>, in_flight: &mut InFlight) -> bool {
        for item in ready {
            if self.cancel.is_cancelled() {
                return false;
            }
            self.deliver(outline, item, in_flight);
        }
        true
    }

    fn deliver(&mut self, outline: &Outline, item: SectionFragment, in_flight: &mut InFlight) {
        let SectionFragment { section, fragment } = item;
        match fragment {
            Fragment::Status { message } => {
                self.session.publish(EventPayload::Status(StatusUpdate::Progress {
                    section: Some(section),
                    message,
                }));
            }
            Fragment::Content { delta, attempt, origin } => {
                if let Some((index, body)) = in_flight.record(section, attempt, origin, &delta) {
                    self.keep_unfinished(outline, index, body);
                }
                self.session.publish(EventPayload::Content {
                    section,
                    delta,
                    attempt,
                    origin,
                });
            }
            Fragment::SectionDone {
                text,
                word_count,
                status,
                terms,
            } => {
                if let Some((index, body)) = in_flight.finish(section) {
                    self.keep_unfinished(outline, index, body);
                }
                let (kind, heading) = outline
                    .section(section)
                    .map(|s| (s.kind, s.heading.clone()))
                    .unwrap_or((SectionKind::Intro, String::new()));

                self.session.publish(EventPayload::Done {
                    section,
                    heading: heading.clone(),
                    text: text.clone(),
                    word_count,
                    status,
                    terms: terms.clone(),
                });
                if status == SectionStatus::Partial {
                    warn!(session = %self.session.id(), section, "section is partial");
                    self.session.publish(EventPayload::Error {
                        section: Some(section),
                        message: format!("section {} ({}) is incomplete after retrying", section + 1, heading),
                    });
                }

                self.session.push_section(DraftSection {
                    index: section,
                    kind,
                    heading,
                    content: text,
                    status,
                    word_count,
                    terms,
                });
            }
        }
    }

    /// Keep a section whose worker stopped without a done fragment.
    fn keep_unfinished(&mut self, outline: &Outline, index: usize, body: String) {
        self.session.publish(EventPayload::Error {
            section: Some(index),
            message: format!("section {} stopped before finishing", index + 1),
        });
        self.session.push_section(partial_section(outline, index, body));
    }
}

/// Content delivered for the section currently streaming.
#[derive(Debug, Default)]
struct InFlight {
    section: Option<usize>,
    attempt: u32,
    body: String,
}

impl InFlight {
    /// Track a delivered delta. Returns the previous section when it was left
    /// without a done fragment.
    fn record(&mut self, section: usize, attempt: u32, origin: ContentOrigin, delta: &str) -> Option<(usize, String)> {
        let abandoned = if self.section == Some(section) {
            None
        } else {
            let previous = self.take();
            self.section = Some(section);
            self.attempt = attempt;
            previous
        };

        match origin {
            ContentOrigin::Generated if attempt > self.attempt => {
                self.attempt = attempt;
                self.body = delta.to_string();
            }
            ContentOrigin::Generated | ContentOrigin::OfferCard => self.body.push_str(delta),
            ContentOrigin::Terms => {}
        }
        abandoned
    }

    /// Close out `section`. Returns another section left unfinished, if any.
    fn finish(&mut self, section: usize) -> Option<(usize, String)> {
        if self.section == Some(section) {
            self.clear();
            None
        } else {
            self.take()
        }
    }

    /// Take the tracked section if any content reached observers.
    fn take(&mut self) -> Option<(usize, String)> {
        let section = self.section?;
        let body = std::mem::take(&mut self.body);
        self.clear();
        if body.trim().is_empty() {
            None
        } else {
            Some((section, body.trim().to_string()))
        }
    }

    fn clear(&mut self) {
        self.section = None;
        self.attempt = 0;
        self.body.clear();
    }
}

fn partial_section(outline: &Outline, index: usize, body: String) -> DraftSection {
    let (kind, heading) = outline
        .section(index)
        .map(|s| (s.kind, s.heading.clone()))
        .unwrap_or((SectionKind::Intro, String::new()));
    DraftSection {
        index,
        kind,
        heading,
        word_count: count_words(&body),
        content: body,
        status: SectionStatus::Partial,
        terms: Vec::new(),
    }
}
