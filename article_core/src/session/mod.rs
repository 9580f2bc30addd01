//! Generation sessions - one request driven through planning, drafting and validation.
//!
//! A [`GenerationSession`] is the single-writer record of a run: its state, the
//! offers it holds, the frozen context, the outline and the in-progress article.
//! Observers never touch it directly; they read the [`EventBus`] instead.

mod events;
mod pipeline;
mod state;

pub use events::*;
pub use pipeline::*;
pub use state::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use offer_facts::{Offer, OfferId, ValidationError};

use crate::article::{Article, DraftSection};
use crate::context_assembler::GenerationContext;
use crate::error::SessionError;
use crate::outline::Outline;

/// What a caller asks the pipeline to write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Retrieval query and planning topic.
    pub topic: String,

    pub title: String,

    /// Offers to feature, in priority order. The first is the main offer.
    pub offer_ids: Vec<OfferId>,

    /// Target state code for the footer, `ALL` for national.
    pub state: String,
}

impl GenerationRequest {
    /// Create a request; the title defaults to the topic.
    pub fn new(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            title: topic.clone(),
            topic,
            offer_ids: Vec::new(),
            state: "ALL".to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_offers(mut self, offer_ids: Vec<OfferId>) -> Self {
        self.offer_ids = offer_ids;
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    /// Reject requests with nothing to write about.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.topic.trim().is_empty() {
            return Err(ValidationError::MissingField("topic"));
        }
        Ok(())
    }
}

/// The state of one generation run.
#[derive(Debug)]
pub struct GenerationSession {
    id: Uuid,
    state: SessionState,
    furthest: SessionState,
    request: GenerationRequest,
    offers: Vec<Offer>,
    context: Option<Arc<GenerationContext>>,
    outline: Option<Outline>,
    article: Option<Article>,
    events: EventBus,
    state_tx: watch::Sender<SessionState>,
}

impl GenerationSession {
    pub fn new(request: GenerationRequest, events: EventConfig) -> Self {
        let id = Uuid::new_v4();
        let (state_tx, _) = watch::channel(SessionState::Created);
        Self {
            id,
            state: SessionState::Created,
            furthest: SessionState::Created,
            request,
            offers: Vec::new(),
            context: None,
            outline: None,
            article: None,
            events: EventBus::new(id, events),
            state_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The furthest non-terminal state reached.
    pub fn furthest_state(&self) -> SessionState {
        self.furthest
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    pub fn context(&self) -> Option<&Arc<GenerationContext>> {
        self.context.as_ref()
    }

    pub fn outline(&self) -> Option<&Outline> {
        self.outline.as_ref()
    }

    pub fn article(&self) -> Option<&Article> {
        self.article.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Watch state changes without subscribing to the event stream.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Move to `to`, publishing one transition event.
    ///
    /// Entering a terminal state closes the event stream, so the transition event
    /// is the last one any observer sees.
    pub fn transition(&mut self, to: SessionState, message: impl Into<String>) -> Result<u64, SessionError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(SessionError::InvalidTransition { from, to });
        }

        let message = message.into();
        info!(session = %self.id, %from, %to, "{}", message);

        self.state = to;
        if !to.is_terminal() {
            self.furthest = to;
        }
        self.state_tx.send_replace(to);

        let seq = self
            .events
            .publish(EventPayload::Status(StatusUpdate::Transition { from, to, message }))
            .unwrap_or_else(|| self.events.last_seq());
        if to.is_terminal() {
            self.events.close();
        }
        Ok(seq)
    }

    /// Publish a non-transition event.
    pub fn publish(&self, payload: EventPayload) -> Option<u64> {
        self.events.publish(payload)
    }

    pub(crate) fn set_offers(&mut self, offers: Vec<Offer>) {
        self.offers = offers;
    }

    pub(crate) fn set_context(&mut self, context: Arc<GenerationContext>) {
        self.context = Some(context);
    }

    pub(crate) fn set_outline(&mut self, outline: Outline) {
        self.outline = Some(outline);
    }

    pub(crate) fn set_article(&mut self, article: Article) {
        self.article = Some(article);
    }

    pub(crate) fn article_mut(&mut self) -> Option<&mut Article> {
        self.article.as_mut()
    }

    pub(crate) fn push_section(&mut self, section: DraftSection) {
        if let Some(article) = self.article.as_mut() {
            article.push_section(section);
        }
    }

    /// Hand everything produced so far to the caller.
    pub fn into_report(self, error: Option<SessionError>) -> SessionReport {
        SessionReport {
            id: self.id,
            state: self.state,
            furthest_state: self.furthest,
            last_seq: self.events.last_seq(),
            offers: self.offers,
            context: self.context,
            outline: self.outline,
            article: self.article,
            error,
        }
    }
}

/// Final result of a session, whichever way it ended.
///
/// Failed and cancelled sessions keep whatever was produced before they stopped.
#[derive(Debug)]
pub struct SessionReport {
    pub id: Uuid,
    pub state: SessionState,
    pub furthest_state: SessionState,
    pub offers: Vec<Offer>,
    pub context: Option<Arc<GenerationContext>>,
    pub outline: Option<Outline>,
    pub article: Option<Article>,
    /// Why the session failed.
    pub error: Option<SessionError>,
    /// Sequence number of the last event published.
    pub last_seq: u64,
}

impl SessionReport {
    /// Completed, fully drafted and free of blocking compliance issues.
    pub fn is_publish_ready(&self) -> bool {
        self.state == SessionState::Complete
            && self.article.as_ref().is_some_and(Article::is_publish_ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = GenerationRequest::new("NFL betting promos")
            .with_offers(vec![OfferId::new("a")])
            .with_state("NJ");
        assert_eq!(request.title, "NFL betting promos");
        assert_eq!(request.state, "NJ");
        assert!(request.validate().is_ok());

        assert!(matches!(
            GenerationRequest::new("  ").validate(),
            Err(ValidationError::MissingField("topic"))
        ));
    }

    #[test]
    fn test_transitions_publish_and_track_furthest() {
        let mut session = GenerationSession::new(GenerationRequest::new("topic"), EventConfig::default());
        let watcher = session.watch_state();

        assert_eq!(session.transition(SessionState::Planning, "planning").unwrap(), 1);
        assert_eq!(session.transition(SessionState::Drafting, "drafting").unwrap(), 2);
        assert_eq!(*watcher.borrow(), SessionState::Drafting);

        session.transition(SessionState::Failed, "boom").unwrap();
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.furthest_state(), SessionState::Drafting);
        assert!(session.events().is_closed());
        assert_eq!(session.publish(EventPayload::Error { section: None, message: "late".into() }), None);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut session = GenerationSession::new(GenerationRequest::new("topic"), EventConfig::default());

        let err = session.transition(SessionState::Validating, "skip ahead").unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                from: SessionState::Created,
                to: SessionState::Validating
            }
        ));
        assert_eq!(err.to_string(), "invalid session transition from created to validating");
        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(session.events().last_seq(), 0);

        session.transition(SessionState::Cancelled, "stop").unwrap();
        assert!(session.transition(SessionState::Failed, "again").is_err());
    }

    #[test]
    fn test_report_keeps_furthest_state() {
        let mut session = GenerationSession::new(GenerationRequest::new("topic"), EventConfig::default());
        session.transition(SessionState::Planning, "planning").unwrap();
        session.transition(SessionState::Cancelled, "cancelled").unwrap();

        let report = session.into_report(None);
        assert_eq!(report.state, SessionState::Cancelled);
        assert_eq!(report.furthest_state, SessionState::Planning);
        assert_eq!(report.last_seq, 2);
        assert!(!report.is_publish_ready());
    }
}
