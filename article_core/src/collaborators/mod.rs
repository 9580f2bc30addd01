//! Collaborator contracts - retrieval and text generation.
//!
//! The pipeline never builds an index or calls a model itself. It talks to these two
//! traits, and callers plug in real backends. [`scripted`] ships in-process
//! implementations for tests and demos.

pub mod scripted;

pub use scripted::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tokio::sync::mpsc;

use crate::error::{GenerationError, RetrievalError};

/// A ranked passage returned by the retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub source_url: String,
    /// Relevance score, higher is better.
    pub score: f32,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl RetrievedPassage {
    pub fn new(text: impl Into<String>, source_url: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            source_url: source_url.into(),
            score,
            published_at: None,
        }
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// Score used for ranking. NaN ranks with negative infinity, below every real score.
    pub fn ranking_score(&self) -> f32 {
        if self.score.is_nan() {
            f32::NEG_INFINITY
        } else {
            self.score
        }
    }

    /// Total order putting the more relevant passage first.
    pub fn cmp_relevance(&self, other: &Self) -> Ordering {
        other.ranking_score().total_cmp(&self.ranking_score())
    }
}

/// Read-only access to the passage index.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` passages for `query`, best first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError>;
}

/// What a completion request is for.
///
/// Backends may ignore it; it exists for logging and for scripted generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPurpose {
    Outline { attempt: u32 },
    Section { index: usize, heading: String, attempt: u32 },
}

/// A single request to the generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask for incremental chunks instead of a single final chunk.
    pub streaming: bool,
    pub purpose: RequestPurpose,
}

/// A piece of generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationChunk {
    pub text: String,
    /// Set on the last chunk of a completion.
    pub is_final: bool,
}

impl GenerationChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn finished(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Receiving half of a completion stream.
pub type ChunkStream = mpsc::Receiver<Result<GenerationChunk, GenerationError>>;

/// The text generation collaborator.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Start a completion. Chunks arrive on the returned channel; the last one has
    /// `is_final` set.
    async fn complete(&self, request: CompletionRequest) -> Result<ChunkStream, GenerationError>;
}

/// Drain a completion stream into a single string.
///
/// A channel that closes before a final chunk counts as an interrupted stream.
pub async fn collect_completion(mut stream: ChunkStream) -> Result<String, GenerationError> {
    let mut text = String::new();
    while let Some(chunk) = stream.recv().await {
        let chunk = chunk?;
        text.push_str(&chunk.text);
        if chunk.is_final {
            return Ok(text);
        }
    }
    Err(GenerationError::Transport(
        "stream closed before the final chunk".to_string(),
    ))
}
