//! In-process collaborators with scripted behaviour.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use super::{ChunkStream, CompletionRequest, GenerationChunk, Generator, RequestPurpose};
use super::{RetrievedPassage, Retriever};
use crate::error::{GenerationError, RetrievalError};

/// How the scripted generator answers a section request.
#[derive(Debug, Clone, Default)]
pub struct SectionScript {
    pub text: String,

    /// Pause before each chunk.
    pub chunk_delay: Duration,

    /// Number of leading attempts whose stream breaks off halfway.
    pub interrupted_attempts: u32,

    /// When set, the stream waits for a permit before sending anything.
    pub gate: Option<Arc<Semaphore>>,
}

impl SectionScript {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn interrupted(mut self, attempts: u32) -> Self {
        self.interrupted_attempts = attempts;
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// A generator that replays scripted outlines and section bodies.
///
/// Outline responses are consumed in order, the last one repeating. Sections are
/// matched by heading; unscripted headings get a short generic paragraph.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    outlines: Mutex<VecDeque<String>>,
    sections: HashMap<String, SectionScript>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outline response.
    pub fn with_outline(mut self, outline: impl Into<String>) -> Self {
        if let Ok(outlines) = self.outlines.get_mut() {
            outlines.push_back(outline.into());
        }
        self
    }

    /// Script the body for the section with this heading.
    pub fn with_section(mut self, heading: impl Into<String>, script: SectionScript) -> Self {
        self.sections.insert(heading.into(), script);
        self
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Number of outline requests received so far.
    pub fn outline_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call.purpose, RequestPurpose::Outline { .. }))
            .count()
    }

    fn next_outline(&self) -> Option<String> {
        let mut outlines = self.outlines.lock().ok()?;
        if outlines.len() > 1 {
            outlines.pop_front()
        } else {
            outlines.front().cloned()
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, request: CompletionRequest) -> Result<ChunkStream, GenerationError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        let (script, attempt) = match &request.purpose {
            RequestPurpose::Outline { .. } => {
                let outline = self.next_outline().ok_or_else(|| {
                    GenerationError::Unavailable("no outline scripted".to_string())
                })?;
                (SectionScript::new(outline), 1)
            }
            RequestPurpose::Section { heading, attempt, .. } => {
                let script = self.sections.get(heading).cloned().unwrap_or_else(|| {
                    SectionScript::new(format!(
                        "{} is covered here in plain language for readers comparing offers.",
                        heading
                    ))
                });
                (script, *attempt)
            }
        };

        let (tx, rx) = mpsc::channel(16);
        let streaming = request.streaming;

        tokio::spawn(async move {
            if let Some(gate) = &script.gate {
                let _ = gate.acquire().await;
            }

            if !streaming {
                let _ = tx.send(Ok(GenerationChunk::finished(script.text))).await;
                return;
            }

            let words: Vec<&str> = script.text.split_whitespace().collect();
            let interrupt_at = if attempt <= script.interrupted_attempts {
                Some(words.len() / 2)
            } else {
                None
            };

            for (i, word) in words.iter().enumerate() {
                if Some(i) == interrupt_at {
                    let _ = tx
                        .send(Err(GenerationError::Transport(
                            "scripted interruption".to_string(),
                        )))
                        .await;
                    return;
                }
                if !script.chunk_delay.is_zero() {
                    tokio::time::sleep(script.chunk_delay).await;
                }
                let chunk = if i + 1 == words.len() {
                    GenerationChunk::finished(*word)
                } else {
                    GenerationChunk::delta(format!("{} ", word))
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }

            if words.is_empty() {
                let final_chunk = match interrupt_at {
                    Some(_) => Err(GenerationError::Transport("scripted interruption".to_string())),
                    None => Ok(GenerationChunk::finished("")),
                };
                let _ = tx.send(final_chunk).await;
            }
        });

        Ok(rx)
    }
}

/// A retriever over a fixed passage list.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    passages: Vec<RetrievedPassage>,
    failure: Option<String>,
}

impl StaticRetriever {
    pub fn new(passages: Vec<RetrievedPassage>) -> Self {
        Self {
            passages,
            failure: None,
        }
    }

    /// A retriever whose every call fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            passages: Vec::new(),
            failure: Some(message.into()),
        }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        if let Some(message) = &self.failure {
            return Err(RetrievalError::Backend(message.clone()));
        }
        let mut passages = self.passages.clone();
        passages.sort_by(RetrievedPassage::cmp_relevance);
        passages.truncate(k);
        Ok(passages)
    }
}
