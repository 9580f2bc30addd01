//! # Article Core
//!
//! The generation pipeline. This crate reads offers from `offer_facts`, plans and
//! drafts an article with a text-generation collaborator, and gates the result
//! behind compliance checks.
//!
//! ## Core Components
//!
//! - **context_assembler**: Freezes offers and deduplicated passages into a prompt context
//! - **outline**: Outline parsing, offer resolution, and the retrying planner
//! - **draft**: Concurrent section expansion and the resequencer
//! - **compliance**: Structural document checks and the compliance report
//! - **session**: The session state machine, orchestrator, and event stream
//! - **collaborators**: Retrieval and generation traits, plus scripted implementations
//!
//! ## Design Philosophy
//!
//! - **Facts In, Prose Out**: Models write prose; codes, cards and terms come from offer facts
//! - **Observable**: Every state change and fragment is a sequenced event
//! - **Explicit Config**: Components take their own config section; nothing reads globals

pub mod article;
pub mod cancel;
pub mod collaborators;
pub mod compliance;
pub mod config;
pub mod context_assembler;
pub mod draft;
pub mod error;
pub mod logging;
pub mod outline;
pub mod session;

pub use article::*;
pub use cancel::*;
pub use collaborators::*;
pub use compliance::*;
pub use config::*;
pub use context_assembler::*;
pub use draft::*;
pub use error::*;
pub use logging::*;
pub use outline::*;
pub use session::*;
