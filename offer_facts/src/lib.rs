//! # Offer Facts
//!
//! The source-of-truth crate - offer records, explicit-only fact extraction, and
//! deterministic terms rendering. Everything legal or promotional that ends up in an
//! article comes from here, and this crate never calls a text-generation model.
//!
//! ## Core Components
//!
//! - **offer**: Offer records, raw feed parsing, and fact extractors
//! - **terms**: Terms blocks, promo cards, and responsible-gaming disclaimers
//! - **corpus**: Read-only offer lookup by id

pub mod corpus;
pub mod offer;
pub mod terms;

pub use corpus::*;
pub use offer::*;
pub use terms::*;
