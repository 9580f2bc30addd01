//! Offer corpus - read-only lookup of offers by id.
//!
//! Ingestion happens upstream; a corpus is built once and then shared (behind an
//! `Arc`) by every generation session.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::offer::{parse_offer, Offer, OfferId, RawOffer, ValidationError};

/// In-memory store of parsed offers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferCorpus {
    offers: HashMap<OfferId, Offer>,
}

impl OfferCorpus {
    /// Create a new empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a corpus from a JSON array of raw offer records.
    ///
    /// Fails on the first record that is not a valid offer.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let records: Vec<RawOffer> = serde_json::from_str(json)?;
        let mut corpus = Self::new();
        for raw in records {
            corpus.insert(parse_offer(raw)?);
        }
        Ok(corpus)
    }

    /// Add an offer, replacing any offer with the same id.
    pub fn insert(&mut self, offer: Offer) -> OfferId {
        let id = offer.id.clone();
        self.offers.insert(id.clone(), offer);
        id
    }

    /// Get an offer by id.
    pub fn get(&self, id: &OfferId) -> Option<&Offer> {
        self.offers.get(id)
    }

    /// Resolve a selection of offer ids, in selection order.
    ///
    /// Repeated ids keep their first position. Any unknown id fails the whole
    /// selection.
    pub fn select(&self, ids: &[OfferId]) -> Result<Vec<Offer>, ValidationError> {
        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            let offer = self
                .get(id)
                .ok_or_else(|| ValidationError::UnknownOffer(id.clone()))?;
            selected.push(offer.clone());
        }
        Ok(selected)
    }

    /// Get the total number of offers.
    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}
