//! Restores outline order for fragments produced by concurrent section workers.

use std::collections::BTreeMap;

use super::{Fragment, SectionFragment};

/// Buffers out-of-order fragments and releases them in section order.
///
/// Fragments of the section currently being delivered pass straight through. Later
/// sections are held until every earlier section has delivered its done fragment.
#[derive(Debug, Default)]
pub struct Resequencer {
    next: usize,
    total: usize,
    pending: BTreeMap<usize, Vec<Fragment>>,
}

impl Resequencer {
    /// Create a resequencer for `total` sections.
    pub fn new(total: usize) -> Self {
        Self {
            next: 0,
            total,
            pending: BTreeMap::new(),
        }
    }

    /// The section currently being delivered.
    pub fn current(&self) -> usize {
        self.next
    }

    /// Check whether every section has delivered its done fragment.
    pub fn is_finished(&self) -> bool {
        self.next >= self.total
    }

    /// Number of fragments held back.
    pub fn buffered(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Accept a fragment and return everything that can be delivered now, in order.
    ///
    /// Fragments for sections that already finished are discarded.
    pub fn push(&mut self, item: SectionFragment) -> Vec<SectionFragment> {
        let mut ready = Vec::new();

        if item.section > self.next {
            self.pending.entry(item.section).or_default().push(item.fragment);
            return ready;
        }
        if item.section < self.next {
            return ready;
        }

        let done = item.fragment.is_done();
        ready.push(item);
        if done {
            self.next += 1;
            self.release_pending(&mut ready);
        }
        ready
    }

    /// Release everything still buffered, in section order, skipping gaps.
    ///
    /// Used when producers stop early and some sections will never finish.
    pub fn flush(&mut self) -> Vec<SectionFragment> {
        let pending = std::mem::take(&mut self.pending);
        self.next = self.total;
        pending
            .into_iter()
            .flat_map(|(section, fragments)| {
                fragments
                    .into_iter()
                    .map(move |fragment| SectionFragment { section, fragment })
            })
            .collect()
    }

    fn release_pending(&mut self, ready: &mut Vec<SectionFragment>) {
        while let Some(fragments) = self.pending.remove(&self.next) {
            let section = self.next;
            let mut finished = false;
            for fragment in fragments {
                finished |= fragment.is_done();
                ready.push(SectionFragment { section, fragment });
            }
            if !finished {
                break;
            }
            self.next += 1;
        }
    }
}
