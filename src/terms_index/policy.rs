//! Sample selection policies of the variable gap terms index.

use crate::config::IndexTermPolicy;
use crate::postings::TermStats;

/// Decides which terms become index samples.
///
/// The writer forces the first term of every field in regardless of what
/// the selector answers.
pub trait IndexTermSelector: Send + std::fmt::Debug {
    /// Whether `term` should be sampled.
    fn is_index_term(&mut self, term: &[u8], stats: &TermStats) -> bool;

    /// Reset state for a new field.
    fn new_field(&mut self);
}

/// Samples every Nth term.
#[derive(Debug, Clone)]
pub struct EveryNTermSelector {
    interval: u32,
    count: u32,
}

impl EveryNTermSelector {
    /// Create a selector sampling every `interval` terms.
    pub fn new(interval: u32) -> Self {
        EveryNTermSelector {
            interval,
            // First term is first indexed term
            count: interval,
        }
    }
}

impl IndexTermSelector for EveryNTermSelector {
    fn is_index_term(&mut self, _term: &[u8], _stats: &TermStats) -> bool {
        if self.count >= self.interval {
            self.count = 1;
            true
        } else {
            self.count += 1;
            false
        }
    }

    fn new_field(&mut self) {
        self.count = self.interval;
    }
}

/// Samples every Nth term, and every term with a doc freq at or above a
/// threshold. Sampling a frequent term restarts the interval count.
#[derive(Debug, Clone)]
pub struct EveryNOrDocFreqTermSelector {
    interval: u32,
    doc_freq_threshold: u32,
    count: u32,
}

impl EveryNOrDocFreqTermSelector {
    /// Create a new selector.
    pub fn new(interval: u32, doc_freq_threshold: u32) -> Self {
        EveryNOrDocFreqTermSelector {
            interval,
            doc_freq_threshold,
            count: interval,
        }
    }
}

impl IndexTermSelector for EveryNOrDocFreqTermSelector {
    fn is_index_term(&mut self, _term: &[u8], stats: &TermStats) -> bool {
        if stats.doc_freq >= self.doc_freq_threshold || self.count >= self.interval {
            self.count = 1;
            true
        } else {
            self.count += 1;
            false
        }
    }

    fn new_field(&mut self) {
        self.count = self.interval;
    }
}

/// Build the selector for a configured policy.
pub fn selector_for(policy: &IndexTermPolicy) -> Box<dyn IndexTermSelector> {
    match *policy {
        IndexTermPolicy::EveryN { interval } => Box::new(EveryNTermSelector::new(interval)),
        IndexTermPolicy::EveryNOrDocFreq {
            interval,
            doc_freq_threshold,
        } => Box::new(EveryNOrDocFreqTermSelector::new(
            interval,
            doc_freq_threshold,
        )),
    }
}
