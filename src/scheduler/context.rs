//! Per-root expansion bookkeeping
//!
//! Every input URL gets its own context; counters never leak between the
//! trees of two input URLs.

use crate::crawler::ScrapeItemKind;
use std::collections::HashMap;
use url::Url;

/// What a parent yielded, for the children counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildCategory {
    Scrape(ScrapeItemKind),
    Media,
}

/// Children counters of one input URL's expansion tree
#[derive(Debug, Clone, Default)]
pub struct ExpansionContext {
    counts: HashMap<(Url, ChildCategory), u32>,
    dropped: u64,
}

impl ExpansionContext {

    /// Counts one child of `parent`; false once `limit` children of that
    /// category were admitted
    ///
    /// A `None` limit admits everything.
    pub fn admit_child(&mut self, parent: &Url, category: ChildCategory, limit: Option<u32>) -> bool {
        let count = self.counts.entry((parent.clone(), category)).or_insert(0);
        match limit {
            Some(limit) if *count >= limit => {
                self.dropped += 1;
                false
            }
            _ => {
                *count += 1;
                true
            }
        }
    }

    /// Children refused by the limit
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
