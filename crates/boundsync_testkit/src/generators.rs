//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use crate::fixtures::{repos, Repo};
use boundsync_engine::Page;
use boundsync_store::{Cursor, RecordId};
use proptest::prelude::*;

/// Strategy for generating record ids.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    1..=1_000_000u64
}

/// Strategy for generating search keys.
pub fn search_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9 ]{0,23}").expect("Invalid regex")
}

/// Strategy for generating page cursors.
pub fn cursor_strategy() -> impl Strategy<Value = Cursor> {
    prop_oneof![
        3 => (1u32..1_000).prop_map(Cursor::page),
        1 => prop::string::string_regex("[A-Za-z0-9=]{4,16}")
            .expect("Invalid regex")
            .prop_map(Cursor::new),
    ]
}

/// Strategy for generating a chain of result pages.
///
/// Ids are unique across the whole chain, every page but the last links to
/// the following one, and `total` on each page counts the records of the whole chain.
pub fn page_chain_strategy(
    max_pages: usize,
    max_per_page: usize,
) -> impl Strategy<Value = Vec<Page<Repo>>> {
    prop::collection::vec(0..=max_per_page, 1..=max_pages.max(1)).prop_map(|sizes| {
        let total: u64 = sizes.iter().map(|&n| n as u64).sum();
        let pages = sizes.len();
        let mut next_id: RecordId = 1;

        sizes
            .into_iter()
            .enumerate()
            .map(|(i, size)| {
                let ids: Vec<RecordId> = (next_id..next_id + size as u64).collect();
                next_id += size as u64;
                let next = (i + 1 < pages).then(|| Cursor::page(i as u32 + 2));
                Page::new(repos(&ids), total, next)
            })
            .collect()
    })
}

/// A step in a simulated "load more" session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMoreStep {
    /// The next page arrives.
    Page,
    /// The next request fails.
    Fail,
    /// The handler is reset, as for a new query.
    Reset,
}

/// Strategy for generating a sequence of "load more" steps.
pub fn load_more_steps_strategy(max_steps: usize) -> impl Strategy<Value = Vec<LoadMoreStep>> {
    prop::collection::vec(
        prop_oneof![
            4 => Just(LoadMoreStep::Page),
            2 => Just(LoadMoreStep::Fail),
            1 => Just(LoadMoreStep::Reset),
        ],
        0..max_steps,
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn page_chain_ids_are_unique(chain in page_chain_strategy(6, 5)) {
            let ids: Vec<RecordId> = chain.iter().flat_map(Page::member_ids).collect();
            let unique: HashSet<_> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
            prop_assert!(chain.iter().all(|page| page.total == ids.len() as u64));
        }

        #[test]
        fn only_last_page_ends_chain(chain in page_chain_strategy(6, 5)) {
            let last = chain.len() - 1;
            for (i, page) in chain.iter().enumerate() {
                prop_assert_eq!(page.next.is_none(), i == last);
            }
        }

        #[test]
        fn search_key_is_not_blank(key in search_key_strategy()) {
            prop_assert!(!key.trim().is_empty());
        }
    }
}
