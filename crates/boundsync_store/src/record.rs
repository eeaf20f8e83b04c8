//! Store-resident data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a record in the store.
pub type RecordId = u64;

/// A value the store can hold.
///
/// The store does not interpret records beyond their id: two records with the
/// same id are the same entity, and writing one replaces the other.
pub trait Record: Clone + Send + Sync + 'static {
    /// Returns the id under which this record is stored.
    fn id(&self) -> RecordId;
}

/// Opaque continuation token marking where the next page of a paged result
/// begins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Creates a cursor from a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Creates a cursor addressing a page number.
    pub fn page(number: u32) -> Self {
        Self(number.to_string())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interprets the token as a page number, if it is one.
    pub fn as_page(&self) -> Option<u32> {
        self.0.parse().ok()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u32> for Cursor {
    fn from(number: u32) -> Self {
        Self::page(number)
    }
}

impl From<&str> for Cursor {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// An accumulated, paged result set stored under a logical key
/// (for example a search query).
///
/// # Invariants
///
/// - `member_ids` keeps fetch order and duplicates across pages
/// - `member_ids` only ever grows by concatenation
/// - `next == None` means no further pages exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedResult {
    /// Logical key the result set belongs to.
    pub key: String,
    /// Ids of the member records, in fetch order.
    pub member_ids: Vec<RecordId>,
    /// Total number of members reported by the remote side.
    pub total: u64,
    /// Cursor of the next page, if any.
    pub next: Option<Cursor>,
}

impl PagedResult {
    /// Creates a paged result from its first page.
    pub fn new(
        key: impl Into<String>,
        member_ids: Vec<RecordId>,
        total: u64,
        next: Option<Cursor>,
    ) -> Self {
        Self {
            key: key.into(),
            member_ids,
            total,
            next,
        }
    }

    /// Returns true if another page may be requested.
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }

    /// Returns a new result set with `page_ids` appended.
    ///
    /// `total` and `next` are taken from the newly fetched page.
    #[must_use]
    pub fn extended<I>(&self, page_ids: I, total: u64, next: Option<Cursor>) -> Self
    where
        I: IntoIterator<Item = RecordId>,
    {
        let mut member_ids = self.member_ids.clone();
        member_ids.extend(page_ids);
        Self {
            key: self.key.clone(),
            member_ids,
            total,
            next,
        }
    }
}

/// A set of writes that the store applies atomically.
#[derive(Debug, Clone)]
pub struct WriteBatch<R> {
    /// Records to insert or replace.
    pub records: Vec<R>,
    /// Paged results to insert or replace.
    pub paged: Vec<PagedResult>,
}

impl<R> WriteBatch<R> {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            paged: Vec::new(),
        }
    }

    /// Adds records to the batch.
    #[must_use]
    pub fn with_records(mut self, records: impl IntoIterator<Item = R>) -> Self {
        self.records.extend(records);
        self
    }

    /// Adds a paged result to the batch.
    #[must_use]
    pub fn with_paged(mut self, paged: PagedResult) -> Self {
        self.paged.push(paged);
        self
    }

    /// Number of individual writes in the batch.
    pub fn len(&self) -> usize {
        self.records.len() + self.paged.len()
    }

    /// Returns true if the batch contains no writes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> Default for WriteBatch<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cursor_page_numbers() {
        let cursor = Cursor::page(3);
        assert_eq!(cursor.as_str(), "3");
        assert_eq!(cursor.as_page(), Some(3));
        assert_eq!(Cursor::new("opaque-token").as_page(), None);
        assert_eq!(Cursor::from(7u32), Cursor::new("7"));
    }

    #[test]
    fn extended_keeps_order_and_duplicates() {
        let current = PagedResult::new("rust", vec![1, 2], 4, Some(Cursor::page(2)));
        let merged = current.extended(vec![2, 3], 5, None);

        assert_eq!(merged.key, "rust");
        assert_eq!(merged.member_ids, vec![1, 2, 2, 3]);
        assert_eq!(merged.total, 5);
        assert!(!merged.has_more());
        // Source is untouched.
        assert_eq!(current.member_ids, vec![1, 2]);
    }

    #[test]
    fn write_batch_len() {
        let batch: WriteBatch<u8> = WriteBatch::new()
            .with_records(vec![1, 2, 3])
            .with_paged(PagedResult::new("q", vec![], 0, None));
        assert_eq!(batch.len(), 4);
        assert!(!batch.is_empty());
        assert!(WriteBatch::<u8>::default().is_empty());
    }

    proptest! {
        #[test]
        fn extended_is_concatenation(
            first in prop::collection::vec(any::<u64>(), 0..32),
            second in prop::collection::vec(any::<u64>(), 0..32),
        ) {
            let current = PagedResult::new("k", first.clone(), 0, Some(Cursor::page(2)));
            let merged = current.extended(second.clone(), 0, None);

            let mut expected = first;
            expected.extend(second);
            prop_assert_eq!(merged.member_ids, expected);
        }
    }
}
