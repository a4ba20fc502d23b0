//! Storage of search links and listings
//!
//! The crawler talks to storage only through [`ListingStore`]; the SQLite
//! backend is the one shipped implementation.

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::models::{ListingRecord, SearchLink, StoredListing};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What an upsert did to the stored row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpsertOutcome {
    /// No row existed; one was inserted without a previous price
    Inserted { id: i64 },
    /// The price moved; the old one is now the previous price
    PriceChanged { id: i64, previous: f64 },
    /// Same price; only the timestamp moved
    Refreshed { id: i64 },
}

/// Persistence used by the crawler and the deal ranking
pub trait ListingStore {
    /// Registers a search URL, returning the existing link if already known
    fn add_search_link(&mut self, url: &str) -> StorageResult<SearchLink>;

    fn search_links(&self) -> StorageResult<Vec<SearchLink>>;

    /// Looks up a listing by its identity key
    fn listing_by_external_id(
        &self,
        search_link_id: i64,
        olx_id: &str,
    ) -> StorageResult<Option<StoredListing>>;

    fn listings_for_search_link(&self, search_link_id: i64) -> StorageResult<Vec<StoredListing>>;

    /// Inserts a listing or updates the stored one.
    ///
    /// On a price change the stored price moves to `previous_price` and every
    /// field is overwritten. With an unchanged price only the timestamp moves.
    fn upsert_listing(
        &mut self,
        search_link_id: i64,
        record: &ListingRecord,
    ) -> StorageResult<UpsertOutcome>;

    /// Refreshes the freshness timestamp of a listing
    fn touch_listing(&mut self, listing_id: i64) -> StorageResult<()>;
}
