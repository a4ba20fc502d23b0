//! SQLite storage implementation

use crate::models::{ItemCondition, ListingDetails, ListingRecord, SearchLink, StoredListing};
use crate::storage::schema::initialize_schema;
use crate::storage::{ListingStore, StorageError, StorageResult, UpsertOutcome};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const LISTING_COLUMNS: &str = "id, search_link_id, olx_id, title, price, location, item_condition,
     url, image_url, description, last_updated, previous_price";

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<StoredListing> {
    let condition: Option<String> = row.get(6)?;
    let last_updated: String = row.get(10)?;
    let last_updated = DateTime::parse_from_rfc3339(&last_updated)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(StoredListing {
        id: row.get(0)?,
        search_link_id: row.get(1)?,
        record: ListingRecord {
            olx_id: row.get(2)?,
            url: row.get(7)?,
            details: ListingDetails {
                title: row.get(3)?,
                description: row.get(9)?,
                price: row.get(4)?,
                location: row.get(5)?,
                item_condition: condition.as_deref().and_then(ItemCondition::from_db_string),
                image_url: row.get(8)?,
            },
        },
        previous_price: row.get(11)?,
        last_updated,
    })
}

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database file and makes sure the schema exists
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl ListingStore for SqliteStore {
    fn add_search_link(&mut self, url: &str) -> StorageResult<SearchLink> {
        self.conn.execute(
            "INSERT OR IGNORE INTO search_links (url) VALUES (?1)",
            params![url],
        )?;
        let link = self.conn.query_row(
            "SELECT id, url FROM search_links WHERE url = ?1",
            params![url],
            |row| {
                Ok(SearchLink {
                    id: row.get(0)?,
                    url: row.get(1)?,
                })
            },
        )?;
        Ok(link)
    }

    fn search_links(&self) -> StorageResult<Vec<SearchLink>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, url FROM search_links ORDER BY id")?;
        let links = stmt
            .query_map([], |row| {
                Ok(SearchLink {
                    id: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn listing_by_external_id(
        &self,
        search_link_id: i64,
        olx_id: &str,
    ) -> StorageResult<Option<StoredListing>> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE search_link_id = ?1 AND olx_id = ?2"
        );
        let listing = self
            .conn
            .query_row(&sql, params![search_link_id, olx_id], listing_from_row)
            .optional()?;
        Ok(listing)
    }

    fn listings_for_search_link(&self, search_link_id: i64) -> StorageResult<Vec<StoredListing>> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE search_link_id = ?1 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let listings = stmt
            .query_map(params![search_link_id], listing_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(listings)
    }

    fn upsert_listing(
        &mut self,
        search_link_id: i64,
        record: &ListingRecord,
    ) -> StorageResult<UpsertOutcome> {
        let details = &record.details;
        if !details.price.is_finite() {
            return Err(StorageError::InvalidValue(format!(
                "price of {} is {}",
                record.olx_id, details.price
            )));
        }

        let tx = self.conn.transaction()?;
        let existing: Option<(i64, f64)> = tx
            .query_row(
                "SELECT id, price FROM listings WHERE search_link_id = ?1 AND olx_id = ?2",
                params![search_link_id, record.olx_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let now = timestamp();
        let condition = details.item_condition.map(|c| c.as_str());

        let outcome = match existing {
            Some((id, stored_price)) if stored_price != details.price => {
                tx.execute(
                    "UPDATE listings
                     SET previous_price = ?1, price = ?2, title = ?3, description = ?4,
                         location = ?5, item_condition = ?6, url = ?7, image_url = ?8,
                         last_updated = ?9
                     WHERE id = ?10",
                    params![
                        stored_price,
                        details.price,
                        details.title,
                        details.description,
                        details.location,
                        condition,
                        record.url,
                        details.image_url,
                        now,
                        id
                    ],
                )?;
                UpsertOutcome::PriceChanged {
                    id,
                    previous: stored_price,
                }
            }
            Some((id, _)) => {
                tx.execute(
                    "UPDATE listings SET last_updated = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
                UpsertOutcome::Refreshed { id }
            }
            None => {
                tx.execute(
                    "INSERT INTO listings
                     (search_link_id, olx_id, title, price, location, item_condition, url,
                      image_url, description, last_updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        search_link_id,
                        record.olx_id,
                        details.title,
                        details.price,
                        details.location,
                        condition,
                        record.url,
                        details.image_url,
                        details.description,
                        now
                    ],
                )?;
                UpsertOutcome::Inserted {
                    id: tx.last_insert_rowid(),
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn touch_listing(&mut self, listing_id: i64) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE listings SET last_updated = ?1 WHERE id = ?2",
            params![timestamp(), listing_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("listing {listing_id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_link() -> (SqliteStore, SearchLink) {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let link = store
            .add_search_link("https://www.olx.pl/sport-hobby/rowery/q-rower-gorski/")
            .unwrap();
        (store, link)
    }

    const OLD_STAMP: &str = "2000-01-01T00:00:00Z";

    fn backdate(store: &SqliteStore, listing_id: i64) {
        store
            .conn
            .execute(
                "UPDATE listings SET last_updated = ?1 WHERE id = ?2",
                params![OLD_STAMP, listing_id],
            )
            .unwrap();
    }

    fn old_stamp() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(OLD_STAMP)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn record(price: f64) -> ListingRecord {
        ListingRecord {
            olx_id: "CID767-IDa1".to_string(),
            url: "https://www.olx.pl/d/oferta/rower-CID767-IDa1.html".to_string(),
            details: ListingDetails {
                title: Some("Rower górski".to_string()),
                description: Some("Opis".to_string()),
                price,
                location: Some("Kraków".to_string()),
                item_condition: Some(ItemCondition::Used),
                image_url: None,
            },
        }
    }

    #[test]
    fn test_add_search_link_is_idempotent() {
        let (mut store, link) = store_with_link();
        let again = store.add_search_link(&link.url).unwrap();
        assert_eq!(again, link);
        assert_eq!(store.search_links().unwrap(), vec![link]);
    }

    #[test]
    fn test_insert_then_lookup() {
        let (mut store, link) = store_with_link();
        let outcome = store.upsert_listing(link.id, &record(1200.0)).unwrap();
        assert!(matches!(outcome, UpsertOutcome::Inserted { .. }));

        let stored = store
            .listing_by_external_id(link.id, "CID767-IDa1")
            .unwrap()
            .unwrap();
        assert_eq!(stored.record, record(1200.0));
        assert_eq!(stored.previous_price, None);
        assert!(store.listing_by_external_id(link.id, "other").unwrap().is_none());
    }

    #[test]
    fn test_unchanged_upsert_only_refreshes() {
        let (mut store, link) = store_with_link();
        store.upsert_listing(link.id, &record(1200.0)).unwrap();
        let first = store.listing_by_external_id(link.id, "CID767-IDa1").unwrap().unwrap();
        backdate(&store, first.id);

        let outcome = store.upsert_listing(link.id, &record(1200.0)).unwrap();
        assert_eq!(outcome, UpsertOutcome::Refreshed { id: first.id });

        let second = store.listing_by_external_id(link.id, "CID767-IDa1").unwrap().unwrap();
        assert_eq!(second.previous_price, None);
        assert_eq!(second.record, first.record);
        assert!(second.last_updated > old_stamp());
    }

    #[test]
    fn test_price_drop_keeps_previous_price_once() {
        let (mut store, link) = store_with_link();
        store.upsert_listing(link.id, &record(1200.0)).unwrap();

        let outcome = store.upsert_listing(link.id, &record(999.99)).unwrap();
        assert!(matches!(
            outcome,
            UpsertOutcome::PriceChanged { previous, .. } if previous == 1200.0
        ));

        // same lower price again: history untouched
        store.upsert_listing(link.id, &record(999.99)).unwrap();
        let stored = store.listing_by_external_id(link.id, "CID767-IDa1").unwrap().unwrap();
        assert_eq!(stored.record.details.price, 999.99);
        assert_eq!(stored.previous_price, Some(1200.0));
    }

    #[test]
    fn test_price_change_overwrites_fields() {
        let (mut store, link) = store_with_link();
        store.upsert_listing(link.id, &record(1200.0)).unwrap();

        let mut changed = record(1100.0);
        changed.details.title = Some("Rower górski, okazja".to_string());
        changed.details.item_condition = None;
        store.upsert_listing(link.id, &changed).unwrap();

        let stored = store.listing_by_external_id(link.id, "CID767-IDa1").unwrap().unwrap();
        assert_eq!(stored.record, changed);
    }

    #[test]
    fn test_same_olx_id_under_two_links() {
        let (mut store, link) = store_with_link();
        let other = store.add_search_link("https://www.olx.pl/q-rower/").unwrap();
        store.upsert_listing(link.id, &record(1200.0)).unwrap();
        store.upsert_listing(other.id, &record(1300.0)).unwrap();

        assert_eq!(store.listings_for_search_link(link.id).unwrap().len(), 1);
        assert_eq!(store.listings_for_search_link(other.id).unwrap().len(), 1);
    }

    #[test]
    fn test_touch_listing() {
        let (mut store, link) = store_with_link();
        store.upsert_listing(link.id, &record(1200.0)).unwrap();
        let before = store.listing_by_external_id(link.id, "CID767-IDa1").unwrap().unwrap();
        backdate(&store, before.id);

        store.touch_listing(before.id).unwrap();
        let after = store.listing_by_external_id(link.id, "CID767-IDa1").unwrap().unwrap();
        assert!(after.last_updated > old_stamp());
        assert_eq!(after.record, before.record);

        assert!(matches!(
            store.touch_listing(9999),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_rejects_nan_price() {
        let (mut store, link) = store_with_link();
        assert!(matches!(
            store.upsert_listing(link.id, &record(f64::NAN)),
            Err(StorageError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scout.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            let link = store.add_search_link("https://www.olx.pl/q-lego/").unwrap();
            store.upsert_listing(link.id, &record(50.0)).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let links = store.search_links().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(store.listings_for_search_link(links[0].id).unwrap().len(), 1);
    }
}
