//! Database schema definitions

use rusqlite::Connection;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Saved searches
CREATE TABLE IF NOT EXISTS search_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE
);

-- Listings found under a search, one row per (search, OLX id)
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    search_link_id INTEGER NOT NULL REFERENCES search_links(id),
    olx_id TEXT NOT NULL,
    title TEXT,
    price REAL NOT NULL DEFAULT 0,
    location TEXT,
    item_condition TEXT,
    url TEXT NOT NULL,
    image_url TEXT,
    description TEXT,
    last_updated TEXT NOT NULL,
    previous_price REAL,
    UNIQUE(search_link_id, olx_id)
);

CREATE INDEX IF NOT EXISTS idx_listings_search_link ON listings(search_link_id);
"#;

/// Creates the tables if they do not exist yet
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('search_links', 'listings')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
