use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved search whose result pages get crawled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLink {
    pub id: i64,
    pub url: String,
}

/// A single entry scraped from a result page, kept only until the
/// per-listing loop has looked at it
#[derive(Debug, Clone)]
pub struct ListingSummary {
    pub text: String,
    pub markup: String,
}

/// Item condition as advertised on the detail page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCondition {
    New,
    Used,
    Damaged,
}

impl ItemCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Used => "used",
            Self::Damaged => "damaged",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "used" => Some(Self::Used),
            "damaged" => Some(Self::Damaged),
            _ => None,
        }
    }
}

/// Fields read from a listing's detail page.
///
/// `None` marks a field the page did not yield.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingDetails {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: f64,
    pub location: Option<String>,
    pub item_condition: Option<ItemCondition>,
    pub image_url: Option<String>,
}

/// Names of the detail fields, used to report partial extractions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailField {
    Title,
    Description,
    Price,
    Location,
    ItemCondition,
}

/// Outcome of parsing one detail page: what was found plus which
/// fields could not be read
#[derive(Debug, Clone, PartialEq)]
pub struct DetailExtraction {
    pub details: ListingDetails,
    pub missing: Vec<DetailField>,
}

impl DetailExtraction {
    /// Result for a page that could not be read at all
    pub fn failed() -> Self {
        Self {
            details: ListingDetails::default(),
            missing: vec![
                DetailField::Title,
                DetailField::Description,
                DetailField::Price,
                DetailField::Location,
                DetailField::ItemCondition,
            ],
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A listing as produced by the crawler, ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub olx_id: String,
    pub url: String,
    #[serde(flatten)]
    pub details: ListingDetails,
}

impl ListingRecord {
    /// Lowercased title and description, the haystack for keyword matching
    pub fn searchable_text(&self) -> String {
        format!(
            "{} {}",
            self.details.title.as_deref().unwrap_or_default(),
            self.details.description.as_deref().unwrap_or_default()
        )
        .to_lowercase()
    }
}

/// A persisted listing with its bookkeeping columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredListing {
    pub id: i64,
    pub search_link_id: i64,
    #[serde(flatten)]
    pub record: ListingRecord,
    pub previous_price: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

/// Progress snapshot handed to the optional progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrawlProgress {
    pub page_index: u32,
    pub total_pages: u32,
    pub items_processed: usize,
    pub items_total: usize,
}

/// An item watched by URL rather than through a saved search link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedItem {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_db_strings() {
        assert_eq!(ItemCondition::from_db_string("used"), Some(ItemCondition::Used));
        assert_eq!(ItemCondition::Damaged.as_str(), "damaged");
        assert_eq!(ItemCondition::from_db_string("error"), None);
    }

    #[test]
    fn test_searchable_text_skips_missing_fields() {
        let record = ListingRecord {
            olx_id: "CID1-ID2".to_string(),
            url: "https://www.olx.pl/d/oferta/x-CID1-ID2.html".to_string(),
            details: ListingDetails {
                title: Some("Rower Górski".to_string()),
                ..Default::default()
            },
        };
        assert_eq!(record.searchable_text(), "rower górski ");
    }

    #[test]
    fn test_failed_extraction_lists_every_field() {
        let failed = DetailExtraction::failed();
        assert_eq!(failed.missing.len(), 5);
        assert_eq!(failed.details.price, 0.0);
        assert!(failed.details.image_url.is_none());
        assert!(!failed.is_complete());
    }
}
