//! Ranking of stored listings as deals.
//!
//! Each listing is compared against the average price of its own search:
//! the cheaper it is, the more its price dropped, and the better its
//! condition, the higher it scores on a 1-10 scale.

use crate::models::{ItemCondition, SearchLink, StoredListing};
use crate::storage::{ListingStore, StorageResult};
use serde::Serialize;

const PROFIT_WEIGHT: f64 = 0.5;
const DROP_WEIGHT: f64 = 0.3;
const CONDITION_WEIGHT: f64 = 0.2;

/// A stored listing together with its score inputs
#[derive(Debug, Clone, Serialize)]
pub struct Deal {
    #[serde(flatten)]
    pub listing: StoredListing,
    pub avg_price: f64,
    pub potential_profit: f64,
    pub price_drop_pct: f64,
    pub score: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn raw_price_drop(price: f64, previous: Option<f64>) -> f64 {
    match previous {
        Some(previous) if previous > price => (previous - price) / previous * 100.0,
        _ => 0.0,
    }
}

/// Percent the price fell since the previous observation, 0 if it did not fall
pub fn price_drop_pct(price: f64, previous: Option<f64>) -> f64 {
    round2(raw_price_drop(price, previous))
}

pub fn condition_factor(condition: Option<ItemCondition>) -> f64 {
    match condition {
        Some(ItemCondition::New) => 1.5,
        Some(ItemCondition::Used) => 1.0,
        Some(ItemCondition::Damaged) => 0.1,
        None => 0.7,
    }
}

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max == min {
        return 1.0;
    }
    (value - min) / (max - min)
}

/// Scores the listings of one search. Listings are measured against the
/// average of the positive prices; a search without any yields nothing.
pub fn score_search(listings: Vec<StoredListing>) -> Vec<Deal> {
    let prices: Vec<f64> = listings
        .iter()
        .map(|l| l.record.details.price)
        .filter(|p| *p > 0.0)
        .collect();
    if prices.is_empty() {
        return Vec::new();
    }
    let avg_price = prices.iter().sum::<f64>() / prices.len() as f64;

    let inputs: Vec<(StoredListing, f64, f64)> = listings
        .into_iter()
        .map(|listing| {
            let price = listing.record.details.price;
            let profit = (avg_price - price).max(0.0);
            let drop = raw_price_drop(price, listing.previous_price);
            (listing, profit, drop)
        })
        .collect();

    let (min_profit, max_profit) = bounds(inputs.iter().map(|(_, profit, _)| *profit));
    let (min_drop, max_drop) = bounds(inputs.iter().map(|(_, _, drop)| *drop));

    inputs
        .into_iter()
        .map(|(listing, profit, drop)| {
            let raw = PROFIT_WEIGHT * normalize(profit, min_profit, max_profit)
                + DROP_WEIGHT * normalize(drop, min_drop, max_drop)
                + CONDITION_WEIGHT * condition_factor(listing.record.details.item_condition);
            Deal {
                listing,
                avg_price,
                potential_profit: profit,
                price_drop_pct: round2(drop),
                score: round2(1.0 + raw * 9.0),
            }
        })
        .collect()
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    })
}

/// Scores every search separately and merges the results, best first
pub fn score_deals(groups: Vec<(SearchLink, Vec<StoredListing>)>) -> Vec<Deal> {
    let mut deals: Vec<Deal> = groups
        .into_iter()
        .flat_map(|(_, listings)| score_search(listings))
        .collect();
    deals.sort_by(|a, b| b.score.total_cmp(&a.score));
    deals
}

/// Loads all searches from the store and ranks their listings
pub fn best_deals<S: ListingStore>(store: &S) -> StorageResult<Vec<Deal>> {
    let mut groups = Vec::new();
    for link in store.search_links()? {
        let listings = store.listings_for_search_link(link.id)?;
        if !listings.is_empty() {
            groups.push((link, listings));
        }
    }
    Ok(score_deals(groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingDetails, ListingRecord};
    use chrono::Utc;

    fn listing(id: i64, price: f64, previous: Option<f64>, condition: Option<ItemCondition>) -> StoredListing {
        StoredListing {
            id,
            search_link_id: 1,
            record: ListingRecord {
                olx_id: format!("CID1-ID{id}"),
                url: format!("https://www.olx.pl/d/oferta/x-CID1-ID{id}.html"),
                details: ListingDetails {
                    title: Some(format!("Rower {id}")),
                    price,
                    item_condition: condition,
                    ..Default::default()
                },
            },
            previous_price: previous,
            last_updated: Utc::now(),
        }
    }

    fn link(id: i64) -> SearchLink {
        SearchLink {
            id,
            url: format!("https://www.olx.pl/q-rower-{id}/"),
        }
    }

    #[test]
    fn test_price_drop_pct() {
        assert_eq!(price_drop_pct(80.0, Some(100.0)), 20.0);
        assert_eq!(price_drop_pct(100.0, Some(80.0)), 0.0);
        assert_eq!(price_drop_pct(100.0, None), 0.0);
        assert_eq!(price_drop_pct(2.0, Some(3.0)), 33.33);
    }

    #[test]
    fn test_condition_factor() {
        assert_eq!(condition_factor(Some(ItemCondition::New)), 1.5);
        assert_eq!(condition_factor(Some(ItemCondition::Damaged)), 0.1);
        assert_eq!(condition_factor(None), 0.7);
    }

    #[test]
    fn test_cheapest_dropped_listing_ranks_first() {
        let listings = vec![
            listing(1, 1000.0, None, Some(ItemCondition::Used)),
            listing(2, 600.0, Some(800.0), Some(ItemCondition::Used)),
            listing(3, 1400.0, None, Some(ItemCondition::Used)),
        ];
        let deals = score_deals(vec![(link(1), listings)]);

        assert_eq!(deals[0].listing.id, 2);
        assert_eq!(deals[0].avg_price, 1000.0);
        assert_eq!(deals[0].potential_profit, 400.0);
        assert_eq!(deals[0].price_drop_pct, 25.0);
        // profit 1.0, drop 1.0, condition 1.0 -> 1 + 9 * 1.0
        assert_eq!(deals[0].score, 10.0);
        // the two without profit or drop: 1 + 9 * 0.2
        assert_eq!(deals[1].score, 2.8);
        assert_eq!(deals[2].score, 2.8);
    }

    #[test]
    fn test_reported_drop_matches_price_drop_pct() {
        let listings = vec![
            listing(1, 200.0, Some(300.0), None),
            listing(2, 250.0, None, None),
        ];
        let deals = score_search(listings);
        let dropped = deals.iter().find(|d| d.listing.id == 1).unwrap();
        assert_eq!(dropped.price_drop_pct, price_drop_pct(200.0, Some(300.0)));
        assert_eq!(dropped.price_drop_pct, 33.33);
    }

    #[test]
    fn test_single_listing_normalizes_to_one() {
        let deals = score_search(vec![listing(1, 500.0, None, None)]);
        // equal bounds normalize to 1.0: 1 + 9 * (0.5 + 0.3 + 0.14)
        assert_eq!(deals[0].score, 9.46);
    }

    #[test]
    fn test_search_without_prices_is_skipped() {
        let deals = score_deals(vec![
            (link(1), vec![listing(1, 0.0, None, None)]),
            (link(2), vec![listing(2, 300.0, None, Some(ItemCondition::New))]),
        ]);
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].listing.id, 2);
    }

    #[test]
    fn test_best_deals_from_store() {
        use crate::storage::SqliteStore;

        let mut store = SqliteStore::open_in_memory().unwrap();
        let link = store.add_search_link("https://www.olx.pl/q-rower/").unwrap();
        store
            .upsert_listing(link.id, &listing(1, 700.0, None, None).record)
            .unwrap();
        store
            .upsert_listing(link.id, &listing(2, 900.0, None, None).record)
            .unwrap();

        let deals = best_deals(&store).unwrap();
        assert_eq!(deals.len(), 2);
        assert_eq!(deals[0].listing.record.olx_id, "CID1-ID1");
        assert!(deals[0].score > deals[1].score);
    }
}
