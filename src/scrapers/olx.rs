//! OLX markup schema.
//!
//! All knowledge of the site's class names lives here: result-page
//! pagination and cards, the detail page fields and the anti-bot markers.
//! When OLX reshuffles its markup this is the file to touch.

use crate::models::{DetailExtraction, DetailField, ItemCondition, ListingDetails, ListingSummary};
use crate::CrawlError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

const PAGINATION_ITEM: &str = ".pagination-list .pagination-item";
const LISTING_CARD: &str = ".css-qfzx1y";
const DETAIL_LINK: &str = "a.css-1tqlkj0";
const DESCRIPTION: &str = ".css-19duwlz";
const PARAMETER: &str = ".css-1los5bp";
const TITLE: &str = ".css-10ofhqw";
const PRICE: &str = ".css-fqcbii";
const LOCATION: &str = ".css-7wnksb";
const IMAGE: &str = ".css-1bmvjcs";
const CHALLENGE_WIDGET: &str = ".g-recaptcha";
const SITE_KEY: &str = "[data-sitekey]";
const BODY: &str = "body";

/// Condition labels as printed in the parameter list, in match order
const CONDITION_LABELS: [(&str, ItemCondition); 3] = [
    ("Stan: Używane", ItemCondition::Used),
    ("Stan: Uszkodzone", ItemCondition::Damaged),
    ("Stan: Nowe", ItemCondition::New),
];

/// Why a page was judged to be an anti-bot wall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockSignal {
    /// A reCAPTCHA widget is embedded
    ChallengeWidget,
    /// Some element carries a captcha site key
    SiteKey,
    /// The body text mentions a captcha
    BlockText,
}

impl BlockSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChallengeWidget => "challenge widget",
            Self::SiteKey => "site key",
            Self::BlockText => "block text",
        }
    }
}

/// Compiled selectors for the OLX result and detail pages
#[derive(Debug)]
pub struct OlxSchema {
    pagination_item: Selector,
    listing_card: Selector,
    detail_link: Selector,
    description: Selector,
    parameter: Selector,
    title: Selector,
    price: Selector,
    location: Selector,
    image: Selector,
    challenge_widget: Selector,
    site_key: Selector,
    body: Selector,
}

fn selector(css: &str) -> Result<Selector, CrawlError> {
    Selector::parse(css).map_err(|e| CrawlError::Selector {
        selector: css.to_string(),
        message: format!("{e:?}"),
    })
}

/// Text of an element with every text node trimmed and glued together
fn stripped_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn trimmed_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

impl OlxSchema {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            pagination_item: selector(PAGINATION_ITEM)?,
            listing_card: selector(LISTING_CARD)?,
            detail_link: selector(DETAIL_LINK)?,
            description: selector(DESCRIPTION)?,
            parameter: selector(PARAMETER)?,
            title: selector(TITLE)?,
            price: selector(PRICE)?,
            location: selector(LOCATION)?,
            image: selector(IMAGE)?,
            challenge_widget: selector(CHALLENGE_WIDGET)?,
            site_key: selector(SITE_KEY)?,
            body: selector(BODY)?,
        })
    }

    /// Highest page number among the pagination controls, 1 without any.
    ///
    /// Controls that are not plain numbers ("next", ellipsis) are skipped.
    pub fn page_count(&self, html: &str) -> u32 {
        let document = Html::parse_document(html);
        document
            .select(&self.pagination_item)
            .filter_map(|item| {
                let text = trimmed_text(item);
                match text.parse::<u32>() {
                    Ok(n) => Some(n),
                    Err(_) => {
                        debug!("Skipping pagination control {:?}", text);
                        None
                    }
                }
            })
            .fold(1, u32::max)
    }

    /// Every listing card on a result page, in page order
    pub fn summaries(&self, html: &str) -> Vec<ListingSummary> {
        let document = Html::parse_document(html);
        document
            .select(&self.listing_card)
            .map(|card| ListingSummary {
                text: stripped_text(card),
                markup: card.html(),
            })
            .collect()
    }

    /// The detail-page href inside a card, if the card links anywhere
    pub fn detail_href(&self, summary: &ListingSummary) -> Option<String> {
        let fragment = Html::parse_fragment(&summary.markup);
        let link = fragment.select(&self.detail_link).next()?;
        link.value()
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_string)
    }

    /// Parse a detail page. Never fails: fields that cannot be read are
    /// reported in [`DetailExtraction::missing`].
    pub fn detail(&self, html: &str) -> DetailExtraction {
        if html.trim().is_empty() {
            return DetailExtraction::failed();
        }

        let document = Html::parse_document(html);
        let first_text = |sel: &Selector| document.select(sel).next().map(trimmed_text);

        let item_condition = document.select(&self.parameter).find_map(|p| {
            let text = stripped_text(p);
            CONDITION_LABELS
                .iter()
                .find(|(label, _)| text.contains(label))
                .map(|(_, condition)| *condition)
        });

        let price_text = first_text(&self.price);

        let details = ListingDetails {
            title: first_text(&self.title),
            description: first_text(&self.description),
            price: price_text.as_deref().map(parse_price).unwrap_or(0.0),
            location: first_text(&self.location),
            item_condition,
            image_url: document
                .select(&self.image)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(str::to_string),
        };

        let mut missing = Vec::new();
        if details.title.is_none() {
            missing.push(DetailField::Title);
        }
        if details.description.is_none() {
            missing.push(DetailField::Description);
        }
        if price_text.is_none() {
            missing.push(DetailField::Price);
        }
        if details.location.is_none() {
            missing.push(DetailField::Location);
        }
        if details.item_condition.is_none() {
            missing.push(DetailField::ItemCondition);
        }

        DetailExtraction { details, missing }
    }

    /// First anti-bot marker found on the page
    pub fn block_signal(&self, html: &str) -> Option<BlockSignal> {
        let document = Html::parse_document(html);

        if document.select(&self.challenge_widget).next().is_some() {
            return Some(BlockSignal::ChallengeWidget);
        }
        if document.select(&self.site_key).next().is_some() {
            return Some(BlockSignal::SiteKey);
        }

        let text: String = match document.select(&self.body).next() {
            Some(body) => body.text().collect(),
            None => document.root_element().text().collect(),
        };
        if text.to_lowercase().contains("captcha") {
            return Some(BlockSignal::BlockText);
        }

        None
    }
}

fn price_run() -> &'static Regex {
    static PRICE_RUN: OnceLock<Regex> = OnceLock::new();
    PRICE_RUN.get_or_init(|| Regex::new(r"[\d\s,]+").expect("price pattern is valid"))
}

/// Numeric price from display text such as "1 234,56 zł".
///
/// Takes the first run of digits, whitespace and commas, drops spaces,
/// reads the comma as the decimal separator. Anything unparseable is 0.
pub fn parse_price(text: &str) -> f64 {
    let Some(run) = price_run().find(text) else {
        return 0.0;
    };
    let cleaned = run
        .as_str()
        .replace(' ', "")
        .replace("zł", "")
        .replace(',', ".");
    cleaned.trim().parse().unwrap_or(0.0)
}

/// Stable listing id: the last two hyphen-separated chunks of the detail
/// URL without the `.html` suffix.
///
/// Only the tail is looked at, so two URLs that differ before it map to
/// the same id.
pub fn olx_id(detail_url: &str) -> String {
    let parts: Vec<&str> = detail_url.split('-').collect();
    let tail = &parts[parts.len().saturating_sub(2)..];
    tail.join("-").replace(".html", "")
}
