use crate::models::ListingRecord;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

fn query_segment() -> &'static Regex {
    static QUERY_SEGMENT: OnceLock<Regex> = OnceLock::new();
    QUERY_SEGMENT.get_or_init(|| Regex::new(r"q-([^/]+)/").expect("query pattern is valid"))
}

/// Filter keywords for a crawl.
///
/// Explicit keywords win. Otherwise they come from the `q-<tokens>/`
/// segment of the search URL path, with any `-CID...` suffix dropped.
/// No segment means no keywords, which lets everything through.
pub fn resolve_keywords(search_url: &str, explicit: Option<&[String]>) -> Vec<String> {
    if let Some(keywords) = explicit.filter(|k| !k.is_empty()) {
        return keywords.to_vec();
    }
    keywords_from_url(search_url)
}

pub fn keywords_from_url(search_url: &str) -> Vec<String> {
    let Ok(url) = Url::parse(search_url) else {
        return Vec::new();
    };
    let Some(captures) = query_segment().captures(url.path()) else {
        return Vec::new();
    };

    let raw = &captures[1];
    let tokens = raw.split("-CID").next().unwrap_or_default();
    tokens
        .split('-')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when every keyword occurs in the title or description,
/// ignoring case. An empty keyword list matches anything.
pub fn matches_keywords(record: &ListingRecord, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let text = record.searchable_text();
    keywords
        .iter()
        .all(|keyword| text.contains(&keyword.to_lowercase()))
}
