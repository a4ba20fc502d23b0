use crate::config::CrawlerConfig;
use crate::crawler::keywords::{matches_keywords, resolve_keywords};
use crate::crawler::rate_limit::RateLimiter;
use crate::models::{CrawlProgress, ListingRecord, SearchLink, WatchedItem};
use crate::scrapers::olx::{olx_id, BlockSignal, OlxSchema};
use crate::scrapers::traits::{PageSession, SessionLauncher};
use crate::storage::ListingStore;
use crate::{CrawlError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Optional progress callback for a crawl
pub type Progress<'a> = Option<&'a mut (dyn FnMut(CrawlProgress) + Send)>;

/// Stage of a search-link crawl that touches the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrawlPhase {
    /// Loading the search URL to read the page count
    ListPaginating,
    /// Walking the result pages
    Collecting,
    /// Loading a listing's detail page
    Fetching,
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListPaginating => "reading pagination",
            Self::Collecting => "collecting listings",
            Self::Fetching => "fetching details",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrawlStatus {
    Completed,
    /// An anti-bot page showed up; nothing from this crawl is returned
    Aborted { phase: CrawlPhase, signal: BlockSignal },
}

/// Everything a single search-link crawl produced
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub search_link_id: i64,
    pub status: CrawlStatus,
    /// New listings that matched the keywords and were stored
    pub records: Vec<ListingRecord>,
    /// Already-known listings whose timestamp was refreshed
    pub refreshed: usize,
    /// Fetched listings dropped by the keyword filter
    pub filtered_out: usize,
    /// Cards without a usable detail link, or repeated within the crawl
    pub skipped: usize,
    /// Fetched listings with at least one unreadable field
    pub incomplete: usize,
}

impl CrawlReport {
    fn new(search_link_id: i64) -> Self {
        Self {
            search_link_id,
            status: CrawlStatus::Completed,
            records: Vec::new(),
            refreshed: 0,
            filtered_out: 0,
            skipped: 0,
            incomplete: 0,
        }
    }

    fn aborted(mut self, phase: CrawlPhase, signal: BlockSignal) -> Self {
        self.status = CrawlStatus::Aborted { phase, signal };
        self.records.clear();
        self
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.status, CrawlStatus::Aborted { .. })
    }
}

/// Result of one search link in a batch run
#[derive(Debug)]
pub struct LinkRun {
    pub link: SearchLink,
    pub result: Result<CrawlReport>,
}

enum Visit {
    Loaded(String),
    Blocked(BlockSignal),
}

/// URL of result page `index` for a search URL
pub fn page_url(search_url: &str, index: u32) -> String {
    if search_url.contains('?') {
        format!("{search_url}&page={index}")
    } else {
        format!("{search_url}?page={index}")
    }
}

fn notify(progress: &mut Progress<'_>, update: CrawlProgress) {
    if let Some(callback) = progress.as_mut() {
        callback(update);
    }
}

/// Drives page sessions over saved searches and stores what it finds
pub struct Crawler<L, S> {
    launcher: L,
    store: S,
    limiter: Arc<RateLimiter>,
    schema: Arc<OlxSchema>,
    origin: Url,
}

impl<L, S> Crawler<L, S>
where
    L: SessionLauncher,
    S: ListingStore,
{
    pub fn new(
        launcher: L,
        store: S,
        limiter: Arc<RateLimiter>,
        schema: Arc<OlxSchema>,
        config: &CrawlerConfig,
    ) -> Result<Self> {
        Ok(Self {
            launcher,
            store,
            limiter,
            schema,
            origin: Url::parse(&config.site_origin)?,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Crawl one search link and return the newly stored listings.
    ///
    /// A block page ends the crawl with an empty result rather than an error.
    pub async fn crawl(
        &mut self,
        link: &SearchLink,
        keywords: Option<&[String]>,
        progress: Progress<'_>,
    ) -> Result<Vec<ListingRecord>> {
        Ok(self.crawl_report(link, keywords, progress).await?.records)
    }

    /// Like [`Crawler::crawl`] but with the full set of counters
    pub async fn crawl_report(
        &mut self,
        link: &SearchLink,
        keywords: Option<&[String]>,
        progress: Progress<'_>,
    ) -> Result<CrawlReport> {
        let mut session = self.launcher.open().await?;
        let outcome = self.run(&mut session, link, keywords, progress).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close browser session: {:#}", e);
        }
        outcome
    }

    /// Crawl a single watched item by its URL.
    ///
    /// The URL has to live on the configured site and is registered as a
    /// search link; keywords default to the ones encoded in the URL.
    pub async fn crawl_by_url(&mut self, item: &WatchedItem) -> Result<Vec<ListingRecord>> {
        info!("Crawling item {:?}: {}", item.name, item.url);
        let url = Url::parse(&item.url)?;
        if url.scheme() != self.origin.scheme() || url.host_str() != self.origin.host_str() {
            return Err(CrawlError::ForeignUrl {
                url: item.url.clone(),
                expected: self.origin.to_string(),
            });
        }

        let keywords = resolve_keywords(&item.url, item.keywords.as_deref());
        let link = self.store.add_search_link(&item.url)?;
        self.crawl(&link, Some(keywords.as_slice()), None).await
    }

    /// Crawl every saved search link, or only `only` when given.
    ///
    /// Explicit `keywords` apply to every link; without them each link uses
    /// the keywords of its own URL. A failing link is logged and the batch
    /// moves on.
    pub async fn crawl_all(
        &mut self,
        only: Option<i64>,
        keywords: Option<&[String]>,
    ) -> Result<Vec<LinkRun>> {
        let links = self.store.search_links()?;
        let mut runs = Vec::new();

        for link in links {
            if only.is_some_and(|id| id != link.id) {
                continue;
            }

            info!("Scraping search link {}: {}", link.id, link.url);
            let result = self.crawl_report(&link, keywords, None).await;
            match &result {
                Ok(report) => info!(
                    "Link {}: {} new, {} refreshed",
                    link.id,
                    report.records.len(),
                    report.refreshed
                ),
                Err(e) => error!("Link {} failed: {}", link.id, e),
            }
            runs.push(LinkRun { link, result });
        }

        Ok(runs)
    }

    async fn run<P: PageSession>(
        &mut self,
        session: &mut P,
        link: &SearchLink,
        keywords: Option<&[String]>,
        mut progress: Progress<'_>,
    ) -> Result<CrawlReport> {
        let mut report = CrawlReport::new(link.id);
        debug!("Session user agent: {}", session.user_agent());

        let first_page =
            match Self::visit(&self.limiter, session, &link.url, CrawlPhase::ListPaginating).await? {
                Visit::Loaded(markup) => markup,
                Visit::Blocked(signal) => {
                    return Ok(report.aborted(CrawlPhase::ListPaginating, signal))
                }
            };
        let total_pages = self.schema.page_count(&first_page);
        info!("Result pages: {}", total_pages);

        let mut summaries = Vec::new();
        for page_index in 1..=total_pages {
            let url = page_url(&link.url, page_index);
            debug!("Fetching page {}: {}", page_index, url);
            let markup = match Self::visit(&self.limiter, session, &url, CrawlPhase::Collecting).await? {
                Visit::Loaded(markup) => markup,
                Visit::Blocked(signal) => return Ok(report.aborted(CrawlPhase::Collecting, signal)),
            };

            let found = self.schema.summaries(&markup);
            info!("Page {}: {} listings", page_index, found.len());
            summaries.extend(found);
            notify(
                &mut progress,
                CrawlProgress {
                    page_index,
                    total_pages,
                    items_processed: 0,
                    items_total: summaries.len(),
                },
            );
        }
        info!("Collected {} listings from all pages", summaries.len());

        let keywords = resolve_keywords(&link.url, keywords);
        debug!("Required keywords: {:?}", keywords);

        let mut seen = HashSet::new();
        let total = summaries.len();

        for (index, summary) in summaries.iter().enumerate() {
            debug!("Processing listing {} of {}", index + 1, total);

            let Some(href) = self.schema.detail_href(summary) else {
                report.skipped += 1;
                continue;
            };
            let detail_url = match self.origin.join(&href) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    debug!("Unusable detail link {:?}: {}", href, e);
                    report.skipped += 1;
                    continue;
                }
            };

            let olx_id = olx_id(&detail_url);
            if !seen.insert(olx_id.clone()) {
                report.skipped += 1;
                continue;
            }

            if let Some(existing) = self.store.listing_by_external_id(link.id, &olx_id)? {
                self.store.touch_listing(existing.id)?;
                report.refreshed += 1;
                continue;
            }

            let markup = match Self::visit(&self.limiter, session, &detail_url, CrawlPhase::Fetching).await? {
                Visit::Loaded(markup) => markup,
                Visit::Blocked(signal) => return Ok(report.aborted(CrawlPhase::Fetching, signal)),
            };
            debug!("Fetched details for listing {}", olx_id);

            let extraction = self.schema.detail(&markup);
            if !extraction.is_complete() {
                debug!("Listing {} is missing {:?}", olx_id, extraction.missing);
                report.incomplete += 1;
            }

            let record = ListingRecord {
                olx_id,
                url: detail_url,
                details: extraction.details,
            };

            if matches_keywords(&record, &keywords) {
                self.store.upsert_listing(link.id, &record)?;
                report.records.push(record);
            } else {
                debug!("Listing {} does not match the keywords", record.olx_id);
                report.filtered_out += 1;
            }

            notify(
                &mut progress,
                CrawlProgress {
                    page_index: total_pages,
                    total_pages,
                    items_processed: index + 1,
                    items_total: total,
                },
            );
        }

        Ok(report)
    }

    /// Rate-limited navigation followed by the block check
    async fn visit<P: PageSession>(
        limiter: &RateLimiter,
        session: &mut P,
        url: &str,
        phase: CrawlPhase,
    ) -> Result<Visit> {
        limiter.admit().await;
        session.navigate(url).await?;

        if let Some(signal) = session.detect_block().await? {
            warn!(
                "Anti-bot page ({}) while {}, aborting this link",
                signal.as_str(),
                phase
            );
            if let Err(e) = session.capture(signal.as_str()).await {
                warn!("Failed to capture block page: {:#}", e);
            }
            return Ok(Visit::Blocked(signal));
        }

        Ok(Visit::Loaded(session.current_markup().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_respects_existing_query() {
        assert_eq!(
            page_url("https://www.olx.pl/q-rower/", 2),
            "https://www.olx.pl/q-rower/?page=2"
        );
        assert_eq!(
            page_url("https://www.olx.pl/q-rower/?search%5Border%5D=created_at", 3),
            "https://www.olx.pl/q-rower/?search%5Border%5D=created_at&page=3"
        );
    }

    #[test]
    fn test_aborted_report_drops_records() {
        let mut report = CrawlReport::new(4);
        report.records.push(ListingRecord {
            olx_id: "a-b".to_string(),
            url: "https://www.olx.pl/a-b.html".to_string(),
            details: Default::default(),
        });
        let report = report.aborted(CrawlPhase::Fetching, BlockSignal::SiteKey);
        assert!(report.is_aborted());
        assert!(report.records.is_empty());
    }
}
