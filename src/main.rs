use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use olx_scout::config::{load_config_or_default, Config};
use olx_scout::crawler::{Crawler, RateLimiter};
use olx_scout::deals::best_deals;
use olx_scout::models::{ListingRecord, WatchedItem};
use olx_scout::scrapers::{ChromeLauncher, OlxSchema};
use olx_scout::storage::{ListingStore, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// OLX Scout: tracks classified listings and their prices
#[derive(Parser, Debug)]
#[command(name = "olx-scout", version, about, long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE", default_value = "olx-scout.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save a search URL to be crawled
    AddLink { url: String },

    /// List saved search URLs
    Links,

    /// Crawl saved searches once
    Crawl {
        /// Only crawl this search link
        #[arg(long)]
        link_id: Option<i64>,

        /// Required keywords (comma separated), applied to every crawled link;
        /// default comes from each link's URL
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Write the new listings to this JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Crawl a single item URL
    Item {
        url: String,

        #[arg(long, default_value = "")]
        name: String,

        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
    },

    /// Print stored listings of a search link as JSON
    Listings { link_id: i64 },

    /// Print the best deals across all searches
    Best {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Crawl all searches periodically until interrupted
    Watch,
}

fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("olx_scout=info,warn"),
                1 => EnvFilter::new("olx_scout=debug,info"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = Path::new(&config.storage.database_path);
    SqliteStore::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn build_crawler(config: &Config) -> Result<Crawler<ChromeLauncher, SqliteStore>> {
    let schema = Arc::new(OlxSchema::new()?);
    let limiter = Arc::new(RateLimiter::from_config(&config.crawler));
    let launcher = ChromeLauncher::new(&config.crawler, Arc::clone(&schema));
    let crawler = Crawler::new(launcher, open_store(config)?, limiter, schema, &config.crawler)?;
    Ok(crawler)
}

async fn write_json(path: &Path, records: &[ListingRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("💾 Saved {} listings to {}", records.len(), path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let config = load_config_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command {
        Command::AddLink { url } => {
            let link = open_store(&config)?.add_search_link(&url)?;
            println!("{} {}", link.id, link.url);
        }
        Command::Links => {
            for link in open_store(&config)?.search_links()? {
                println!("{} {}", link.id, link.url);
            }
        }
        Command::Crawl {
            link_id,
            keywords,
            output,
        } => {
            let mut crawler = build_crawler(&config)?;
            let keywords = (!keywords.is_empty()).then_some(keywords);
            let mut records = Vec::new();
            for run in crawler.crawl_all(link_id, keywords.as_deref()).await? {
                if let Ok(report) = run.result {
                    records.extend(report.records);
                }
            }

            info!("✅ {} new listings", records.len());
            if let Some(path) = output {
                write_json(&path, &records).await?;
            }
        }
        Command::Item {
            url,
            name,
            keywords,
        } => {
            let mut crawler = build_crawler(&config)?;
            let item = WatchedItem {
                name,
                url,
                keywords: (!keywords.is_empty()).then_some(keywords),
            };
            let records = crawler.crawl_by_url(&item).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Listings { link_id } => {
            let listings = open_store(&config)?.listings_for_search_link(link_id)?;
            println!("{}", serde_json::to_string_pretty(&listings)?);
        }
        Command::Best { limit } => {
            let deals = best_deals(&open_store(&config)?)?;
            if deals.is_empty() {
                println!("No listings to analyze.");
            }
            for (i, deal) in deals.iter().take(limit).enumerate() {
                let details = &deal.listing.record.details;
                println!(
                    "{}. {} ({:.2} zł, avg {:.2} zł)",
                    i + 1,
                    details.title.as_deref().unwrap_or("?"),
                    details.price,
                    deal.avg_price
                );
                println!(
                    "   score {:.2}, profit {:.2} zł, drop {:.2}%",
                    deal.score, deal.potential_profit, deal.price_drop_pct
                );
                println!("   {}", deal.listing.record.url);
            }
        }
        Command::Watch => {
            let mut crawler = build_crawler(&config)?;
            let mut interval = tokio::time::interval(config.scheduler.interval());
            info!(
                "Scheduler started, crawling every {} minutes. Press Ctrl+C to stop.",
                config.scheduler.interval_minutes
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        info!("Starting scheduled crawl...");
                        match crawler.crawl_all(None, None).await {
                            Ok(runs) => info!("Scheduled crawl finished for {} links", runs.len()),
                            Err(e) => error!("Scheduled crawl failed: {}", e),
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Stopping scheduler");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
