//! # Ticker Trawler
//!
//! A pipeline for harvesting stock ticker chatter from the web and turning it
//! into daily sentiment charts.
//!
//! ## Features
//!
//! - Breadth-first crawl of Wikipedia article links, optionally persisting
//!   page HTML to SQLite
//! - Scrapes hot posts from investment subreddits through Reddit's public
//!   JSON listings into SQLite
//! - Filters posts against the SEC ticker dictionary, OCRs post images with
//!   tesseract, and labels per-ticker sentiment via an OpenAI-compatible LLM
//!   API (parallel, 12 at a time)
//! - Renders per-ticker, per-subreddit, and overall sentiment SVG charts
//!
//! ## Usage
//!
//! ```sh
//! ticker_trawler scrape
//! ticker_trawler filter --tickers company_tickers.json
//! ticker_trawler report --out-dir charts
//! ```
//!
//! ## Architecture
//!
//! Each subcommand is one pipeline stage sharing a single SQLite database:
//! 1. **Scraping**: Fetch hot post listings and store them as rows
//! 2. **Filtering**: Match tickers in text and OCR'd images, label sentiment
//! 3. **Reporting**: Aggregate one day of mentions into charts

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod crawler;
mod filter;
mod models;
mod ocr;
mod report;
mod scrapers;
mod store;
mod tickers;
mod utils;

use api::ChatClient;
use cli::{Cli, Command};
use crawler::Crawler;
use scrapers::reddit::{self, DEFAULT_SUBREDDITS};
use store::Store;
use tickers::TickerDictionary;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("ticker_trawler starting up");

    let args = Cli::parse();
    debug!(?args.command, "Parsed CLI arguments");

    match args.command {
        Command::Crawl {
            seed_url,
            end_url,
            max_pages,
            db,
        } => {
            let store = match db {
                Some(path) => Some(Store::open(&path).await?),
                None => None,
            };
            let mut crawler = Crawler::new(&seed_url, end_url, max_pages, store.clone());
            let outcome = crawler.crawl().await?;
            info!(
                pages_visited = outcome.pages_visited,
                reached_end = outcome.reached_end,
                "Crawl finished"
            );
            if let Some(store) = store {
                info!(pages_stored = store.page_count().await?, "Database totals");
            }
        }

        Command::Scrape {
            db,
            limit,
            subreddits,
            user_agent,
            base_url,
        } => {
            let store = Store::open(&db).await?;
            let subreddits = if subreddits.is_empty() {
                DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect()
            } else {
                subreddits
            };
            let summary =
                reddit::scrape_all(&store, &base_url, &subreddits, limit, &user_agent).await?;
            info!(
                subreddits = summary.subreddits_scraped,
                fetched = summary.posts_fetched,
                inserted = summary.posts_inserted,
                total_posts = store.post_count().await?,
                "Scrape finished"
            );
        }

        Command::Filter {
            db,
            tickers,
            concurrency,
            api_key,
            llm_base_url,
            model,
        } => {
            let store = Store::open(&db).await?;
            let dict = match TickerDictionary::load(&tickers) {
                Ok(dict) => dict,
                Err(e) => {
                    error!(path = %tickers, error = %e, "Failed to load ticker dictionary");
                    return Err(e);
                }
            };
            let client = api_key.map(|key| ChatClient::new(llm_base_url, key, model));
            if client.is_none() {
                info!("No API key given; mentions will be stored without sentiment labels");
            }
            let summary = filter::run(&store, &dict, client.as_ref(), concurrency).await?;
            info!(
                scanned = summary.posts_scanned,
                with_mentions = summary.posts_with_mentions,
                "Filter finished"
            );
        }

        Command::Report { db, date, out_dir } => {
            let store = Store::open(&db).await?;
            let date = date.unwrap_or_else(|| Local::now().date_naive().to_string());
            let summary = report::run(&store, &date, &out_dir).await?;
            info!(
                date = %date,
                mentions = summary.mentions_on_date,
                tickers = summary.tickers,
                subreddits = summary.subreddits,
                positive = summary.overall.positive,
                neutral = summary.overall.neutral,
                negative = summary.overall.negative,
                "Report finished"
            );
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
