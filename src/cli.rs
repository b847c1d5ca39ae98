//! Command line interface definitions.

use crate::filter::PARALLEL_BATCH_SIZE;
use crate::scrapers::reddit::DEFAULT_BASE_URL;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ticker_trawler",
    about = "Crawl, scrape, and analyze stock ticker chatter",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Breadth-first crawl of Wikipedia article links from a seed page.
    Crawl {
        /// Full URL of the article to start from.
        seed_url: String,

        /// Stop as soon as this URL is dequeued and fetched.
        #[arg(long)]
        end_url: Option<String>,

        /// Stop after visiting this many pages.
        #[arg(long)]
        max_pages: Option<usize>,

        /// SQLite database to persist fetched page HTML into. Without it
        /// the crawl only logs its traversal.
        #[arg(long)]
        db: Option<String>,
    },

    /// Scrape hot posts from investment subreddits into SQLite.
    Scrape {
        /// SQLite database file for scraped posts.
        #[arg(long, default_value = "reddit_posts.db")]
        db: String,

        /// How many hot posts to request per subreddit.
        #[arg(long, default_value_t = 100)]
        limit: u32,

        /// Subreddit to scrape (repeatable). Defaults to the built-in
        /// investment subreddit list.
        #[arg(long = "subreddit")]
        subreddits: Vec<String>,

        /// User-Agent header sent to Reddit.
        #[arg(
            long,
            env = "REDDIT_USER_AGENT",
            default_value = "ticker_trawler/0.1 (stock mention research)"
        )]
        user_agent: String,

        /// Reddit API base URL.
        #[arg(long, default_value = DEFAULT_BASE_URL, hide = true)]
        base_url: String,
    },

    /// Find ticker mentions in stored posts and label their sentiment.
    Filter {
        /// SQLite database file holding scraped posts.
        #[arg(long, default_value = "reddit_posts.db")]
        db: String,

        /// Path to the SEC company_tickers.json dictionary.
        #[arg(long, default_value = "company_tickers.json")]
        tickers: String,

        /// How many posts to process concurrently.
        #[arg(long, default_value_t = PARALLEL_BATCH_SIZE)]
        concurrency: usize,

        /// API key for the sentiment endpoint. Without it, mentions are
        /// stored unlabelled.
        #[arg(long, env = "OPENAI_API_KEY")]
        api_key: Option<String>,

        /// Base URL of the OpenAI-compatible chat completions API.
        #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
        llm_base_url: String,

        /// Model name to request sentiment labels from.
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,
    },

    /// Aggregate one day of mentions and render SVG charts.
    Report {
        /// SQLite database file holding filter results.
        #[arg(long, default_value = "reddit_posts.db")]
        db: String,

        /// Scrape date to report on (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,

        /// Directory the charts are written into.
        #[arg(long, default_value = "charts")]
        out_dir: String,
    },
}
