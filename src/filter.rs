//! Batch ticker/sentiment extraction over stored posts.
//!
//! Loads every stored post, fans out over a bounded number of concurrent
//! tasks, and for each post:
//!
//! 1. Matches the ticker dictionary against the combined title/body text
//! 2. OCRs the post image (when there is one) and matches that text too
//! 3. Optionally asks the sentiment endpoint for per-ticker labels
//!
//! Posts with no ticker mentions are dropped. Survivors replace the previous
//! contents of the `stock_mentions` table.

use crate::api::{ChatClient, ask_with_backoff};
use crate::models::{RedditPost, StockMention, TickerSentiment};
use crate::ocr;
use crate::store::Store;
use crate::tickers::TickerDictionary;
use crate::utils::{looks_truncated, truncate_for_log};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::error::Error;
use tracing::{debug, info, instrument, warn};

/// Upper bound on posts processed concurrently.
pub const PARALLEL_BATCH_SIZE: usize = 12;

/// Totals for a filter run.
#[derive(Debug)]
pub struct FilterSummary {
    pub posts_scanned: usize,
    pub posts_with_mentions: usize,
}

/// Run the filter pipeline end to end.
#[instrument(level = "info", skip_all, fields(concurrency))]
pub async fn run(
    store: &Store,
    dict: &TickerDictionary,
    sentiment: Option<&ChatClient>,
    concurrency: usize,
) -> Result<FilterSummary, Box<dyn Error>> {
    let posts = store.load_posts().await?;
    let total = posts.len();
    info!(
        count = total,
        concurrency,
        sentiment = sentiment.is_some(),
        "Starting post filtering"
    );

    let results: Vec<Option<StockMention>> = stream::iter(posts.into_iter().enumerate())
        .map(|(i, post)| async move {
            debug!(index = i, url = %post.url, "Filtering post");
            process_post(post, dict, sentiment).await
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mentions: Vec<StockMention> = results.into_iter().flatten().collect();
    store.replace_mentions(&mentions).await?;

    info!(
        total,
        with_mentions = mentions.len(),
        "Filter completed"
    );
    Ok(FilterSummary {
        posts_scanned: total,
        posts_with_mentions: mentions.len(),
    })
}

/// Extract mentions from a single post. `None` when the post mentions nothing.
async fn process_post(
    post: RedditPost,
    dict: &TickerDictionary,
    sentiment: Option<&ChatClient>,
) -> Option<StockMention> {
    let combined = format!("{} {}", post.title, post.body);
    let mut tickers = dict.find_tickers(&combined);

    let image_text = if post.image.trim().is_empty() {
        String::new()
    } else {
        ocr::extract_text_from_image(&post.image).await
    };
    if !image_text.is_empty() {
        tickers.extend(dict.find_tickers(&image_text));
    }

    let tickers: Vec<String> = tickers.into_iter().unique().sorted().collect();
    if tickers.is_empty() {
        return None;
    }
    for ticker in &tickers {
        debug!(
            url = %post.url,
            ticker = %ticker,
            company = dict.title(ticker).unwrap_or("unknown"),
            "Ticker matched"
        );
    }

    let extracted_data = match sentiment {
        Some(client) => label_sentiment(client, &combined).await,
        None => None,
    };

    Some(StockMention {
        url: post.url,
        subreddit: post.subreddit,
        scraped_date: post.scraped_date,
        mentioned_tickers: tickers.join(", "),
        image_text,
        extracted_data,
    })
}

/// Ask the sentiment endpoint for labels and validate the reply.
///
/// A reply that fails to parse due to EOF (truncation) is re-asked ONCE; any
/// other non-conforming reply is logged and dropped. Mentions survive either
/// way; sentiment is an enrichment, not a requirement.
async fn label_sentiment(client: &ChatClient, text: &str) -> Option<String> {
    let mut raw = match ask_with_backoff(client, text).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Sentiment call failed; continuing without labels");
            return None;
        }
    };

    let mut parsed = serde_json::from_str::<Vec<TickerSentiment>>(&raw);
    if let Err(ref e) = parsed
        && looks_truncated(e)
    {
        warn!(error = %e, "EOF while parsing sentiment reply; re-asking once");
        match ask_with_backoff(client, text).await {
            Ok(r2) => {
                parsed = serde_json::from_str::<Vec<TickerSentiment>>(&r2);
                raw = r2;
            }
            Err(e2) => {
                warn!(error = %e2, "Re-ask failed; dropping labels");
            }
        }
    }

    match parsed {
        Ok(_) => Some(raw),
        Err(e) => {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&raw, 300),
                "Model returned non-conforming JSON; dropping labels"
            );
            None
        }
    }
}
