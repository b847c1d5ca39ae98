//! Data models for scraped posts, ticker mentions, and sentiment labels.
//!
//! This module defines the core data structures used throughout the application:
//! - [`RedditPost`]: A scraped Reddit post as stored in the `posts` table
//! - [`StockMention`]: An enriched row in the `stock_mentions` table
//! - [`Sentiment`] / [`TickerSentiment`]: coarse sentiment labels attached to tickers
//! - Wire types ([`Listing`] et al.) matching Reddit's public listing JSON

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A Reddit post as scraped from a subreddit's hot listing.
///
/// One row of the `posts` table. Posts are keyed by `(url, scraped_date)` so
/// a post that stays hot across several days is captured once per day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPost {
    /// The post's content URL (link posts point off-site, self posts to Reddit).
    pub url: String,
    /// The subreddit the post was scraped from, without the `r/` prefix.
    pub subreddit: String,
    /// The post title.
    pub title: String,
    /// The author's username.
    pub author: String,
    /// Creation time as a Unix timestamp (Reddit reports fractional seconds).
    pub created_utc: f64,
    /// The post score at scrape time.
    pub upvotes: i64,
    /// The self-text body; empty for link posts.
    pub body: String,
    /// Number of comments at scrape time.
    pub comments: i64,
    /// Image reference: the post URL when it points at an image file,
    /// otherwise empty. The filter also accepts inline base64 payloads here.
    pub image: String,
    /// The date the post was scraped, in `YYYY-MM-DD` format.
    pub scraped_date: String,
}

/// A coarse sentiment bucket for a ticker mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        };
        write!(f, "{s}")
    }
}

/// One element of the JSON array the sentiment model is asked to return.
///
/// The raw array is stored verbatim in `stock_mentions.extracted_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSentiment {
    /// The ticker symbol the sentiment applies to.
    pub ticker: String,
    /// The sentiment bucket.
    pub sentiment: Sentiment,
}

/// An enriched post record: which tickers a post mentions, the OCR text pulled
/// from its image, and the optional sentiment payload.
///
/// One row of the `stock_mentions` table. Posts with no ticker mentions are
/// never written here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMention {
    /// The URL of the mentioning post.
    pub url: String,
    /// The subreddit of the mentioning post.
    pub subreddit: String,
    /// The scrape date of the mentioning post, `YYYY-MM-DD`.
    pub scraped_date: String,
    /// Comma-separated list of mentioned ticker symbols.
    pub mentioned_tickers: String,
    /// Text extracted from the post image via OCR; empty when there was no image.
    pub image_text: String,
    /// Raw JSON array of [`TickerSentiment`] entries, when sentiment labelling ran.
    pub extracted_data: Option<String>,
}

impl StockMention {
    /// The mentioned tickers as individual symbols.
    pub fn tickers(&self) -> Vec<&str> {
        self.mentioned_tickers
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Parse the sentiment payload, if any.
    ///
    /// Malformed JSON is logged and treated as no sentiment data, matching the
    /// aggregation behavior downstream.
    pub fn sentiments(&self) -> Vec<TickerSentiment> {
        match self.extracted_data.as_deref() {
            None => Vec::new(),
            Some(raw) if raw.trim().is_empty() => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<TickerSentiment>>(raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Malformed extracted_data; ignoring");
                    Vec::new()
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Reddit listing wire format
// ---------------------------------------------------------------------------

/// Top level of Reddit's `/r/{sub}/hot.json` response.
#[derive(Debug, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
pub struct ListingChild {
    pub data: ListingPost,
}

/// The subset of post fields the scraper keeps. Reddit's payload carries far
/// more; everything else is ignored by serde.
#[derive(Debug, Deserialize)]
pub struct ListingPost {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub subreddit: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&Sentiment::Positive).unwrap(),
            "\"positive\""
        );
        let s: Sentiment = serde_json::from_str("\"negative\"").unwrap();
        assert_eq!(s, Sentiment::Negative);
    }

    #[test]
    fn test_sentiment_rejects_unknown_label() {
        let r: Result<Sentiment, _> = serde_json::from_str("\"bullish\"");
        assert!(r.is_err());
    }

    #[test]
    fn test_listing_deserialization() {
        let json = r#"{
            "kind": "Listing",
            "data": {
                "children": [
                    {
                        "kind": "t3",
                        "data": {
                            "title": "AAPL to the moon",
                            "author": "trader1",
                            "created_utc": 1721088000.0,
                            "score": 420,
                            "selftext": "buy AAPL now",
                            "num_comments": 69,
                            "url": "https://reddit.com/r/stocks/abc",
                            "stickied": false,
                            "subreddit": "stocks"
                        }
                    }
                ]
            }
        }"#;

        let listing: Listing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.data.children.len(), 1);
        let post = &listing.data.children[0].data;
        assert_eq!(post.title, "AAPL to the moon");
        assert_eq!(post.score, 420);
        assert!(!post.stickied);
    }

    #[test]
    fn test_listing_tolerates_missing_fields() {
        let json = r#"{"data": {"children": [{"data": {"title": "bare"}}]}}"#;
        let listing: Listing = serde_json::from_str(json).unwrap();
        let post = &listing.data.children[0].data;
        assert_eq!(post.title, "bare");
        assert_eq!(post.num_comments, 0);
        assert!(post.url.is_empty());
    }

    fn mention_with(extracted: Option<&str>) -> StockMention {
        StockMention {
            url: "https://reddit.com/r/stocks/abc".to_string(),
            subreddit: "stocks".to_string(),
            scraped_date: "2024-07-16".to_string(),
            mentioned_tickers: "AAPL, TSLA".to_string(),
            image_text: String::new(),
            extracted_data: extracted.map(str::to_string),
        }
    }

    #[test]
    fn test_mention_tickers_split() {
        let m = mention_with(None);
        assert_eq!(m.tickers(), vec!["AAPL", "TSLA"]);
    }

    #[test]
    fn test_mention_sentiments_parse() {
        let m = mention_with(Some(
            r#"[{"ticker": "AAPL", "sentiment": "positive"},
                {"ticker": "TSLA", "sentiment": "negative"}]"#,
        ));
        let entries = m.sentiments();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ticker, "AAPL");
        assert_eq!(entries[1].sentiment, Sentiment::Negative);
    }

    #[test]
    fn test_mention_sentiments_malformed_json_is_empty() {
        let m = mention_with(Some("{not json"));
        assert!(m.sentiments().is_empty());
    }

    #[test]
    fn test_mention_sentiments_absent_is_empty() {
        assert!(mention_with(None).sentiments().is_empty());
    }
}
