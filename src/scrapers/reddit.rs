//! Reddit hot-post scraper.
//!
//! Fetches the top N "hot" posts for each configured subreddit through
//! Reddit's public JSON listing endpoint (`/r/{sub}/hot.json`), which needs
//! no OAuth, only a descriptive User-Agent. Stickied posts (subreddit rules,
//! megathreads) are skipped. Posts whose URL points at an image file keep
//! that URL in the `image` column for the OCR pass downstream.

use crate::models::{Listing, RedditPost};
use crate::store::Store;
use chrono::Local;
use std::error::Error;
use tracing::{debug, error, info, instrument};

/// Investment-related subreddits scraped when none are given on the CLI.
pub const DEFAULT_SUBREDDITS: &[&str] = &[
    "wallstreetbets",
    "investing",
    "stocks",
    "trading",
    "forex",
    "algotrading",
    "investor",
    "etoro",
    "asktrading",
    "finance",
    "forextrading",
    "investoradvice",
];

/// Public Reddit endpoint; overridable for tests.
pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];

/// Totals for a scrape run.
#[derive(Debug, Default)]
pub struct ScrapeSummary {
    pub subreddits_scraped: usize,
    pub posts_fetched: usize,
    pub posts_inserted: usize,
}

/// Keep the post URL as the image reference when it points at an image file.
pub(crate) fn image_reference(url: &str) -> String {
    let lower = url.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        url.to_string()
    } else {
        String::new()
    }
}

/// Fetch the hot listing for one subreddit and map it to [`RedditPost`]s.
///
/// Stickied posts are dropped here; everything else is kept.
#[instrument(level = "info", skip(client, base_url))]
pub async fn index_posts(
    client: &reqwest::Client,
    base_url: &str,
    subreddit: &str,
    limit: u32,
) -> Result<Vec<RedditPost>, Box<dyn Error>> {
    let listing_url = format!("{base_url}/r/{subreddit}/hot.json?limit={limit}&raw_json=1");
    let listing: Listing = client
        .get(&listing_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let scraped_date = Local::now().date_naive().to_string();
    let posts: Vec<RedditPost> = listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .filter(|post| !post.stickied)
        .map(|post| RedditPost {
            image: image_reference(&post.url),
            url: post.url,
            subreddit: if post.subreddit.is_empty() {
                subreddit.to_string()
            } else {
                post.subreddit
            },
            title: post.title,
            author: post.author,
            created_utc: post.created_utc,
            upvotes: post.score,
            body: post.selftext,
            comments: post.num_comments,
            scraped_date: scraped_date.clone(),
        })
        .collect();

    info!(subreddit, count = posts.len(), "Indexed hot posts");
    Ok(posts)
}

/// Scrape every subreddit in `subreddits` and persist the posts.
///
/// A failed subreddit fetch is logged and skipped; a post already stored for
/// today's date is ignored by the store.
#[instrument(level = "info", skip_all, fields(subreddits = subreddits.len(), limit))]
pub async fn scrape_all(
    store: &Store,
    base_url: &str,
    subreddits: &[String],
    limit: u32,
    user_agent: &str,
) -> Result<ScrapeSummary, Box<dyn Error>> {
    let client = reqwest::Client::builder().user_agent(user_agent).build()?;
    let mut summary = ScrapeSummary::default();

    for subreddit in subreddits {
        let posts = match index_posts(&client, base_url, subreddit, limit).await {
            Ok(posts) => posts,
            Err(e) => {
                error!(subreddit, error = %e, "Subreddit fetch failed; skipping");
                continue;
            }
        };

        summary.subreddits_scraped += 1;
        summary.posts_fetched += posts.len();

        for post in &posts {
            match store.insert_post(post).await {
                Ok(true) => {
                    summary.posts_inserted += 1;
                    debug!(title = %post.title, "Saved post");
                }
                Ok(false) => debug!(url = %post.url, "Post already stored for today"),
                Err(e) => error!(url = %post.url, error = %e, "Failed to save post"),
            }
        }
    }

    info!(
        subreddits = summary.subreddits_scraped,
        fetched = summary.posts_fetched,
        inserted = summary.posts_inserted,
        "Scrape completed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const LISTING: &str = r#"{
        "kind": "Listing",
        "data": {
            "children": [
                {"kind": "t3", "data": {
                    "title": "Daily megathread",
                    "author": "automod",
                    "created_utc": 1721088000.0,
                    "score": 1,
                    "selftext": "",
                    "num_comments": 1000,
                    "url": "https://reddit.com/r/stocks/mega",
                    "stickied": true,
                    "subreddit": "stocks"
                }},
                {"kind": "t3", "data": {
                    "title": "buy AAPL",
                    "author": "trader1",
                    "created_utc": 1721088001.0,
                    "score": 321,
                    "selftext": "calls only",
                    "num_comments": 12,
                    "url": "https://i.redd.it/chart.PNG",
                    "stickied": false,
                    "subreddit": "stocks"
                }}
            ]
        }
    }"#;

    #[test]
    fn test_image_reference_detection() {
        assert_eq!(
            image_reference("https://i.redd.it/a.jpg"),
            "https://i.redd.it/a.jpg"
        );
        // Case-insensitive on the extension.
        assert_eq!(
            image_reference("https://i.redd.it/a.GIF"),
            "https://i.redd.it/a.GIF"
        );
        assert_eq!(image_reference("https://reddit.com/r/stocks/post"), "");
    }

    #[tokio::test]
    async fn test_index_posts_skips_stickied_and_maps_fields() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/r/stocks/hot.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(LISTING)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let posts = index_posts(&client, &server.url(), "stocks", 25)
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.title, "buy AAPL");
        assert_eq!(post.upvotes, 321);
        assert_eq!(post.comments, 12);
        assert_eq!(post.image, "https://i.redd.it/chart.PNG");
        assert_eq!(post.subreddit, "stocks");
        assert!(!post.scraped_date.is_empty());
    }

    #[tokio::test]
    async fn test_scrape_all_persists_and_skips_failures() {
        let mut server = Server::new_async().await;
        let _ok = server
            .mock("GET", "/r/stocks/hot.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(LISTING)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/r/investing/hot.json")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("posts.db");
        let store = Store::open(db_path.to_str().unwrap()).await.unwrap();

        let subreddits = vec!["stocks".to_string(), "investing".to_string()];
        let summary = scrape_all(&store, &server.url(), &subreddits, 25, "test-agent")
            .await
            .unwrap();

        assert_eq!(summary.subreddits_scraped, 1);
        assert_eq!(summary.posts_fetched, 1);
        assert_eq!(summary.posts_inserted, 1);
        assert_eq!(store.post_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scrape_all_is_idempotent_per_day() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/r/stocks/hot.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(LISTING)
            .expect(2)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("posts.db");
        let store = Store::open(db_path.to_str().unwrap()).await.unwrap();

        let subreddits = vec!["stocks".to_string()];
        scrape_all(&store, &server.url(), &subreddits, 25, "test-agent")
            .await
            .unwrap();
        let second = scrape_all(&store, &server.url(), &subreddits, 25, "test-agent")
            .await
            .unwrap();

        assert_eq!(second.posts_inserted, 0);
        assert_eq!(store.post_count().await.unwrap(), 1);
    }
}
