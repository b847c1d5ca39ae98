//! SQLite persistence for crawled pages, scraped posts, and ticker mentions.
//!
//! Everything lives in a single database file with three tables:
//!
//! - `pages`: raw HTML captured by the crawler, keyed by URL
//! - `posts`: Reddit posts, keyed by `(url, scraped_date)`
//! - `stock_mentions`: filter output, rebuilt on every filter run
//!
//! The pool uses WAL mode and a busy timeout so the scraper and filter can
//! run back to back against the same file without lock errors.

use crate::models::{RedditPost, StockMention};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if necessary) the database at `path` and ensure the schema.
    #[instrument(level = "info", skip_all, fields(%path))]
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to open sqlite database")?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("Database ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pages (
                url TEXT PRIMARY KEY,
                html TEXT NOT NULL,
                crawled_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("failed to create pages table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS posts (
                url TEXT NOT NULL,
                subreddit TEXT NOT NULL,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                post_date REAL NOT NULL,
                upvotes INTEGER NOT NULL,
                body TEXT NOT NULL,
                comments INTEGER NOT NULL,
                image TEXT NOT NULL DEFAULT '',
                scraped_date TEXT NOT NULL,
                PRIMARY KEY (url, scraped_date)
            )",
        )
        .execute(&self.pool)
        .await
        .context("failed to create posts table")?;

        sqlx::query(Self::MENTIONS_DDL)
            .execute(&self.pool)
            .await
            .context("failed to create stock_mentions table")?;

        Ok(())
    }

    const MENTIONS_DDL: &'static str = "CREATE TABLE IF NOT EXISTS stock_mentions (
        url TEXT NOT NULL,
        subreddit TEXT NOT NULL,
        scraped_date TEXT NOT NULL,
        mentioned_tickers TEXT NOT NULL,
        image_text TEXT NOT NULL DEFAULT '',
        extracted_data TEXT
    )";

    // ------------------------------------------------------------------
    // pages
    // ------------------------------------------------------------------

    /// Store the HTML of a crawled page, replacing any earlier capture.
    pub async fn insert_page(&self, url: &str, html: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO pages (url, html, crawled_at) VALUES (?, ?, ?)")
            .bind(url)
            .bind(html)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("failed to insert page")?;
        Ok(())
    }

    pub async fn page_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM pages")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    // ------------------------------------------------------------------
    // posts
    // ------------------------------------------------------------------

    /// Insert a post; a post already seen on the same scrape date is ignored.
    ///
    /// Returns `true` when a new row was written.
    pub async fn insert_post(&self, post: &RedditPost) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO posts \
             (url, subreddit, title, author, post_date, upvotes, body, comments, image, scraped_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&post.url)
        .bind(&post.subreddit)
        .bind(&post.title)
        .bind(&post.author)
        .bind(post.created_utc)
        .bind(post.upvotes)
        .bind(&post.body)
        .bind(post.comments)
        .bind(&post.image)
        .bind(&post.scraped_date)
        .execute(&self.pool)
        .await
        .context("failed to insert post")?;
        Ok(result.rows_affected() > 0)
    }

    /// Load every stored post for the filter pipeline.
    pub async fn load_posts(&self) -> Result<Vec<RedditPost>> {
        let rows = sqlx::query(
            "SELECT url, subreddit, title, author, post_date, upvotes, body, comments, image, scraped_date \
             FROM posts",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load posts")?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            posts.push(RedditPost {
                url: row.try_get("url")?,
                subreddit: row.try_get("subreddit")?,
                title: row.try_get("title")?,
                author: row.try_get("author")?,
                created_utc: row.try_get("post_date")?,
                upvotes: row.try_get("upvotes")?,
                body: row.try_get("body")?,
                comments: row.try_get("comments")?,
                image: row.try_get("image")?,
                scraped_date: row.try_get("scraped_date")?,
            });
        }
        Ok(posts)
    }

    pub async fn post_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    // ------------------------------------------------------------------
    // stock_mentions
    // ------------------------------------------------------------------

    /// Replace the entire `stock_mentions` table with a fresh filter result.
    #[instrument(level = "info", skip_all, fields(count = mentions.len()))]
    pub async fn replace_mentions(&self, mentions: &[StockMention]) -> Result<()> {
        const CHUNK_SIZE: usize = 50;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DROP TABLE IF EXISTS stock_mentions")
            .execute(&mut *tx)
            .await?;
        sqlx::query(Self::MENTIONS_DDL).execute(&mut *tx).await?;

        for chunk in mentions.chunks(CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO stock_mentions \
                 (url, subreddit, scraped_date, mentioned_tickers, image_text, extracted_data) ",
            );
            qb.push_values(chunk, |mut b, mention| {
                b.push_bind(&mention.url)
                    .push_bind(&mention.subreddit)
                    .push_bind(&mention.scraped_date)
                    .push_bind(&mention.mentioned_tickers)
                    .push_bind(&mention.image_text)
                    .push_bind(&mention.extracted_data);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .context("failed to insert stock mentions chunk")?;
        }

        tx.commit().await?;
        info!(count = mentions.len(), "Replaced stock_mentions table");
        Ok(())
    }

    /// Load every stored mention for reporting.
    pub async fn load_mentions(&self) -> Result<Vec<StockMention>> {
        let rows = sqlx::query(
            "SELECT url, subreddit, scraped_date, mentioned_tickers, image_text, extracted_data \
             FROM stock_mentions",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load stock mentions")?;

        let mut mentions = Vec::with_capacity(rows.len());
        for row in rows {
            mentions.push(StockMention {
                url: row.try_get("url")?,
                subreddit: row.try_get("subreddit")?,
                scraped_date: row.try_get("scraped_date")?,
                mentioned_tickers: row.try_get("mentioned_tickers")?,
                image_text: row.try_get("image_text")?,
                extracted_data: row.try_get("extracted_data")?,
            });
        }
        Ok(mentions)
    }
}
