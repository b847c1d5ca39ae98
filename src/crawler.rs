//! Breadth-first crawler over Wikipedia article hyperlinks.
//!
//! Maintains a FIFO frontier plus two sets: `visited` (URLs already fetched)
//! and `queued` (URLs already in the frontier), so no URL is ever fetched or
//! enqueued twice. Traversal stops when the end URL is reached, the frontier
//! empties, or the page cap is hit.
//!
//! Only article links are followed: hrefs must start with `/wiki/` and must
//! not point into the Special, File, User, Talk, or Category namespaces.
//!
//! Fetch failures are logged and skipped; they never abort the crawl.

use crate::store::Store;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::error::Error;
use tracing::{debug, error, info, instrument};
use url::Url;

/// Wikipedia namespace prefixes that are never followed.
const EXCLUDED_PREFIXES: [&str; 5] = [
    "/wiki/Special:",
    "/wiki/File:",
    "/wiki/User:",
    "/wiki/Talk:",
    "/wiki/Category:",
];

/// What a finished crawl looked like.
#[derive(Debug)]
pub struct CrawlOutcome {
    /// Number of pages successfully fetched.
    pub pages_visited: usize,
    /// Whether the end URL was reached before the frontier emptied.
    pub reached_end: bool,
}

/// A breadth-first crawler seeded with a single URL.
pub struct Crawler {
    client: reqwest::Client,
    frontier: VecDeque<String>,
    visited: HashSet<String>,
    queued: HashSet<String>,
    end_url: Option<String>,
    max_pages: Option<usize>,
    store: Option<Store>,
}

impl Crawler {
    /// Create a crawler. When `store` is given, each fetched page's HTML is
    /// persisted; otherwise the crawl only logs its traversal.
    pub fn new(
        seed_url: &str,
        end_url: Option<String>,
        max_pages: Option<usize>,
        store: Option<Store>,
    ) -> Self {
        let mut frontier = VecDeque::new();
        let mut queued = HashSet::new();
        frontier.push_back(seed_url.to_string());
        queued.insert(seed_url.to_string());

        Self {
            client: reqwest::Client::new(),
            frontier,
            visited: HashSet::new(),
            queued,
            end_url,
            max_pages,
            store,
        }
    }

    /// Run the crawl to completion.
    #[instrument(level = "info", skip_all)]
    pub async fn crawl(&mut self) -> Result<CrawlOutcome, Box<dyn Error>> {
        let mut pages_visited = 0usize;

        while let Some(current_url) = self.frontier.pop_front() {
            self.queued.remove(&current_url);
            if self.visited.contains(&current_url) {
                continue;
            }
            if let Some(cap) = self.max_pages
                && pages_visited >= cap
            {
                info!(cap, "Page cap reached; stopping crawl");
                return Ok(CrawlOutcome {
                    pages_visited,
                    reached_end: false,
                });
            }
            self.visited.insert(current_url.clone());

            let html = match self.fetch(&current_url).await {
                Ok(html) => html,
                Err(e) => {
                    error!(url = %current_url, error = %e, "Fetch failed; skipping");
                    continue;
                }
            };
            pages_visited += 1;
            info!(n = pages_visited, url = %current_url, "Visited page");

            if let Some(store) = &self.store
                && let Err(e) = store.insert_page(&current_url, &html).await
            {
                error!(url = %current_url, error = %e, "Failed to persist page");
            }

            if self.end_url.as_deref() == Some(current_url.as_str()) {
                info!(n = pages_visited, url = %current_url, "Reached the end URL");
                return Ok(CrawlOutcome {
                    pages_visited,
                    reached_end: true,
                });
            }

            self.enqueue_links(&current_url, &html);
        }

        if self.end_url.is_some() {
            info!(pages_visited, "End URL not found");
        } else {
            info!(pages_visited, "Frontier exhausted");
        }
        Ok(CrawlOutcome {
            pages_visited,
            reached_end: false,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, reqwest::Error> {
        Ok(self.client.get(url).send().await?.text().await?)
    }

    /// Extract article links from a page and enqueue the ones not yet seen.
    fn enqueue_links(&mut self, current_url: &str, html: &str) {
        let base = match Url::parse(current_url) {
            Ok(base) => base,
            Err(e) => {
                error!(url = %current_url, error = %e, "Unparseable base URL");
                return;
            }
        };

        let document = Html::parse_document(html);
        let selector = Selector::parse("a[href]").unwrap();
        let mut enqueued = 0usize;

        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if !is_valid_wiki_link(href) {
                continue;
            }
            if let Ok(resolved) = base.join(href) {
                let full_url = resolved.to_string();
                if !self.visited.contains(&full_url) && self.queued.insert(full_url.clone()) {
                    self.frontier.push_back(full_url);
                    enqueued += 1;
                }
            }
        }

        debug!(
            url = %current_url,
            enqueued,
            frontier = self.frontier.len(),
            "Enqueued article links"
        );
    }
}

/// Article-namespace link policy: `/wiki/` pages only, no Special, File,
/// User, Talk, or Category pages.
pub(crate) fn is_valid_wiki_link(href: &str) -> bool {
    href.starts_with("/wiki/") && !EXCLUDED_PREFIXES.iter().any(|p| href.starts_with(p))
}
