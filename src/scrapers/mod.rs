//! Post scrapers for fetching content from remote sources.
//!
//! Each scraper follows a consistent two-phase pattern:
//!
//! 1. **Indexing**: Fetch a listing and turn it into domain records
//! 2. **Storing**: Insert the records into the local store
//!
//! Scrapers use graceful error handling: a failed source is logged and
//! skipped, never failing the entire run.

pub mod reddit;
