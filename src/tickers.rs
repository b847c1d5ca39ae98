//! Ticker dictionary loading and mention matching.
//!
//! The dictionary is loaded from the SEC's `company_tickers.json` format:
//!
//! ```json
//! { "0": { "cik_str": 320193, "ticker": "AAPL", "title": "Apple Inc." }, ... }
//! ```
//!
//! A ticker counts as mentioned only when both of its patterns match:
//!
//! 1. The bare symbol on a word boundary (case-insensitive), and
//! 2. A contextual pattern requiring a trading-related word shortly before the
//!    symbol (`stock`, `shares`, `buy`, `sell`, ...).
//!
//! The contextual requirement keeps common English words that double as
//! tickers (e.g. "A", "ALL", "IT") from flooding the results.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use tracing::{info, instrument};

/// One record of the SEC company ticker file.
#[derive(Debug, Deserialize)]
pub struct CompanyRecord {
    #[allow(dead_code)]
    pub cik_str: u64,
    pub ticker: String,
    pub title: String,
}

/// Compiled per-ticker patterns plus company titles.
pub struct TickerDictionary {
    titles: HashMap<String, String>,
    patterns: HashMap<String, Regex>,
    contextual: HashMap<String, Regex>,
}

const CONTEXT_WORDS: &str =
    "stock|shares|equities|buy|sell|trade|investment|price|value|market|traded";

impl TickerDictionary {
    /// Load and compile the dictionary from a `company_tickers.json` file.
    #[instrument(level = "info", skip_all, fields(%path))]
    pub fn load(path: &str) -> Result<Self, Box<dyn Error>> {
        let raw = std::fs::read_to_string(path)?;
        let records: HashMap<String, CompanyRecord> = serde_json::from_str(&raw)?;
        let dict = Self::from_records(records.into_values())?;
        info!(tickers = dict.len(), "Loaded ticker dictionary");
        Ok(dict)
    }

    /// Build a dictionary from in-memory records.
    pub fn from_records(
        records: impl IntoIterator<Item = CompanyRecord>,
    ) -> Result<Self, Box<dyn Error>> {
        let mut titles = HashMap::new();
        let mut patterns = HashMap::new();
        let mut contextual = HashMap::new();

        for record in records {
            let symbol = record.ticker.to_uppercase();
            let escaped = regex::escape(&symbol);
            let bare = Regex::new(&format!(r"(?i)\b{escaped}\b"))?;
            let ctx = Regex::new(&format!(
                r"(?i)\b(?:{CONTEXT_WORDS})\s*[\s.,]*{escaped}\b"
            ))?;
            patterns.insert(symbol.clone(), bare);
            contextual.insert(symbol.clone(), ctx);
            titles.insert(symbol, record.title);
        }

        Ok(Self {
            titles,
            patterns,
            contextual,
        })
    }

    /// Number of tickers in the dictionary.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// The company title for a symbol, if known.
    pub fn title(&self, symbol: &str) -> Option<&str> {
        self.titles.get(symbol).map(String::as_str)
    }

    /// Find all tickers mentioned in `text` with trading context.
    ///
    /// Returns symbols sorted alphabetically so output is deterministic.
    pub fn find_tickers(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = self
            .patterns
            .iter()
            .filter(|(symbol, bare)| {
                bare.is_match(text)
                    && self
                        .contextual
                        .get(*symbol)
                        .is_some_and(|ctx| ctx.is_match(text))
            })
            .map(|(symbol, _)| symbol.clone())
            .collect();
        found.sort();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> TickerDictionary {
        TickerDictionary::from_records(vec![
            CompanyRecord {
                cik_str: 320193,
                ticker: "AAPL".to_string(),
                title: "Apple Inc.".to_string(),
            },
            CompanyRecord {
                cik_str: 1318605,
                ticker: "TSLA".to_string(),
                title: "Tesla, Inc.".to_string(),
            },
            CompanyRecord {
                cik_str: 1067983,
                ticker: "BRK-B".to_string(),
                title: "Berkshire Hathaway Inc.".to_string(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_load_sec_format() {
        let json = r#"{
            "0": {"cik_str": 320193, "ticker": "AAPL", "title": "Apple Inc."},
            "1": {"cik_str": 789019, "ticker": "MSFT", "title": "Microsoft Corp"}
        }"#;
        let records: HashMap<String, CompanyRecord> = serde_json::from_str(json).unwrap();
        let dict = TickerDictionary::from_records(records.into_values()).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.title("MSFT"), Some("Microsoft Corp"));
    }

    #[test]
    fn test_match_requires_context() {
        let d = dict();
        // Bare symbol without a trading word nearby is not a mention.
        assert!(d.find_tickers("AAPL released a phone today").is_empty());
        assert_eq!(d.find_tickers("time to buy AAPL"), vec!["AAPL"]);
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let d = dict();
        assert_eq!(d.find_tickers("should I sell tsla?"), vec!["TSLA"]);
    }

    #[test]
    fn test_word_boundary_blocks_substrings() {
        let d = dict();
        assert!(d.find_tickers("buy AAPLX calls").is_empty());
    }

    #[test]
    fn test_context_with_punctuation_between() {
        let d = dict();
        assert_eq!(d.find_tickers("price, AAPL looks cheap"), vec!["AAPL"]);
    }

    #[test]
    fn test_multiple_mentions_sorted() {
        let d = dict();
        let found = d.find_tickers("sell TSLA and buy AAPL");
        assert_eq!(found, vec!["AAPL", "TSLA"]);
    }

    #[test]
    fn test_escaped_symbol_with_dash() {
        let d = dict();
        assert_eq!(d.find_tickers("buy BRK-B and hold"), vec!["BRK-B"]);
    }
}
