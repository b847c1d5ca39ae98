//! Aggregation and chart rendering over filter results.
//!
//! Loads the `stock_mentions` table, restricts to a single scrape date, and
//! produces three summaries:
//!
//! - posts per ticker, with a dominant sentiment bucket per ticker
//! - sentiment distribution per subreddit
//! - overall positive/neutral/negative counts
//!
//! Each summary is rendered to an SVG chart in the output directory:
//! `{date}_tickers.svg`, `{date}_subreddits.svg`, `{date}_sentiment.svg`.

use crate::models::{Sentiment, StockMention};
use crate::store::Store;
use crate::utils::ensure_writable_dir;
use plotters::element::Pie;
use plotters::prelude::*;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use tracing::{info, instrument, warn};

const POSITIVE_COLOR: RGBColor = RGBColor(46, 160, 67);
const NEUTRAL_COLOR: RGBColor = RGBColor(139, 148, 158);
const NEGATIVE_COLOR: RGBColor = RGBColor(218, 54, 51);

/// Counts of sentiment labels in some slice of the data.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SentimentTotals {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentTotals {
    pub fn add(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }

    /// The most common bucket; ties resolve positive, then neutral, then
    /// negative. `None` when there are no labels at all.
    pub fn dominant(&self) -> Option<Sentiment> {
        if self.total() == 0 {
            return None;
        }
        let max = self.positive.max(self.neutral).max(self.negative);
        if self.positive == max {
            Some(Sentiment::Positive)
        } else if self.neutral == max {
            Some(Sentiment::Neutral)
        } else {
            Some(Sentiment::Negative)
        }
    }
}

/// Per-ticker aggregation.
#[derive(Debug, Default, Clone)]
pub struct TickerStats {
    /// Number of posts mentioning the ticker.
    pub posts: usize,
    /// Sentiment labels attached to the ticker on the date.
    pub sentiment: SentimentTotals,
}

/// Totals for a report run.
#[derive(Debug)]
pub struct ReportSummary {
    pub mentions_on_date: usize,
    pub tickers: usize,
    pub subreddits: usize,
    pub overall: SentimentTotals,
}

/// Count positive/neutral/negative labels across all mentions on a date.
pub fn overall_sentiment(date: &str, mentions: &[StockMention]) -> SentimentTotals {
    let mut totals = SentimentTotals::default();
    for mention in mentions.iter().filter(|m| m.scraped_date == date) {
        for entry in mention.sentiments() {
            totals.add(entry.sentiment);
        }
    }
    totals
}

/// Posts-per-ticker counts with per-ticker sentiment, for one date.
pub fn ticker_mentions(date: &str, mentions: &[StockMention]) -> BTreeMap<String, TickerStats> {
    let mut stats: BTreeMap<String, TickerStats> = BTreeMap::new();
    for mention in mentions.iter().filter(|m| m.scraped_date == date) {
        for ticker in mention.tickers() {
            stats.entry(ticker.to_string()).or_default().posts += 1;
        }
        for entry in mention.sentiments() {
            let symbol = entry.ticker.to_uppercase();
            if let Some(ticker_stats) = stats.get_mut(&symbol) {
                ticker_stats.sentiment.add(entry.sentiment);
            }
        }
    }
    stats
}

/// Sentiment distribution per subreddit, for one date.
pub fn subreddit_sentiment(
    date: &str,
    mentions: &[StockMention],
) -> BTreeMap<String, SentimentTotals> {
    let mut stats: BTreeMap<String, SentimentTotals> = BTreeMap::new();
    for mention in mentions.iter().filter(|m| m.scraped_date == date) {
        let totals = stats.entry(mention.subreddit.clone()).or_default();
        for entry in mention.sentiments() {
            totals.add(entry.sentiment);
        }
    }
    stats
}

fn sentiment_color(sentiment: Option<Sentiment>) -> RGBColor {
    match sentiment {
        Some(Sentiment::Positive) => POSITIVE_COLOR,
        Some(Sentiment::Negative) => NEGATIVE_COLOR,
        _ => NEUTRAL_COLOR,
    }
}

/// Draw a labelled vertical bar chart. Skipped (with a log line) when there
/// is nothing to plot.
fn bar_chart(
    path: &Path,
    caption: &str,
    bars: &[(String, usize, RGBColor)],
) -> Result<(), Box<dyn Error>> {
    if bars.is_empty() {
        warn!(path = %path.display(), "No data to plot; skipping chart");
        return Ok(());
    }

    let root = SVGBackend::new(path, (960, 540)).into_drawing_area();
    root.fill(&WHITE)?;

    let max = bars.iter().map(|(_, v, _)| *v).max().unwrap_or(0).max(1);
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(60)
        .y_label_area_size(48)
        .build_cartesian_2d((0usize..bars.len()).into_segmented(), 0usize..max + 1)?;

    let labels: Vec<&str> = bars.iter().map(|(label, _, _)| label.as_str()).collect();
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(bars.len())
        .x_label_formatter(&|seg| match seg {
            SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
                labels.get(*i).map(|s| s.to_string()).unwrap_or_default()
            }
            SegmentValue::Last => String::new(),
        })
        .y_desc("posts")
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(i, (_, value, color))| {
        Rectangle::new(
            [(SegmentValue::Exact(i), 0), (SegmentValue::Exact(i + 1), *value)],
            color.filled(),
        )
    }))?;

    root.present()?;
    info!(path = %path.display(), bars = bars.len(), "Wrote bar chart");
    Ok(())
}

/// Draw the overall sentiment split as a pie chart.
fn sentiment_pie(path: &Path, caption: &str, totals: &SentimentTotals) -> Result<(), Box<dyn Error>> {
    if totals.total() == 0 {
        warn!(path = %path.display(), "No sentiment labels; skipping chart");
        return Ok(());
    }

    let root = SVGBackend::new(path, (540, 540)).into_drawing_area();
    root.fill(&WHITE)?;
    root.titled(caption, ("sans-serif", 24))?;

    let dims = root.dim_in_pixel();
    let center = (dims.0 as i32 / 2, dims.1 as i32 / 2);
    let radius = 180.0;
    let sizes = vec![
        totals.positive as f64,
        totals.neutral as f64,
        totals.negative as f64,
    ];
    let colors = vec![POSITIVE_COLOR, NEUTRAL_COLOR, NEGATIVE_COLOR];
    let labels = vec!["positive", "neutral", "negative"];

    let pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    root.draw(&pie)?;

    root.present()?;
    info!(path = %path.display(), "Wrote sentiment pie chart");
    Ok(())
}

/// Run the report pipeline: aggregate one date and render all charts.
#[instrument(level = "info", skip_all, fields(%date, %out_dir))]
pub async fn run(store: &Store, date: &str, out_dir: &str) -> Result<ReportSummary, Box<dyn Error>> {
    ensure_writable_dir(out_dir).await?;
    let mentions = store.load_mentions().await?;
    let mentions_on_date = mentions
        .iter()
        .filter(|m| m.scraped_date == date)
        .count();
    info!(
        total = mentions.len(),
        on_date = mentions_on_date,
        "Loaded stock mentions"
    );

    let overall = overall_sentiment(date, &mentions);
    let tickers = ticker_mentions(date, &mentions);
    let subreddits = subreddit_sentiment(date, &mentions);

    for (ticker, stats) in &tickers {
        info!(
            ticker = %ticker,
            posts = stats.posts,
            positive = stats.sentiment.positive,
            neutral = stats.sentiment.neutral,
            negative = stats.sentiment.negative,
            "Ticker summary"
        );
    }

    let out = Path::new(out_dir);

    let ticker_bars: Vec<(String, usize, RGBColor)> = tickers
        .iter()
        .map(|(ticker, stats)| {
            (
                ticker.clone(),
                stats.posts,
                sentiment_color(stats.sentiment.dominant()),
            )
        })
        .collect();
    bar_chart(
        &out.join(format!("{date}_tickers.svg")),
        &format!("Posts per ticker ({date})"),
        &ticker_bars,
    )?;

    let subreddit_bars: Vec<(String, usize, RGBColor)> = subreddits
        .iter()
        .map(|(subreddit, totals)| {
            (
                subreddit.clone(),
                totals.total(),
                sentiment_color(totals.dominant()),
            )
        })
        .collect();
    bar_chart(
        &out.join(format!("{date}_subreddits.svg")),
        &format!("Sentiment labels per subreddit ({date})"),
        &subreddit_bars,
    )?;

    sentiment_pie(
        &out.join(format!("{date}_sentiment.svg")),
        &format!("Overall sentiment ({date})"),
        &overall,
    )?;

    Ok(ReportSummary {
        mentions_on_date,
        tickers: tickers.len(),
        subreddits: subreddits.len(),
        overall,
    })
}
