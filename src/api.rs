//! Sentiment completion API client with exponential backoff retry logic.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. The filter
//! pipeline sends a post's combined text and expects back a JSON array of
//! `{"ticker": ..., "sentiment": ...}` objects.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining async completion interaction
//! - [`ChatClient`]: reqwest-based client for the chat completions endpoint
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use rand::{Rng, rng};
use serde_json::json;
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// System prompt asking the model for machine-readable sentiment labels.
const SENTIMENT_PROMPT: &str = "You label stock ticker sentiment in social media posts. \
Given a post, respond with ONLY a JSON array where each element is \
{\"ticker\": \"<symbol>\", \"sentiment\": \"positive\"|\"neutral\"|\"negative\"} \
for each publicly traded company the post expresses an opinion about. \
Respond with [] if the post expresses no opinion about any company. \
Do not wrap the array in markdown fences or add commentary.";

/// Trait for async completion interaction.
///
/// Implementors can send text to a completion endpoint and receive a response.
/// This abstraction allows decorators (like retry logic) to wrap any backend.
pub trait AskAsync {
    /// The type of response returned by the endpoint.
    type Response;

    /// Send text and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn completions_url(&self) -> String {
        if self.base_url.ends_with('/') {
            format!("{}chat/completions", self.base_url)
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

impl AskAsync for ChatClient {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SENTIMENT_PROMPT },
                { "role": "user", "content": text }
            ],
            "temperature": 0,
        });

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(
                elapsed_ms = t0.elapsed().as_millis() as u128,
                %status,
                "Completion API returned an error"
            );
            return Err(format!("completion API error ({status}): {text}").into());
        }

        let payload: serde_json::Value = response.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "completion response missing message content".into())
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// Resilient against rate limiting, network issues, and temporary server
/// errors. The delay between retries follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                            elapsed_ms_total = total_dt.as_millis() as u128,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                        elapsed_ms_total = total_dt.as_millis() as u128,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Send a post's text to the sentiment endpoint with retry logic.
///
/// The primary entry point for the filter pipeline: up to 5 retries with
/// exponential backoff and jitter.
#[instrument(level = "info", skip_all)]
pub async fn ask_with_backoff(client: &ChatClient, text: &str) -> Result<String, Box<dyn Error>> {
    let t0 = Instant::now();
    let api = RetryAsk::new(client.clone(), 5, StdDuration::from_secs(1));
    let res = api.ask(text).await;
    let dt = t0.elapsed();

    match &res {
        Ok(_) => info!(
            elapsed_ms_total = dt.as_millis() as u128,
            "ask_with_backoff succeeded"
        ),
        Err(e) => {
            error!(elapsed_ms_total = dt.as_millis() as u128, error = %e, "ask_with_backoff failed")
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_chat_client_extracts_content() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices": [{"message": {"role": "assistant",
                    "content": "[{\"ticker\":\"AAPL\",\"sentiment\":\"positive\"}]"}}]}"#,
            )
            .create_async()
            .await;

        let client = ChatClient::new(server.url(), "test-key", "test-model");
        let reply = client.ask("buy AAPL").await.unwrap();
        assert!(reply.contains("AAPL"));
    }

    #[tokio::test]
    async fn test_chat_client_surfaces_api_errors() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = ChatClient::new(server.url(), "test-key", "test-model");
        assert!(client.ask("buy AAPL").await.is_err());
    }

    #[tokio::test]
    async fn test_chat_client_rejects_missing_content() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let client = ChatClient::new(server.url(), "test-key", "test-model");
        assert!(client.ask("buy AAPL").await.is_err());
    }

    /// Test double that fails a fixed number of times before succeeding.
    struct Flaky {
        failures_left: Cell<usize>,
    }

    impl AskAsync for Flaky {
        type Response = String;

        async fn ask(&self, _text: &str) -> Result<String, Box<dyn Error>> {
            let left = self.failures_left.get();
            if left > 0 {
                self.failures_left.set(left - 1);
                Err("transient".into())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let flaky = Flaky {
            failures_left: Cell::new(2),
        };
        let api = RetryAsk::new(flaky, 5, StdDuration::from_millis(1));
        assert_eq!(api.ask("hello").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let flaky = Flaky {
            failures_left: Cell::new(100),
        };
        let api = RetryAsk::new(flaky, 2, StdDuration::from_millis(1));
        assert!(api.ask("hello").await.is_err());
    }
}
