//! JSON-over-HTTP calls to model providers with retry and backoff.
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

/// A provider endpoint plus the knobs that control how hard we try.
pub struct JsonEndpoint<'a> {
    /// Human-readable provider name used in error messages (e.g. `"Ollama"`).
    pub label: &'a str,
    pub url: String,
    pub bearer: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// POST `body` to the endpoint and return the parsed JSON response.
pub async fn post_json(
    endpoint: &JsonEndpoint<'_>,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(endpoint.timeout_secs))
        .build()?;

    let mut last_err = None;

    for attempt in 0..=endpoint.max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            tracing::debug!(
                attempt,
                delay_secs = delay.as_secs(),
                "retrying {} request",
                endpoint.label
            );
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(&endpoint.url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = &endpoint.bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return Ok(json);
                }

                let body_text = response.text().await.unwrap_or_default();
                if is_retryable(status.as_u16()) {
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        endpoint.label,
                        status,
                        body_text
                    ));
                    continue;
                }

                bail!("{} API error {}: {}", endpoint.label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "{} connection error (is it running at {}?): {}",
                    endpoint.label,
                    endpoint.url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", endpoint.label)))
}

fn is_retryable(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
