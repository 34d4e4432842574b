use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

use crate::config::{verbose_print, Number, State, MAX_EMBED_BATCH};

/// Converts text to fixed-length vectors. The pipeline only depends on this
/// trait, so tests can substitute a local double for the hosted service.
pub trait Embedder {
    /// One vector per input text, order preserving. A single query
    /// embedding is a batch of size one.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<Number>>>;
}

/// Blocking client for the Gemini batch embedding endpoint.
pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    throttle: Duration,
    max_retries: usize,
}

impl GeminiEmbedder {
    pub fn new(api_key: &str, state: &State) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing API key");
        anyhow::ensure!(
            state.batch_size >= 1 && state.batch_size <= MAX_EMBED_BATCH,
            "embedding batch size {} out of range 1..={}",
            state.batch_size,
            MAX_EMBED_BATCH
        );

        let client = build_client(api_key, state.timeout_secs)?;
        let endpoint = format!(
            "{}/models/{}:batchEmbedContents",
            state.api_base.trim_end_matches('/'),
            state.embed_model
        );
        Ok(Self {
            client,
            endpoint,
            model: format!("models/{}", state.embed_model),
            batch_size: state.batch_size,
            throttle: Duration::from_millis(state.throttle_ms),
            max_retries: state.max_retries.max(1),
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<Number>>> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &self.model,
                    content: Content {
                        parts: vec![Part { text }],
                    },
                })
                .collect(),
        };

        let mut attempt = 0usize;
        loop {
            let response = self.client.post(&self.endpoint).json(&request).send();
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: BatchEmbedResponse = resp
                            .json()
                            .context("Failed to parse embedding response")?;
                        let vectors: Vec<Vec<Number>> = parsed
                            .embeddings
                            .into_iter()
                            .map(|embedding| embedding.values)
                            .collect();
                        anyhow::ensure!(
                            vectors.len() == texts.len(),
                            "Embedding service returned {} vectors for {} texts",
                            vectors.len(),
                            texts.len()
                        );
                        return Ok(vectors);
                    }

                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    anyhow::bail!("Embedding request failed ({}): {}", status, body);
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(anyhow::Error::from(err)
                        .context("Embedding service unavailable after retries"));
                }
            }
        }
    }
}

impl Embedder for GeminiEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<Number>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            // Throttle between batches to respect service rate limits.
            if i > 0 {
                thread::sleep(self.throttle);
            }
            verbose_print(&format!(
                "Embedding batch {} ({} texts)",
                i + 1,
                batch.len()
            ));
            vectors.extend(self.embed_batch(batch)?);
        }
        Ok(vectors)
    }
}

pub(crate) fn build_client(api_key: &str, timeout_secs: u64) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let mut key_value =
        HeaderValue::from_str(api_key.trim()).context("invalid API key")?;
    key_value.set_sensitive(true);
    headers.insert("x-goog-api-key", key_value);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .default_headers(headers)
        .build()
        .context("Failed to build HTTP client")
}

pub(crate) fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() || err.is_decode()
}

pub(crate) fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<Number>,
}
