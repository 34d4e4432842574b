use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::thread;

use crate::config::State;
use crate::embed::{build_client, is_retryable_error, retry_backoff, should_retry};

const TEMPERATURE: f32 = 0.3;

/// Blocking client for the Gemini single-turn generation endpoint. The
/// core only needs the stateless request/response contract.
pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    max_retries: usize,
}

impl GeminiGenerator {
    pub fn new(api_key: &str, state: &State) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing API key");
        let client = build_client(api_key, state.timeout_secs.max(60))?;
        let endpoint = format!(
            "{}/models/{}:generateContent",
            state.api_base.trim_end_matches('/'),
            state.chat_model
        );
        Ok(Self {
            client,
            endpoint,
            max_retries: state.max_retries.max(1),
        })
    }

    pub fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        };

        let mut attempt = 0usize;
        loop {
            let response = self.client.post(&self.endpoint).json(&request).send();
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: GenerateResponse = resp
                            .json()
                            .context("Failed to parse generation response")?;
                        return extract_answer(parsed);
                    }

                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    anyhow::bail!("Generation request failed ({}): {}", status, body);
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(anyhow::Error::from(err)
                        .context("Generation service unavailable after retries"));
                }
            }
        }
    }
}

/// Single-turn prompt: instruction preamble, retrieved context, then the
/// user's question. Retrieval order is preserved in the context block.
pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "You are a helpful assistant answering questions using only this context:\n\n\
         {}\n\n\
         User: {}\n\
         Answer:",
        context, query
    )
}

fn extract_answer(response: GenerateResponse) -> Result<String> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content.parts.into_iter().next())
        .map(|part| part.text)
        .context("Generation service returned no candidates")
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_context_then_question() {
        let prompt = build_prompt("Category: Burgers\nItems: Big Mac", "What burgers are there?");
        let context_pos = prompt.find("Category: Burgers").unwrap();
        let question_pos = prompt.find("User: What burgers are there?").unwrap();
        assert!(context_pos < question_pos);
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn extracts_first_candidate_text() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Big Mac"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_answer(parsed).unwrap(), "Big Mac");
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(extract_answer(parsed).is_err());
    }
}
