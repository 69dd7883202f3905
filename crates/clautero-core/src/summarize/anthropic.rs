//! Anthropic Messages API backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{SummarizeError, SummarizeFuture, Summarizer};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicSummarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicSummarizer {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self, SummarizeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

impl Summarizer for AnthropicSummarizer {
    fn name(&self) -> &str {
        "anthropic-api"
    }

    fn complete<'a>(&'a self, prompt: &'a str, max_tokens: u32) -> SummarizeFuture<'a> {
        Box::pin(async move {
            let body = MessagesRequest {
                model: &self.model,
                max_tokens,
                messages: [Message {
                    role: "user",
                    content: prompt,
                }],
            };

            let resp = self
                .client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(SummarizeError::Http {
                    status: status.as_u16(),
                    body,
                });
            }

            let data: MessagesResponse = resp.json().await?;
            data.content
                .into_iter()
                .next()
                .and_then(|block| block.text)
                .ok_or(SummarizeError::EmptyResponse)
        })
    }
}
