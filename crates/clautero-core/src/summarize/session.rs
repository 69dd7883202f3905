//! Web chat session backend.
//!
//! Authenticates with a browser `sessionKey` cookie instead of an API key.
//! Each completion opens a throwaway conversation, streams the reply and
//! deletes the conversation again.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::json;

use super::{SummarizeError, SummarizeFuture, Summarizer};

pub const DEFAULT_BASE_URL: &str = "https://claude.ai";

pub struct SessionSummarizer {
    client: reqwest::Client,
    base_url: String,
    organization_id: String,
}

impl SessionSummarizer {
    pub fn new(
        session_key: &str,
        organization_id: &str,
        timeout: Duration,
    ) -> Result<Self, SummarizeError> {
        let mut cookie = HeaderValue::from_str(&format!("sessionKey={}", session_key))
            .map_err(|_| SummarizeError::Protocol("session key is not a valid cookie".into()))?;
        cookie.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookie);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            organization_id: organization_id.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn conversations_url(&self) -> String {
        format!(
            "{}/api/organizations/{}/chat_conversations",
            self.base_url, self.organization_id
        )
    }

    async fn create_conversation(&self) -> Result<String, SummarizeError> {
        let resp = self
            .client
            .post(self.conversations_url())
            .json(&json!({ "name": "" }))
            .send()
            .await?;
        let resp = error_for_status(resp).await?;
        let data: serde_json::Value = resp.json().await?;
        data["uuid"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SummarizeError::Protocol("conversation has no uuid".into()))
    }

    async fn send_prompt(&self, conversation: &str, prompt: &str) -> Result<String, SummarizeError> {
        let resp = self
            .client
            .post(format!("{}/{}/completion", self.conversations_url(), conversation))
            .header(header::ACCEPT, "text/event-stream")
            .json(&json!({
                "prompt": prompt,
                "timezone": "UTC",
                "attachments": [],
                "files": [],
            }))
            .send()
            .await?;
        let resp = error_for_status(resp).await?;

        let mut acc = CompletionAccumulator::default();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            acc.push(&chunk?)?;
        }
        acc.finish()
    }

    async fn delete_conversation(&self, conversation: &str) {
        let url = format!("{}/{}", self.conversations_url(), conversation);
        match self.client.delete(&url).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(conversation, status = %resp.status(), "could not delete conversation")
            }
            Err(e) => tracing::warn!(conversation, error = %e, "could not delete conversation"),
        }
    }
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, SummarizeError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SummarizeError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Collects `completion` fragments from a server-sent event stream.
#[derive(Default)]
struct CompletionAccumulator {
    /// Bytes after the last newline; a chunk may end mid-character.
    pending: Vec<u8>,
    text: String,
}

impl CompletionAccumulator {
    fn push(&mut self, chunk: &[u8]) -> Result<(), SummarizeError> {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(String::from_utf8_lossy(&line).trim_end())?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<(), SummarizeError> {
        let Some(payload) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let event: serde_json::Value = match serde_json::from_str(payload.trim()) {
            Ok(v) => v,
            Err(_) => return Ok(()),
        };
        if event["type"] == "error" {
            let message = event["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(SummarizeError::Protocol(message));
        }
        if let Some(fragment) = event["completion"].as_str() {
            self.text.push_str(fragment);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<String, SummarizeError> {
        let rest = std::mem::take(&mut self.pending);
        self.handle_line(String::from_utf8_lossy(&rest).trim_end())?;
        if self.text.is_empty() {
            return Err(SummarizeError::EmptyResponse);
        }
        Ok(self.text)
    }
}

impl Summarizer for SessionSummarizer {
    fn name(&self) -> &str {
        "claude-session"
    }

    // The chat endpoint picks its own output length; `max_tokens` is not
    // part of its request format.
    fn complete<'a>(&'a self, prompt: &'a str, _max_tokens: u32) -> SummarizeFuture<'a> {
        Box::pin(async move {
            let conversation = self.create_conversation().await?;
            let result = self.send_prompt(&conversation, prompt).await;
            self.delete_conversation(&conversation).await;
            result
        })
    }
}
