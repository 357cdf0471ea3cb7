//! OpenAI-compatible provider.
//!
//! [`OpenAiCompatProvider`] talks to any endpoint accepting the OpenAI chat
//! completion format: OpenAI itself, OpenRouter, Groq, local servers such as
//! Ollama or llama.cpp, and so on.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::ProviderConfig;
use crate::credential::CredentialSlot;
use crate::error::{ProviderError, Result};
use crate::provider::Provider;
use crate::sse::{LineBuffer, parse_sse_line};
use crate::types::{ChatRequest, ChatResponse, StreamChunk};

/// Fallback wait when a 429 carries no hint.
const DEFAULT_RETRY_AFTER_MS: u64 = 1000;

/// Chat completions over HTTP with Bearer authentication.
pub struct OpenAiCompatProvider {
    config: ProviderConfig,
    http: reqwest::Client,
    session_key: Option<CredentialSlot>,
}

impl OpenAiCompatProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let http = build_client(config.timeout_secs);
        Self {
            config,
            http,
            session_key: None,
        }
    }

    /// Also consult a session credential slot when resolving the key.
    pub fn with_session_credential(mut self, slot: CredentialSlot) -> Self {
        self.session_key = Some(slot);
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Config-file key, then session key, then the environment.
    fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.config.api_key {
            return Ok(key.expose().to_string());
        }
        if let Some(key) = self.session_key.as_ref().and_then(CredentialSlot::get) {
            return Ok(key.expose().to_string());
        }
        std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!("set {} env var", self.config.api_key_env))
            })
    }

    fn post(&self, api_key: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .post(self.completions_url())
            .bearer_auth(api_key)
            .header("Content-Type", "application/json");
        for (k, v) in &self.config.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }

    /// Map a non-2xx response onto a [`ProviderError`].
    async fn error_for_status(
        &self,
        response: reqwest::Response,
        model: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let header_ms = parse_retry_after_header(&response);
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            429 if is_quota_exhausted(&body) => {
                warn!(provider = %self.config.name, "quota exhausted");
                Err(ProviderError::QuotaExhausted(
                    extract_error_message(&body)
                        .unwrap_or_else(|| "credits exhausted or spending limit reached".into()),
                ))
            }
            429 => {
                let retry_after_ms = header_ms
                    .or_else(|| parse_retry_after_ms(&body))
                    .unwrap_or(DEFAULT_RETRY_AFTER_MS);
                warn!(provider = %self.config.name, retry_after_ms, "rate limited");
                Err(ProviderError::RateLimited { retry_after_ms })
            }
            401 | 403 => Err(ProviderError::AuthFailed(
                extract_error_message(&body).unwrap_or(body),
            )),
            404 => Err(ProviderError::ModelNotFound(format!("model '{model}': {body}"))),
            503 | 529 => Err(ProviderError::Overloaded(
                extract_error_message(&body).unwrap_or_else(|| format!("HTTP {status}")),
            )),
            _ => Err(ProviderError::RequestFailed(format!("HTTP {status}: {body}"))),
        }
    }
}

fn build_client(timeout_secs: Option<u64>) -> reqwest::Client {
    let Some(secs) = timeout_secs else {
        return reqwest::Client::new();
    };
    reqwest::Client::builder()
        .timeout(Duration::from_secs(secs))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
            reqwest::Client::new()
        })
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let api_key = self.resolve_api_key()?;

        debug!(
            provider = %self.config.name,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let response = self.post(&api_key).json(request).send().await?;
        let response = self.error_for_status(response, &request.model).await?;

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("failed to parse response: {e}"))
        })?;

        debug!(
            provider = %self.config.name,
            choices = chat_response.choices.len(),
            "chat completion response received"
        );
        Ok(chat_response)
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<()> {
        let api_key = self.resolve_api_key()?;

        let mut stream_request = request.clone();
        stream_request.stream = Some(true);

        debug!(
            provider = %self.config.name,
            model = %request.model,
            "sending streaming chat completion request"
        );

        let response = self
            .post(&api_key)
            .header("Accept", "text/event-stream")
            .json(&stream_request)
            .send()
            .await?;
        let response = self.error_for_status(response, &request.model).await?;

        let mut bytes = response.bytes_stream();
        let mut lines = LineBuffer::default();

        while let Some(next) = bytes.next().await {
            let chunk = next
                .map_err(|e| ProviderError::RequestFailed(format!("stream read error: {e}")))?;

            for line in lines.push(&chunk) {
                let parsed = match parse_sse_line(&line) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(provider = %self.config.name, error = %e, "skipping bad SSE line");
                        continue;
                    }
                };
                for chunk in parsed {
                    trace!(provider = %self.config.name, ?chunk, "stream chunk");
                    if tx.send(chunk).await.is_err() {
                        debug!(provider = %self.config.name, "stream receiver dropped, stopping");
                        return Ok(());
                    }
                }
            }
        }

        if let Some(rest) = lines.finish()
            && let Ok(parsed) = parse_sse_line(&rest)
        {
            for chunk in parsed {
                if tx.send(chunk).await.is_err() {
                    return Ok(());
                }
            }
        }

        debug!(provider = %self.config.name, "stream complete");
        Ok(())
    }
}

/// 429 bodies that mean "out of credits" rather than "slow down".
fn is_quota_exhausted(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["exhausted", "spending limit", "billing", "quota exceeded", "insufficient_quota"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// `{"error": {"message": ".."}}` or `{"error": ".."}`.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(String::from)
}

/// Numeric `Retry-After` (seconds, possibly fractional).
fn parse_retry_after_header(response: &reqwest::Response) -> Option<u64> {
    let secs: f64 = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()?;
    Some((secs * 1000.0).max(0.0) as u64)
}

/// `retry_after_ms` or `retry_after` (seconds) in a JSON error body.
fn parse_retry_after_ms(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("retry_after_ms").and_then(|v| v.as_u64()).or_else(|| {
        value
            .get("retry_after")
            .and_then(|v| v.as_f64())
            .map(|secs| (secs * 1000.0) as u64)
    })
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.config.name)
            .field("base_url", &self.config.base_url)
            .field("api_key", &self.config.api_key.as_ref().map(|_| "***"))
            .field("session_key", &self.session_key.is_some())
            .finish()
    }
}
