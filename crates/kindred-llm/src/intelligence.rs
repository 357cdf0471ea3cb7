//! The three language intelligence operations.
//!
//! [`LanguageIntelligence`] is the seam the turn coordinator depends on;
//! [`ModelIntelligence`] implements it over any [`Provider`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use kindred_types::profile::normalize_fact_key;
use kindred_types::{Emotion, UserProfile};

use crate::error::IntelligenceError;
use crate::prompts;
use crate::provider::Provider;
use crate::types::{ChatMessage, ChatRequest, ResponseFormat, StreamChunk};

/// Facts extracted from one user message.
pub type Facts = BTreeMap<String, String>;

/// Result of emotion + language classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub emotion: Emotion,
    pub language_code: String,
}

/// Lazy sequence of non-empty response fragments.
///
/// Dropping the stream abandons the underlying request.
pub struct ResponseStream {
    first: Option<String>,
    rx: mpsc::Receiver<Result<String, IntelligenceError>>,
    task: Option<JoinHandle<()>>,
}

impl ResponseStream {
    /// Wrap a fragment channel. Empty fragments sent on it are skipped.
    pub fn new(rx: mpsc::Receiver<Result<String, IntelligenceError>>) -> Self {
        Self {
            first: None,
            rx,
            task: None,
        }
    }

    /// Next fragment, an error that ended the stream, or `None` at the end.
    pub async fn next(&mut self) -> Option<Result<String, IntelligenceError>> {
        if let Some(first) = self.first.take() {
            return Some(Ok(first));
        }
        loop {
            match self.rx.recv().await? {
                Ok(text) if text.is_empty() => continue,
                other => return Some(other),
            }
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("buffered", &self.first.is_some())
            .finish()
    }
}

/// Emotion classification, streamed replies and fact extraction.
///
/// None of the operations retry internally.
#[async_trait]
pub trait LanguageIntelligence: Send + Sync {
    /// Detect the emotion and language of `text`.
    ///
    /// Fails with [`IntelligenceError::Analysis`] when either field is
    /// missing or the output is not the expected structure.
    async fn classify(&self, text: &str) -> Result<Classification, IntelligenceError>;

    /// Start generating an empathetic reply.
    ///
    /// Returns an error (before any fragment) if the request cannot be
    /// issued.
    async fn stream_response(
        &self,
        text: &str,
        emotion: Emotion,
        language_code: &str,
        profile: &UserProfile,
    ) -> Result<ResponseStream, IntelligenceError>;

    /// Extract durable facts about the user.
    ///
    /// `Ok(None)` means nothing new was found. Fails with
    /// [`IntelligenceError::Extraction`] on malformed output.
    async fn extract_facts(&self, text: &str) -> Result<Option<Facts>, IntelligenceError>;
}

/// Model names and sampling settings per operation.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub classify_model: String,
    pub response_model: String,
    pub extract_model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
}

impl ModelSettings {
    pub fn from_llm_config(cfg: &kindred_types::config::LlmConfig) -> Self {
        Self {
            classify_model: cfg.classify_model.clone(),
            response_model: cfg.response_model.clone(),
            extract_model: cfg.extract_model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        }
    }
}

/// [`LanguageIntelligence`] backed by a chat-completions [`Provider`].
pub struct ModelIntelligence<P> {
    provider: Arc<P>,
    settings: ModelSettings,
}

impl<P: Provider + 'static> ModelIntelligence<P> {
    pub fn new(provider: Arc<P>, settings: ModelSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    async fn complete_text(&self, request: ChatRequest) -> Result<String, IntelligenceError> {
        let response = self.provider.complete(&request).await?;
        Ok(response.first_content().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl<P: Provider + 'static> LanguageIntelligence for ModelIntelligence<P> {
    async fn classify(&self, text: &str) -> Result<Classification, IntelligenceError> {
        let mut request = ChatRequest::new(
            &self.settings.classify_model,
            vec![
                ChatMessage::system(prompts::CLASSIFY_SYSTEM),
                ChatMessage::user(text),
            ],
        );
        request.response_format = Some(ResponseFormat::json_schema(
            "classification",
            prompts::classification_schema(),
            true,
        ));

        let content = self.complete_text(request).await?;
        let classification = parse_classification(&content)?;
        debug!(
            emotion = %classification.emotion,
            language = %classification.language_code,
            "classified user message"
        );
        Ok(classification)
    }

    async fn stream_response(
        &self,
        text: &str,
        emotion: Emotion,
        language_code: &str,
        profile: &UserProfile,
    ) -> Result<ResponseStream, IntelligenceError> {
        let mut request = ChatRequest::new(
            &self.settings.response_model,
            vec![
                ChatMessage::system(prompts::response_system(emotion, language_code, profile)),
                ChatMessage::user(text),
            ],
        );
        request.temperature = self.settings.temperature;
        request.max_tokens = self.settings.max_tokens;
        request.reasoning_effort = Some("minimal".into());

        let (frag_tx, mut frag_rx) = mpsc::channel(64);
        let provider = Arc::clone(&self.provider);
        let task = tokio::spawn(async move {
            let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
            let forward = async {
                while let Some(chunk) = chunk_rx.recv().await {
                    if let StreamChunk::TextDelta { text } = chunk
                        && frag_tx.send(Ok(text)).await.is_err()
                    {
                        return;
                    }
                }
            };
            let (result, ()) = tokio::join!(provider.complete_stream(&request, chunk_tx), forward);
            if let Err(e) = result {
                let _ = frag_tx.send(Err(e.into())).await;
            }
        });

        // Hold the first item back so a rejected request surfaces here
        // rather than as the stream's first element.
        let first = match frag_rx.recv().await {
            Some(Ok(text)) => Some(text),
            Some(Err(e)) => return Err(e),
            None => None,
        };

        Ok(ResponseStream {
            first,
            rx: frag_rx,
            task: Some(task),
        })
    }

    async fn extract_facts(&self, text: &str) -> Result<Option<Facts>, IntelligenceError> {
        let mut request = ChatRequest::new(
            &self.settings.extract_model,
            vec![
                ChatMessage::system(prompts::EXTRACT_SYSTEM),
                ChatMessage::user(text),
            ],
        );
        request.response_format = Some(ResponseFormat::json_schema(
            "user_facts",
            prompts::extraction_schema(),
            false,
        ));

        let content = self.complete_text(request).await?;
        let facts = parse_facts(&content)?;
        debug!(count = facts.as_ref().map_or(0, Facts::len), "extracted facts");
        Ok(facts)
    }
}

/// Remove a surrounding markdown code fence, if present.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop an info string such as `json` on the opening line.
    match inner.split_once('\n') {
        Some((info, body)) if !info.trim_start().starts_with('{') => body.trim(),
        _ => inner.trim(),
    }
}

/// Parse classification output.
pub fn parse_classification(raw: &str) -> Result<Classification, IntelligenceError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| IntelligenceError::Analysis(format!("not JSON: {e}")))?;

    let emotion = value
        .get("emotion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| IntelligenceError::Analysis("missing emotion".into()))?
        .parse::<Emotion>()
        .map_err(|e| IntelligenceError::Analysis(e.to_string()))?;

    let language_code = value
        .get("languageCode")
        .or_else(|| value.get("language_code"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| IntelligenceError::Analysis("missing languageCode".into()))?
        .to_string();

    Ok(Classification {
        emotion,
        language_code,
    })
}

/// Parse extraction output; `{}` becomes `None`.
pub fn parse_facts(raw: &str) -> Result<Option<Facts>, IntelligenceError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| IntelligenceError::Extraction(format!("not JSON: {e}")))?;
    let serde_json::Value::Object(map) = value else {
        return Err(IntelligenceError::Extraction("expected a JSON object".into()));
    };

    let mut facts = Facts::new();
    for (key, value) in map {
        let serde_json::Value::String(value) = value else {
            return Err(IntelligenceError::Extraction(format!(
                "value for '{key}' is not a string"
            )));
        };
        let key = normalize_fact_key(&key);
        let value = value.trim();
        if !key.is_empty() && !value.is_empty() {
            facts.insert(key, value.to_string());
        }
    }
    Ok((!facts.is_empty()).then_some(facts))
}
