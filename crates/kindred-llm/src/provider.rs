//! The [`Provider`] trait for chat completions.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{ChatRequest, ChatResponse, StreamChunk};

/// Something that can run chat completion requests.
///
/// The production implementation is
/// [`OpenAiCompatProvider`](crate::openai_compat::OpenAiCompatProvider).
/// Neither method retries; callers decide.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Run a single-shot request.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Run a streaming request, sending chunks to `tx` as they arrive.
    ///
    /// Returns an error without sending anything if the request is rejected.
    /// Returns `Ok(())` early, dropping the connection, once `tx`'s receiver
    /// is gone.
    async fn complete_stream(
        &self,
        request: &ChatRequest,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<()>;
}
