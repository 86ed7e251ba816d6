pub mod openai;
pub mod sse;

use async_trait::async_trait;
use futures::{ Future, Stream };
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::LlmConfig;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatMessage;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("completion API error: HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("failed to parse completion stream: {0}")]
    Decode(String),
    #[error("invalid LLM configuration: {0}")]
    InvalidConfig(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// One increment of a streaming completion. `content` may be absent or empty,
/// e.g. on role-only or finish chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), finish_reason: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Opens a streaming completion. Increments arrive in provider order and
    /// the stream ends when the provider signals completion.
    async fn stream_chat(&self, request: &CompletionRequest) -> Result<DeltaStream, LlmError>;

    fn get_model(&self) -> String;
}

/// Runs `response_fn` on a background task feeding a bounded channel.
///
/// Dropping the returned stream closes the channel; the producer must stop at
/// its next failed send.
pub fn create_streaming_response<F, Fut>(response_fn: F) -> DeltaStream
where
    F: FnOnce(mpsc::Sender<Result<StreamChunk, LlmError>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
