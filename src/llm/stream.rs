use futures::{ stream, Stream, StreamExt };
use log::{ error, info };
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;

use super::chat::{ ChatClient, CompletionRequest, DeltaStream };

/// Successive snapshots of one reply. Every item is the full text accumulated
/// so far, not just the latest delta.
pub type ReplyStream = Pin<Box<dyn Stream<Item = String> + Send>>;

pub const ERROR_PREFIX: &str = "Error: ";

pub fn error_reply(err: impl Display) -> String {
    format!("{}{}", ERROR_PREFIX, err)
}

enum DriverState {
    Pending {
        client: Arc<dyn ChatClient>,
        request: CompletionRequest,
    },
    Streaming {
        deltas: DeltaStream,
        partial: String,
    },
    Done,
}

/// Streams a completion as growing snapshots.
///
/// Nothing is sent until the stream is first polled. Absent and empty deltas
/// are skipped. A failure while opening or reading ends the stream with one
/// `"Error: <message>"` item. Dropping the stream early drops the underlying
/// delta stream.
pub fn stream_reply(client: Arc<dyn ChatClient>, request: CompletionRequest) -> ReplyStream {
    Box::pin(stream::unfold(DriverState::Pending { client, request }, advance))
}

async fn advance(mut state: DriverState) -> Option<(String, DriverState)> {
    loop {
        match state {
            DriverState::Pending { client, request } => {
                match client.stream_chat(&request).await {
                    Ok(deltas) => {
                        state = DriverState::Streaming { deltas, partial: String::new() };
                    }
                    Err(e) => {
                        error!("Failed to open completion stream ({}): {}", client.get_model(), e);
                        return Some((error_reply(e), DriverState::Done));
                    }
                }
            }
            DriverState::Streaming { mut deltas, mut partial } => {
                match deltas.next().await {
                    Some(Ok(chunk)) => {
                        match chunk.content {
                            Some(text) if !text.is_empty() => {
                                partial.push_str(&text);
                                let snapshot = partial.clone();
                                return Some((snapshot, DriverState::Streaming { deltas, partial }));
                            }
                            _ => {
                                state = DriverState::Streaming { deltas, partial };
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("Completion stream failed after {} chars: {}", partial.len(), e);
                        return Some((error_reply(e), DriverState::Done));
                    }
                    None => {
                        info!("Completion stream finished ({} chars)", partial.len());
                        return None;
                    }
                }
            }
            DriverState::Done => {
                return None;
            }
        }
    }
}
