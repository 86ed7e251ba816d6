use crate::agent::SearchAgent;
use crate::models::chat::{ History, Turn };
use crate::models::websocket::{ ClientMessage, ServerMessage };

use chrono::Utc;
use futures::{ Sink, SinkExt, StreamExt };
use log::{ info, warn };

pub const TITLE: &str = "DeepSearch";
pub const DESCRIPTION: &str = "Ask me anything, powered by Hugging Face Inference Providers";
pub const EXAMPLES: [&str; 3] = [
    "What is the capital of France?",
    "Explain quantum computing in simple terms",
    "Write a short poem about artificial intelligence",
];

pub fn ready_message() -> ServerMessage {
    ServerMessage::Ready {
        title: TITLE.to_string(),
        description: DESCRIPTION.to_string(),
        examples: EXAMPLES.iter().map(|e| e.to_string()).collect(),
    }
}

/// One connected conversation. Owns the history and runs turns one at a
/// time; the agent only ever sees a copy.
pub struct ChatSession {
    id: String,
    history: History,
}

impl ChatSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), history: History::new() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub async fn handle<S>(
        &mut self,
        agent: &SearchAgent,
        message: ClientMessage,
        tx: &mut S
    ) -> Result<(), S::Error>
        where S: Sink<ServerMessage> + Unpin
    {
        match message {
            ClientMessage::Chat { content } => self.run_turn(agent, content, tx).await,
            ClientMessage::Reset => {
                info!("Conversation {} reset after {} turn(s)", self.id, self.history.len());
                self.history.clear();
                tx.send(ready_message()).await
            }
        }
    }

    async fn run_turn<S>(&mut self, agent: &SearchAgent, content: String, tx: &mut S) -> Result<(), S::Error>
        where S: Sink<ServerMessage> + Unpin
    {
        tx.send(ServerMessage::Processing).await?;

        let mut replies = agent.respond(&content, self.history.clone());
        let mut last = String::new();
        while let Some(snapshot) = replies.next().await {
            tx.send(ServerMessage::Partial { content: snapshot.clone() }).await?;
            last = snapshot;
        }
        if last.is_empty() {
            warn!("Conversation {}: model returned an empty reply", self.id);
        }

        self.history.push(Turn::new(content, last.clone()));
        tx.send(ServerMessage::Response {
            content: last,
            timestamp: Utc::now().timestamp(),
        }).await
    }
}
