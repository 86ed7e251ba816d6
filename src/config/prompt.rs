use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;
use log::{ error, info };

use crate::models::chat::ChatMessage;

pub const WEB_CONTEXT_PLACEHOLDER: &str = "{web_context}";

pub const DEFAULT_SYSTEM_TEMPLATE: &str =
    "You are a helpful AI assistant. Use the following web search results to inform your response:\n\n{web_context}";

#[derive(Debug)]
pub enum PromptError {
    MissingPlaceholder(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::MissingPlaceholder(key) =>
                write!(f, "System template must contain the '{}' placeholder", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PromptConfig {
    #[serde(default = "default_system_template")]
    pub system_template: String,
}

fn default_system_template() -> String {
    DEFAULT_SYSTEM_TEMPLATE.to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self { system_template: default_system_template() }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if !self.system_template.contains(WEB_CONTEXT_PLACEHOLDER) {
            return Err(PromptError::MissingPlaceholder(WEB_CONTEXT_PLACEHOLDER.to_string()));
        }
        Ok(())
    }

    pub fn system_prompt(&self, web_context: &str) -> String {
        self.system_template.replace(WEB_CONTEXT_PLACEHOLDER, web_context)
    }

    /// Builds the request messages: prior history, then the system message
    /// carrying the web context, then the new user message.
    ///
    /// The system message deliberately follows the history rather than leading
    /// it. Nothing is truncated.
    pub fn assemble(
        &self,
        history_messages: Vec<ChatMessage>,
        web_context: &str,
        user_message: &str
    ) -> Vec<ChatMessage> {
        let mut messages = history_messages;
        messages.reserve(2);
        messages.push(ChatMessage::system(self.system_prompt(web_context)));
        messages.push(ChatMessage::user(user_message));
        messages
    }
}

/// [`PromptConfig::assemble`] with the built-in system template.
pub fn assemble(
    history_messages: Vec<ChatMessage>,
    web_context: &str,
    user_message: &str
) -> Vec<ChatMessage> {
    PromptConfig::default().assemble(history_messages, web_context, user_message)
}

pub fn parse_prompts(content: &str) -> Result<PromptConfig, PromptError> {
    let config: PromptConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub fn load_prompts(path: Option<&str>) -> Result<Arc<PromptConfig>, Box<dyn Error + Send + Sync>> {
    let Some(path) = path else {
        return Ok(Arc::new(PromptConfig::default()));
    };
    let file_content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to read prompts file '{}': {}", path, e);
        PromptError::from(e)
    })?;
    let config = parse_prompts(&file_content).map_err(|e| {
        error!("Failed to parse prompts file '{}': {}", path, e);
        e
    })?;
    info!("Loaded system template from {}", path);
    Ok(Arc::new(config))
}
