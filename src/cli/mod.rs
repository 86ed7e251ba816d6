use clap::Parser;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    Temperature(f32),
    #[error("max tokens must be greater than zero")]
    MaxTokens,
    #[error("search timeout must be greater than zero")]
    SearchTimeout,
    #[error("invalid {name} '{value}': {reason}")]
    Url {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Web-search augmented streaming chat assistant", long_about = None)]
pub struct Args {
    // --- Credentials ---
    /// Hugging Face access token used for the inference router.
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Tavily API key for web search.
    #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true)]
    pub tavily_api_key: Option<String>,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (huggingface, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "huggingface")]
    pub chat_llm_type: String,

    /// Base URL of the OpenAI-compatible API (e.g., http://localhost:11434/v1 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API key for non Hugging Face providers. Falls back to HF_TOKEN.
    #[arg(long, env = "CHAT_API_KEY", hide_env_values = true)]
    pub chat_api_key: Option<String>,

    /// Model name for chat completion (e.g., deepseek-ai/DeepSeek-V3-0324, gpt-4o, llama3)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Hugging Face inference provider the router should use. Empty for automatic routing.
    #[arg(long, env = "CHAT_PROVIDER", default_value = "novita")]
    pub chat_provider: String,

    /// Hugging Face organisation billed for inference. Empty to bill the token owner.
    #[arg(long, env = "BILL_TO", default_value = "huggingface")]
    pub bill_to: String,

    /// Sampling temperature.
    #[arg(long, env = "TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Maximum tokens generated per reply.
    #[arg(long, env = "MAX_TOKENS", default_value = "1000")]
    pub max_tokens: u32,

    // --- Search Args ---
    /// Base URL of the Tavily API.
    #[arg(long, env = "SEARCH_BASE_URL")]
    pub search_base_url: Option<String>,

    /// Seconds before a web search is abandoned and the turn continues without results.
    #[arg(long, env = "SEARCH_TIMEOUT_SECS", default_value = "60")]
    pub search_timeout_secs: u64,

    // --- General App Args ---
    /// Optional JSON file overriding the system prompt template.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Host address and port for the chat server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:7860")]
    pub server_addr: String,

    /// Optional key clients must pass as the `key` query parameter when connecting.
    #[arg(long, env = "SERVER_API_KEY", hide_env_values = true)]
    pub server_api_key: Option<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

fn check_url(name: &'static str, value: &Option<String>) -> Result<(), ConfigError> {
    if let Some(value) = value {
        Url::parse(value).map_err(|e| ConfigError::Url {
            name,
            value: value.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

impl Args {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Temperature(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::MaxTokens);
        }
        if self.search_timeout_secs == 0 {
            return Err(ConfigError::SearchTimeout);
        }
        check_url("chat base URL", &self.chat_base_url)?;
        check_url("search base URL", &self.search_base_url)?;
        Ok(())
    }
}
