use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig };
use crate::history::normalize;
use crate::llm::chat::{ new_client as new_chat_client, ChatClient, CompletionRequest };
use crate::llm::stream::{ stream_reply, ReplyStream };
use crate::llm::{ GenerationParams, LlmConfig, LlmType };
use crate::models::chat::History;
use crate::search::{ fetch_context, new_client as new_search_client, SearchClient, SearchConfig };

use futures::{ stream, StreamExt };
use log::info;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// Runs one search-augmented turn: web search, prompt assembly, streamed
/// completion.
///
/// Holds no per-conversation state. History belongs to the caller and is
/// passed in on every turn.
#[derive(Clone)]
pub struct SearchAgent {
    search_client: Arc<dyn SearchClient>,
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>,
    params: GenerationParams,
}

impl SearchAgent {
    pub fn new(
        search_client: Arc<dyn SearchClient>,
        chat_client: Arc<dyn ChatClient>,
        prompt_config: Arc<PromptConfig>,
        params: GenerationParams
    ) -> Self {
        Self {
            search_client,
            chat_client,
            prompt_config,
            params,
        }
    }

    fn initialize_clients(
        args: &Args
    ) -> Result<(Arc<dyn SearchClient>, Arc<dyn ChatClient>), Box<dyn Error + Send + Sync>> {
        let llm_type: LlmType = args.chat_llm_type.parse()?;
        let chat_config = LlmConfig {
            llm_type,
            api_key: args.chat_api_key.clone().or_else(|| args.hf_token.clone()),
            completion_model: args.chat_model.clone(),
            base_url: args.chat_base_url.clone(),
            provider: Some(args.chat_provider.clone()),
            bill_to: Some(args.bill_to.clone()),
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={}",
            chat_config.llm_type,
            chat_client.get_model(),
            chat_config.base_url.as_deref().unwrap_or("adapter default")
        );

        let search_config = SearchConfig {
            api_key: args.tavily_api_key.clone(),
            base_url: args.search_base_url.clone(),
            timeout: Duration::from_secs(args.search_timeout_secs),
        };
        let search_client = new_search_client(&search_config)?;
        info!(
            "Search client configured: BaseURL={}, Timeout={}s",
            search_config.base_url.as_deref().unwrap_or("adapter default"),
            search_config.timeout.as_secs()
        );

        Ok((search_client, chat_client))
    }

    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let (search_client, chat_client) = Self::initialize_clients(args)?;
        let prompt_config = prompt::load_prompts(args.prompts_path.as_deref())?;
        let params = GenerationParams {
            temperature: args.temperature,
            max_tokens: args.max_tokens,
        };
        Ok(Self::new(search_client, chat_client, prompt_config, params))
    }

    /// Searches the web for `user_message` and builds the completion request.
    /// A failed search degrades the system message instead of failing.
    pub async fn prepare(&self, user_message: &str, history: &History) -> CompletionRequest {
        let web_context = fetch_context(self.search_client.as_ref(), user_message).await;
        let messages = self.prompt_config.assemble(
            normalize(history),
            &web_context.render(),
            user_message
        );
        CompletionRequest {
            messages,
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        }
    }

    /// Answers one turn as a stream of growing snapshots.
    ///
    /// Nothing runs until the stream is polled. Every failure surfaces as a
    /// final `"Error: ..."` snapshot, so the caller can always record the last
    /// item as the assistant turn.
    pub fn respond(&self, user_message: &str, history: History) -> ReplyStream {
        let agent = self.clone();
        let message = user_message.to_string();

        Box::pin(
            stream
                ::once(async move {
                    info!("Turn started ({} prior turn(s))", history.len());
                    let request = agent.prepare(&message, &history).await;
                    stream_reply(agent.chat_client, request)
                })
                .flatten()
        )
    }
}
