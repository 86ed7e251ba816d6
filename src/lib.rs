pub mod agent;
pub mod cli;
pub mod config;
pub mod history;
pub mod llm;
pub mod models;
pub mod search;
pub mod server;

use agent::SearchAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    args.validate()?;

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Chat Provider: {}", args.chat_provider);
    info!("Temperature: {}", args.temperature);
    info!("Max Tokens: {}", args.max_tokens);
    info!("Search Timeout: {}s", args.search_timeout_secs);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("HF Token Set: {}", args.hf_token.is_some());
    info!("Tavily Key Set: {}", args.tavily_api_key.is_some());
    info!("Server Auth: {}", args.server_api_key.as_deref().map_or(false, |k| !k.is_empty()));
    info!("-------------------------");

    let agent = Arc::new(SearchAgent::from_args(&args)?);
    info!("Starting server on: {}", args.server_addr);
    let server = Server::new(args.server_addr.clone(), agent, args.server_api_key.clone());
    server.run().await?;

    Ok(())
}
