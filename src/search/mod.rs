pub mod context;
pub mod tavily;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use self::context::{ fetch_context, format_context, WebContext };
use self::tavily::TavilyClient;

/// Search depth requested from the provider. Turns always use `Advanced`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Advanced,
}

pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub search_depth: SearchDepth,
    pub max_results: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search API key is required")]
    MissingApiKey,
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("search API error: HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("failed to parse search response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError>;
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Upper bound on one whole search request, connect through body.
    pub timeout: Duration,
}

pub fn new_client(
    config: &SearchConfig
) -> Result<Arc<dyn SearchClient>, Box<dyn StdError + Send + Sync>> {
    let client = TavilyClient::from_config(config)?;
    Ok(Arc::new(client))
}
