use log::{ info, warn };

use super::{ SearchClient, SearchDepth, SearchError, SearchRequest, SearchResult };

pub const MAX_RESULTS: usize = 3;

/// Web context gathered for a single turn.
///
/// A failed search is not a pipeline failure: it becomes `Unavailable` and
/// still renders to text the model can read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebContext {
    Results(Vec<SearchResult>),
    Unavailable(String),
}

impl WebContext {
    pub fn from_search(result: Result<Vec<SearchResult>, SearchError>) -> Self {
        match result {
            Ok(mut results) => {
                results.truncate(MAX_RESULTS);
                WebContext::Results(results)
            }
            Err(e) => WebContext::Unavailable(e.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, WebContext::Results(_))
    }

    pub fn render(&self) -> String {
        match self {
            WebContext::Results(results) => {
                let mut context = String::from("Web Search Results:\n\n");
                for result in results {
                    context.push_str(&format!("Title: {}\n", result.title));
                    context.push_str(&format!("URL: {}\n", result.url));
                    context.push_str(&format!("Content: {}\n\n", result.content));
                }
                context
            }
            WebContext::Unavailable(message) => {
                format!("Error getting web context: {}", message)
            }
        }
    }
}

pub async fn fetch_context(client: &dyn SearchClient, query: &str) -> WebContext {
    let request = SearchRequest {
        query: query.to_string(),
        search_depth: SearchDepth::Advanced,
        max_results: MAX_RESULTS,
    };

    let result = client.search(&request).await.map(|resp| resp.results);
    let context = WebContext::from_search(result);
    match &context {
        WebContext::Results(results) => info!("Web search returned {} result(s)", results.len()),
        WebContext::Unavailable(message) => warn!("Web search failed, continuing without results: {}", message),
    }
    context
}

pub async fn format_context(client: &dyn SearchClient, query: &str) -> String {
    fetch_context(client, query).await.render()
}
