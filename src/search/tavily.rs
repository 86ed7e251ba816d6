use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use std::error::Error as StdError;
use std::time::Duration;

use super::{ SearchClient, SearchConfig, SearchError, SearchRequest, SearchResponse };

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

pub struct TavilyClient {
    http: HttpClient,
    base_url: String,
}

impl TavilyClient {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout: Duration
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if api_key.is_empty() {
            return Err(Box::new(SearchError::MissingApiKey));
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid Tavily API key format: {}", e))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key.clone().ok_or(SearchError::MissingApiKey)?;
        Self::new(api_key, config.base_url.clone(), config.timeout)
    }
}

#[async_trait]
impl SearchClient for TavilyClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        debug!("Tavily search: {:?}", request);

        let resp = self.http.post(&url).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let text = resp.text().await?;
        serde_json::from_str::<SearchResponse>(&text).map_err(|e| SearchError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{ fetch_context, SearchDepth, DEFAULT_SEARCH_TIMEOUT };
    use wiremock::matchers::{ body_json, header, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            search_depth: SearchDepth::Advanced,
            max_results: 3,
        }
    }

    #[tokio::test]
    async fn sends_advanced_query_and_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer tvly-test"))
            .and(
                body_json(
                    serde_json::json!({
                        "query": "rust async",
                        "search_depth": "advanced",
                        "max_results": 3
                    })
                )
            )
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    serde_json::json!({
                        "query": "rust async",
                        "results": [
                            {"title": "Async Book", "url": "https://rust-lang.github.io/async-book/", "content": "Futures and executors.", "score": 0.9}
                        ]
                    })
                )
            )
            .mount(&server).await;

        let client = TavilyClient::new("tvly-test".into(), Some(server.uri()), DEFAULT_SEARCH_TIMEOUT).unwrap();
        let resp = client.search(&request("rust async")).await.unwrap();

        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].title, "Async Book");
        assert_eq!(resp.results[0].content, "Futures and executors.");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server).await;

        let client = TavilyClient::new("bad".into(), Some(server.uri()), DEFAULT_SEARCH_TIMEOUT).unwrap();
        let err = client.search(&request("anything")).await.unwrap_err();

        match err {
            SearchError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server).await;

        let client = TavilyClient::new("k".into(), Some(server.uri()), DEFAULT_SEARCH_TIMEOUT).unwrap();
        let err = client.search(&request("anything")).await.unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
    }

    #[test]
    fn missing_key_is_rejected() {
        let config = SearchConfig { api_key: None, base_url: None, timeout: DEFAULT_SEARCH_TIMEOUT };
        assert!(TavilyClient::from_config(&config).is_err());
        assert!(TavilyClient::new(String::new(), None, DEFAULT_SEARCH_TIMEOUT).is_err());
    }

    #[tokio::test]
    async fn stalled_search_times_out_into_context_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "results": [] }))
                    .set_delay(Duration::from_secs(5))
            )
            .mount(&server).await;

        let client = TavilyClient::new(
            "k".into(),
            Some(server.uri()),
            Duration::from_millis(200)
        ).unwrap();

        let err = client.search(&request("slow")).await.unwrap_err();
        assert!(matches!(&err, SearchError::Http(e) if e.is_timeout()), "{err}");

        let context = fetch_context(&client, "slow").await;
        assert!(!context.is_available());
        assert!(context.render().starts_with("Error getting web context:"));
    }
}
