use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use tokio::sync::mpsc;

use super::sse::{ parse_line, SseEvent, SseLineBuffer };
use super::{ create_streaming_response, ChatClient, CompletionRequest, DeltaStream, LlmError, StreamChunk };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;

pub const HUGGINGFACE_BASE_URL: &str = "https://router.huggingface.co/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

pub const DEFAULT_HF_MODEL: &str = "deepseek-ai/DeepSeek-V3-0324";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_OLLAMA_MODEL: &str = "llama3";

const BILL_TO_HEADER: &str = "x-hf-bill-to";

/// Client for any endpoint speaking the OpenAI chat-completions protocol with
/// server-sent events: the Hugging Face router, OpenAI itself, or Ollama.
pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    url: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAIDelta {
    content: Option<String>,
}

/// Provider errors arrive either as `{"error": {"message": ...}}` or as a bare
/// string.
fn provider_error_message(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(msg) => msg.clone(),
        other =>
            other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
    }
}

fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

impl OpenAIChatClient {
    pub fn new(
        api_key: Option<String>,
        model: String,
        base_url: String,
        extra_headers: Vec<(&'static str, String)>
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e|
                    LlmError::InvalidConfig(format!("Invalid API key format: {}", e))
                )?
            );
        }
        for (name, value) in extra_headers {
            let value = HeaderValue::from_str(&value).map_err(|e|
                LlmError::InvalidConfig(format!("Invalid value for header '{}': {}", name, e))
            )?;
            headers.insert(HeaderName::from_static(name), value);
        }

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            model,
            url: chat_completions_url(&base_url),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        let mut extra_headers = Vec::new();

        let (model, base_url) = match config.llm_type {
            LlmType::HuggingFace => {
                if api_key.is_none() {
                    return Err("Hugging Face token is required (HF_TOKEN)".into());
                }
                let model = config.completion_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_HF_MODEL.to_string());
                let model = match config.provider.as_deref().filter(|p| !p.is_empty()) {
                    Some(provider) => format!("{}:{}", model, provider),
                    None => model,
                };
                if let Some(bill_to) = config.bill_to.clone().filter(|b| !b.is_empty()) {
                    extra_headers.push((BILL_TO_HEADER, bill_to));
                }
                (model, config.base_url.clone().unwrap_or_else(|| HUGGINGFACE_BASE_URL.to_string()))
            }
            LlmType::OpenAI => {
                if api_key.is_none() {
                    return Err("OpenAI API key is required".into());
                }
                (
                    config.completion_model.clone().unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                    config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                )
            }
            LlmType::Ollama =>
                (
                    config.completion_model.clone().unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
                    config.base_url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
                ),
        };

        Ok(Self::new(api_key, model, base_url, extra_headers)?)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Forwards every choice delta of one `data:` payload. Returns `false` once
/// the stream is finished or the receiver is gone.
async fn forward_payload(
    data: &str,
    tx: &mpsc::Sender<Result<StreamChunk, LlmError>>
) -> bool {
    let parsed = match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(parsed) => parsed,
        Err(e) => {
            let snippet: String = data.chars().take(200).collect();
            let _ = tx.send(Err(LlmError::Decode(format!("{} in payload: {}", e, snippet)))).await;
            return false;
        }
    };

    if let Some(error) = parsed.error.as_ref() {
        let _ = tx.send(Err(LlmError::Stream(provider_error_message(error)))).await;
        return false;
    }

    for choice in parsed.choices {
        let finished = choice.finish_reason.is_some();
        let chunk = StreamChunk {
            content: choice.delta.content,
            finish_reason: choice.finish_reason,
        };
        if tx.send(Ok(chunk)).await.is_err() {
            return false;
        }
        if finished {
            return false;
        }
    }
    true
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_chat(&self, request: &CompletionRequest) -> Result<DeltaStream, LlmError> {
        let req = OpenAIChatRequest {
            model: self.model.clone(),
            messages: request.messages.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };
        info!(
            "Opening completion stream: model={}, messages={}, temperature={}, max_tokens={}",
            req.model,
            req.messages.len(),
            req.temperature,
            req.max_tokens
        );

        let resp = self.http.post(&self.url).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        Ok(
            create_streaming_response(move |tx| async move {
                let mut bytes = resp.bytes_stream();
                let mut lines = SseLineBuffer::new();

                while let Some(chunk_result) = bytes.next().await {
                    let chunk = match chunk_result {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            let _ = tx.send(Err(LlmError::Http(e))).await;
                            return;
                        }
                    };
                    for line in lines.push(&chunk) {
                        debug!("SSE line: {}", line);
                        match parse_line(&line) {
                            Some(SseEvent::Done) => {
                                return;
                            }
                            Some(SseEvent::Data(data)) => {
                                if !forward_payload(data, &tx).await {
                                    return;
                                }
                            }
                            None => {}
                        }
                    }
                }

                if let Some(line) = lines.finish() {
                    if let Some(SseEvent::Data(data)) = parse_line(&line) {
                        forward_payload(data, &tx).await;
                    }
                }
            })
        )
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::stream::stream_reply;
    use crate::models::chat::ChatMessage;
    use wiremock::matchers::{ body_partial_json, header, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::system("ctx"), ChatMessage::user("hi")],
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    fn sse_body(events: &[&str]) -> String {
        events
            .iter()
            .map(|e| format!("data: {}\n\n", e))
            .collect()
    }

    async fn collect_text(stream: DeltaStream) -> Vec<Result<Option<String>, String>> {
        stream
            .map(|item| item.map(|c| c.content).map_err(|e| e.to_string()))
            .collect().await
    }

    fn hf_config(base_url: String) -> LlmConfig {
        LlmConfig {
            llm_type: LlmType::HuggingFace,
            api_key: Some("hf_test".into()),
            completion_model: None,
            base_url: Some(base_url),
            provider: Some("novita".into()),
            bill_to: Some("huggingface".into()),
        }
    }

    #[test]
    fn completions_url_is_appended_once() {
        assert_eq!(chat_completions_url("https://x/v1/"), "https://x/v1/chat/completions");
        assert_eq!(chat_completions_url("https://x/v1/chat/completions"), "https://x/v1/chat/completions");
    }

    #[test]
    fn huggingface_config_builds_routed_model() {
        let client = OpenAIChatClient::from_config(&hf_config(HUGGINGFACE_BASE_URL.into())).unwrap();
        assert_eq!(client.get_model(), "deepseek-ai/DeepSeek-V3-0324:novita");
        assert_eq!(client.url(), "https://router.huggingface.co/v1/chat/completions");
    }

    #[test]
    fn hosted_providers_require_a_key() {
        let mut config = hf_config(HUGGINGFACE_BASE_URL.into());
        config.api_key = None;
        assert!(OpenAIChatClient::from_config(&config).is_err());

        config.llm_type = LlmType::OpenAI;
        assert!(OpenAIChatClient::from_config(&config).is_err());

        config.llm_type = LlmType::Ollama;
        assert!(OpenAIChatClient::from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn streams_deltas_until_done() {
        let server = MockServer::start().await;
        let body = sse_body(
            &[
                r#"{"choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#,
                r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#,
                r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":null}]}"#,
                "[DONE]",
                r#"{"choices":[{"delta":{"content":"ignored"}}]}"#,
            ]
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer hf_test"))
            .and(header("x-hf-bill-to", "huggingface"))
            .and(
                body_partial_json(
                    serde_json::json!({
                        "model": "deepseek-ai/DeepSeek-V3-0324:novita",
                        "temperature": 0.7,
                        "max_tokens": 1000,
                        "stream": true,
                        "messages": [
                            {"role": "system", "content": "ctx"},
                            {"role": "user", "content": "hi"}
                        ]
                    })
                )
            )
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body)
            )
            .mount(&server).await;

        let client = OpenAIChatClient::from_config(&hf_config(format!("{}/v1", server.uri()))).unwrap();
        let stream = client.stream_chat(&request()).await.unwrap();

        assert_eq!(
            collect_text(stream).await,
            vec![Ok(None), Ok(Some("Hel".to_string())), Ok(Some("lo".to_string()))]
        );
    }

    #[tokio::test]
    async fn finish_reason_ends_stream() {
        let server = MockServer::start().await;
        let body = sse_body(
            &[
                r#"{"choices":[{"delta":{"content":"done"},"finish_reason":"stop"}]}"#,
                r#"{"choices":[{"delta":{"content":"late"},"finish_reason":null}]}"#,
            ]
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server).await;

        let client = OpenAIChatClient::new(None, "m".into(), server.uri(), Vec::new()).unwrap();
        let stream = client.stream_chat(&request()).await.unwrap();

        assert_eq!(collect_text(stream).await, vec![Ok(Some("done".to_string()))]);
    }

    #[tokio::test]
    async fn error_status_fails_to_open() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server).await;

        let client = OpenAIChatClient::new(None, "m".into(), server.uri(), Vec::new()).unwrap();
        let err = match client.stream_chat(&request()).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };

        assert_eq!(err.to_string(), "completion API error: HTTP 429: rate limited");
    }

    #[tokio::test]
    async fn malformed_payload_is_reported_in_stream() {
        let server = MockServer::start().await;
        let body = sse_body(
            &[r#"{"choices":[{"delta":{"content":"ok"}}]}"#, "{not json"]
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server).await;

        let client = OpenAIChatClient::new(None, "m".into(), server.uri(), Vec::new()).unwrap();
        let items = collect_text(client.stream_chat(&request()).await.unwrap()).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(Some("ok".to_string())));
        let err = items[1].clone().unwrap_err();
        assert!(err.starts_with("failed to parse completion stream:"), "{err}");
    }

    #[tokio::test]
    async fn provider_error_event_fails_the_stream() {
        let server = MockServer::start().await;
        let body = sse_body(
            &[
                r#"{"choices":[{"delta":{"content":"Par"}}]}"#,
                r#"{"error":{"message":"Input validation error","type":"invalid_request_error"}}"#,
                r#"{"choices":[{"delta":{"content":"is"}}]}"#,
            ]
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server).await;

        let client = OpenAIChatClient::new(None, "m".into(), server.uri(), Vec::new()).unwrap();
        let items = collect_text(client.stream_chat(&request()).await.unwrap()).await;

        assert_eq!(
            items,
            vec![
                Ok(Some("Par".to_string())),
                Err("stream interrupted: Input validation error".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn provider_error_surfaces_as_final_reply() {
        let server = MockServer::start().await;
        let body = sse_body(
            &[r#"{"choices":[{"delta":{"content":"Par"}}]}"#, r#"{"error":"model overloaded"}"#]
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server).await;

        let client = OpenAIChatClient::new(None, "m".into(), server.uri(), Vec::new()).unwrap();
        let snapshots: Vec<String> = stream_reply(std::sync::Arc::new(client), request())
            .collect().await;

        assert_eq!(snapshots, vec!["Par", "Error: stream interrupted: model overloaded"]);
    }
}
