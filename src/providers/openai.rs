//! OpenAI-compatible adapter
//!
//! Works with any service implementing the chat completions API (OpenAI,
//! DeepSeek, Groq, Together, OpenRouter, LM Studio, vLLM, ...).
//!
//! - Chat: `POST /chat/completions`, server-sent events ending in `[DONE]`
//! - Inventory, metadata and probe: `GET /models`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    body_stream, check_status, endpoint, http_client, json_bounded, send_bounded, ChatProvider, ChatRequest,
    ConnectionStatus, ProviderKind, ProviderSettings,
};
use crate::config::TimeoutsConfig;
use crate::errors::{ChatError, Result};
use crate::models::ModelDescriptor;
use crate::streaming::{normalize, CancelToken, ChunkStream, SseParser, WireDecoder, WireEvent};
use crate::types::Message;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeouts: TimeoutsConfig,
}

// Keep the credential out of logs
impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        Ok(Self {
            client: http_client(&settings.timeouts)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.filter(|k| !k.is_empty()),
            timeouts: settings.timeouts,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn fetch_models(&self, limit: std::time::Duration) -> Result<Vec<RemoteModel>> {
        let url = endpoint(&self.base_url, "/models");
        let response = send_bounded(self.authorized(self.client.get(&url)), &url, limit).await?;
        let response = check_status(response).await?;

        let list: ModelList = json_bounded(response, limit, "model list").await?;
        Ok(list.data)
    }

    fn chat_body(request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(wire_message).collect();
        json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": true,
        })
    }
}

/// Plain string content, or a content-part array when images are attached
fn wire_message(message: &Message) -> Value {
    if !message.has_images() {
        return json!({ "role": message.role.as_str(), "content": message.content });
    }

    let mut parts = vec![json!({ "type": "text", "text": message.content })];
    parts.extend(
        message
            .attachments
            .iter()
            .filter(|a| a.is_image())
            .map(|a| json!({ "type": "image_url", "image_url": { "url": a.data_url } })),
    );
    json!({ "role": message.role.as_str(), "content": parts })
}

impl From<RemoteModel> for ModelDescriptor {
    fn from(model: RemoteModel) -> Self {
        let mut descriptor = ModelDescriptor::bare(model.id, ProviderKind::Remote);
        descriptor.context_length = model.context_length;
        descriptor
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Remote
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        let models = self.fetch_models(self.timeouts.connect()).await?;
        Ok(models.into_iter().map(ModelDescriptor::from).collect())
    }

    async fn get_model_info(&self, model_id: &str) -> Result<ModelDescriptor> {
        self.fetch_models(self.timeouts.connect())
            .await?
            .into_iter()
            .find(|m| m.id == model_id)
            .map(ModelDescriptor::from)
            .ok_or_else(|| ChatError::ModelNotFound(model_id.to_string()))
    }

    async fn validate_connection(&self) -> ConnectionStatus {
        match self.fetch_models(self.timeouts.validate()).await {
            Ok(_) => ConnectionStatus::Connected,
            Err(e) => ConnectionStatus::Failed(e.to_string()),
        }
    }

    async fn stream_chat(&self, request: ChatRequest, cancel: CancelToken) -> Result<ChunkStream> {
        let url = endpoint(&self.base_url, "/chat/completions");
        let body = Self::chat_body(&request);

        tracing::debug!(model = %request.model, messages = request.messages.len(), "Starting remote chat stream");

        let http = self
            .authorized(self.client.post(&url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body);
        let response = send_bounded(http, &url, self.timeouts.connect()).await?;
        let response = check_status(response).await?;

        let source = body_stream(response, url, self.timeouts.idle());
        Ok(normalize(source, SseDecoder::default(), cancel, self.timeouts.idle()))
    }
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<RemoteModel>,
}

#[derive(Debug, Deserialize)]
struct RemoteModel {
    id: String,
    /// Non-standard; some aggregators report it
    #[serde(default)]
    context_length: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamErrorBody {
    Object { message: String },
    Text(String),
}

impl StreamErrorBody {
    fn into_message(self) -> String {
        match self {
            StreamErrorBody::Object { message } | StreamErrorBody::Text(message) => message,
        }
    }
}

/// Decodes `data:` payloads of a completions event stream
#[derive(Debug, Default)]
pub struct SseDecoder {
    events: SseParser,
}

impl SseDecoder {
    fn decode_payload(payload: &str, events: &mut Vec<WireEvent>) {
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == DONE_SENTINEL {
            events.push(WireEvent::Done(None));
            return;
        }

        let chunk: CompletionChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                events.push(WireEvent::Malformed(format!("{}: {}", e, payload)));
                return;
            }
        };

        if let Some(error) = chunk.error {
            events.push(WireEvent::Error(error.into_message()));
            return;
        }

        let text = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            events.push(WireEvent::Token(text));
        }
    }
}

impl WireDecoder for SseDecoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<WireEvent>> {
        let mut events = Vec::new();
        for payload in self.events.add_bytes(bytes)? {
            Self::decode_payload(&payload, &mut events);
        }
        Ok(events)
    }

    fn finish(&mut self) -> Vec<WireEvent> {
        let mut events = Vec::new();
        if let Some(payload) = self.events.finish() {
            Self::decode_payload(&payload, &mut events);
        }
        events
    }

    fn provider_name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::StreamChunk;
    use crate::types::Attachment;
    use futures_util::StreamExt;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str, api_key: Option<&str>, idle_secs: u64) -> OpenAiProvider {
        OpenAiProvider::new(ProviderSettings {
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
            timeouts: TimeoutsConfig {
                connect_secs: 2,
                validate_secs: 1,
                idle_secs,
            },
        })
        .unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::system("be brief"), Message::user("hi")],
            max_tokens: 2048,
            temperature: 0.7,
            context_tokens: 8192,
            low_resource_mode: true,
        }
    }

    fn sse(payloads: &[&str]) -> String {
        payloads.iter().map(|p| format!("data: {}\n\n", p)).collect()
    }

    #[test]
    fn test_decoder_tokens_and_sentinel() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .decode(sse(&[r#"{"choices":[{"delta":{"role":"assistant"}}]}"#, r#"{"choices":[{"delta":{"content":"Hi"}}]}"#, "[DONE]"]).as_bytes())
            .unwrap();
        assert_eq!(events, vec![WireEvent::Token("Hi".into()), WireEvent::Done(None)]);
    }

    #[test]
    fn test_decoder_error_payload() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .decode(b"data: {\"error\":{\"message\":\"overloaded\",\"type\":\"server_error\"}}\n\n")
            .unwrap();
        assert_eq!(events, vec![WireEvent::Error("overloaded".into())]);
    }

    #[test]
    fn test_decoder_keepalive_and_garbage() {
        let mut decoder = SseDecoder::default();
        let events = decoder.decode(b": ping\n\ndata: {oops\n\n").unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WireEvent::Malformed(_)));
    }

    #[test]
    fn test_vision_content_parts() {
        let image = Attachment::new("a.png", "image/png", "data:image/png;base64,AAAA");
        let msg = Message::user("describe").with_attachments(vec![image]);
        let wire = wire_message(&msg);
        assert_eq!(wire["content"][0], json!({"type": "text", "text": "describe"}));
        assert_eq!(
            wire["content"][1],
            json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}})
        );
        assert_eq!(wire_message(&Message::user("plain"))["content"], json!("plain"));
    }

    #[tokio::test]
    async fn test_stream_chat_sse() {
        let server = MockServer::start().await;
        let body = sse(&[
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]);
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let base = format!("{}/v1", server.uri());
        let stream = provider(&base, Some("sk-test"), 5)
            .stream_chat(request(), CancelToken::new())
            .await
            .unwrap();
        let chunks: Vec<StreamChunk> = stream.collect().await;

        assert_eq!(chunks.len(), 3);
        assert!(matches!(&chunks[2], StreamChunk::Done { content } if content == "Hello"));
    }

    #[tokio::test]
    async fn test_rejected_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":{\"message\":\"Incorrect API key\"}}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = provider(&server.uri(), Some("bad"), 5);
        let result = provider.stream_chat(request(), CancelToken::new()).await;
        assert!(matches!(result, Err(ChatError::ProviderAuthError(msg)) if msg.contains("Incorrect API key")));

        let listed = provider.list_models().await;
        assert!(matches!(listed, Err(ChatError::ProviderAuthError(_))));
        assert!(!provider.validate_connection().await.is_connected());
    }

    #[tokio::test]
    async fn test_list_and_lookup_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [
                    {"id": "gpt-4o", "object": "model"},
                    {"id": "deepseek-chat", "context_length": 65536}
                ]
            })))
            .mount(&server)
            .await;

        let provider = provider(&server.uri(), None, 5);
        let models = provider.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert!(models.iter().all(|m| m.quantization.is_none()));

        let info = provider.get_model_info("deepseek-chat").await.unwrap();
        assert_eq!(info.context_length, Some(65536));

        let missing = provider.get_model_info("gpt-5").await;
        assert!(matches!(missing, Err(ChatError::ModelNotFound(_))));
        assert!(provider.validate_connection().await.is_connected());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse(&["[DONE]"]), "text/event-stream")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let result = provider(&server.uri(), None, 1)
            .stream_chat(request(), CancelToken::new())
            .await;
        assert!(matches!(result, Err(ChatError::StreamTimeout { duration_ms: 2000 })));
    }

    #[tokio::test]
    async fn test_stalled_model_list_body_times_out() {
        let base_url = crate::providers::stalled_body_server().await;
        let provider = provider(&base_url, None, 5);

        let result = tokio::time::timeout(Duration::from_secs(10), provider.list_models())
            .await
            .expect("list_models must not hang");
        assert!(matches!(result, Err(ChatError::StreamTimeout { duration_ms: 2000 })));

        let status = provider.validate_connection().await;
        assert!(matches!(status, ConnectionStatus::Failed(_)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = provider("http://localhost", Some("sk-secret"), 5);
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("redacted"));
    }
}
