//! Local model server adapter (Ollama API)
//!
//! - Chat: `POST /api/chat`, newline-delimited JSON, `done: true` ends
//! - Inventory: `GET /api/tags`
//! - Metadata: `POST /api/show`
//! - Probe: `GET /`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    body_stream, check_status, endpoint, http_client, json_bounded, send_bounded, ChatProvider, ChatRequest,
    ConnectionStatus, ProviderKind, ProviderSettings,
};
use crate::config::TimeoutsConfig;
use crate::errors::{ChatError, Result};
use crate::models::ModelDescriptor;
use crate::streaming::{normalize, CancelToken, ChunkStream, LineParser, WireDecoder, WireEvent};
use crate::types::Message;

/// Ollama adapter; stateless apart from its HTTP client
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    timeouts: TimeoutsConfig,
}

impl OllamaProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        Ok(Self {
            client: http_client(&settings.timeouts)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeouts: settings.timeouts,
        })
    }

    fn chat_body(request: &ChatRequest) -> Value {
        let messages: Vec<OllamaMessage<'_>> = request.messages.iter().map(OllamaMessage::from).collect();

        let mut options = json!({
            "num_predict": request.max_tokens,
            "temperature": request.temperature,
            "num_ctx": request.context_tokens,
        });
        if request.low_resource_mode {
            options["low_vram"] = Value::Bool(true);
        }

        json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
            "options": options,
        })
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        let url = endpoint(&self.base_url, "/api/tags");
        let response = send_bounded(self.client.get(&url), &url, self.timeouts.connect()).await?;
        let response = check_status(response).await?;

        let tags: TagsResponse = json_bounded(response, self.timeouts.connect(), "model list").await?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelDescriptor {
                id: m.name.clone(),
                name: m.name,
                parameter_count: m.details.parameter_size,
                quantization: m.details.quantization_level,
                context_length: None,
                size_bytes: m.size,
                provider: ProviderKind::Local,
            })
            .collect())
    }

    async fn get_model_info(&self, model_id: &str) -> Result<ModelDescriptor> {
        let url = endpoint(&self.base_url, "/api/show");
        let request = self.client.post(&url).json(&json!({ "name": model_id }));
        let response = send_bounded(request, &url, self.timeouts.connect()).await?;

        if response.status().as_u16() == 404 {
            return Err(ChatError::ModelNotFound(model_id.to_string()));
        }
        let response = check_status(response).await?;

        let show: ShowResponse = json_bounded(response, self.timeouts.connect(), "model info").await?;

        let context_length = show
            .model_info
            .iter()
            .find(|(key, _)| key.contains("context_length"))
            .and_then(|(_, value)| value.as_u64());

        Ok(ModelDescriptor {
            id: model_id.to_string(),
            name: model_id.to_string(),
            parameter_count: show.details.parameter_size,
            quantization: show.details.quantization_level,
            context_length,
            size_bytes: None,
            provider: ProviderKind::Local,
        })
    }

    async fn validate_connection(&self) -> ConnectionStatus {
        let url = endpoint(&self.base_url, "/");
        match send_bounded(self.client.get(&url), &url, self.timeouts.validate()).await {
            Ok(response) if response.status().is_success() => ConnectionStatus::Connected,
            Ok(response) => ConnectionStatus::Failed(format!("HTTP {}", response.status())),
            Err(e) => ConnectionStatus::Failed(e.to_string()),
        }
    }

    async fn stream_chat(&self, request: ChatRequest, cancel: CancelToken) -> Result<ChunkStream> {
        let url = endpoint(&self.base_url, "/api/chat");
        let body = Self::chat_body(&request);

        tracing::debug!(model = %request.model, messages = request.messages.len(), "Starting local chat stream");

        let response = send_bounded(self.client.post(&url).json(&body), &url, self.timeouts.connect()).await?;
        let response = check_status(response).await?;

        let source = body_stream(response, url, self.timeouts.idle());
        Ok(normalize(source, NdjsonDecoder::default(), cancel, self.timeouts.idle()))
    }
}

/// Outbound message in Ollama's shape; images travel as bare base64
#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
}

impl<'a> From<&'a Message> for OllamaMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: &message.content,
            images: message
                .attachments
                .iter()
                .filter(|a| a.is_image())
                .map(|a| a.base64_payload())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    details: ModelDetails,
}

#[derive(Debug, Default, Deserialize)]
struct ModelDetails {
    #[serde(default)]
    parameter_size: Option<String>,
    #[serde(default)]
    quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    #[serde(default)]
    details: ModelDetails,
    #[serde(default)]
    model_info: serde_json::Map<String, Value>,
}

/// One NDJSON line of a chat stream
#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<ChatLineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatLineMessage {
    #[serde(default)]
    content: String,
}

/// Decodes newline-delimited chat objects
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    lines: LineParser,
}

impl NdjsonDecoder {
    fn decode_line(line: &str, events: &mut Vec<WireEvent>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let parsed: ChatLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                events.push(WireEvent::Malformed(format!("{}: {}", e, line)));
                return;
            }
        };

        if let Some(error) = parsed.error {
            events.push(WireEvent::Error(error));
            return;
        }
        if let Some(message) = parsed.message {
            if !message.content.is_empty() {
                events.push(WireEvent::Token(message.content));
            }
        }
        if parsed.done {
            events.push(WireEvent::Done(None));
        }
    }
}

impl WireDecoder for NdjsonDecoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<WireEvent>> {
        let mut events = Vec::new();
        for line in self.lines.add_bytes(bytes)? {
            Self::decode_line(&line, &mut events);
        }
        Ok(events)
    }

    fn finish(&mut self) -> Vec<WireEvent> {
        let mut events = Vec::new();
        if let Some(rest) = self.lines.finish() {
            Self::decode_line(&rest, &mut events);
        }
        events
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
