//! Inference backends behind one normalized interface
//!
//! Two variants exist:
//! - `ollama`: local model server, newline-delimited JSON stream
//! - `openai`: any OpenAI-compatible API, server-sent events with `[DONE]`
//!
//! Callers only ever hold a `ProviderHandle`; the adapters are the only code
//! that knows about wire differences.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, TimeoutsConfig};
use crate::errors::{ChatError, Result};
use crate::models::ModelDescriptor;
use crate::session::SessionSettings;
use crate::streaming::{ByteStream, CancelToken, ChunkStream};
use crate::types::Message;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Largest error body kept from a failed response
const MAX_ERROR_BODY_BYTES: usize = 4096;

/// Backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local model server (Ollama API)
    #[serde(alias = "ollama")]
    Local,

    /// OpenAI-compatible remote API
    #[serde(alias = "openai", alias = "openai_compat")]
    Remote,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Remote => "remote",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "ollama" => Ok(ProviderKind::Local),
            "remote" | "openai" | "openai_compat" => Ok(ProviderKind::Remote),
            other => Err(ChatError::Config(format!(
                "Unknown provider '{}' (expected 'local' or 'remote')",
                other
            ))),
        }
    }
}

/// Fully built chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,

    /// System prompt first, then the selected history window
    pub messages: Vec<Message>,

    /// Response token cap
    pub max_tokens: usize,

    pub temperature: f32,

    /// Context window the backend should allocate
    pub context_tokens: usize,

    /// Ask the backend to trade speed for memory (local only)
    pub low_resource_mode: bool,
}

/// Outcome of a reachability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Failed(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Capability set every backend variant implements
#[async_trait]
pub trait ChatProvider: Send + Sync + fmt::Debug {
    fn kind(&self) -> ProviderKind;

    fn base_url(&self) -> &str;

    /// Models the backend offers
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>>;

    /// Metadata for one model; `ModelNotFound` when absent
    async fn get_model_info(&self, model_id: &str) -> Result<ModelDescriptor>;

    /// Bounded reachability probe; never mutates anything
    async fn validate_connection(&self) -> ConnectionStatus;

    /// Start a generation.
    ///
    /// Fails only when the request cannot be started (unreachable backend,
    /// rejected credential, non-success status). Everything after that is
    /// reported through the returned stream's terminal chunk.
    async fn stream_chat(&self, request: ChatRequest, cancel: CancelToken) -> Result<ChunkStream>;
}

/// Opaque, shareable adapter handle
pub type ProviderHandle = Arc<dyn ChatProvider>;

/// Endpoint and credential for one adapter instance
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeouts: TimeoutsConfig,
}

/// Resolves the adapter a session should talk to
pub trait ProviderFactory: Send + Sync {
    fn provider_for(&self, settings: &SessionSettings) -> Result<ProviderHandle>;
}

/// Builds adapters from configuration, honouring per-session overrides
#[derive(Debug, Clone)]
pub struct ConfiguredProviders {
    config: Config,
}

impl ConfiguredProviders {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Effective endpoint settings for a session
    pub fn settings_for(&self, settings: &SessionSettings) -> ProviderSettings {
        let base_url = settings
            .base_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.config.base_url(settings.provider).to_string());

        let api_key = match settings.provider {
            ProviderKind::Local => None,
            ProviderKind::Remote => settings
                .api_key
                .clone()
                .or_else(|| self.config.remote.api_key.clone()),
        };

        ProviderSettings {
            base_url,
            api_key,
            timeouts: self.config.timeouts.clone(),
        }
    }

    pub fn build(&self, kind: ProviderKind, settings: ProviderSettings) -> Result<ProviderHandle> {
        Ok(match kind {
            ProviderKind::Local => Arc::new(OllamaProvider::new(settings)?),
            ProviderKind::Remote => Arc::new(OpenAiProvider::new(settings)?),
        })
    }
}

impl ProviderFactory for ConfiguredProviders {
    fn provider_for(&self, settings: &SessionSettings) -> Result<ProviderHandle> {
        let endpoint = self.settings_for(settings);
        self.build(settings.provider, endpoint)
    }
}

/// HTTP client shared by both adapters; only connection setup is bounded
pub(crate) fn http_client(timeouts: &TimeoutsConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeouts.connect())
        .build()
        .map_err(ChatError::Http)
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Send a request, bounding the wait for response headers
pub(crate) async fn send_bounded(
    request: reqwest::RequestBuilder,
    url: &str,
    limit: Duration,
) -> Result<reqwest::Response> {
    let limit_ms = limit.as_millis() as u64;
    match tokio::time::timeout(limit, request.send()).await {
        Err(_) => Err(ChatError::StreamTimeout {
            duration_ms: limit_ms,
        }),
        Ok(Err(e)) => Err(ChatError::from_transport(url, e, limit_ms)),
        Ok(Ok(response)) => Ok(response),
    }
}

/// Decode a JSON body under the same limit as the request; a server that
/// sends headers and then stalls reports `StreamTimeout`
pub(crate) async fn json_bounded<T: DeserializeOwned>(
    response: reqwest::Response,
    limit: Duration,
    what: &str,
) -> Result<T> {
    match tokio::time::timeout(limit, response.json::<T>()).await {
        Err(_) => Err(ChatError::StreamTimeout {
            duration_ms: limit.as_millis() as u64,
        }),
        Ok(Err(e)) => Err(ChatError::MalformedProviderResponse(format!("Invalid {}: {}", what, e))),
        Ok(Ok(value)) => Ok(value),
    }
}

/// Map a non-success status to the matching error kind
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = read_capped_error_body(response).await;
    Err(ChatError::from_status(status, body))
}

pub(crate) async fn read_capped_error_body(response: reqwest::Response) -> String {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{}...(truncated)", text.trim());
        }
    }
    String::from_utf8_lossy(&body).trim().to_string()
}

/// Response body as a stream of chunks with transport errors classified
pub(crate) fn body_stream(response: reqwest::Response, url: String, idle: Duration) -> ByteStream {
    let idle_ms = idle.as_millis() as u64;
    Box::pin(
        response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| ChatError::from_transport(&url, e, idle_ms))),
    )
}

/// Local server that answers every request with headers and a body that never finishes
#[cfg(test)]
pub(crate) async fn stalled_body_server() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 1000\r\n\r\n{\"models\":[")
                .await;
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("local".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
        assert_eq!("Ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
        assert_eq!("openai_compat".parse::<ProviderKind>().unwrap(), ProviderKind::Remote);
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_serde_aliases() {
        let kind: ProviderKind = serde_json::from_str("\"ollama\"").unwrap();
        assert_eq!(kind, ProviderKind::Local);
        let kind: ProviderKind = serde_json::from_str("\"openai_compat\"").unwrap();
        assert_eq!(kind, ProviderKind::Remote);
        assert_eq!(serde_json::to_string(&ProviderKind::Remote).unwrap(), "\"remote\"");
    }

    #[test]
    fn test_endpoint_join() {
        assert_eq!(endpoint("http://h:1/", "/api/chat"), "http://h:1/api/chat");
        assert_eq!(endpoint("https://api.x/v1", "models"), "https://api.x/v1/models");
    }

    #[test]
    fn test_session_overrides_win() {
        let mut config = Config::default();
        config.remote.api_key = Some("config-key".to_string());
        let providers = ConfiguredProviders::new(config);

        let mut settings = SessionSettings::for_provider(ProviderKind::Remote, &Config::default());
        let resolved = providers.settings_for(&settings);
        assert_eq!(resolved.api_key.as_deref(), Some("config-key"));
        assert_eq!(resolved.base_url, crate::config::DEFAULT_REMOTE_URL);

        settings.base_url = Some("https://api.groq.com/openai/v1".to_string());
        settings.api_key = Some("session-key".to_string());
        let resolved = providers.settings_for(&settings);
        assert_eq!(resolved.api_key.as_deref(), Some("session-key"));
        assert_eq!(resolved.base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_local_never_sends_key() {
        let mut config = Config::default();
        config.remote.api_key = Some("config-key".to_string());
        let providers = ConfiguredProviders::new(config.clone());

        let settings = SessionSettings::for_provider(ProviderKind::Local, &config);
        let resolved = providers.settings_for(&settings);
        assert!(resolved.api_key.is_none());
        assert_eq!(resolved.base_url, crate::config::DEFAULT_LOCAL_URL);

        let handle = providers.provider_for(&settings).unwrap();
        assert_eq!(handle.kind(), ProviderKind::Local);
    }
}
