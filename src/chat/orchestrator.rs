//! Streaming orchestrator - main coordinator
//!
//! Runs one generation per send request:
//! - claims the session's active slot (`SessionBusy` when taken)
//! - builds the history window and the outbound user turn
//! - starts the provider stream and relays chunks to the caller in order
//! - persists the exchange on completion or on a cancel with content
//!
//! Each request runs in its own task so requests for different sessions
//! proceed in parallel. Events reach the caller through a bounded channel;
//! dropping the returned `ChatStream` cancels the request. A token counts as
//! relayed only once the caller has pulled it, so a cancel persists exactly
//! what the caller saw.

use chrono::Utc;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::events::ChatEvent;
use super::handle::{ActiveGuard, ActiveStreams, RelayLog, StreamHandle};
use super::state::StreamEvent;
use crate::attachments::outbound_user_turn;
use crate::config::Config;
use crate::context::WindowBuilder;
use crate::errors::{ChatError, Result};
use crate::providers::{ChatRequest, ProviderFactory, ProviderHandle};
use crate::search::{augment, date_header, grounded_system_prompt, WebSearch};
use crate::session::{Session, SessionId, SessionStore};
use crate::streaming::{CancelToken, StreamChunk};
use crate::types::{Attachment, Message};

/// Events buffered between the driver task and the caller
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Inbound send-message command
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub session_id: SessionId,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub web_search: bool,
}

impl SendRequest {
    pub fn new(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            attachments: Vec::new(),
            web_search: false,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }
}

/// Caller side of one generation
#[derive(Debug)]
pub struct ChatStream {
    session_id: SessionId,
    rx: mpsc::Receiver<ChatEvent>,
    cancel: CancelToken,
    relay: RelayLog,
}

impl ChatStream {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.next().await
    }

    /// Same effect as a stop command for this session
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for ChatStream {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChatEvent>> {
        loop {
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(ChatEvent::Token { token })) => {
                    // Tokens still buffered once cancellation is seen are discarded
                    if self.cancel.is_cancelled() || !self.relay.record(&token) {
                        continue;
                    }
                    return Poll::Ready(Some(ChatEvent::Token { token }));
                }
                other => return other,
            }
        }
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Coordinates sessions, the window builder and provider adapters
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: SessionStore,
    providers: Arc<dyn ProviderFactory>,
    active: ActiveStreams,
    window: WindowBuilder,
    search: Option<Arc<dyn WebSearch>>,
    event_buffer: usize,
}

impl ChatOrchestrator {
    pub fn new(store: SessionStore, providers: Arc<dyn ProviderFactory>, config: &Config) -> Self {
        Self {
            store,
            providers,
            active: ActiveStreams::new(),
            window: WindowBuilder::with_max_messages(config.memory.max_history_messages),
            search: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn is_active(&self, session_id: SessionId) -> bool {
        self.active.is_active(session_id)
    }

    /// Adapter the session currently points at
    pub async fn provider_for(&self, session_id: SessionId) -> Result<ProviderHandle> {
        let session = self.store.get(session_id).await?;
        self.providers.provider_for(&session.settings)
    }

    /// Start a generation.
    ///
    /// Hard errors (`SessionNotFound`, `SessionBusy`, `NoModelSelected`)
    /// are returned here and leave the session untouched. Provider failures
    /// arrive as the stream's terminal error event.
    pub async fn send(&self, request: SendRequest) -> Result<ChatStream> {
        let session_id = request.session_id;
        let cancel = CancelToken::new();
        let guard = self.active.try_acquire(session_id, cancel.clone())?;

        // Snapshot after claiming the slot so no other request can append meanwhile
        let session = self.store.get(session_id).await?;
        let model = session
            .settings
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ChatError::NoModelSelected(session_id.to_string()))?;
        let provider = self.providers.provider_for(&session.settings)?;

        let mut handle = StreamHandle::new(session_id, cancel.clone());
        handle.advance(StreamEvent::Start)?;
        let relay = handle.relay().clone();

        tracing::info!(
            session_id = %session_id,
            provider = %provider.kind(),
            model = %model,
            web_search = request.web_search,
            attachments = request.attachments.len(),
            "Generation started"
        );

        let (tx, rx) = mpsc::channel(self.event_buffer);
        let driver = Driver {
            store: self.store.clone(),
            provider,
            window: self.window.clone(),
            search: self.search.clone(),
            session,
            model,
            request,
            handle,
            tx,
            guard: Some(guard),
        };
        tokio::spawn(driver.run());

        Ok(ChatStream {
            session_id,
            rx,
            cancel,
            relay,
        })
    }

    /// Cancel the session's active generation; no-op when none is active
    pub fn stop(&self, session_id: SessionId) -> bool {
        let stopped = self.active.cancel(session_id);
        if stopped {
            tracing::info!(session_id = %session_id, "Stop requested");
        }
        stopped
    }
}

enum Outcome {
    Completed(String),
    Cancelled,
    Failed(ChatError),
}

/// Task state for one generation
struct Driver {
    store: SessionStore,
    provider: ProviderHandle,
    window: WindowBuilder,
    search: Option<Arc<dyn WebSearch>>,
    session: Session,
    model: String,
    request: SendRequest,
    handle: StreamHandle,
    tx: mpsc::Sender<ChatEvent>,
    guard: Option<ActiveGuard>,
}

impl Driver {
    async fn run(mut self) {
        let outcome = self.generate().await;
        self.finish(outcome).await;
    }

    fn step(&mut self, event: StreamEvent) {
        if let Err(e) = self.handle.advance(event) {
            tracing::warn!(session_id = %self.session.id, error = %e, "Ignoring stream event");
        }
    }

    fn cancelled(&mut self) -> Outcome {
        self.step(StreamEvent::Cancel);
        Outcome::Cancelled
    }

    async fn generate(&mut self) -> Outcome {
        let cancel = self.handle.cancel_token().clone();

        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.cancelled(),
            request = self.build_request() => request,
        };
        self.step(StreamEvent::WindowReady);

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.cancelled(),
            started = self.provider.stream_chat(request, cancel.clone()) => started,
        };
        let mut stream = match started {
            Ok(stream) => stream,
            Err(e) => return Outcome::Failed(e),
        };

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(StreamChunk::Token(text)) => {
                    if cancel.is_cancelled() {
                        return self.cancelled();
                    }
                    self.step(StreamEvent::FirstChunk);

                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.cancelled(),
                        sent = self.tx.send(ChatEvent::token(text)) => sent,
                    };
                    if sent.is_err() {
                        tracing::debug!(session_id = %self.session.id, "Receiver dropped; cancelling");
                        cancel.cancel();
                        return self.cancelled();
                    }
                }
                Some(StreamChunk::Done { content }) => {
                    self.step(StreamEvent::Finished);
                    return Outcome::Completed(content);
                }
                Some(StreamChunk::Error(e)) => return Outcome::Failed(e),
                None if cancel.is_cancelled() => return self.cancelled(),
                None => {
                    return Outcome::Failed(ChatError::MalformedProviderResponse(
                        "stream ended without a completion marker".to_string(),
                    ))
                }
            }
        }
    }

    /// Window plus the outbound form of the new user turn
    async fn build_request(&self) -> ChatRequest {
        let settings = &self.session.settings;
        let text = &self.request.text;

        let (system_prompt, outbound_text) = if self.request.web_search {
            let augmented = match &self.search {
                Some(search) => augment(search.as_ref(), text, Utc::now()).await,
                None => format!("{}\n---\n{}", date_header(Utc::now()), text),
            };
            (grounded_system_prompt(&self.session.system_prompt), augmented)
        } else {
            (self.session.system_prompt.clone(), text.clone())
        };

        // Only the new turn carries files; earlier attachments are not re-sent
        let mut history: Vec<Message> = self
            .session
            .messages
            .iter()
            .map(|m| Message::new(m.role, m.content.clone()))
            .collect();
        history.push(self.user_message());

        let window = self.window.build(
            &history,
            &system_prompt,
            settings.max_context_tokens,
            settings.max_response_tokens,
        );

        if window.budget_exhausted {
            tracing::warn!(
                session_id = %self.session.id,
                max_context = settings.max_context_tokens,
                max_response = settings.max_response_tokens,
                system_tokens = window.system_tokens,
                "No history budget left; sending system prompt only"
            );
        } else {
            tracing::debug!(
                session_id = %self.session.id,
                sent = window.history().len(),
                dropped = window.dropped,
                history_tokens = window.history_tokens,
                history_budget = window.history_budget,
                "History window built"
            );
        }

        let mut messages = window.messages;
        // The newest history entry is always the new user turn when any history was kept
        if messages.len() > 1 {
            if let Some(last) = messages.last_mut() {
                *last = outbound_user_turn(&outbound_text, &self.request.attachments);
            }
        }

        ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: settings.max_response_tokens,
            temperature: settings.temperature,
            context_tokens: settings.max_context_tokens,
            low_resource_mode: settings.low_resource_mode,
        }
    }

    /// The user turn as persisted
    fn user_message(&self) -> Message {
        Message::user(self.request.text.clone()).with_attachments(self.request.attachments.clone())
    }

    async fn persist(&self, assistant: String) {
        let exchange = vec![self.user_message(), Message::assistant(assistant)];
        if let Err(e) = self.store.append_messages(self.session.id, exchange).await {
            tracing::warn!(session_id = %self.session.id, error = %e, "Could not persist exchange");
        }
    }

    async fn finish(mut self, outcome: Outcome) {
        let session_id = self.session.id;

        let terminal = match outcome {
            Outcome::Completed(content) => {
                self.persist(content.clone()).await;
                tracing::info!(
                    session_id = %session_id,
                    chunks = self.handle.relayed_chunks(),
                    "Generation completed"
                );
                Some(ChatEvent::done(content))
            }
            Outcome::Cancelled => {
                let partial = self.handle.take_accumulated();
                if partial.is_empty() {
                    tracing::info!(session_id = %session_id, "Generation cancelled before any output");
                } else {
                    self.persist(partial).await;
                    tracing::info!(
                        session_id = %session_id,
                        chunks = self.handle.relayed_chunks(),
                        "Generation cancelled; partial response kept"
                    );
                }
                None
            }
            Outcome::Failed(error) => {
                self.step(StreamEvent::Fail);
                tracing::error!(
                    session_id = %session_id,
                    kind = error.kind(),
                    error = %error,
                    "Generation failed"
                );
                Some(ChatEvent::from(&error))
            }
        };

        // Free the slot before the caller can observe the end of the stream
        drop(self.guard.take());

        if let Some(event) = terminal {
            // Receiver may already be gone
            let _ = self.tx.send(event).await;
        }
    }
}
