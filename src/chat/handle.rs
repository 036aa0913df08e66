//! In-flight generation bookkeeping
//!
//! `ActiveStreams` holds one slot per session with a request in flight;
//! acquiring an occupied slot fails with `SessionBusy`. The slot is released
//! when its `ActiveGuard` drops, on every exit path of the driver task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::state::{StreamEvent, StreamState};
use crate::errors::{ChatError, Result};
use crate::session::SessionId;
use crate::streaming::CancelToken;

/// Registry of sessions with an active request
#[derive(Debug, Clone, Default)]
pub struct ActiveStreams {
    slots: Arc<Mutex<HashMap<SessionId, CancelToken>>>,
}

impl ActiveStreams {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SessionId, CancelToken>> {
        // No code path panics while holding the lock; recover the map if one ever does
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the session's slot
    pub fn try_acquire(&self, session_id: SessionId, cancel: CancelToken) -> Result<ActiveGuard> {
        let mut slots = self.slots();
        if slots.contains_key(&session_id) {
            return Err(ChatError::SessionBusy(session_id.to_string()));
        }
        slots.insert(session_id, cancel);
        Ok(ActiveGuard {
            streams: self.clone(),
            session_id,
        })
    }

    /// Signal cancellation; false when nothing is active
    pub fn cancel(&self, session_id: SessionId) -> bool {
        match self.slots().get(&session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, session_id: SessionId) -> bool {
        self.slots().contains_key(&session_id)
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

/// Releases a session's slot on drop
#[derive(Debug)]
pub struct ActiveGuard {
    streams: ActiveStreams,
    session_id: SessionId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.streams.slots().remove(&self.session_id);
    }
}

/// Text the caller has actually received, shared with its `ChatStream`.
///
/// Sealing closes the log: a chunk recorded before the seal is both
/// delivered and persisted, a chunk refused after it is neither.
#[derive(Debug, Clone, Default)]
pub struct RelayLog {
    inner: Arc<Mutex<Relayed>>,
}

#[derive(Debug, Default)]
struct Relayed {
    text: String,
    chunks: usize,
    sealed: bool,
}

impl RelayLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn relayed(&self) -> MutexGuard<'_, Relayed> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a chunk handed to the caller; false once sealed
    pub fn record(&self, text: &str) -> bool {
        let mut relayed = self.relayed();
        if relayed.sealed {
            return false;
        }
        relayed.text.push_str(text);
        relayed.chunks += 1;
        true
    }

    /// Close the log and take the received text
    pub fn seal(&self) -> String {
        let mut relayed = self.relayed();
        relayed.sealed = true;
        std::mem::take(&mut relayed.text)
    }

    pub fn text(&self) -> String {
        self.relayed().text.clone()
    }

    pub fn chunks(&self) -> usize {
        self.relayed().chunks
    }

    pub fn is_sealed(&self) -> bool {
        self.relayed().sealed
    }
}

/// One generation: cancellation signal, state and relayed text
#[derive(Debug)]
pub struct StreamHandle {
    session_id: SessionId,
    cancel: CancelToken,
    state: StreamState,
    relay: RelayLog,
}

impl StreamHandle {
    pub fn new(session_id: SessionId, cancel: CancelToken) -> Self {
        Self {
            session_id,
            cancel,
            state: StreamState::Idle,
            relay: RelayLog::new(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn advance(&mut self, event: StreamEvent) -> Result<StreamState> {
        let next = self.state.transition(event)?;
        if next != self.state {
            tracing::debug!(
                session_id = %self.session_id,
                from = %self.state,
                to = %next,
                "Stream state transition"
            );
        }
        self.state = next;
        Ok(next)
    }

    /// Log the caller side records into
    pub fn relay(&self) -> &RelayLog {
        &self.relay
    }

    pub fn relayed_chunks(&self) -> usize {
        self.relay.chunks()
    }

    /// Stop accepting chunks and take what reached the caller
    pub fn take_accumulated(&mut self) -> String {
        self.relay.seal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let streams = ActiveStreams::new();
        let id = SessionId::new();

        let guard = streams.try_acquire(id, CancelToken::new()).unwrap();
        assert!(matches!(
            streams.try_acquire(id, CancelToken::new()),
            Err(ChatError::SessionBusy(_))
        ));
        assert!(streams.try_acquire(SessionId::new(), CancelToken::new()).is_ok());

        drop(guard);
        assert!(!streams.is_active(id));
        assert!(streams.try_acquire(id, CancelToken::new()).is_ok());
    }

    #[test]
    fn test_cancel_reaches_registered_token() {
        let streams = ActiveStreams::new();
        let id = SessionId::new();
        let token = CancelToken::new();

        assert!(!streams.cancel(id));
        let _guard = streams.try_acquire(id, token.clone()).unwrap();
        assert!(streams.cancel(id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_handle_accumulates_relayed_text() {
        let mut handle = StreamHandle::new(SessionId::new(), CancelToken::new());
        handle.advance(StreamEvent::Start).unwrap();
        handle.advance(StreamEvent::WindowReady).unwrap();
        handle.advance(StreamEvent::FirstChunk).unwrap();

        let caller_side = handle.relay().clone();
        assert!(caller_side.record("Hel"));
        assert!(caller_side.record("lo"));

        assert_eq!(handle.state(), StreamState::Streaming);
        assert_eq!(handle.relay().text(), "Hello");
        assert_eq!(handle.relayed_chunks(), 2);
        assert_eq!(handle.take_accumulated(), "Hello");
    }

    #[test]
    fn test_sealed_log_refuses_chunks() {
        let log = RelayLog::new();
        assert!(log.record("kept"));
        assert_eq!(log.seal(), "kept");
        assert!(log.is_sealed());

        assert!(!log.record("late"));
        assert_eq!(log.text(), "");
        assert_eq!(log.chunks(), 1);
    }
}
