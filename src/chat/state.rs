//! Per-request stream state machine
//!
//! ```text
//! Idle ─Start→ Building ─WindowReady→ Requesting ─FirstChunk→ Streaming
//!                                        │                      │
//!                                        ├─Finished→ Completed ←┤
//!                                        ├─Fail─────→ Failed ←──┤
//!                                        └─Cancel───→ Cancelled ←┘
//! ```
//!
//! `Completed`, `Cancelled` and `Failed` are terminal and absorb every
//! further event, so a late chunk or a second stop request cannot move a
//! finished request anywhere else.

use serde::Serialize;
use std::fmt;

use crate::errors::{ChatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// No request yet
    Idle,

    /// Selecting the history window
    Building,

    /// Waiting for the provider to start answering
    Requesting,

    /// Relaying chunks
    Streaming,

    /// Provider finished; response persisted (terminal)
    Completed,

    /// Stopped by the caller; partial response persisted (terminal)
    Cancelled,

    /// Provider or transport failure; nothing persisted (terminal)
    Failed,
}

/// Events that drive the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    Start,
    WindowReady,
    FirstChunk,
    Finished,
    Cancel,
    Fail,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Cancelled | StreamState::Failed
        )
    }

    /// Transition function `T: State × Event → Result<State>`
    pub fn transition(&self, event: StreamEvent) -> Result<StreamState> {
        use StreamEvent::*;
        use StreamState::*;

        let next = match (self, event) {
            (Idle, Start) => Building,

            (Building, WindowReady) => Requesting,
            (Building, Cancel) => Cancelled,

            (Requesting, FirstChunk) => Streaming,
            (Requesting, Finished) => Completed,
            (Requesting, Cancel) => Cancelled,
            (Requesting, Fail) => Failed,

            (Streaming, FirstChunk) => Streaming,
            (Streaming, Finished) => Completed,
            (Streaming, Cancel) => Cancelled,
            (Streaming, Fail) => Failed,

            (Completed, _) => Completed,
            (Cancelled, _) => Cancelled,
            (Failed, _) => Failed,

            (from, event) => {
                return Err(ChatError::InvalidTransition {
                    from: from.to_string(),
                    event: format!("{:?}", event),
                });
            }
        };

        Ok(next)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StreamState::Idle => "Idle",
            StreamState::Building => "Building",
            StreamState::Requesting => "Requesting",
            StreamState::Streaming => "Streaming",
            StreamState::Completed => "Completed",
            StreamState::Cancelled => "Cancelled",
            StreamState::Failed => "Failed",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [StreamState; 7] = [
        StreamState::Idle,
        StreamState::Building,
        StreamState::Requesting,
        StreamState::Streaming,
        StreamState::Completed,
        StreamState::Cancelled,
        StreamState::Failed,
    ];

    const ALL_EVENTS: [StreamEvent; 6] = [
        StreamEvent::Start,
        StreamEvent::WindowReady,
        StreamEvent::FirstChunk,
        StreamEvent::Finished,
        StreamEvent::Cancel,
        StreamEvent::Fail,
    ];

    #[test]
    fn test_happy_path() {
        let mut state = StreamState::Idle;
        for event in [
            StreamEvent::Start,
            StreamEvent::WindowReady,
            StreamEvent::FirstChunk,
            StreamEvent::FirstChunk,
            StreamEvent::Finished,
        ] {
            state = state.transition(event).unwrap();
        }
        assert_eq!(state, StreamState::Completed);
    }

    #[test]
    fn test_immediate_failure() {
        let state = StreamState::Requesting.transition(StreamEvent::Fail).unwrap();
        assert_eq!(state, StreamState::Failed);
    }

    #[test]
    fn test_terminal_states_absorb() {
        for state in [StreamState::Completed, StreamState::Cancelled, StreamState::Failed] {
            assert!(state.is_terminal());
            for event in ALL_EVENTS {
                assert_eq!(state.transition(event).unwrap(), state);
            }
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(StreamState::Idle.transition(StreamEvent::FirstChunk).is_err());
        assert!(StreamState::Building.transition(StreamEvent::Fail).is_err());
        assert!(StreamState::Streaming.transition(StreamEvent::Start).is_err());
    }

    #[test]
    fn test_every_active_state_can_be_cancelled_or_reach_terminal() {
        for state in ALL_STATES.iter().filter(|s| !s.is_terminal() && **s != StreamState::Idle) {
            let next = state.transition(StreamEvent::Cancel).unwrap();
            assert_eq!(next, StreamState::Cancelled);
        }
    }
}
