//! Sliding-window selection of conversation history
//!
//! Picks the most recent messages that fit in the token budget left over
//! after the system prompt and the reserved response tokens:
//!
//! ```text
//! history_budget = max_context − estimate(system_prompt) − max_response
//! ```
//!
//! History is walked newest to oldest until the next message would exceed
//! the budget or the message cap is reached, whichever comes first. The
//! selection is a pure function of its inputs.

use crate::context::counter::TokenCounter;
use crate::types::Message;

/// Default cap on history messages per request
pub const DEFAULT_MAX_HISTORY_MESSAGES: usize = 20;

/// Result of a window build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    /// System prompt followed by the selected history in chronological order
    pub messages: Vec<Message>,

    /// Estimated tokens of the system prompt
    pub system_tokens: usize,

    /// Tokens available for history (0 when exhausted)
    pub history_budget: usize,

    /// Estimated tokens of the selected history
    pub history_tokens: usize,

    /// Number of older history messages left out
    pub dropped: usize,

    /// No room for history at all; only the system prompt is sent
    pub budget_exhausted: bool,
}

impl ContextWindow {
    /// Selected history, without the leading system prompt
    pub fn history(&self) -> &[Message] {
        &self.messages[1..]
    }

    /// True when the newest message alone was larger than the budget
    pub fn is_oversized(&self) -> bool {
        !self.budget_exhausted && self.history_tokens > self.history_budget
    }
}

/// Token-budgeted history selector
#[derive(Debug, Clone)]
pub struct WindowBuilder {
    counter: TokenCounter,
    max_messages: usize,
}

impl WindowBuilder {
    pub fn new() -> Self {
        Self::with_max_messages(DEFAULT_MAX_HISTORY_MESSAGES)
    }

    /// Builder with a custom message cap (clamped to at least one)
    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            counter: TokenCounter::new(),
            max_messages: max_messages.max(1),
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Select the messages to send for one request.
    ///
    /// The newest message is always kept when the budget is positive, even
    /// if it alone exceeds the budget, so the latest user turn is never
    /// silently dropped.
    pub fn build(
        &self,
        history: &[Message],
        system_prompt: &str,
        max_context_tokens: usize,
        max_response_tokens: usize,
    ) -> ContextWindow {
        let system_tokens = self.counter.estimate(system_prompt);
        let reserved = system_tokens.saturating_add(max_response_tokens);
        let system = Message::system(system_prompt);

        if max_context_tokens <= reserved {
            return ContextWindow {
                messages: vec![system],
                system_tokens,
                history_budget: 0,
                history_tokens: 0,
                dropped: history.len(),
                budget_exhausted: true,
            };
        }

        let history_budget = max_context_tokens - reserved;
        let mut start = history.len();
        let mut used = 0usize;

        for (index, message) in history.iter().enumerate().rev() {
            if history.len() - start >= self.max_messages {
                break;
            }

            let cost = self.counter.estimate_message(message);
            if used + cost > history_budget {
                if start == history.len() {
                    // Oversized newest message goes out alone.
                    start = index;
                    used = cost;
                }
                break;
            }

            used += cost;
            start = index;
        }

        let mut messages = Vec::with_capacity(history.len() - start + 1);
        messages.push(system);
        messages.extend_from_slice(&history[start..]);

        ContextWindow {
            messages,
            system_tokens,
            history_budget,
            history_tokens: used,
            dropped: start,
            budget_exhausted: false,
        }
    }
}

impl Default for WindowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
