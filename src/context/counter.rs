//! Token estimation
//!
//! Fast, approximate token counting using a word-based heuristic.
//! Backends reject over-budget requests on their own, so the estimate only
//! has to be cheap and roughly proportional to text length.
//!
//! # Algorithm
//!
//! ```text
//! estimate(text) = ⌈words(text) × 1.3⌉
//! ```
//!
//! Computed in integer arithmetic as `(words × 13 + 9) / 10`.

use crate::types::Message;

/// Tokens per word, scaled by ten
const TOKENS_PER_WORD_X10: usize = 13;

/// Word-based token estimator
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter;

impl TokenCounter {
    /// Create new token counter
    pub fn new() -> Self {
        Self
    }

    /// Estimate token count for text
    ///
    /// # Examples
    ///
    /// ```
    /// # use localchat::context::counter::TokenCounter;
    /// let counter = TokenCounter::new();
    ///
    /// // 10 words ≈ 13 tokens
    /// assert_eq!(counter.estimate("one two three four five six seven eight nine ten"), 13);
    /// assert_eq!(counter.estimate(""), 0);
    /// ```
    pub fn estimate(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        (words * TOKENS_PER_WORD_X10 + 9) / 10
    }

    /// Estimate a single message; attachment payloads are not counted
    pub fn estimate_message(&self, message: &Message) -> usize {
        self.estimate(&message.content)
    }

    /// Total estimate for a sequence of messages
    pub fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Attachment;

    #[test]
    fn test_empty_string() {
        let counter = TokenCounter::new();
        assert_eq!(counter.estimate(""), 0);
        assert_eq!(counter.estimate("   \n\t "), 0);
    }

    #[test]
    fn test_rounds_up() {
        let counter = TokenCounter::new();
        // 1 word × 1.3 = 1.3 → 2
        assert_eq!(counter.estimate("hello"), 2);
        // 11 words × 1.3 = 14.3 → 15
        assert_eq!(counter.estimate(&"w ".repeat(11)), 15);
        // 15 words × 1.3 = 19.5 → 20
        assert_eq!(counter.estimate(&"w ".repeat(15)), 20);
    }

    #[test]
    fn test_whitespace_kinds() {
        let counter = TokenCounter::new();
        assert_eq!(counter.estimate("a\nb\tc  d"), counter.estimate("a b c d"));
    }

    #[test]
    fn test_longer_text_not_smaller() {
        let counter = TokenCounter::new();
        let mut previous = 0;
        for words in 0..200 {
            let estimate = counter.estimate(&"word ".repeat(words));
            assert!(estimate >= previous);
            previous = estimate;
        }
    }

    #[test]
    fn test_attachments_ignored() {
        let counter = TokenCounter::new();
        let plain = Message::user("describe this image please");
        let with_image = plain.clone().with_attachments(vec![Attachment::new(
            "big.png",
            "image/png",
            format!("data:image/png;base64,{}", "QUFB ".repeat(10_000)),
        )]);
        assert_eq!(
            counter.estimate_message(&plain),
            counter.estimate_message(&with_image)
        );
    }

    #[test]
    fn test_estimate_messages() {
        let counter = TokenCounter::new();
        let messages = vec![Message::user("a b c d e f g h i j"), Message::assistant("k l m n o p q r s t")];
        assert_eq!(counter.estimate_messages(&messages), 26);
    }
}
