use anyhow::Result;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::chat::Message;

/// Maps a message sequence to a scalar cost (message count, tokens, ...).
///
/// Implementations must be deterministic for a fixed input, otherwise window
/// selection is not reproducible.
pub trait CostEstimator: Send + Sync {
    fn estimate(&self, messages: &[Message]) -> Result<usize>;
}

impl<F> CostEstimator for F
where
    F: Fn(&[Message]) -> Result<usize> + Send + Sync,
{
    fn estimate(&self, messages: &[Message]) -> Result<usize> {
        self(messages)
    }
}

/// Cost = number of messages. Makes the budget a message-count window.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCounter;

impl CostEstimator for MessageCounter {
    fn estimate(&self, messages: &[Message]) -> Result<usize> {
        Ok(messages.len())
    }
}

/// Grapheme-based token heuristic
#[derive(Debug, Clone, Copy)]
pub struct TokenCounter {
    /// Average graphemes per token
    chars_per_token: usize,
    /// Fixed framing cost per message (role tag, separators)
    per_message_overhead: usize,
}

impl TokenCounter {
    pub fn new(chars_per_token: usize, per_message_overhead: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
            per_message_overhead,
        }
    }

    pub fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.graphemes(true).count();
        char_count.div_ceil(self.chars_per_token).max(1)
    }

    pub fn count_message(&self, message: &Message) -> usize {
        self.count_text(message.content()) + self.per_message_overhead
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        // ~4 chars per token for English; 4 tokens of chat framing per message
        Self::new(4, 4)
    }
}

impl CostEstimator for TokenCounter {
    fn estimate(&self, messages: &[Message]) -> Result<usize> {
        Ok(messages.iter().map(|msg| self.count_message(msg)).sum())
    }
}
