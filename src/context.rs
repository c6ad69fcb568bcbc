//! Context-window helpers for loop histories.
//!
//! Nothing here runs on its own. The functions are meant to be called from a
//! before-inference transformer, where trimming only shapes what the model is
//! sent and never touches the history the loop keeps.
//!
//! ```rust
//! use open_agent_loop::{Hooks, context::truncate_history};
//!
//! // Send at most the system prompt and the 20 most recent messages
//! let hooks = Hooks::new().add_before_inference(truncate_history(20, true));
//! ```

use crate::Result;
use crate::hooks::HistoryEvent;
use crate::types::{ContentBlock, Message, MessageRole};
use futures::future::{BoxFuture, FutureExt};

/// Estimate token count for message list
///
/// Character-based approximation (1 token ≈ 4 characters) with a small
/// per-message overhead for role formatting. Expect 70–85% accuracy across
/// model families and keep a safety margin when checking limits.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0;
    for message in messages {
        // role formatting, ~2 tokens
        total_chars += 8;

        for block in &message.content {
            total_chars += match block {
                ContentBlock::Text(text) => text.text.len(),
                ContentBlock::ToolUse(tool) => {
                    tool.name.len() + tool.id.len() + tool.input.to_string().len()
                }
                ContentBlock::ToolResult(result) => {
                    result.tool_use_id.len() + result.content.len()
                }
            };
        }
    }

    // conversation framing
    total_chars += 16;

    total_chars.div_ceil(4)
}

/// Keep the most recent `keep` messages, plus a leading system prompt when
/// `preserve_system` is set.
///
/// The cut never lands inside a tool exchange: tool results whose assistant
/// turn was cut off are dropped too, so the model never sees an orphaned
/// result.
pub fn truncate_messages(messages: &[Message], keep: usize, preserve_system: bool) -> Vec<Message> {
    if messages.len() <= keep {
        return messages.to_vec();
    }

    let has_system = preserve_system
        && messages
            .first()
            .is_some_and(|m| m.role == MessageRole::System);
    let floor = usize::from(has_system);

    let mut start = messages.len().saturating_sub(keep).max(floor);
    while start < messages.len() && messages[start].role == MessageRole::Tool {
        start += 1;
    }

    let mut result = Vec::with_capacity(messages.len() - start + floor);
    if has_system {
        result.push(messages[0].clone());
    }
    result.extend_from_slice(&messages[start..]);
    result
}

/// True when the estimate exceeds `limit * margin`.
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}

/// Before-inference transformer applying [`truncate_messages`].
pub fn truncate_history(
    keep: usize,
    preserve_system: bool,
) -> impl Fn(HistoryEvent) -> BoxFuture<'static, Result<Vec<Message>>> + Send + Sync + 'static {
    move |event: HistoryEvent| {
        let truncated = truncate_messages(&event.history, keep, preserve_system);
        if truncated.len() < event.history.len() {
            log::debug!(
                "Sending {} of {} messages at iteration {}",
                truncated.len(),
                event.history.len(),
                event.iteration
            );
        }
        async move { Ok(truncated) }.boxed()
    }
}

/// Before-inference transformer that truncates only once the estimate nears
/// `limit` tokens.
pub fn truncate_near_limit(
    limit: usize,
    margin: f32,
    keep: usize,
) -> impl Fn(HistoryEvent) -> BoxFuture<'static, Result<Vec<Message>>> + Send + Sync + 'static {
    move |event: HistoryEvent| {
        let history = if is_approaching_limit(&event.history, limit, margin) {
            truncate_messages(&event.history, keep, true)
        } else {
            event.history
        };
        async move { Ok(history) }.boxed()
    }
}
