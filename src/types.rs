//! Core types for the tool-calling loop

use crate::hooks::Hooks;
use crate::injection::ToolInjectionStrategy;
use crate::retry::{DefaultRetryClassifier, RetryClassifier, RetryConfig};
use crate::tools::Tool;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Iteration ceiling used when none is configured.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Options for one loop engine
#[derive(Clone)]
pub struct LoopOptions {
    /// Inference calls allowed before the loop gives up on a plain answer
    pub max_iterations: u32,

    /// Backoff policy for inference retries
    pub retry: RetryConfig,

    /// Decides whether a failed inference call is retried
    pub classifier: Arc<dyn RetryClassifier>,

    /// Injection strategies, evaluated left to right after every tool call
    pub strategies: Vec<Arc<dyn ToolInjectionStrategy>>,

    /// Inspectors and transformers
    pub hooks: Hooks,
}

impl std::fmt::Debug for LoopOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopOptions")
            .field("max_iterations", &self.max_iterations)
            .field("retry", &self.retry)
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            retry: RetryConfig::default(),
            classifier: Arc::new(DefaultRetryClassifier::default()),
            strategies: Vec::new(),
            hooks: Hooks::new(),
        }
    }
}

impl LoopOptions {
    pub fn builder() -> LoopOptionsBuilder {
        LoopOptionsBuilder::default()
    }
}

/// Builder for LoopOptions
#[derive(Default)]
pub struct LoopOptionsBuilder {
    max_iterations: Option<u32>,
    retry: Option<RetryConfig>,
    classifier: Option<Arc<dyn RetryClassifier>>,
    strategies: Vec<Arc<dyn ToolInjectionStrategy>>,
    hooks: Hooks,
}

impl std::fmt::Debug for LoopOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopOptionsBuilder")
            .field("max_iterations", &self.max_iterations)
            .field("retry", &self.retry)
            .field("strategies", &format!("{} strategies", self.strategies.len()))
            .finish()
    }
}

impl LoopOptionsBuilder {
    pub fn max_iterations(mut self, iterations: u32) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn classifier(mut self, classifier: impl RetryClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn strategy(mut self, strategy: impl ToolInjectionStrategy + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Add a strategy the caller keeps a handle to.
    pub fn shared_strategy(mut self, strategy: Arc<dyn ToolInjectionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validate and build. Without an explicit ceiling, the environment
    /// (see [`crate::config::get_max_iterations`]) or the default applies.
    pub fn build(self) -> crate::Result<LoopOptions> {
        let max_iterations = match self.max_iterations {
            Some(n) => n,
            None => crate::config::get_max_iterations(None)?,
        };
        if max_iterations == 0 {
            return Err(crate::Error::config("max_iterations must be at least 1"));
        }

        let retry = self.retry.unwrap_or_default();
        if retry.max_attempts == 0 {
            return Err(crate::Error::config("retry max_attempts must be at least 1"));
        }

        Ok(LoopOptions {
            max_iterations,
            retry,
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(DefaultRetryClassifier::default())),
            strategies: self.strategies,
            hooks: self.hooks,
        })
    }
}

/// Message role in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Content block types that can appear in messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextBlock {
    pub text: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

impl ToolUseBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Stringified result of a tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResultBlock {
    pub fn new(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::new(tool_use_id, content)
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn new(role: MessageRole, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![ContentBlock::Text(TextBlock::new(text))])
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Assistant message holding only text
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![ContentBlock::Text(TextBlock::new(text))])
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, vec![ContentBlock::Text(TextBlock::new(text))])
    }

    /// Tool-role message carrying one tool result
    pub fn tool_result(result: ToolResultBlock) -> Self {
        Self::new(MessageRole::Tool, vec![ContentBlock::ToolResult(result)])
    }

    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(tool_use) => Some(tool_use),
                _ => None,
            })
            .collect()
    }

    pub fn tool_results(&self) -> Vec<&ToolResultBlock> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult(result) => Some(result),
                _ => None,
            })
            .collect()
    }
}

/// Token accounting reported by the model server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One completed inference call
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResponse {
    /// Assistant message: text and/or tool-use blocks
    pub message: Message,
    pub usage: Option<Usage>,
}

impl InferenceResponse {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn text_content(&self) -> String {
        self.message.text()
    }

    pub fn tool_calls(&self) -> Vec<&ToolUseBlock> {
        self.message.tool_uses()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.message
            .content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse(_)))
    }
}

/// Single non-streaming call to a model.
///
/// Timeouts belong to the implementation; report them as [`crate::Error::Timeout`]
/// so the retry classifier treats them as transient.
#[async_trait]
pub trait InferenceCall: Send + Sync {
    async fn infer(
        &self,
        history: &[Message],
        visible_tools: &[Arc<Tool>],
    ) -> crate::Result<InferenceResponse>;
}
