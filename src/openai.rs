//! OpenAI-compatible inference adapter.
//!
//! [`OpenAiClient`] talks to any server exposing `/chat/completions` with SSE
//! streaming (LM Studio, Ollama, llama.cpp, vLLM, hosted endpoints) and
//! implements both collaborator traits the loop consumes:
//!
//! - [`InferenceCall`]: chunks are folded by a [`ToolCallAggregator`] into one
//!   assistant message with text and tool-use blocks
//! - [`StreamingInference`]: content deltas are handed out as raw fragments for
//!   the streaming decoder
//!
//! Tool calls arrive as deltas spread over many chunks:
//!
//! ```text
//! Chunk 1: { tool_calls: [{ index: 0, id: "call_abc", function: { name: "search" } }] }
//! Chunk 2: { tool_calls: [{ index: 0, function: { arguments: "{\"q" } }] }
//! Chunk 3: { tool_calls: [{ index: 0, function: { arguments: "\":\"rust\"}" } }] }
//! Chunk 4: { finish_reason: "tool_calls" }
//! ```
//!
//! Arguments are only parsed as JSON once the call is complete.

use crate::config;
use crate::streaming::{FragmentStream, StreamingInference};
use crate::tools::Tool;
use crate::types::{
    ContentBlock, InferenceCall, InferenceResponse, Message, MessageRole, TextBlock, ToolUseBlock,
    Usage,
};
use crate::{Error, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI API message format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAIFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIFunction {
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

/// One SSE chunk. Servers differ on which envelope fields they send, so only
/// `choices` is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
    /// Sent in a final chunk when `stream_options.include_usage` is set
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: OpenAIDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIDelta {
    pub role: Option<String>,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub call_type: Option<String>,
    pub function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIFunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Folds streamed chunks into content blocks.
///
/// Text deltas are concatenated; tool-call deltas are accumulated per index
/// and emitted in index order. Blocks are released when a choice reports a
/// `finish_reason`, or by [`finish`](Self::finish) for servers that end the
/// stream without one.
#[derive(Debug, Default)]
pub struct ToolCallAggregator {
    text: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    usage: Option<Usage>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl PartialToolCall {
    fn into_block(self) -> Result<Option<ContentBlock>> {
        let (Some(id), Some(name)) = (self.id, self.name) else {
            log::warn!("Dropping tool call delta without id or name");
            return Ok(None);
        };

        let input = if self.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&self.arguments).map_err(|e| {
                Error::stream(format!("Failed to parse arguments of tool '{}': {}", name, e))
            })?
        };

        Ok(Some(ContentBlock::ToolUse(ToolUseBlock::new(id, name, input))))
    }
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one chunk. Returns the completed blocks once a choice
    /// finishes, otherwise an empty vector.
    pub fn process_chunk(&mut self, chunk: OpenAIChunk) -> Result<Vec<ContentBlock>> {
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let mut finished = false;
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                self.text.push_str(&content);
            }

            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let entry = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    entry.id = Some(id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        entry.name = Some(name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }

            finished |= choice.finish_reason.is_some();
        }

        if finished {
            self.flush()
        } else {
            Ok(Vec::new())
        }
    }

    /// Usage reported so far.
    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Release whatever is still pending at end of stream.
    pub fn finish(&mut self) -> Result<Vec<ContentBlock>> {
        self.flush()
    }

    fn flush(&mut self) -> Result<Vec<ContentBlock>> {
        let mut blocks = Vec::new();
        if !self.text.is_empty() {
            blocks.push(ContentBlock::Text(TextBlock::new(std::mem::take(
                &mut self.text,
            ))));
        }
        for (_, partial) in std::mem::take(&mut self.tool_calls) {
            blocks.extend(partial.into_block()?);
        }
        Ok(blocks)
    }
}

/// Parse an SSE byte stream into chunks. The `[DONE]` sentinel and empty
/// events are skipped.
pub fn parse_sse<S, B, E>(bytes: S) -> impl Stream<Item = Result<OpenAIChunk>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    bytes.eventsource().filter_map(|event| async move {
        match event {
            Ok(event) => {
                let data = event.data.trim();
                if data.is_empty() || data == "[DONE]" {
                    return None;
                }
                Some(
                    serde_json::from_str::<OpenAIChunk>(data)
                        .map_err(|e| Error::stream(format!("Failed to parse chunk: {}", e))),
                )
            }
            Err(e) => Some(Err(Error::stream(format!("SSE transport failed: {}", e)))),
        }
    })
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

/// Convert loop history to wire messages.
///
/// Every tool result becomes its own `tool` message; an assistant turn with
/// tool calls carries them in `tool_calls` with any text as content.
pub fn to_openai_messages(history: &[Message]) -> Vec<OpenAIMessage> {
    let mut messages = Vec::with_capacity(history.len());

    for message in history {
        let results = message.tool_results();
        if !results.is_empty() {
            messages.extend(results.into_iter().map(|result| OpenAIMessage {
                role: "tool".to_string(),
                content: result.content.clone(),
                tool_calls: None,
                tool_call_id: Some(result.tool_use_id.clone()),
            }));
            continue;
        }

        let uses = message.tool_uses();
        let tool_calls = (!uses.is_empty()).then(|| {
            uses.into_iter()
                .map(|tool_use| OpenAIToolCall {
                    id: tool_use.id.clone(),
                    call_type: "function".to_string(),
                    function: OpenAIFunction {
                        name: tool_use.name.clone(),
                        arguments: tool_use.input.to_string(),
                    },
                })
                .collect()
        });

        messages.push(OpenAIMessage {
            role: role_name(message.role).to_string(),
            content: message.text(),
            tool_calls,
            tool_call_id: None,
        });
    }

    messages
}

/// Connection settings for [`OpenAiClient`]
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl OpenAiConfig {
    pub fn builder() -> OpenAiConfigBuilder {
        OpenAiConfigBuilder::default()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Builder for [`OpenAiConfig`].
///
/// Model and base URL fall back to the `config` environment resolvers.
#[derive(Debug, Default)]
pub struct OpenAiConfigBuilder {
    model: Option<String>,
    base_url: Option<String>,
    provider: Option<config::Provider>,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
}

impl OpenAiConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Use a provider's default URL unless a base URL is set.
    pub fn provider(mut self, provider: config::Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<OpenAiConfig> {
        let model = match self.model {
            Some(model) => Some(model),
            None => config::get_model(None, true),
        }
        .filter(|model| !model.trim().is_empty())
        .ok_or_else(|| Error::config("model is required"))?;

        let base_url = match self.base_url {
            Some(url) => url,
            None => config::get_base_url(self.provider, None),
        };
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::config(format!(
                "base_url must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let temperature = self.temperature.unwrap_or(0.7);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::config(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                temperature
            )));
        }

        if self.max_tokens == Some(0) {
            return Err(Error::config("max_tokens must be greater than 0"));
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(Error::config("timeout must be greater than 0"));
        }

        Ok(OpenAiConfig {
            model,
            base_url,
            api_key: self.api_key.unwrap_or_else(|| "not-needed".to_string()),
            temperature,
            max_tokens: self.max_tokens,
            timeout,
        })
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// The underlying `reqwest::Client` is reused across calls, so one client can
/// serve many loops.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    pub fn request(&self, history: &[Message], visible_tools: &[Arc<Tool>]) -> OpenAIRequest {
        OpenAIRequest {
            model: self.config.model.clone(),
            messages: to_openai_messages(history),
            stream: true,
            stream_options: Some(json!({ "include_usage": true })),
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
            tools: (!visible_tools.is_empty())
                .then(|| visible_tools.iter().map(|t| t.to_openai_format()).collect()),
        }
    }

    async fn open(
        &self,
        history: &[Message],
        visible_tools: &[Arc<Tool>],
    ) -> Result<impl Stream<Item = Result<OpenAIChunk>> + Send + 'static> {
        let url = format!("{}/chat/completions", self.config.base_url);
        log::debug!(
            "POST {} with {} messages and {} tools",
            url,
            history.len(),
            visible_tools.len()
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request(history, visible_tools))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                log::warn!("Failed to read error response body: {}", e);
                String::new()
            });
            return Err(Error::api_status(status.as_u16(), format!("{}: {}", status, body)));
        }

        Ok(parse_sse(response.bytes_stream()))
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::timeout()
    } else {
        Error::Http(error)
    }
}

#[async_trait]
impl InferenceCall for OpenAiClient {
    async fn infer(
        &self,
        history: &[Message],
        visible_tools: &[Arc<Tool>],
    ) -> Result<InferenceResponse> {
        let mut chunks = Box::pin(self.open(history, visible_tools).await?);
        let mut aggregator = ToolCallAggregator::new();
        let mut content = Vec::new();

        while let Some(chunk) = chunks.next().await {
            content.extend(aggregator.process_chunk(chunk?)?);
        }
        content.extend(aggregator.finish()?);

        let response = InferenceResponse::new(Message::assistant(content));
        Ok(match aggregator.usage() {
            Some(usage) => response.with_usage(usage),
            None => response,
        })
    }
}

#[async_trait]
impl StreamingInference for OpenAiClient {
    async fn stream(
        &self,
        history: &[Message],
        visible_tools: &[Arc<Tool>],
    ) -> Result<FragmentStream> {
        let chunks = self.open(history, visible_tools).await?;
        let fragments = chunks.filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) => {
                    let text: String = chunk
                        .choices
                        .into_iter()
                        .filter_map(|choice| choice.delta.content)
                        .collect();
                    (!text.is_empty()).then_some(Ok(text))
                }
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolResultBlock;
    use futures::stream;

    fn text_chunk(content: &str, finish: Option<&str>) -> OpenAIChunk {
        OpenAIChunk {
            choices: vec![OpenAIChoice {
                delta: OpenAIDelta {
                    content: Some(content.to_string()),
                    ..Default::default()
                },
                finish_reason: finish.map(str::to_string),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn tool_chunk(
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: &str,
        finish: Option<&str>,
    ) -> OpenAIChunk {
        OpenAIChunk {
            choices: vec![OpenAIChoice {
                delta: OpenAIDelta {
                    tool_calls: Some(vec![OpenAIToolCallDelta {
                        index,
                        id: id.map(str::to_string),
                        call_type: id.map(|_| "function".to_string()),
                        function: Some(OpenAIFunctionDelta {
                            name: name.map(str::to_string),
                            arguments: Some(arguments.to_string()),
                        }),
                    }]),
                    ..Default::default()
                },
                finish_reason: finish.map(str::to_string),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_aggregator_text() {
        let mut aggregator = ToolCallAggregator::new();
        assert!(aggregator.process_chunk(text_chunk("Hello ", None)).unwrap().is_empty());

        let blocks = aggregator
            .process_chunk(text_chunk("world", Some("stop")))
            .unwrap();
        assert_eq!(blocks, vec![ContentBlock::Text(TextBlock::new("Hello world"))]);
    }

    #[test]
    fn test_aggregator_interleaved_tool_calls_keep_index_order() {
        let mut aggregator = ToolCallAggregator::new();
        let chunks = vec![
            tool_chunk(1, Some("call_2"), Some("calculate"), "", None),
            tool_chunk(0, Some("call_1"), Some("search"), r#"{"q""#, None),
            tool_chunk(1, None, None, r#"{"expr":"2+2"}"#, None),
            tool_chunk(0, None, None, r#":"rust"}"#, Some("tool_calls")),
        ];

        let mut blocks = Vec::new();
        for chunk in chunks {
            blocks.extend(aggregator.process_chunk(chunk).unwrap());
        }

        assert_eq!(
            blocks,
            vec![
                ContentBlock::ToolUse(ToolUseBlock::new("call_1", "search", json!({"q": "rust"}))),
                ContentBlock::ToolUse(ToolUseBlock::new(
                    "call_2",
                    "calculate",
                    json!({"expr": "2+2"})
                )),
            ]
        );
    }

    #[test]
    fn test_aggregator_empty_arguments_and_missing_finish() {
        let mut aggregator = ToolCallAggregator::new();
        aggregator
            .process_chunk(tool_chunk(0, Some("call_1"), Some("status"), "", None))
            .unwrap();

        let blocks = aggregator.finish().unwrap();
        assert_eq!(
            blocks,
            vec![ContentBlock::ToolUse(ToolUseBlock::new("call_1", "status", json!({})))]
        );
        assert!(aggregator.finish().unwrap().is_empty());
    }

    #[test]
    fn test_aggregator_rejects_broken_arguments() {
        let mut aggregator = ToolCallAggregator::new();
        let result =
            aggregator.process_chunk(tool_chunk(0, Some("c"), Some("t"), "{\"a\":", Some("stop")));
        assert!(matches!(result, Err(Error::Stream(_))));
    }

    #[test]
    fn test_aggregator_records_usage() {
        let mut aggregator = ToolCallAggregator::new();
        let chunk: OpenAIChunk = serde_json::from_str(
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        )
        .unwrap();
        aggregator.process_chunk(chunk).unwrap();
        assert_eq!(aggregator.usage().map(|u| u.total_tokens), Some(15));
    }

    #[tokio::test]
    async fn test_parse_sse_handles_split_events_and_done() {
        let body = vec![
            Ok::<_, std::io::Error>("data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"},"),
            Ok("\"finish_reason\":null}]}\n\n: keep-alive\n\n"),
            Ok("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n"),
            Ok("data: [DONE]\n\n"),
        ];

        let chunks: Vec<_> = parse_sse(stream::iter(body)).collect().await;
        assert_eq!(chunks.len(), 2);

        let first = chunks[0].as_ref().unwrap();
        assert_eq!(first.choices[0].delta.content.as_deref(), Some("Hi"));
        let second = chunks[1].as_ref().unwrap();
        assert_eq!(second.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_parse_sse_reports_bad_json() {
        let body = vec![Ok::<_, std::io::Error>("data: {not json}\n\n")];
        let chunks: Vec<_> = parse_sse(stream::iter(body)).collect().await;
        assert!(matches!(chunks.as_slice(), [Err(Error::Stream(_))]));
    }

    #[test]
    fn test_to_openai_messages() {
        let history = vec![
            Message::system("Be brief."),
            Message::user("Weather?"),
            Message::assistant(vec![
                ContentBlock::Text(TextBlock::new("Checking.")),
                ContentBlock::ToolUse(ToolUseBlock::new("call_1", "weather", json!({"city": "Oslo"}))),
            ]),
            Message::tool_result(ToolResultBlock::new("call_1", "Rain")),
        ];

        let messages = to_openai_messages(&history);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");

        let calls = messages[2].tool_calls.as_ref().unwrap();
        assert_eq!(messages[2].content, "Checking.");
        assert_eq!(calls[0].function.arguments, r#"{"city":"Oslo"}"#);

        assert_eq!(messages[3].role, "tool");
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[3].content, "Rain");

        let wire = serde_json::to_value(&messages[1]).unwrap();
        assert!(wire.get("tool_calls").is_none());
    }

    #[test]
    fn test_config_builder_validation() {
        let config = OpenAiConfig::builder()
            .model("qwen2.5")
            .base_url("http://localhost:1234/v1/")
            .build()
            .unwrap();
        assert_eq!(config.base_url(), "http://localhost:1234/v1");
        assert_eq!(config.api_key(), "not-needed");
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);

        let bad_url = OpenAiConfig::builder().model("m").base_url("localhost").build();
        assert!(matches!(bad_url, Err(Error::Config(_))));

        let bad_temp = OpenAiConfig::builder()
            .model("m")
            .base_url("http://x")
            .temperature(3.0)
            .build();
        assert!(matches!(bad_temp, Err(Error::Config(_))));

        let bad_tokens = OpenAiConfig::builder()
            .model("m")
            .base_url("http://x")
            .max_tokens(0)
            .build();
        assert!(bad_tokens.is_err());
    }

    #[test]
    fn test_request_includes_visible_tools() {
        let client = OpenAiClient::new(
            OpenAiConfig::builder()
                .model("m")
                .provider(config::Provider::Ollama)
                .base_url("http://localhost:11434/v1")
                .build()
                .unwrap(),
        )
        .unwrap();

        let lookup = Arc::new(
            crate::tools::tool("lookup", "Find a record")
                .param("id", "string")
                .build(|_| async { Ok(json!("found")) }),
        );

        let request = client.request(&[Message::user("hi")], &[lookup]);
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["stream"], true);
        assert_eq!(wire["tools"][0]["function"]["name"], "lookup");
        assert_eq!(wire["stream_options"]["include_usage"], true);

        let bare = serde_json::to_value(client.request(&[], &[])).unwrap();
        assert!(bare.get("tools").is_none());
    }
}
