//! # Open Agent Loop
//!
//! A tool-calling loop engine for autonomous LLM agents.
//!
//! The engine sends conversation state to a model, runs the tools it asks
//! for, reshapes the set of tools the model can see as results come in, and
//! repeats until the model gives a plain answer or a limit is hit.
//!
//! ## Key Features
//!
//! - **Loop orchestration**: iteration ceiling, ordered tool execution,
//!   cancellation between iterations, usage accounting
//! - **Adaptive tool visibility**: facade tools that reveal inner tools on
//!   demand, and domain objects whose operations become tools once a tool
//!   returns them
//! - **Callback pipeline**: best-effort inspectors plus ordered transformers at
//!   four checkpoints per iteration
//! - **Retry classification**: transient failures and rate limits retried with
//!   exponential backoff and jitter; contract violations and control-flow
//!   signals never
//! - **Incremental stream decoding**: raw fragments to lines to reasoning text
//!   and typed objects, in order and with backpressure
//! - **OpenAI-compatible adapter** for LM Studio, Ollama, llama.cpp, vLLM and
//!   hosted endpoints
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use open_agent_loop::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = OpenAiClient::new(
//!         OpenAiConfig::builder()
//!             .model("qwen2.5-32b-instruct")
//!             .base_url("http://localhost:1234/v1")
//!             .build()?,
//!     )?;
//!
//!     let weather = tool("get_weather", "Current weather for a city")
//!         .param("city", "string")
//!         .build(|args| async move {
//!             Ok(json!({"city": args["city"], "forecast": "sunny"}))
//!         });
//!
//!     let engine = ToolLoop::new(Arc::new(client), LoopOptions::builder().max_iterations(6).build()?);
//!     let outcome = engine
//!         .run(
//!             vec![Message::user("Should I bring an umbrella in Lisbon?")],
//!             vec![Arc::new(weather)],
//!             &ProcessContext::new("weather-demo"),
//!         )
//!         .await?;
//!
//!     println!("{}", outcome.final_text().unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **tool_loop**: the orchestrator and its outcome types
//! - **tools** / **artifact**: tool values, decorators, domain objects
//! - **injection** / **facade** / **domain**: visible-set changes between iterations
//! - **hooks**: inspectors and transformers
//! - **retry**: failure classification and backoff
//! - **line_buffer** / **streaming**: fragment decoding
//! - **openai**: HTTP adapter for the inference traits
//! - **process**: explicit per-run context and cancellation
//! - **context** / **config**: context-window helpers and environment defaults

mod artifact;
mod domain;
mod error;
mod facade;
mod hooks;
mod injection;
mod process;
mod tool_loop;
mod tools;
mod types;

/// Provider defaults and environment lookups.
pub mod config;

/// Token estimation and history truncation.
pub mod context;

/// Line-oriented buffering of streamed text.
pub mod line_buffer;

/// OpenAI-compatible HTTP adapter.
pub mod openai;

/// Retry classification and exponential backoff.
pub mod retry;

/// Incremental decoding of streamed model output.
pub mod streaming;

pub use artifact::{Artifact, AsAny, DomainObject, DomainType, downcast_object};

pub use domain::{
    DiscoveryMode, DomainToolInjection, DomainToolSource, DomainToolTracker, PlannedBinding,
    SharedDomainTracker,
};

pub use error::{Error, ErrorClass, Result};

pub use facade::{FacadeInjection, FacadeSelector, FacadeTool};

pub use hooks::{
    Checkpoint, HistoryEvent, Hooks, LoopEvent, ResponseEvent, ToolResultEvent,
};

pub use injection::{
    CompletedToolCall, ToolInjectionContext, ToolInjectionResult, ToolInjectionStrategy,
    ToolSetDelta, VisibleToolSet,
};

pub use openai::{OpenAiClient, OpenAiConfig, OpenAiConfigBuilder};

pub use process::{CancelHandle, ProcessContext};

pub use retry::{DefaultRetryClassifier, RetryClassifier, RetryConfig, RetryContext};

pub use streaming::{ReasoningMarkers, StreamingEvent, StreamingInference};

pub use tool_loop::{LoopOutcome, LoopState, TerminalReason, ToolLoop};

pub use tools::{Tool, ToolBinding, ToolBuilder, ToolId, ToolLayer, ToolOutput, tool};

pub use types::{
    ContentBlock, DEFAULT_MAX_ITERATIONS, InferenceCall, InferenceResponse, LoopOptions,
    LoopOptionsBuilder, Message, MessageRole, TextBlock, ToolResultBlock, ToolUseBlock, Usage,
};

/// Commonly used types.
///
/// ```rust
/// use open_agent_loop::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Artifact, ContentBlock, DomainObject, DomainToolInjection, Error, FacadeInjection,
        FacadeTool, Hooks, InferenceCall, InferenceResponse, LoopEvent, LoopOptions, LoopOutcome,
        Message, OpenAiClient, OpenAiConfig, ProcessContext, Result, TerminalReason, Tool,
        ToolLoop, ToolOutput, tool,
    };
}
