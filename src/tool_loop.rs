//! The tool-calling loop.
//!
//! One [`ToolLoop::run`] drives a conversation from its initial history to a
//! terminal state:
//!
//! ```text
//! Running(n) ─► before-inference ─► infer (retried) ─► after-inference
//!     │                                                     │
//!     │                       no tool calls ◄───────────────┤
//!     │                            │                        ▼
//!     │                  Terminated(Completed)   AwaitingToolResults(n)
//!     │                                                     │
//!     │        each call in order: execute ─► after-tool-result ─► evaluate strategies
//!     │                                                     │
//!     └──── n + 1 ◄── after-iteration ◄── apply merged delta, commit strategies
//! ```
//!
//! The visible tool set only changes between inference calls. Cancellation is
//! checked before each iteration; a tool call already running is allowed to
//! finish.

use crate::artifact::{DomainObject, DomainType};
use crate::hooks::{HistoryEvent, LoopEvent, ResponseEvent, ToolResultEvent};
use crate::injection::{
    CompletedToolCall, ToolInjectionContext, ToolInjectionResult, ToolSetDelta, VisibleToolSet,
};
use crate::process::ProcessContext;
use crate::retry::retry_with_classifier;
use crate::tools::Tool;
use crate::types::{InferenceCall, LoopOptions, Message, ToolResultBlock, ToolUseBlock, Usage};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Why a loop invocation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalReason {
    /// The model produced a plain answer
    Completed,
    MaxIterationsExceeded,
    ToolNotFound,
    /// Any other error, including exhausted retries and transformer failures
    Failed,
    Cancelled,
}

impl TerminalReason {
    /// Map an error returned by [`ToolLoop::run`] onto a terminal reason.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::MaxIterationsExceeded { .. } => TerminalReason::MaxIterationsExceeded,
            Error::ToolNotFound { .. } => TerminalReason::ToolNotFound,
            Error::Cancelled => TerminalReason::Cancelled,
            _ => TerminalReason::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::Completed => "completed",
            TerminalReason::MaxIterationsExceeded => "max_iterations_exceeded",
            TerminalReason::ToolNotFound => "tool_not_found",
            TerminalReason::Failed => "failed",
            TerminalReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running(u32),
    AwaitingToolResults(u32),
    Terminated(TerminalReason),
}

/// Result of a loop invocation that reached a terminal state without error.
#[derive(Clone)]
pub struct LoopOutcome {
    pub history: Vec<Message>,
    pub terminal_reason: TerminalReason,
    /// Domain objects still bound when the loop stopped
    pub bound_artifacts: Vec<Arc<dyn DomainObject>>,
    /// Inference calls made, the answering call included
    pub iterations: u32,
    /// Token usage summed over every inference call that reported it
    pub usage: Usage,
}

impl LoopOutcome {
    /// Text of the final assistant message, if the loop completed.
    pub fn final_text(&self) -> Option<String> {
        if self.terminal_reason != TerminalReason::Completed {
            return None;
        }
        self.history.last().map(Message::text)
    }
}

impl fmt::Debug for LoopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopOutcome")
            .field("messages", &self.history.len())
            .field("terminal_reason", &self.terminal_reason)
            .field(
                "bound_artifacts",
                &self
                    .bound_artifacts
                    .iter()
                    .map(|object| DomainType::of_val(object.as_ref()).name())
                    .collect::<Vec<_>>(),
            )
            .field("iterations", &self.iterations)
            .field("usage", &self.usage)
            .finish()
    }
}

/// Loop engine bound to one inference collaborator.
///
/// A `ToolLoop` holds no per-run state of its own and can run many
/// invocations, one after another or concurrently. Strategies may keep state
/// across invocations (domain bindings do); each invocation starts with the
/// tools they hand back from [`crate::ToolInjectionStrategy::begin_run`].
///
/// ```rust,no_run
/// use open_agent_loop::{LoopOptions, Message, OpenAiClient, OpenAiConfig, ProcessContext, ToolLoop, tool};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> open_agent_loop::Result<()> {
/// let client = OpenAiClient::new(OpenAiConfig::builder().model("qwen2.5-32b-instruct").build()?)?;
/// let add = tool("add", "Add two numbers")
///     .param("a", "number")
///     .param("b", "number")
///     .build(|args| async move {
///         let a = args["a"].as_f64().unwrap_or(0.0);
///         let b = args["b"].as_f64().unwrap_or(0.0);
///         Ok(json!({"result": a + b}))
///     });
///
/// let engine = ToolLoop::new(Arc::new(client), LoopOptions::builder().max_iterations(5).build()?);
/// let outcome = engine
///     .run(vec![Message::user("What is 2 + 3?")], vec![Arc::new(add)], &ProcessContext::new("calc"))
///     .await?;
/// println!("{:?}", outcome.final_text());
/// # Ok(())
/// # }
/// ```
pub struct ToolLoop {
    inference: Arc<dyn InferenceCall>,
    options: LoopOptions,
}

impl fmt::Debug for ToolLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolLoop")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ToolLoop {
    pub fn new(inference: Arc<dyn InferenceCall>, options: LoopOptions) -> Self {
        Self { inference, options }
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    /// Run one loop invocation.
    ///
    /// Returns the outcome on a plain answer or cancellation. Every other
    /// terminal state is an error: [`Error::MaxIterationsExceeded`],
    /// [`Error::ToolNotFound`], an exhausted or non-retryable inference
    /// failure, a control-flow signal raised by a tool, or a transformer's
    /// error as it was returned.
    pub async fn run(
        &self,
        initial_history: Vec<Message>,
        initial_tools: Vec<Arc<Tool>>,
        process: &ProcessContext,
    ) -> Result<LoopOutcome> {
        let hooks = &self.options.hooks;
        let strategies = &self.options.strategies;
        let process_id = process.id().to_string();

        let mut history = initial_history;
        let mut visible = VisibleToolSet::new(initial_tools);
        for strategy in strategies {
            for tool in strategy.begin_run(process) {
                visible.add(tool);
            }
        }
        let mut usage = Usage::default();
        let mut iteration = 0u32;

        loop {
            if process.is_cancelled() {
                return Ok(self.finish(
                    history,
                    &visible,
                    TerminalReason::Cancelled,
                    iteration,
                    usage,
                    process,
                ));
            }
            if iteration >= self.options.max_iterations {
                self.log_state(process, LoopState::Terminated(TerminalReason::MaxIterationsExceeded));
                return Err(Error::MaxIterationsExceeded {
                    max_iterations: self.options.max_iterations,
                });
            }
            self.log_state(process, LoopState::Running(iteration));

            let request = hooks
                .transform_before_inference(HistoryEvent {
                    iteration,
                    process_id: process_id.clone(),
                    history: history.clone(),
                })
                .await?;
            hooks
                .inspect(LoopEvent::BeforeInference(HistoryEvent {
                    iteration,
                    process_id: process_id.clone(),
                    history: request.clone(),
                }))
                .await;

            let response = {
                let inference = &self.inference;
                let request = &request;
                let tools = visible.tools();
                retry_with_classifier(&self.options.retry, self.options.classifier.as_ref(), move || {
                    inference.infer(request, tools)
                })
                .await?
            };
            if let Some(reported) = response.usage {
                usage += reported;
            }

            let message = hooks
                .transform_after_inference(ResponseEvent {
                    iteration,
                    process_id: process_id.clone(),
                    response: response.message,
                })
                .await?;
            hooks
                .inspect(LoopEvent::AfterInference(ResponseEvent {
                    iteration,
                    process_id: process_id.clone(),
                    response: message.clone(),
                }))
                .await;

            let calls: Vec<ToolUseBlock> = message.tool_uses().into_iter().cloned().collect();
            history.push(message);
            if calls.is_empty() {
                return Ok(self.finish(
                    history,
                    &visible,
                    TerminalReason::Completed,
                    iteration + 1,
                    usage,
                    process,
                ));
            }
            self.log_state(process, LoopState::AwaitingToolResults(iteration));

            // Strategies see the set as it was when the model chose these calls
            let snapshot = visible.tools().to_vec();
            let mut proposals: Vec<Vec<ToolInjectionResult>> = vec![Vec::new(); strategies.len()];

            for call in calls {
                let tool = visible
                    .get(&call.name)
                    .cloned()
                    .ok_or_else(|| Error::tool_not_found(call.name.as_str(), visible.names()))?;

                log::debug!("Calling tool '{}' ({})", call.name, call.id);
                let output = tool.call(call.input.clone(), process).await?;

                let event = ToolResultEvent {
                    iteration,
                    process_id: process_id.clone(),
                    tool_use_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    input: call.input.clone(),
                    result: output.content().to_string(),
                    is_error: output.is_error(),
                };
                let result = hooks.transform_tool_result(event.clone()).await?;
                hooks
                    .inspect(LoopEvent::AfterToolResult(ToolResultEvent {
                        result: result.clone(),
                        ..event
                    }))
                    .await;

                history.push(Message::tool_result(if output.is_error() {
                    ToolResultBlock::error(call.id.as_str(), result)
                } else {
                    ToolResultBlock::new(call.id.as_str(), result)
                }));

                let completed = CompletedToolCall {
                    tool_use_id: call.id,
                    name: call.name,
                    input: call.input,
                    tool,
                    output,
                };
                let ctx = ToolInjectionContext {
                    visible_tools: &snapshot,
                    call: &completed,
                    iteration,
                    history: &history,
                    process,
                };
                for (strategy, accepted) in strategies.iter().zip(proposals.iter_mut()) {
                    let proposal = strategy.evaluate(&ctx);
                    if !proposal.is_no_change() {
                        log::debug!(
                            "Strategy '{}' proposed {:?} after '{}'",
                            strategy.name(),
                            proposal,
                            completed.name
                        );
                        accepted.push(proposal);
                    }
                }
            }

            let delta = ToolSetDelta::merge(proposals.iter().flatten());
            if !delta.is_empty() {
                visible.apply(&delta);
            }
            for (strategy, accepted) in strategies.iter().zip(&proposals) {
                if accepted.is_empty() {
                    continue;
                }
                for released in strategy.commit(process, accepted) {
                    if visible.remove_exact(released.id()).is_some() {
                        log::debug!(
                            "Strategy '{}' released tool '{}'",
                            strategy.name(),
                            released.name()
                        );
                    }
                }
            }
            if !delta.is_empty() {
                log::info!(
                    "Visible tools after iteration {}: [{}]",
                    iteration,
                    visible.names().join(", ")
                );
            }

            history = hooks
                .transform_after_iteration(HistoryEvent {
                    iteration,
                    process_id: process_id.clone(),
                    history,
                })
                .await?;
            hooks
                .inspect(LoopEvent::AfterIteration(HistoryEvent {
                    iteration,
                    process_id: process_id.clone(),
                    history: history.clone(),
                }))
                .await;

            iteration += 1;
        }
    }

    /// Bound artifacts are reported only while this run still exposes at
    /// least one of their tools.
    fn finish(
        &self,
        history: Vec<Message>,
        visible: &VisibleToolSet,
        terminal_reason: TerminalReason,
        iterations: u32,
        usage: Usage,
        process: &ProcessContext,
    ) -> LoopOutcome {
        self.log_state(process, LoopState::Terminated(terminal_reason));
        LoopOutcome {
            history,
            terminal_reason,
            bound_artifacts: self
                .options
                .strategies
                .iter()
                .flat_map(|strategy| strategy.bound_artifacts())
                .filter(|object| {
                    visible.tools().iter().any(|tool| {
                        tool.binding()
                            .is_some_and(|binding| Arc::ptr_eq(&binding.instance, object))
                    })
                })
                .collect(),
            iterations,
            usage,
        }
    }

    fn log_state(&self, process: &ProcessContext, state: LoopState) {
        match state {
            LoopState::Terminated(TerminalReason::Completed) => {
                log::info!("Loop {} completed", process.id())
            }
            LoopState::Terminated(reason) => log::warn!("Loop {} terminated: {}", process.id(), reason),
            _ => log::debug!("Loop {}: {:?}", process.id(), state),
        }
    }
}
