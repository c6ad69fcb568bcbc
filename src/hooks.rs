//! Callback pipeline run by the loop at four checkpoints per iteration.
//!
//! # Checkpoints
//!
//! 1. **Before inference**: the history about to be sent to the model
//! 2. **After inference**: the assistant message the model returned
//! 3. **After tool result**: the stringified result of each tool call
//! 4. **After iteration**: the history once all of an iteration's tool calls ran
//!
//! # Two kinds of callbacks
//!
//! **Inspectors** observe every checkpoint through a [`LoopEvent`]. They are
//! best-effort: an inspector that returns an error or panics is logged and
//! skipped, and the loop carries on.
//!
//! **Transformers** rewrite the value passing through one checkpoint. They run
//! in registration order, each receiving the previous one's output, and the
//! last output feeds the next stage of the loop. A transformer that fails
//! aborts the loop and its error is returned unchanged.
//!
//! ```rust
//! use open_agent_loop::{Hooks, LoopEvent, Message};
//!
//! let hooks = Hooks::new()
//!     .add_inspector(|event: LoopEvent| async move {
//!         log::debug!("checkpoint {} at iteration {}", event.checkpoint(), event.iteration());
//!         Ok(())
//!     })
//!     .add_after_tool_result(|event| async move {
//!         // Keep huge tool outputs out of the context window
//!         Ok(event.result.chars().take(4_000).collect())
//!     })
//!     .add_before_inference(|event| async move {
//!         let mut history = event.history;
//!         history.insert(0, Message::system("Answer tersely."));
//!         Ok(history)
//!     });
//! ```

use crate::Result;
use crate::types::Message;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Where in the iteration a callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    BeforeInference,
    AfterInference,
    AfterToolResult,
    AfterIteration,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::BeforeInference => "before_inference",
            Checkpoint::AfterInference => "after_inference",
            Checkpoint::AfterToolResult => "after_tool_result",
            Checkpoint::AfterIteration => "after_iteration",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// History at the before-inference and after-iteration checkpoints.
#[derive(Debug, Clone)]
pub struct HistoryEvent {
    pub iteration: u32,
    pub process_id: String,
    pub history: Vec<Message>,
}

/// The assistant message returned by one inference call.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub iteration: u32,
    pub process_id: String,
    pub response: Message,
}

/// One tool call and its stringified result.
#[derive(Debug, Clone)]
pub struct ToolResultEvent {
    pub iteration: u32,
    pub process_id: String,
    pub tool_use_id: String,
    pub tool_name: String,
    pub input: Value,
    pub result: String,
    pub is_error: bool,
}

/// What an inspector sees.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    BeforeInference(HistoryEvent),
    AfterInference(ResponseEvent),
    AfterToolResult(ToolResultEvent),
    AfterIteration(HistoryEvent),
}

impl LoopEvent {
    pub fn checkpoint(&self) -> Checkpoint {
        match self {
            LoopEvent::BeforeInference(_) => Checkpoint::BeforeInference,
            LoopEvent::AfterInference(_) => Checkpoint::AfterInference,
            LoopEvent::AfterToolResult(_) => Checkpoint::AfterToolResult,
            LoopEvent::AfterIteration(_) => Checkpoint::AfterIteration,
        }
    }

    pub fn iteration(&self) -> u32 {
        match self {
            LoopEvent::BeforeInference(e) | LoopEvent::AfterIteration(e) => e.iteration,
            LoopEvent::AfterInference(e) => e.iteration,
            LoopEvent::AfterToolResult(e) => e.iteration,
        }
    }
}

pub type Inspector = Arc<dyn Fn(LoopEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub type HistoryTransformer =
    Arc<dyn Fn(HistoryEvent) -> BoxFuture<'static, Result<Vec<Message>>> + Send + Sync>;

pub type ResponseTransformer =
    Arc<dyn Fn(ResponseEvent) -> BoxFuture<'static, Result<Message>> + Send + Sync>;

pub type ToolResultTransformer =
    Arc<dyn Fn(ToolResultEvent) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Registered inspectors and transformers.
///
/// Cheap to clone; handlers are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct Hooks {
    pub inspectors: Vec<Inspector>,
    pub before_inference: Vec<HistoryTransformer>,
    pub after_inference: Vec<ResponseTransformer>,
    pub after_tool_result: Vec<ToolResultTransformer>,
    pub after_iteration: Vec<HistoryTransformer>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an inspector for every checkpoint.
    pub fn add_inspector<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(LoopEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inspectors
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Rewrite the history sent to the model. The rewrite shapes the request
    /// only; the loop keeps appending to its own history.
    pub fn add_before_inference<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(HistoryEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Message>>> + Send + 'static,
    {
        self.before_inference
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Rewrite the assistant message before the loop acts on it.
    pub fn add_after_inference<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ResponseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Message>> + Send + 'static,
    {
        self.after_inference
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Rewrite a tool result before it enters the history.
    pub fn add_after_tool_result<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ToolResultEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.after_tool_result
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Rewrite the history at the end of an iteration. The output replaces the
    /// loop's history.
    pub fn add_after_iteration<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(HistoryEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Message>>> + Send + 'static,
    {
        self.after_iteration
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Run every inspector. Failures and panics are logged, never returned.
    pub async fn inspect(&self, event: LoopEvent) {
        let checkpoint = event.checkpoint();
        for (index, inspector) in self.inspectors.iter().enumerate() {
            let started = std::panic::catch_unwind(AssertUnwindSafe(|| inspector(event.clone())));
            let outcome = match started {
                Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
                Err(panic) => Err(panic),
            };
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::warn!("Inspector #{} failed at {}: {:#}", index, checkpoint, err)
                }
                Err(_) => log::warn!("Inspector #{} panicked at {}", index, checkpoint),
            }
        }
    }

    pub async fn transform_before_inference(&self, event: HistoryEvent) -> Result<Vec<Message>> {
        run_history_chain(&self.before_inference, event).await
    }

    pub async fn transform_after_inference(&self, event: ResponseEvent) -> Result<Message> {
        let ResponseEvent {
            iteration,
            process_id,
            mut response,
        } = event;
        for transformer in &self.after_inference {
            response = transformer(ResponseEvent {
                iteration,
                process_id: process_id.clone(),
                response,
            })
            .await?;
        }
        Ok(response)
    }

    pub async fn transform_tool_result(&self, event: ToolResultEvent) -> Result<String> {
        let mut current = event;
        for transformer in &self.after_tool_result {
            let result = transformer(current.clone()).await?;
            current.result = result;
        }
        Ok(current.result)
    }

    pub async fn transform_after_iteration(&self, event: HistoryEvent) -> Result<Vec<Message>> {
        run_history_chain(&self.after_iteration, event).await
    }
}

async fn run_history_chain(
    transformers: &[HistoryTransformer],
    event: HistoryEvent,
) -> Result<Vec<Message>> {
    let HistoryEvent {
        iteration,
        process_id,
        mut history,
    } = event;
    for transformer in transformers {
        history = transformer(HistoryEvent {
            iteration,
            process_id: process_id.clone(),
            history,
        })
        .await?;
    }
    Ok(history)
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("inspectors", &format!("{} handlers", self.inspectors.len()))
            .field(
                "before_inference",
                &format!("{} handlers", self.before_inference.len()),
            )
            .field(
                "after_inference",
                &format!("{} handlers", self.after_inference.len()),
            )
            .field(
                "after_tool_result",
                &format!("{} handlers", self.after_tool_result.len()),
            )
            .field(
                "after_iteration",
                &format!("{} handlers", self.after_iteration.len()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn history_event(history: Vec<Message>) -> HistoryEvent {
        HistoryEvent {
            iteration: 0,
            process_id: "test".into(),
            history,
        }
    }

    fn tool_event(result: &str) -> ToolResultEvent {
        ToolResultEvent {
            iteration: 1,
            process_id: "test".into(),
            tool_use_id: "call_1".into(),
            tool_name: "lookup".into(),
            input: json!({}),
            result: result.into(),
            is_error: false,
        }
    }

    #[tokio::test]
    async fn test_transformers_chain_in_registration_order() {
        let hooks = Hooks::new()
            .add_after_tool_result(|e| async move { Ok(format!("{}-a", e.result)) })
            .add_after_tool_result(|e| async move { Ok(format!("{}-b", e.result)) });

        let result = hooks.transform_tool_result(tool_event("x")).await.unwrap();
        assert_eq!(result, "x-a-b");
    }

    #[tokio::test]
    async fn test_history_transformer_sees_previous_output() {
        let hooks = Hooks::new()
            .add_before_inference(|e| async move {
                let mut history = e.history;
                history.push(Message::user("second"));
                Ok(history)
            })
            .add_before_inference(|e| async move {
                assert_eq!(e.history.len(), 2);
                Ok(e.history.into_iter().rev().collect())
            });

        let history = hooks
            .transform_before_inference(history_event(vec![Message::user("first")]))
            .await
            .unwrap();
        assert_eq!(history[0].text(), "second");
        assert_eq!(history[1].text(), "first");
    }

    #[tokio::test]
    async fn test_failing_transformer_error_is_returned_as_is() {
        let reached = Arc::new(AtomicUsize::new(0));
        let reached_clone = reached.clone();
        let hooks = Hooks::new()
            .add_after_inference(|_| async move { Err(Error::replan("rethink")) })
            .add_after_inference(move |e| {
                reached_clone.fetch_add(1, Ordering::SeqCst);
                async move { Ok(e.response) }
            });

        let err = hooks
            .transform_after_inference(ResponseEvent {
                iteration: 0,
                process_id: "test".into(),
                response: Message::assistant_text("hi"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReplanRequested { .. }));
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_inspector_failures_and_panics_are_swallowed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let hooks = Hooks::new()
            .add_inspector(|_| async move { Err(anyhow::anyhow!("metrics backend down")) })
            .add_inspector(|_| async move {
                panic!("inspector bug");
            })
            .add_inspector(move |event| {
                let seen = seen_clone.clone();
                async move {
                    seen.lock().unwrap().push(event.checkpoint());
                    Ok(())
                }
            });

        hooks
            .inspect(LoopEvent::AfterToolResult(tool_event("ok")))
            .await;
        hooks
            .inspect(LoopEvent::AfterIteration(history_event(vec![])))
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Checkpoint::AfterToolResult, Checkpoint::AfterIteration]
        );
    }

    #[tokio::test]
    async fn test_empty_hooks_pass_values_through() {
        let hooks = Hooks::new();
        let history = hooks
            .transform_after_iteration(history_event(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            hooks.transform_tool_result(tool_event("same")).await.unwrap(),
            "same"
        );
    }

    #[test]
    fn test_hooks_debug_shows_counts() {
        let hooks = Hooks::new().add_inspector(|_| async { Ok(()) });
        let debug = format!("{:?}", hooks);
        assert!(debug.contains("inspectors: \"1 handlers\""));
    }

    #[test]
    fn test_checkpoint_names() {
        assert_eq!(Checkpoint::BeforeInference.to_string(), "before_inference");
        assert_eq!(Checkpoint::AfterIteration.as_str(), "after_iteration");
    }
}
