//! Explicit per-run context handed to the loop, to every tool call and to
//! injection strategies.
//!
//! Nothing in this crate looks up "the current process" from thread-local or
//! global state. Whatever a tool or predicate needs to know about the agent run
//! it belongs to travels through [`ProcessContext`].

use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a caller and a running loop.
///
/// The loop checks the flag between iterations. Tool calls already in flight
/// are allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag so the owning context can be reused for another run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Identity and shared state of one agent run.
///
/// Cloning is cheap; clones share the cancellation flag and attributes.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    id: String,
    attributes: Arc<Map<String, Value>>,
    cancel: CancelHandle,
}

impl ProcessContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Arc::new(Map::new()),
            cancel: CancelHandle::new(),
        }
    }

    /// Attach a read-only attribute visible to tools and binding predicates.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        Arc::make_mut(&mut self.attributes).insert(key.into(), value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Handle a caller can keep to cancel the run from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new("default")
    }
}
