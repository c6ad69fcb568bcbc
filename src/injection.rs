//! Tool injection: strategies that reshape the visible tool set between
//! iterations.
//!
//! After every tool call the loop asks each [`ToolInjectionStrategy`] what
//! should change, given the call that just completed. Strategies only propose
//! changes; the loop merges the proposals of a whole iteration into one
//! [`ToolSetDelta`] and applies it between inference calls.
//!
//! Merge rules:
//! - every strategy sees the visible set as it was before this iteration's
//!   injections
//! - additions accumulate in proposal order
//! - `Remove` and `Replace` remove the named tools regardless of which
//!   strategy proposed them; removing the same tool twice removes it once
//! - removals are applied before additions

use crate::artifact::DomainObject;
use crate::process::ProcessContext;
use crate::tools::{Tool, ToolId, ToolOutput};
use crate::types::Message;
use serde_json::Value;
use std::sync::Arc;

/// A tool call that just finished.
#[derive(Debug, Clone)]
pub struct CompletedToolCall {
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
    /// The visible tool that handled the call, decorators included.
    pub tool: Arc<Tool>,
    pub output: ToolOutput,
}

/// Read-only snapshot handed to [`ToolInjectionStrategy::evaluate`].
#[derive(Debug, Clone, Copy)]
pub struct ToolInjectionContext<'a> {
    pub visible_tools: &'a [Arc<Tool>],
    pub call: &'a CompletedToolCall,
    pub iteration: u32,
    pub history: &'a [Message],
    pub process: &'a ProcessContext,
}

/// A proposed change to the visible tool set.
#[derive(Debug, Clone, Default)]
pub enum ToolInjectionResult {
    #[default]
    NoChange,
    Add(Vec<Arc<Tool>>),
    Remove(Vec<Arc<Tool>>),
    Replace {
        old: Arc<Tool>,
        new: Vec<Arc<Tool>>,
    },
}

impl ToolInjectionResult {
    pub fn is_no_change(&self) -> bool {
        matches!(self, ToolInjectionResult::NoChange)
    }

    /// Tools this result adds.
    pub fn additions(&self) -> &[Arc<Tool>] {
        match self {
            ToolInjectionResult::Add(tools) => tools,
            ToolInjectionResult::Replace { new, .. } => new,
            _ => &[],
        }
    }

    /// Names this result removes.
    pub fn removals(&self) -> Vec<&str> {
        match self {
            ToolInjectionResult::Remove(tools) => tools.iter().map(|t| t.name()).collect(),
            ToolInjectionResult::Replace { old, .. } => vec![old.name()],
            _ => Vec::new(),
        }
    }
}

/// Decides how the visible tool set changes after a tool call.
pub trait ToolInjectionStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Called once when a loop invocation starts, before the first inference.
    /// Returns tools that must be visible from the start, such as the tools
    /// of bindings kept from an earlier invocation.
    fn begin_run(&self, _process: &ProcessContext) -> Vec<Arc<Tool>> {
        Vec::new()
    }

    /// Propose a change. Must not mutate any state.
    fn evaluate(&self, ctx: &ToolInjectionContext<'_>) -> ToolInjectionResult;

    /// Called once the loop has applied the iteration's merged delta, with every
    /// result this strategy proposed during that iteration. Returns tools whose
    /// visibility ended as a consequence of the commit (for example a replaced
    /// binding); the loop removes exactly those tool values.
    fn commit(
        &self,
        _process: &ProcessContext,
        _accepted: &[ToolInjectionResult],
    ) -> Vec<Arc<Tool>> {
        Vec::new()
    }

    /// Domain objects this strategy currently keeps bound.
    fn bound_artifacts(&self) -> Vec<Arc<dyn DomainObject>> {
        Vec::new()
    }
}

/// Merged proposals of one iteration.
#[derive(Debug, Clone, Default)]
pub struct ToolSetDelta {
    removals: Vec<String>,
    additions: Vec<Arc<Tool>>,
}

impl ToolSetDelta {
    pub fn merge<'a>(results: impl IntoIterator<Item = &'a ToolInjectionResult>) -> Self {
        let mut delta = Self::default();
        for result in results {
            delta.push(result);
        }
        delta
    }

    pub fn push(&mut self, result: &ToolInjectionResult) {
        for name in result.removals() {
            if !self.removals.iter().any(|existing| existing == name) {
                self.removals.push(name.to_string());
            }
        }
        self.additions.extend(result.additions().iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }

    pub fn removals(&self) -> &[String] {
        &self.removals
    }

    pub fn additions(&self) -> &[Arc<Tool>] {
        &self.additions
    }
}

/// Ordered, name-unique set of tools shown to the model.
#[derive(Debug, Clone, Default)]
pub struct VisibleToolSet {
    tools: Vec<Arc<Tool>>,
}

impl VisibleToolSet {
    /// Build from initial tools. A later tool replaces an earlier one with the
    /// same name.
    pub fn new(tools: impl IntoIterator<Item = Arc<Tool>>) -> Self {
        let mut set = Self::default();
        for tool in tools {
            set.add(tool);
        }
        set
    }

    /// Insert, replacing any tool of the same name in place.
    pub fn add(&mut self, tool: Arc<Tool>) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Tool>> {
        let index = self.tools.iter().position(|t| t.name() == name)?;
        Some(self.tools.remove(index))
    }

    /// Remove the tool with this exact identity, leaving a same-name
    /// replacement alone.
    pub fn remove_exact(&mut self, id: ToolId) -> Option<Arc<Tool>> {
        let index = self.tools.iter().position(|t| t.id() == id)?;
        Some(self.tools.remove(index))
    }

    pub fn apply(&mut self, delta: &ToolSetDelta) {
        for name in delta.removals() {
            self.remove(name);
        }
        for tool in delta.additions() {
            self.add(Arc::clone(tool));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn tools(&self) -> &[Arc<Tool>] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool;
    use serde_json::json;

    fn named(name: &str) -> Arc<Tool> {
        Arc::new(tool(name, "test tool").build(|_| async { Ok(json!("ok")) }))
    }

    #[test]
    fn test_visible_set_is_name_unique_and_ordered() {
        let first_a = named("a");
        let second_a = named("a");
        let mut set = VisibleToolSet::new(vec![first_a, named("b")]);
        set.add(Arc::clone(&second_a));

        assert_eq!(set.names(), vec!["a", "b"]);
        assert_eq!(set.get("a").map(|t| t.id()), Some(second_a.id()));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_remove_exact_leaves_replacement() {
        let old = named("status");
        let new = named("status");
        let mut set = VisibleToolSet::new(vec![Arc::clone(&old)]);
        set.add(Arc::clone(&new));

        assert!(set.remove_exact(old.id()).is_none());
        assert!(set.contains("status"));
        assert!(set.remove_exact(new.id()).is_some());
        assert!(set.is_empty());
    }

    #[test]
    fn test_merge_removals_before_additions() {
        let facade = named("facade");
        let inner = named("inner");
        let extra = named("extra");

        let delta = ToolSetDelta::merge(&[
            ToolInjectionResult::Replace {
                old: Arc::clone(&facade),
                new: vec![Arc::clone(&inner)],
            },
            ToolInjectionResult::NoChange,
            ToolInjectionResult::Remove(vec![Arc::clone(&facade)]),
            ToolInjectionResult::Add(vec![Arc::clone(&extra)]),
        ]);

        assert_eq!(delta.removals(), &["facade".to_string()]);
        assert_eq!(delta.additions().len(), 2);

        let mut set = VisibleToolSet::new(vec![named("search"), facade]);
        set.apply(&delta);
        assert_eq!(set.names(), vec!["search", "inner", "extra"]);
    }

    #[test]
    fn test_remove_then_readd_same_name_in_one_delta() {
        let old = named("lookup");
        let new = named("lookup");
        let delta = ToolSetDelta::merge(&[ToolInjectionResult::Replace {
            old: Arc::clone(&old),
            new: vec![Arc::clone(&new)],
        }]);

        let mut set = VisibleToolSet::new(vec![old]);
        set.apply(&delta);
        assert_eq!(set.get("lookup").map(|t| t.id()), Some(new.id()));
    }

    #[test]
    fn test_no_change_delta_is_empty() {
        let delta = ToolSetDelta::merge(&[ToolInjectionResult::NoChange]);
        assert!(delta.is_empty());
        assert!(ToolInjectionResult::default().is_no_change());
    }
}
