//! Progressive disclosure through facade tools.
//!
//! A facade is a small tool that stands in for a group of inner tools. The
//! model sees only the facade until it calls it; the call input selects which
//! inner tools to reveal, and [`FacadeInjection`] turns that call into a change
//! of the visible set.
//!
//! ```rust
//! use open_agent_loop::{FacadeInjection, FacadeSelector, FacadeTool, tool};
//! use serde_json::json;
//!
//! let read = tool("read_file", "Read a file").param("path", "string")
//!     .build(|_| async { Ok(json!("contents")) });
//! let write = tool("write_file", "Write a file").param("path", "string")
//!     .build(|_| async { Ok(json!("ok")) });
//!
//! let files = FacadeTool::builder("file_tools", "Enable file system tools")
//!     .inner(read)
//!     .inner(write)
//!     .selector(FacadeSelector::ByName)
//!     .build();
//!
//! let initial_tools = vec![files.tool()];
//! let strategy = FacadeInjection::new().with_facade(files);
//! ```

use crate::injection::{ToolInjectionContext, ToolInjectionResult, ToolInjectionStrategy};
use crate::tools::{Tool, ToolOutput, tool};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a facade call input picks inner tools.
#[derive(Debug, Clone, Default)]
pub enum FacadeSelector {
    /// Every inner tool.
    #[default]
    All,
    /// Names listed in the input's `tools` array. Without the array, all.
    ByName,
    /// Tools of the categories named by `input[field]` (a string or an array
    /// of strings). Without the field, all; unknown categories select nothing.
    ByCategory {
        field: String,
        categories: BTreeMap<String, Vec<String>>,
    },
}

impl FacadeSelector {
    pub fn select(&self, inner: &[Arc<Tool>], input: &Value) -> Vec<Arc<Tool>> {
        let wanted: Vec<String> = match self {
            FacadeSelector::All => return inner.to_vec(),
            FacadeSelector::ByName => match input.get("tools").and_then(Value::as_array) {
                Some(names) => string_values(names),
                None => return inner.to_vec(),
            },
            FacadeSelector::ByCategory { field, categories } => {
                let requested = match input.get(field.as_str()) {
                    None | Some(Value::Null) => return inner.to_vec(),
                    Some(Value::String(category)) => vec![category.clone()],
                    Some(Value::Array(items)) => string_values(items),
                    Some(_) => Vec::new(),
                };
                requested
                    .iter()
                    .filter_map(|category| categories.get(category))
                    .flatten()
                    .cloned()
                    .collect()
            }
        };

        inner
            .iter()
            .filter(|tool| wanted.iter().any(|name| name == tool.name()))
            .cloned()
            .collect()
    }

    fn input_schema(&self) -> Value {
        match self {
            FacadeSelector::All => json!({}),
            FacadeSelector::ByName => json!({
                "tools": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Names of the tools to enable; omit to enable all",
                    "optional": true
                }
            }),
            FacadeSelector::ByCategory { field, categories } => json!({
                field.as_str(): {
                    "type": "string",
                    "enum": categories.keys().collect::<Vec<_>>(),
                    "description": "Category of tools to enable; omit to enable all",
                    "optional": true
                }
            }),
        }
    }
}

fn string_values(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// A facade tool together with the tools it reveals.
#[derive(Debug, Clone)]
pub struct FacadeTool {
    tool: Arc<Tool>,
    inner: Vec<Arc<Tool>>,
    remove_on_invoke: bool,
    selector: FacadeSelector,
}

impl FacadeTool {
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> FacadeToolBuilder {
        FacadeToolBuilder {
            name: name.into(),
            description: description.into(),
            inner: Vec::new(),
            remove_on_invoke: true,
            selector: FacadeSelector::default(),
        }
    }

    /// The tool to place in the visible set (possibly after decorating it).
    pub fn tool(&self) -> Arc<Tool> {
        Arc::clone(&self.tool)
    }

    pub fn inner(&self) -> &[Arc<Tool>] {
        &self.inner
    }

    pub fn remove_on_invoke(&self) -> bool {
        self.remove_on_invoke
    }

    /// True when `candidate` is this facade or a decorator around it.
    pub fn recognizes(&self, candidate: &Tool) -> bool {
        candidate.is_or_wraps(&self.tool)
    }

    pub fn select(&self, input: &Value) -> Vec<Arc<Tool>> {
        self.selector.select(&self.inner, input)
    }
}

pub struct FacadeToolBuilder {
    name: String,
    description: String,
    inner: Vec<Arc<Tool>>,
    remove_on_invoke: bool,
    selector: FacadeSelector,
}

impl FacadeToolBuilder {
    pub fn inner(mut self, tool: Tool) -> Self {
        self.inner.push(Arc::new(tool));
        self
    }

    pub fn inner_tools(mut self, tools: impl IntoIterator<Item = Arc<Tool>>) -> Self {
        self.inner.extend(tools);
        self
    }

    /// Whether the facade disappears once it has been used. Defaults to true.
    pub fn remove_on_invoke(mut self, remove: bool) -> Self {
        self.remove_on_invoke = remove;
        self
    }

    pub fn selector(mut self, selector: FacadeSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn build(self) -> FacadeTool {
        let inner_names: Vec<&str> = self.inner.iter().map(|t| t.name()).collect();
        let description = format!("{} (enables: {})", self.description, inner_names.join(", "));

        let selector = self.selector.clone();
        let inner = self.inner.clone();
        let handler = tool(self.name, description)
            .schema(self.selector.input_schema())
            .build_with_output(move |input, _process| {
                let selected: Vec<String> = selector
                    .select(&inner, &input)
                    .iter()
                    .map(|t| t.name().to_string())
                    .collect();
                async move {
                    Ok(if selected.is_empty() {
                        ToolOutput::text("No tools matched the request")
                    } else {
                        ToolOutput::text(format!("Enabled tools: {}", selected.join(", ")))
                    })
                }
            });

        FacadeTool {
            tool: Arc::new(handler),
            inner: self.inner,
            remove_on_invoke: self.remove_on_invoke,
            selector: self.selector,
        }
    }
}

/// Strategy revealing inner tools when one of its facades is called.
#[derive(Debug, Clone, Default)]
pub struct FacadeInjection {
    facades: Vec<FacadeTool>,
}

impl FacadeInjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_facade(mut self, facade: FacadeTool) -> Self {
        self.facades.push(facade);
        self
    }

    pub fn facades(&self) -> &[FacadeTool] {
        &self.facades
    }
}

impl ToolInjectionStrategy for FacadeInjection {
    fn name(&self) -> &str {
        "facade"
    }

    fn evaluate(&self, ctx: &ToolInjectionContext<'_>) -> ToolInjectionResult {
        let Some(facade) = self.facades.iter().find(|f| f.recognizes(&ctx.call.tool)) else {
            return ToolInjectionResult::NoChange;
        };

        let selected = facade.select(&ctx.call.input);
        log::debug!(
            "Facade '{}' selected {} of {} inner tools",
            ctx.call.name,
            selected.len(),
            facade.inner.len()
        );

        match (selected.is_empty(), facade.remove_on_invoke) {
            (false, true) => ToolInjectionResult::Replace {
                old: Arc::clone(&ctx.call.tool),
                new: selected,
            },
            (false, false) => ToolInjectionResult::Add(selected),
            (true, true) => ToolInjectionResult::Remove(vec![Arc::clone(&ctx.call.tool)]),
            (true, false) => ToolInjectionResult::NoChange,
        }
    }
}
