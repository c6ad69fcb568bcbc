//! # Tool System
//!
//! A [`Tool`] is an immutable value: a name, a description, a JSON Schema for
//! its input, and an async handler. Handlers receive the call input and the
//! [`ProcessContext`] of the run that invoked them and produce a [`ToolOutput`].
//!
//! ## Tool Lifecycle
//!
//! ```text
//! 1. Definition:   tool(name, description).param(..).build(handler)
//! 2. Visibility:   the loop places it in the visible tool set
//! 3. Invocation:   the model requests it by name with JSON arguments
//! 4. Execution:    Tool::call runs the handler, folding failures into ToolOutput::Error
//! 5. Injection:    strategies inspect the completed call and reshape the visible set
//! ```
//!
//! ## Decorators
//!
//! Cross-cutting behaviour (timeouts, auditing, input rewriting) is added by
//! wrapping a tool in another tool with [`Tool::decorate`]. The wrapper records
//! its inner tool as [`ToolLayer::Wrapping`], so code that needs to know "which
//! tool is this really" walks [`Tool::layers`] instead of comparing the outer
//! object.
//!
//! ## Schema Conversion
//!
//! - **Simple notation**: `{"location": "string", "units": "string"}`
//! - **Typed schema**: `{"param": {"type": "number", "optional": true}}`
//! - **Full JSON Schema**: passed through unchanged

use crate::artifact::{Artifact, DomainObject, DomainType};
use crate::process::ProcessContext;
use crate::{Error, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Type-erased async handler behind every tool.
pub type ToolHandler =
    Arc<dyn Fn(Value, ProcessContext) -> BoxFuture<'static, Result<ToolOutput>> + Send + Sync>;

static NEXT_TOOL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a tool value. Clones share it; decorators get
/// their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToolId(u64);

impl ToolId {
    fn next() -> Self {
        ToolId(NEXT_TOOL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Result of a tool call.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    Text(String),
    WithArtifact {
        content: String,
        artifact: Artifact,
    },
    Error {
        message: String,
        cause: Option<Arc<anyhow::Error>>,
    },
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        ToolOutput::Text(content.into())
    }

    pub fn with_artifact(content: impl Into<String>, artifact: Artifact) -> Self {
        ToolOutput::WithArtifact {
            content: content.into(),
            artifact,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolOutput::Error {
            message: message.into(),
            cause: None,
        }
    }

    pub fn error_with_cause(message: impl Into<String>, cause: anyhow::Error) -> Self {
        ToolOutput::Error {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// The text the model sees for this result.
    pub fn content(&self) -> &str {
        match self {
            ToolOutput::Text(content) => content,
            ToolOutput::WithArtifact { content, .. } => content,
            ToolOutput::Error { message, .. } => message,
        }
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            ToolOutput::WithArtifact { artifact, .. } => Some(artifact),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error { .. })
    }

    /// Decode a `{"success": .., "failure": ..}` envelope returned by a remote
    /// tool. Exactly one of the two fields must be present and non-null.
    pub fn from_envelope(raw: &str) -> Result<ToolOutput> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            Error::invalid_input(format!("Malformed tool result envelope: {}", e))
        })?;
        if !value.is_object() {
            return Err(Error::invalid_input(
                "Tool result envelope must be a JSON object",
            ));
        }

        let success = value.get("success").filter(|v| !v.is_null());
        let failure = value.get("failure").filter(|v| !v.is_null());
        match (success, failure) {
            (Some(success), None) => Ok(ToolOutput::Text(value_to_text(success))),
            (None, Some(failure)) => Ok(ToolOutput::error(value_to_text(failure))),
            (None, None) => Err(Error::invalid_input(
                "Tool result envelope has neither 'success' nor 'failure'",
            )),
            (Some(_), Some(_)) => Err(Error::invalid_input(
                "Tool result envelope has both 'success' and 'failure'",
            )),
        }
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Text(value_to_text(&value))
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One level of the decorator chain.
#[derive(Clone)]
pub enum ToolLayer {
    Plain,
    Wrapping(Arc<Tool>),
}

/// Provenance of a tool extracted from a bound domain object.
#[derive(Clone)]
pub struct ToolBinding {
    pub domain_type: DomainType,
    pub instance: Arc<dyn DomainObject>,
}

/// A callable tool.
#[derive(Clone)]
pub struct Tool {
    id: ToolId,
    name: String,
    description: String,
    input_schema: Value,
    handler: ToolHandler,
    layer: ToolLayer,
    binding: Option<ToolBinding>,
}

impl Tool {
    /// Create a tool whose handler returns JSON. The JSON becomes
    /// [`ToolOutput::Text`]; a bare JSON string is passed through unquoted.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::with_output(name, description, input_schema, move |args, _process| {
            let handler = Arc::clone(&handler);
            async move { handler(args).await.map(ToolOutput::from) }
        })
    }

    /// Create a tool with full control over its output and access to the
    /// invoking process.
    pub fn with_output<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ProcessContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Self {
            id: ToolId::next(),
            name: name.into(),
            description: description.into(),
            input_schema: convert_schema_to_openai(input_schema),
            handler: Arc::new(move |args, process| Box::pin(handler(args, process))),
            layer: ToolLayer::Plain,
            binding: None,
        }
    }

    /// Wrap `inner` in a decorator. The wrapper keeps the inner tool's name,
    /// description, schema and binding, and receives the inner tool so it can
    /// delegate.
    pub fn decorate<F, Fut>(inner: Arc<Tool>, decorator: F) -> Self
    where
        F: Fn(Arc<Tool>, Value, ProcessContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        let delegate = Arc::clone(&inner);
        Self {
            id: ToolId::next(),
            name: inner.name.clone(),
            description: inner.description.clone(),
            input_schema: inner.input_schema.clone(),
            handler: Arc::new(move |args, process| {
                Box::pin(decorator(Arc::clone(&delegate), args, process))
            }),
            binding: inner.binding.clone(),
            layer: ToolLayer::Wrapping(inner),
        }
    }

    /// Decorator that turns a slow call into [`ToolOutput::Error`].
    pub fn with_timeout(inner: Arc<Tool>, limit: Duration) -> Self {
        Self::decorate(inner, move |inner, args, process| async move {
            match tokio::time::timeout(limit, inner.call(args, &process)).await {
                Ok(result) => result,
                Err(_) => Ok(ToolOutput::error(format!(
                    "Tool '{}' timed out after {:?}",
                    inner.name(),
                    limit
                ))),
            }
        })
    }

    pub(crate) fn bound_to(mut self, binding: ToolBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Run the tool.
    ///
    /// Handler failures become [`ToolOutput::Error`] so the conversation can
    /// carry on; control-flow signals (replan, cancellation) propagate as `Err`.
    pub async fn call(&self, input: Value, process: &ProcessContext) -> Result<ToolOutput> {
        match (self.handler)(input, process.clone()).await {
            Ok(output) => Ok(output),
            Err(err) if err.is_control_flow() => Err(err),
            Err(err) => Ok(ToolOutput::Error {
                message: err.to_string(),
                cause: Some(Arc::new(anyhow::Error::new(err))),
            }),
        }
    }

    /// The tool this one decorates, if any.
    pub fn unwrap_once(&self) -> Option<&Arc<Tool>> {
        match &self.layer {
            ToolLayer::Plain => None,
            ToolLayer::Wrapping(inner) => Some(inner),
        }
    }

    /// This tool followed by every tool it wraps, outermost first.
    pub fn layers(&self) -> impl Iterator<Item = &Tool> {
        std::iter::successors(Some(self), |tool| tool.unwrap_once().map(|inner| inner.as_ref()))
    }

    /// The undecorated tool at the bottom of the chain.
    pub fn innermost(&self) -> &Tool {
        self.layers().last().unwrap_or(self)
    }

    /// True when `other` is this tool or appears anywhere in its decorator chain.
    pub fn is_or_wraps(&self, other: &Tool) -> bool {
        self.layers().any(|layer| layer.id == other.id)
    }

    pub fn to_openai_format(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema
            }
        })
    }

    pub fn id(&self) -> ToolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn layer(&self) -> &ToolLayer {
        &self.layer
    }

    pub fn binding(&self) -> Option<&ToolBinding> {
        self.binding.as_ref()
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field(
                "wraps",
                &self.unwrap_once().map(|inner| inner.id),
            )
            .finish()
    }
}

/// Normalise the supported schema notations into an OpenAI-style JSON Schema.
fn convert_schema_to_openai(schema: Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        });
    };

    // Already a full JSON Schema
    if obj.contains_key("type") && obj.contains_key("properties") {
        return schema;
    }

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for (param_name, param_type) in obj {
        if let Some(type_str) = param_type.as_str() {
            properties.insert(param_name.clone(), type_to_json_schema(type_str));
            required.push(param_name.clone());
        } else if let Some(prop_obj) = param_type.as_object() {
            let mut prop_obj = prop_obj.clone();

            // "optional" and per-property "required" are not JSON Schema; strip them
            let is_optional = prop_obj
                .remove("optional")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let is_required = prop_obj.remove("required").and_then(|v| v.as_bool());
            let has_default = prop_obj.contains_key("default");

            properties.insert(param_name.clone(), Value::Object(prop_obj));

            match is_required {
                Some(true) => required.push(param_name.clone()),
                Some(false) => {}
                None if is_optional || has_default => {}
                None => required.push(param_name.clone()),
            }
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        // Unknown names fall back to string
        _ => "string",
    };

    serde_json::json!({ "type": json_type })
}

/// Builder for creating tools with a fluent API.
///
/// ```rust
/// use open_agent_loop::tool;
/// use serde_json::json;
///
/// let add = tool("add", "Add two numbers")
///     .param("a", "number")
///     .param("b", "number")
///     .build(|args| async move {
///         let a = args["a"].as_f64().unwrap_or(0.0);
///         let b = args["b"].as_f64().unwrap_or(0.0);
///         Ok(json!({"result": a + b}))
///     });
/// assert_eq!(add.name(), "add");
/// ```
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
        }
    }

    /// Replace the schema wholesale.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Add a required parameter in simple type notation.
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if let Some(obj) = self.schema.as_object_mut() {
            obj.insert(name.to_string(), Value::String(type_str.to_string()));
        } else {
            self.schema = serde_json::json!({ name: type_str });
        }
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }

    pub fn build_with_output<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value, ProcessContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Tool::with_output(self.name, self.description, self.schema, handler)
    }
}

/// Start building a tool.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}
