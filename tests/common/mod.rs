//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use open_agent_loop::{
    ContentBlock, Error, InferenceCall, InferenceResponse, Message, Result, Tool, ToolUseBlock,
    tool,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Inference collaborator replaying a fixed script.
///
/// Records the history length and visible tool names of every call so tests
/// can check what the model was shown.
#[derive(Default)]
pub struct ScriptedInference {
    script: Mutex<VecDeque<Result<InferenceResponse>>>,
    calls: Mutex<Vec<SeenCall>>,
}

#[derive(Debug, Clone)]
pub struct SeenCall {
    pub history: Vec<Message>,
    pub tools: Vec<String>,
}

impl ScriptedInference {
    pub fn new(script: Vec<Result<InferenceResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<SeenCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tools_shown(&self) -> Vec<Vec<String>> {
        self.calls().into_iter().map(|c| c.tools).collect()
    }
}

#[async_trait]
impl InferenceCall for ScriptedInference {
    async fn infer(
        &self,
        history: &[Message],
        visible_tools: &[Arc<Tool>],
    ) -> Result<InferenceResponse> {
        self.calls.lock().unwrap().push(SeenCall {
            history: history.to_vec(),
            tools: visible_tools.iter().map(|t| t.name().to_string()).collect(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::illegal_state("inference script exhausted")))
    }
}

/// Assistant turn requesting one tool call.
pub fn call(name: &str, input: Value) -> Result<InferenceResponse> {
    call_with_id(&format!("call_{}", name), name, input)
}

pub fn call_with_id(id: &str, name: &str, input: Value) -> Result<InferenceResponse> {
    Ok(InferenceResponse::new(Message::assistant(vec![
        ContentBlock::ToolUse(ToolUseBlock::new(id, name, input)),
    ])))
}

/// Plain assistant answer.
pub fn answer(text: &str) -> Result<InferenceResponse> {
    Ok(InferenceResponse::new(Message::assistant_text(text)))
}

/// Tool answering `"<name> ran"`.
pub fn echo_tool(name: &str) -> Arc<Tool> {
    let reply = format!("{} ran", name);
    Arc::new(tool(name, format!("Echo tool {}", name)).build(move |_| {
        let reply = reply.clone();
        async move { Ok(json!(reply)) }
    }))
}

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}
