//! Several injection strategies registered on one loop.

mod common;

use common::{ScriptedInference, answer, echo_tool};
use open_agent_loop::{
    Artifact, ContentBlock, DomainObject, DomainToolInjection, DomainToolSource,
    FacadeInjection, FacadeSelector, FacadeTool, InferenceResponse, LoopOptions, Message,
    ProcessContext, Tool, ToolInjectionContext, ToolInjectionResult, ToolInjectionStrategy,
    ToolLoop, ToolOutput, ToolUseBlock, tool,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

struct Ticket;

impl DomainObject for Ticket {
    fn tools(self: Arc<Self>) -> Vec<Tool> {
        vec![tool("close_ticket", "Close the bound ticket")
            .build(|_| async { Ok(json!("closed")) })]
    }
}

fn open_ticket() -> Arc<Tool> {
    Arc::new(tool("open_ticket", "Open a ticket").build_with_output(|_, _| async {
        Ok(ToolOutput::with_artifact("opened", Artifact::object(Ticket)))
    }))
}

/// Retires `search` after any call and records the tool names it was shown.
struct RetireSearch {
    seen: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ToolInjectionStrategy for RetireSearch {
    fn name(&self) -> &str {
        "retire-search"
    }

    fn evaluate(&self, ctx: &ToolInjectionContext<'_>) -> ToolInjectionResult {
        self.seen
            .lock()
            .unwrap()
            .push(ctx.visible_tools.iter().map(|t| t.name().to_string()).collect());
        match ctx.visible_tools.iter().find(|t| t.name() == "search") {
            Some(search) => ToolInjectionResult::Remove(vec![Arc::clone(search)]),
            None => ToolInjectionResult::NoChange,
        }
    }
}

/// One assistant turn requesting both calls.
fn facade_and_ticket_turn() -> open_agent_loop::Result<InferenceResponse> {
    Ok(InferenceResponse::new(Message::assistant(vec![
        ContentBlock::ToolUse(ToolUseBlock::new(
            "call_1",
            "file_tools",
            json!({"tools": ["read_file"]}),
        )),
        ContentBlock::ToolUse(ToolUseBlock::new("call_2", "open_ticket", json!({}))),
    ])))
}

#[tokio::test]
async fn test_strategies_merge_against_one_snapshot() {
    common::init_logging();

    let facade = FacadeTool::builder("file_tools", "Enable file tools")
        .inner_tools(vec![echo_tool("read_file"), echo_tool("write_file")])
        .selector(FacadeSelector::ByName)
        .build();
    let first_seen = Arc::new(Mutex::new(Vec::new()));
    let second_seen = Arc::new(Mutex::new(Vec::new()));

    let inference = ScriptedInference::new(vec![facade_and_ticket_turn(), answer("done")]);
    let engine = ToolLoop::new(
        inference.clone(),
        LoopOptions::builder()
            .strategy(FacadeInjection::new().with_facade(facade.clone()))
            .strategy(DomainToolInjection::registered(vec![DomainToolSource::of::<Ticket>()]))
            .strategy(RetireSearch {
                seen: Arc::clone(&first_seen),
            })
            .strategy(RetireSearch {
                seen: Arc::clone(&second_seen),
            })
            .build()
            .unwrap(),
    );

    let outcome = engine
        .run(
            vec![Message::user("read the log and file a ticket")],
            vec![echo_tool("search"), facade.tool(), open_ticket()],
            &ProcessContext::default(),
        )
        .await
        .unwrap();

    // The facade's replacement and the binding's addition combine; `search`
    // is removed once even though two strategies asked for it
    assert_eq!(
        inference.tools_shown(),
        vec![
            vec!["search", "file_tools", "open_ticket"],
            vec!["open_ticket", "read_file", "close_ticket"],
        ]
    );

    // Both calls of the turn were evaluated against the pre-injection set
    let before = vec!["search", "file_tools", "open_ticket"];
    for seen in [&first_seen, &second_seen] {
        assert_eq!(*seen.lock().unwrap(), vec![before.clone(), before.clone()]);
    }
    assert_eq!(outcome.bound_artifacts.len(), 1);
    assert_eq!(outcome.iterations, 2);
}
