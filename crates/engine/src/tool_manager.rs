//! Tool-call manager: turns completed tool calls into results.
//!
//! Every call resolves to exactly one of:
//! - a `tool_result` chunk plus a tool-role message (success, executor
//!   fault, unknown tool, malformed arguments, declined approval)
//! - an `approval-requested` chunk, suspending the call until a decision
//!   arrives with a later request
//! - a `tool-input-available` chunk, suspending a client-side tool until
//!   the client sends its result
//!
//! Executors of independent calls run concurrently; the batch is returned
//! only after all of them have finished. Chunks and messages always follow
//! the order the model issued the calls in.

use std::collections::HashMap;
use std::sync::Arc;

use chatrelay_core::{
    ApprovalInfo, ChunkKind, Envelope, ModelMessage, StreamChunk, Tool, ToolCall, ToolError,
    ToolExecutor, tool::find_tool,
};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

const DECLINED_MESSAGE: &str = "User declined tool execution";

/// Approval handle id for a tool call.
pub fn approval_id(tool_call_id: &str) -> String {
    format!("approval_{tool_call_id}")
}

/// Outcome of one batch of tool calls.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ToolBatch {
    /// `tool_result`, `approval-requested` and `tool-input-available`
    /// chunks in call order
    pub chunks: Vec<StreamChunk>,

    /// Tool-role messages for every resolved call
    pub messages: Vec<ModelMessage>,

    /// Ids of calls waiting for an approval decision
    pub needs_approval: Vec<String>,

    /// Ids of client-side calls waiting for the client's result
    pub needs_client_execution: Vec<String>,
}

impl ToolBatch {
    /// At least one call is waiting on the outside world.
    pub fn is_suspended(&self) -> bool {
        !self.needs_approval.is_empty() || !self.needs_client_execution.is_empty()
    }
}

/// How a single call gets resolved.
enum Plan {
    Resolved(Value),
    Execute(Arc<dyn ToolExecutor>, Value),
    AwaitApproval(Value),
    AwaitClient(Value),
}

/// Resolves tool calls against a per-request tool list.
#[derive(Clone, Copy)]
pub struct ToolCallManager<'a> {
    tools: &'a [Tool],
    approvals: Option<&'a HashMap<String, bool>>,
    client_results: Option<&'a HashMap<String, Value>>,
}

impl<'a> ToolCallManager<'a> {
    pub fn new(tools: &'a [Tool]) -> Self {
        Self {
            tools,
            approvals: None,
            client_results: None,
        }
    }

    /// Approval decisions keyed by tool call id.
    pub fn with_approvals(mut self, approvals: &'a HashMap<String, bool>) -> Self {
        self.approvals = Some(approvals);
        self
    }

    /// Client-side tool results keyed by tool call id.
    pub fn with_client_results(mut self, results: &'a HashMap<String, Value>) -> Self {
        self.client_results = Some(results);
        self
    }

    fn approval(&self, tool_call_id: &str) -> Option<bool> {
        self.approvals.and_then(|m| m.get(tool_call_id).copied())
    }

    fn client_result(&self, tool_call_id: &str) -> Option<&'a Value> {
        self.client_results.and_then(|m| m.get(tool_call_id))
    }

    fn plan(&self, call: &ToolCall) -> Plan {
        let Some(tool) = find_tool(self.tools, call.name()) else {
            warn!(tool = %call.name(), tool_call_id = %call.id, "Model called an unknown tool");
            return Plan::Resolved(error_value(&ToolError::NotFound(call.name().to_string())));
        };

        let input = match call.parse_arguments() {
            Ok(input) => input,
            Err(e) => {
                warn!(tool = %tool.name, error = %e, "Tool arguments are not valid JSON");
                return Plan::Resolved(error_value(&ToolError::InvalidArguments(e.to_string())));
            }
        };

        if tool.needs_approval {
            match self.approval(&call.id) {
                Some(true) => debug!(tool = %tool.name, "Tool call approved"),
                Some(false) => {
                    debug!(tool = %tool.name, "Tool call declined");
                    return Plan::Resolved(serde_json::json!({ "error": DECLINED_MESSAGE }));
                }
                None => return Plan::AwaitApproval(input),
            }
        }

        match &tool.executor {
            Some(executor) => Plan::Execute(Arc::clone(executor), input),
            None => match self.client_result(&call.id) {
                Some(result) => Plan::Resolved(result.clone()),
                None => Plan::AwaitClient(input),
            },
        }
    }

    /// Resolve every call. Chunks carry `envelope`'s id and model.
    pub async fn execute(&self, calls: &[ToolCall], envelope: &Envelope) -> ToolBatch {
        let plans: Vec<Plan> = calls.iter().map(|call| self.plan(call)).collect();

        // Run all executors at once; the rest resolve immediately.
        let outcomes = join_all(calls.iter().zip(plans).map(|(call, plan)| async move {
            match plan {
                Plan::Execute(executor, input) => {
                    let started = std::time::Instant::now();
                    let result = executor.execute(input).await;
                    let duration_ms = started.elapsed().as_millis() as u64;
                    match result {
                        Ok(value) => {
                            debug!(tool = %call.name(), duration_ms, "Tool executed");
                            Plan::Resolved(value)
                        }
                        Err(e) => {
                            warn!(tool = %call.name(), duration_ms, error = %e, "Tool execution failed");
                            Plan::Resolved(error_value(&e))
                        }
                    }
                }
                other => other,
            }
        }))
        .await;

        let mut batch = ToolBatch::default();
        for (call, outcome) in calls.iter().zip(outcomes) {
            match outcome {
                Plan::Resolved(value) => {
                    let content = result_content(&value);
                    batch.chunks.push(envelope.wrap(ChunkKind::ToolResult {
                        tool_call_id: call.id.clone(),
                        content: content.clone(),
                    }));
                    batch
                        .messages
                        .push(ModelMessage::tool_result(&call.id, content));
                }
                Plan::AwaitApproval(input) => {
                    batch.chunks.push(envelope.wrap(ChunkKind::ApprovalRequested {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name().to_string(),
                        input,
                        approval: ApprovalInfo {
                            id: approval_id(&call.id),
                            needs_approval: true,
                        },
                    }));
                    batch.needs_approval.push(call.id.clone());
                }
                Plan::AwaitClient(input) => {
                    batch.chunks.push(envelope.wrap(ChunkKind::ToolInputAvailable {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name().to_string(),
                        input,
                    }));
                    batch.needs_client_execution.push(call.id.clone());
                }
                // Executors were all awaited above.
                Plan::Execute(..) => {}
            }
        }
        batch
    }
}

fn error_value(err: &ToolError) -> Value {
    serde_json::json!({ "error": err.to_string() })
}

/// Strings pass through; anything else is JSON encoded.
fn result_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
