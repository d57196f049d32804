//! Tool definitions: the capabilities a model may call.
//!
//! A [`Tool`] is plain data plus an optional executor. Tools without an
//! executor are client-side: the browser (or whoever drives the request)
//! runs them and sends the result back with the next request.
//!
//! Synchronous and asynchronous executors are both wrapped into one
//! [`ToolExecutor`] trait object, so the tool-call manager can await them
//! uniformly.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// Runs a tool against parsed arguments.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

struct SyncExecutor<F>(F);

#[async_trait]
impl<F, E> ToolExecutor for SyncExecutor<F>
where
    F: Fn(Value) -> Result<Value, E> + Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
{
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        (self.0)(input).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

struct AsyncExecutor<F>(F);

#[async_trait]
impl<F, Fut, E> ToolExecutor for AsyncExecutor<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        (self.0)(input)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

/// What gets sent to the model to describe a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

/// One callable capability offered to the model.
#[derive(Clone)]
pub struct Tool {
    /// Unique, stable name used by the model
    pub name: String,

    /// Passed to the model verbatim
    pub description: String,

    /// JSON Schema for the arguments
    pub input_schema: Option<Value>,

    /// JSON Schema for the result
    pub output_schema: Option<Value>,

    /// Server-side executor. `None` means the client executes it.
    pub executor: Option<Arc<dyn ToolExecutor>>,

    /// Require an explicit approval before running
    pub needs_approval: bool,

    /// Opaque metadata
    pub metadata: serde_json::Map<String, Value>,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: None,
            output_schema: None,
            executor: None,
            needs_approval: false,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Attach a synchronous executor.
    pub fn with_sync<F, E>(self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, E> + Send + Sync + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.with_executor(Arc::new(SyncExecutor(f)))
    }

    /// Attach an asynchronous executor.
    pub fn with_async<F, Fut, E>(self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.with_executor(Arc::new(AsyncExecutor(f)))
    }

    pub fn requiring_approval(mut self) -> Self {
        self.needs_approval = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Client-side tools have no executor.
    pub fn is_client_side(&self) -> bool {
        self.executor.is_none()
    }

    /// Convert this tool into a ToolDefinition for sending to the model.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone().unwrap_or_else(|| {
                serde_json::json!({ "type": "object", "properties": {} })
            }),
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .field("executor", &self.executor.as_ref().map(|_| "<executor>"))
            .field("needs_approval", &self.needs_approval)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Look up a tool by name in a per-request tool list.
pub fn find_tool<'a>(tools: &'a [Tool], name: &str) -> Option<&'a Tool> {
    tools.iter().find(|t| t.name == name)
}
