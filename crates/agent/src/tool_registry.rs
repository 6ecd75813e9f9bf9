//! Name-indexed collection of the tools offered to the model.

use std::collections::BTreeMap;
use std::sync::Arc;

use proto::{ToolCall, ToolDefinition, ToolResult};
use tools::Tool;
use tracing::{debug, warn};

/// Tools keyed by the name the model calls them by, in name order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `tool`. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_shared(Arc::new(tool));
    }

    /// Adds a tool the caller keeps a handle to, e.g. to restart a shell out of band.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Tool registered twice, keeping the latest");
        } else {
            debug!(tool = %name, "Tool registered");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Definitions handed to the model, including api types and display options.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    /// Runs `name` with `args`. Unknown names yield an error result.
    pub async fn execute(&self, call_id: &str, name: &str, args: serde_json::Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            warn!(tool = %name, call_id, "Call for unknown tool");
            return ToolResult::error(call_id, name, format!("Tool '{name}' not found"));
        };
        debug!(tool = %name, call_id, "Executing tool");
        tool.execute(call_id, args).await
    }

    /// Runs a call requested by the model.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        self.execute(&call.id, &call.name, call.arguments.clone())
            .await
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }
}
