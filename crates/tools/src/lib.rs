//! Tool trait and the computer-use tool implementations.
//!
//! The agent loop uses this crate to expose a persistent shell session and
//! screen/mouse/keyboard control to a tool-calling model.

pub mod computer;
pub mod shell;

pub use computer::{ComputerSettings, ComputerTool, DisplayCapture, XdotoolDriver};
pub use shell::{SessionConfig, ShellFlavor, ShellResponse, ShellSession, ShellTool};

use async_trait::async_trait;
use proto::{ToolDefinition, ToolResult};

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name exposed to the LLM.
    fn name(&self) -> &str;
    /// Human-readable description for tool selection.
    fn description(&self) -> &str;
    /// JSON schema for accepted tool arguments.
    fn parameters_schema(&self) -> serde_json::Value;
    /// Full definition handed to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }
    /// Executes the tool with the given call id and JSON args.
    async fn execute(&self, call_id: &str, args: serde_json::Value) -> ToolResult;
}
