//! Tool collection handed to the agent loop.

pub mod tool_registry;

/// Runtime tool registry.
pub use tool_registry::ToolRegistry;
