//! Shared protocol types for the computer-use tools.
//!
//! This crate defines the serializable tool structures handed to and from
//! a tool-calling model, plus strongly-typed error enums shared across the
//! workspace.

pub mod error;
pub mod tool;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of tool call definition and result types.
pub use tool::{ToolCall, ToolDefinition, ToolResult};
