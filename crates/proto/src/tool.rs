use serde::{Deserialize, Serialize};

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call identifier.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments for the tool.
    pub arguments: serde_json::Value,
}

/// Declarative description of a tool, consumable by a tool-calling model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name exposed to the model.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema of the accepted arguments.
    pub parameters: serde_json::Value,
    /// Provider-defined tool type (e.g. `bash_20241022`), if any.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub api_type: Option<String>,
    /// Extra provider options such as display dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

impl ToolDefinition {
    /// Creates a plain function-style tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            api_type: None,
            options: None,
        }
    }

    /// Attaches a provider tool type.
    pub fn with_api_type(mut self, api_type: impl Into<String>) -> Self {
        self.api_type = Some(api_type.into());
        self
    }

    /// Attaches provider options.
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = Some(options);
        self
    }
}

/// Result of a single tool execution, handed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Call identifier this result answers.
    pub call_id: String,
    /// Name of the tool that produced the result.
    pub tool_name: String,
    /// Text payload.
    pub output: String,
    /// Whether the execution failed.
    pub is_error: bool,
    /// Out-of-band note for the model, e.g. "tool must be restarted".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Base64-encoded PNG attached to the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,
}

impl ToolResult {
    /// Creates a successful result.
    pub fn success(call_id: &str, tool_name: &str, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            output: output.into(),
            is_error: false,
            system: None,
            base64_image: None,
        }
    }

    /// Creates a failed result.
    pub fn error(call_id: &str, tool_name: &str, output: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::success(call_id, tool_name, output)
        }
    }

    /// Attaches a system note.
    pub fn with_system(mut self, note: impl Into<String>) -> Self {
        self.system = Some(note.into());
        self
    }

    /// Attaches a base64-encoded PNG image.
    pub fn with_image(mut self, base64_png: impl Into<String>) -> Self {
        self.base64_image = Some(base64_png.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_result_keeps_identity() {
        let result = ToolResult::error("c1", "bash", "boom");
        assert!(result.is_error);
        assert_eq!(result.call_id, "c1");
        assert_eq!(result.tool_name, "bash");
        assert_eq!(result.output, "boom");
        assert!(result.system.is_none());
    }

    #[test]
    fn optional_fields_are_skipped_when_empty() {
        let json = serde_json::to_value(ToolResult::success("c1", "bash", "ok")).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("base64_image").is_none());

        let json = serde_json::to_value(
            ToolResult::success("c1", "bash", "").with_system("tool has been restarted."),
        )
        .unwrap();
        assert_eq!(json["system"], "tool has been restarted.");
    }

    #[test]
    fn definition_serializes_api_type_as_type() {
        let def = ToolDefinition::new("bash", "shell", serde_json::json!({"type":"object"}))
            .with_api_type("bash_20241022");
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["type"], "bash_20241022");
        assert!(json.get("options").is_none());
    }
}
