//! End-to-end behavior of the shell tool through the `Tool` interface.
#![cfg(unix)]

use std::time::Duration;

use tools::Tool;
use tools::shell::{SessionConfig, ShellTool};

fn tool() -> ShellTool {
    ShellTool::new(
        SessionConfig::bash()
            .with_timeout(Duration::from_secs(10))
            .with_poll_interval(Duration::from_millis(20)),
    )
}

#[tokio::test]
async fn echo_hello_scenario() {
    let tool = tool();
    let result = tool
        .execute("call-1", serde_json::json!({"command": "echo hello"}))
        .await;
    assert!(!result.is_error);
    assert_eq!(result.output, "stdout:\nhello\n");
    assert!(result.system.is_none());
}

#[tokio::test]
async fn restart_then_command_scenario() {
    let tool = tool();
    let restarted = tool
        .execute("call-1", serde_json::json!({"restart": true}))
        .await;
    assert_eq!(restarted.system.as_deref(), Some("tool has been restarted."));

    let result = tool
        .execute("call-2", serde_json::json!({"command": "echo x"}))
        .await;
    assert!(!result.is_error);
    assert_eq!(result.output, "stdout:\nx\n");
}

#[tokio::test]
async fn missing_command_scenario() {
    let tool = tool();
    let result = tool.execute("call-1", serde_json::json!({})).await;
    assert!(result.is_error);
    assert!(result.output.contains("no command provided"));
}

#[tokio::test]
async fn working_directory_survives_between_calls() {
    let dir = tempfile::tempdir().expect("temp dir");
    let tool = tool();
    let cd = format!("cd '{}'", dir.path().display());
    tool.execute("call-1", serde_json::json!({"command": cd}))
        .await;
    let result = tool
        .execute("call-2", serde_json::json!({"command": "pwd"}))
        .await;
    let canonical = dir.path().canonicalize().expect("canonical");
    assert!(
        result.output.contains(&dir.path().display().to_string())
            || result.output.contains(&canonical.display().to_string())
    );
}

#[tokio::test]
async fn timed_out_session_recovers_only_after_restart() {
    let tool = ShellTool::new(
        SessionConfig::bash()
            .with_timeout(Duration::from_millis(300))
            .with_poll_interval(Duration::from_millis(20)),
    );
    let result = tool
        .execute("call-1", serde_json::json!({"command": "sleep 5"}))
        .await;
    assert!(result.is_error);
    assert!(result.output.contains("timed out"));

    let result = tool
        .execute("call-2", serde_json::json!({"command": "echo x"}))
        .await;
    assert!(result.is_error);
    assert!(result.output.contains("must be restarted"));

    tool.execute("call-3", serde_json::json!({"restart": true}))
        .await;
    let result = tool
        .execute("call-4", serde_json::json!({"command": "echo x"}))
        .await;
    assert!(!result.is_error);
    assert_eq!(result.output, "stdout:\nx\n");
}
