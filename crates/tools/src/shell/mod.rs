//! Persistent shell tool.
//!
//! [`ShellTool`] lazily starts a [`ShellSession`] on the first command, keeps
//! it alive across calls so shell state (cwd, exported variables) persists,
//! and replaces it on `restart`.

mod session;

pub use session::{
    CommandResult, DEFAULT_POLL_INTERVAL, DEFAULT_SENTINEL, DEFAULT_TIMEOUT, RESTART_REQUIRED_NOTE,
    SessionConfig, SessionState, ShellFlavor, ShellSession,
};

use async_trait::async_trait;
use proto::{ToolDefinition, ToolError, ToolResult};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::Tool;

/// System note returned after a successful restart.
pub const RESTARTED_NOTE: &str = "tool has been restarted.";

const TOOL_NAME: &str = "bash";
const API_TYPE: &str = "bash_20241022";

#[derive(Debug, Default, Deserialize)]
struct ShellArgs {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    restart: bool,
}

/// What a shell tool call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellResponse {
    /// The command ran (or the shell was found dead, see [`CommandResult::system`]).
    Completed(CommandResult),
    /// A fresh session is running.
    Restarted,
}

/// Tool that runs commands in one long-lived shell.
pub struct ShellTool {
    config: SessionConfig,
    session: Mutex<Option<ShellSession>>,
}

impl ShellTool {
    /// Creates a tool whose sessions use `config`. No process is spawned yet.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    /// Shell tool for the current platform with default tunables.
    pub fn native() -> Self {
        Self::new(SessionConfig::native())
    }

    /// Session configuration used for every (re)started session.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs `command`, or restarts the session when `restart` is set.
    ///
    /// With `restart`, any `command` is ignored.
    pub async fn invoke(
        &self,
        command: Option<&str>,
        restart: bool,
    ) -> Result<ShellResponse, ToolError> {
        if restart {
            self.restart().await?;
            return Ok(ShellResponse::Restarted);
        }
        let Some(command) = command else {
            return Err(ToolError::NoCommand);
        };

        let mut guard = self.session.lock().await;
        let session = match guard.take() {
            Some(session) => session,
            None => {
                let mut session = ShellSession::new(self.config.clone());
                session.start()?;
                debug!(program = %self.config.program, "Shell session created on first use");
                session
            }
        };
        guard
            .insert(session)
            .run(command)
            .await
            .map(ShellResponse::Completed)
    }

    /// Replaces the current session with a freshly started one.
    ///
    /// The old shell is killed and reaped before the new one is spawned.
    pub async fn restart(&self) -> Result<(), ToolError> {
        let mut guard = self.session.lock().await;
        if let Some(mut old) = guard.take() {
            old.shutdown().await?;
        }
        let mut session = ShellSession::new(self.config.clone());
        session.start()?;
        info!(program = %self.config.program, pid = ?session.pid(), "Shell session restarted");
        *guard = Some(session);
        Ok(())
    }

    /// Kills and reaps the current session, if any. The next command starts a new one.
    pub async fn shutdown(&self) -> Result<(), ToolError> {
        if let Some(mut session) = self.session.lock().await.take() {
            session.shutdown().await?;
            debug!("Shell session shut down");
        }
        Ok(())
    }

    /// State of the current session, or `None` before first use.
    pub async fn session_state(&self) -> Option<SessionState> {
        self.session.lock().await.as_ref().map(ShellSession::state)
    }

    /// Process id of the current shell, if any.
    pub async fn session_pid(&self) -> Option<u32> {
        self.session.lock().await.as_ref().and_then(ShellSession::pid)
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::native()
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run commands in a persistent shell session. State such as the working directory \
         and exported variables is kept between calls. Set `restart` to replace a shell \
         that timed out or exited."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to run in the shell"
                },
                "restart": {
                    "type": "boolean",
                    "description": "Restart the shell session instead of running a command"
                }
            },
            "additionalProperties": false
        })
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
            .with_api_type(API_TYPE)
    }

    async fn execute(&self, call_id: &str, args: serde_json::Value) -> ToolResult {
        let args: ShellArgs = if args.is_null() {
            ShellArgs::default()
        } else {
            match serde_json::from_value(args) {
                Ok(a) => a,
                Err(e) => {
                    return ToolResult::error(call_id, self.name(), format!("Invalid arguments: {e}"));
                }
            }
        };

        match self.invoke(args.command.as_deref(), args.restart).await {
            Ok(ShellResponse::Restarted) => {
                ToolResult::success(call_id, self.name(), "").with_system(RESTARTED_NOTE)
            }
            Ok(ShellResponse::Completed(result)) => match result.system {
                Some(note) => ToolResult::error(call_id, self.name(), result.stderr).with_system(note),
                None => ToolResult::success(
                    call_id,
                    self.name(),
                    format_output(&result.stdout, &result.stderr),
                ),
            },
            Err(e) => ToolResult::error(call_id, self.name(), e.to_string()),
        }
    }
}

/// Formats command stdout/stderr into a single text payload.
fn format_output(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();

    if !stdout.is_empty() {
        out.push_str("stdout:\n");
        out.push_str(stdout);
        if !stdout.ends_with('\n') {
            out.push('\n');
        }
    }

    if !stderr.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("stderr:\n");
        out.push_str(stderr);
        if !stderr.ends_with('\n') {
            out.push('\n');
        }
    }

    if out.is_empty() {
        out.push_str("(no output)");
    }
    out
}
