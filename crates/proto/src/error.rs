use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Tool registration/execution error.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// Tool execution errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Requested tool is unknown.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Tool process or operation failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Tool call arguments are invalid.
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// Shell tool was called with neither a command nor a restart request.
    #[error("no command provided.")]
    NoCommand,

    /// A session was used before `start()`.
    #[error("Session has not started.")]
    NotStarted,

    /// A command did not produce its sentinel in time; the session is dead.
    #[error("timed out: {shell} has not returned in {secs} seconds and must be restarted")]
    TimedOut { shell: String, secs: f64 },

    /// The shell process could not be spawned.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// API coordinates fall outside the scaled display.
    #[error("Coordinates {x}, {y} are out of bounds")]
    OutOfBounds { x: u32, y: u32 },

    /// Filesystem/process IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
