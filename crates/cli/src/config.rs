use proto::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tools::shell::{DEFAULT_SENTINEL, SessionConfig};
use tools::ComputerSettings;
use tools::computer::Resolution;
use tracing::debug;

/// Top-level CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Persistent shell session tunables.
    #[serde(default)]
    pub shell: ShellConfig,

    /// Screen/mouse/keyboard tool tunables.
    #[serde(default)]
    pub computer: ComputerConfig,
}

/// `[shell]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Shell program override. Empty uses the platform shell.
    #[serde(default)]
    pub program: Option<String>,
    /// Arguments for `program`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Seconds a command may run before the session is declared dead.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Milliseconds between output buffer inspections.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// End-of-output marker echoed after each command.
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
}

fn default_timeout_secs() -> f64 {
    120.0
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_sentinel() -> String {
    DEFAULT_SENTINEL.to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            sentinel: default_sentinel(),
        }
    }
}

/// `[computer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputerConfig {
    /// Downscale the screen reported to the model.
    #[serde(default = "default_true")]
    pub scaling_enabled: bool,
    /// Screen width override; detected when unset.
    #[serde(default)]
    pub width: Option<u32>,
    /// Screen height override; detected when unset.
    #[serde(default)]
    pub height: Option<u32>,
    /// X display number (`DISPLAY=:{n}`).
    #[serde(default)]
    pub display_number: Option<u32>,
    /// Index of the display to capture.
    #[serde(default)]
    pub capture_display: usize,
    #[serde(default = "default_screenshot_delay_ms")]
    pub screenshot_delay_ms: u64,
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,
    #[serde(default = "default_typing_group_size")]
    pub typing_group_size: usize,
    /// Directory where screenshots are kept. Unset keeps them in memory only.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_screenshot_delay_ms() -> u64 {
    2000
}

fn default_typing_delay_ms() -> u64 {
    12
}

fn default_typing_group_size() -> usize {
    50
}

impl Default for ComputerConfig {
    fn default() -> Self {
        Self {
            scaling_enabled: true,
            width: None,
            height: None,
            display_number: None,
            capture_display: 0,
            screenshot_delay_ms: default_screenshot_delay_ms(),
            typing_delay_ms: default_typing_delay_ms(),
            typing_group_size: default_typing_group_size(),
            output_dir: None,
        }
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl Config {
    /// Loads configuration from explicit path, fallback locations, and env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            // Look in current dir, then home dir
            let cwd = std::env::current_dir().ok()?.join("config.toml");
            if cwd.exists() {
                return Some(cwd);
            }
            let home = std::env::var("HOME").ok()?;
            let home_config = PathBuf::from(home).join(".computer-use").join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        // Environment variable overrides
        if let Ok(program) = std::env::var("COMPUTER_USE_SHELL")
            && !program.trim().is_empty()
        {
            config.shell.program = Some(program);
        }
        if let Ok(secs) = std::env::var("COMPUTER_USE_TIMEOUT_SECS") {
            config.shell.timeout_secs = secs
                .parse()
                .map_err(|_| invalid("COMPUTER_USE_TIMEOUT_SECS", "not a number"))?;
        }
        if let Ok(width) = std::env::var("WIDTH")
            && let Ok(w) = width.parse::<u32>()
        {
            config.computer.width = Some(w);
        }
        if let Ok(height) = std::env::var("HEIGHT")
            && let Ok(h) = height.parse::<u32>()
        {
            config.computer.height = Some(h);
        }
        if let Ok(display) = std::env::var("DISPLAY_NUM")
            && let Ok(n) = display.parse::<u32>()
        {
            config.computer.display_number = Some(n);
        }

        debug!(
            shell = ?config.shell.program,
            timeout_secs = config.shell.timeout_secs,
            scaling = config.computer.scaling_enabled,
            "Config loaded"
        );
        Ok(config)
    }

    /// Validated, immutable session configuration for the shell tool.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let shell = &self.shell;
        if !shell.timeout_secs.is_finite() || shell.timeout_secs <= 0.0 {
            return Err(invalid("shell.timeout_secs", "must be a positive number"));
        }
        let timeout = Duration::try_from_secs_f64(shell.timeout_secs)
            .map_err(|_| invalid("shell.timeout_secs", "is too large"))?;
        if shell.poll_interval_ms == 0 {
            return Err(invalid("shell.poll_interval_ms", "must be greater than zero"));
        }
        if shell.sentinel.trim().is_empty() {
            return Err(invalid("shell.sentinel", "must not be empty"));
        }

        let mut session = SessionConfig::native()
            .with_timeout(timeout)
            .with_poll_interval(Duration::from_millis(shell.poll_interval_ms))
            .with_sentinel(shell.sentinel.clone());
        if let Some(program) = shell.program.as_deref().filter(|p| !p.trim().is_empty()) {
            session = session.with_program(program, shell.args.clone());
        }
        Ok(session)
    }

    /// Screen size from `width`/`height`, when both are set.
    pub fn screen_override(&self) -> Option<Resolution> {
        match (self.computer.width, self.computer.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(Resolution::new(w, h)),
            _ => None,
        }
    }

    /// Settings for the computer tool.
    pub fn computer_settings(&self) -> Result<ComputerSettings, ConfigError> {
        let computer = &self.computer;
        if computer.typing_group_size == 0 {
            return Err(invalid("computer.typing_group_size", "must be greater than zero"));
        }
        Ok(ComputerSettings {
            scaling_enabled: computer.scaling_enabled,
            display_number: computer.display_number,
            screenshot_delay: Duration::from_millis(computer.screenshot_delay_ms),
            typing_delay: Duration::from_millis(computer.typing_delay_ms),
            typing_group_size: computer.typing_group_size,
            output_dir: computer.output_dir.clone(),
        })
    }
}
