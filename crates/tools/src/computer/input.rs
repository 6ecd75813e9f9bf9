//! Mouse and keyboard synthesis.

use std::time::Duration;

use async_trait::async_trait;
use proto::ToolError;
use tokio::process::Command;
use tracing::debug;

use super::scaling::Resolution;

/// Mouse button understood by [`InputDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    fn xdotool_code(self) -> &'static str {
        match self {
            Self::Left => "1",
            Self::Middle => "2",
            Self::Right => "3",
        }
    }
}

/// Platform automation backend used by the computer tool.
#[async_trait]
pub trait InputDriver: Send + Sync {
    /// Physical size of the controlled screen.
    async fn screen_size(&self) -> Result<Resolution, ToolError>;
    /// Moves the pointer to screen coordinates.
    async fn move_to(&self, x: u32, y: u32) -> Result<(), ToolError>;
    async fn mouse_down(&self, button: MouseButton) -> Result<(), ToolError>;
    async fn mouse_up(&self, button: MouseButton) -> Result<(), ToolError>;
    /// Clicks `button` `clicks` times at the current pointer position.
    async fn click(&self, button: MouseButton, clicks: u8) -> Result<(), ToolError>;
    /// Presses a key or chord such as `Return` or `ctrl+c`.
    async fn press_key(&self, key: &str) -> Result<(), ToolError>;
    /// Types literal text with `delay` between keystrokes.
    async fn type_text(&self, text: &str, delay: Duration) -> Result<(), ToolError>;
    /// Current pointer position in screen coordinates.
    async fn cursor_position(&self) -> Result<(u32, u32), ToolError>;
}

/// [`InputDriver`] backed by the `xdotool` command.
#[derive(Debug, Clone, Default)]
pub struct XdotoolDriver {
    display: Option<String>,
}

impl XdotoolDriver {
    /// Targets `DISPLAY=:{n}` when a display number is given, else inherits `DISPLAY`.
    pub fn new(display_number: Option<u32>) -> Self {
        Self {
            display: display_number.map(|n| format!(":{n}")),
        }
    }

    async fn xdotool(&self, args: &[&str]) -> Result<String, ToolError> {
        debug!(?args, display = ?self.display, "Running xdotool");
        let mut cmd = Command::new("xdotool");
        cmd.args(args);
        if let Some(display) = &self.display {
            cmd.env("DISPLAY", display);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("xdotool failed to start: {e}")))?;
        if !output.status.success() {
            return Err(ToolError::ExecutionFailed(format!(
                "xdotool {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl InputDriver for XdotoolDriver {
    async fn screen_size(&self) -> Result<Resolution, ToolError> {
        let out = self.xdotool(&["getdisplaygeometry"]).await?;
        parse_geometry(&out)
            .ok_or_else(|| ToolError::ExecutionFailed(format!("unexpected geometry output: {out}")))
    }

    async fn move_to(&self, x: u32, y: u32) -> Result<(), ToolError> {
        let (x, y) = (x.to_string(), y.to_string());
        self.xdotool(&["mousemove", "--sync", &x, &y]).await.map(drop)
    }

    async fn mouse_down(&self, button: MouseButton) -> Result<(), ToolError> {
        self.xdotool(&["mousedown", button.xdotool_code()])
            .await
            .map(drop)
    }

    async fn mouse_up(&self, button: MouseButton) -> Result<(), ToolError> {
        self.xdotool(&["mouseup", button.xdotool_code()]).await.map(drop)
    }

    async fn click(&self, button: MouseButton, clicks: u8) -> Result<(), ToolError> {
        let repeat = clicks.to_string();
        self.xdotool(&["click", "--repeat", &repeat, button.xdotool_code()])
            .await
            .map(drop)
    }

    async fn press_key(&self, key: &str) -> Result<(), ToolError> {
        self.xdotool(&["key", "--", key]).await.map(drop)
    }

    async fn type_text(&self, text: &str, delay: Duration) -> Result<(), ToolError> {
        let delay = delay.as_millis().to_string();
        self.xdotool(&["type", "--delay", &delay, "--", text])
            .await
            .map(drop)
    }

    async fn cursor_position(&self) -> Result<(u32, u32), ToolError> {
        let out = self.xdotool(&["getmouselocation", "--shell"]).await?;
        parse_mouse_location(&out).ok_or_else(|| {
            ToolError::ExecutionFailed(format!("unexpected mouse location output: {out}"))
        })
    }
}

/// Parses `xdotool getdisplaygeometry` output (`"1920 1080"`).
fn parse_geometry(out: &str) -> Option<Resolution> {
    let mut parts = out.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some(Resolution::new(width, height))
}

/// Parses `xdotool getmouselocation --shell` output (`X=..`, `Y=..` lines).
fn parse_mouse_location(out: &str) -> Option<(u32, u32)> {
    let mut x = None;
    let mut y = None;
    for line in out.lines() {
        if let Some(v) = line.trim().strip_prefix("X=") {
            x = v.parse().ok();
        } else if let Some(v) = line.trim().strip_prefix("Y=") {
            y = v.parse().ok();
        }
    }
    Some((x?, y?))
}

/// Splits text into groups of at most `size` characters.
pub(crate) fn chunks(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}
