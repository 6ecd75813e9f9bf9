//! Screen, mouse and keyboard control tool.
//!
//! Coordinates exchanged with the model live in a downscaled "API" space
//! (see [`scaling`]); input synthesis and capture are delegated to an
//! [`InputDriver`] and a [`ScreenCapture`].

mod capture;
mod input;
pub mod scaling;

pub use capture::{DisplayCapture, ScreenCapture};
pub use input::{InputDriver, MouseButton, XdotoolDriver};
pub use scaling::{FALLBACK_SCREEN, Resolution, Scaler, ScalingSource};

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use proto::{ToolDefinition, ToolError, ToolResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Tool;

const TOOL_NAME: &str = "computer";
const API_TYPE: &str = "computer_20241022";

/// Actions accepted by the computer tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Key,
    Type,
    MouseMove,
    LeftClick,
    LeftClickDrag,
    RightClick,
    MiddleClick,
    DoubleClick,
    Screenshot,
    CursorPosition,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::Key,
        Action::Type,
        Action::MouseMove,
        Action::LeftClick,
        Action::LeftClickDrag,
        Action::RightClick,
        Action::MiddleClick,
        Action::DoubleClick,
        Action::Screenshot,
        Action::CursorPosition,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Type => "type",
            Self::MouseMove => "mouse_move",
            Self::LeftClick => "left_click",
            Self::LeftClickDrag => "left_click_drag",
            Self::RightClick => "right_click",
            Self::MiddleClick => "middle_click",
            Self::DoubleClick => "double_click",
            Self::Screenshot => "screenshot",
            Self::CursorPosition => "cursor_position",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ToolError::InvalidArgs(format!("Invalid action: {s}")))
    }
}

/// Tunables of the computer tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputerSettings {
    /// Report a downscaled screen to the model and scale its coordinates back.
    pub scaling_enabled: bool,
    /// X display number, reported to the model and used by the input driver.
    pub display_number: Option<u32>,
    /// Pause between typing and the follow-up screenshot.
    pub screenshot_delay: Duration,
    /// Delay between typed keystrokes.
    pub typing_delay: Duration,
    /// Characters typed per driver call.
    pub typing_group_size: usize,
    /// Directory where screenshots are also written, if any.
    pub output_dir: Option<PathBuf>,
}

impl Default for ComputerSettings {
    fn default() -> Self {
        Self {
            scaling_enabled: true,
            display_number: None,
            screenshot_delay: Duration::from_secs(2),
            typing_delay: Duration::from_millis(12),
            typing_group_size: 50,
            output_dir: None,
        }
    }
}

/// Display description sent to the model alongside the tool definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComputerOptions {
    pub display_width_px: u32,
    pub display_height_px: u32,
    pub display_number: Option<u32>,
}

/// Outcome of one computer action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    pub output: Option<String>,
    pub base64_image: Option<String>,
}

impl ActionOutput {
    fn text(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            base64_image: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ComputerArgs {
    action: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    coordinate: Option<Vec<i64>>,
}

/// Tool that lets the model look at and drive the desktop.
pub struct ComputerTool {
    driver: Arc<dyn InputDriver>,
    capture: Arc<dyn ScreenCapture>,
    scaler: Scaler,
    settings: ComputerSettings,
}

impl ComputerTool {
    /// Creates a tool for a screen of known size.
    pub fn new(
        driver: Arc<dyn InputDriver>,
        capture: Arc<dyn ScreenCapture>,
        screen: Resolution,
        settings: ComputerSettings,
    ) -> Self {
        Self {
            driver,
            capture,
            scaler: Scaler::new(screen, settings.scaling_enabled),
            settings,
        }
    }

    /// Creates a tool, asking the driver for the screen size.
    ///
    /// Falls back to [`FALLBACK_SCREEN`] when the size cannot be detected.
    pub async fn detect(
        driver: Arc<dyn InputDriver>,
        capture: Arc<dyn ScreenCapture>,
        settings: ComputerSettings,
    ) -> Self {
        let screen = match driver.screen_size().await {
            Ok(size) => size,
            Err(e) => {
                warn!("Screen size detection failed ({e}), assuming {FALLBACK_SCREEN:?}");
                FALLBACK_SCREEN
            }
        };
        Self::new(driver, capture, screen, settings)
    }

    /// Display dimensions in API space.
    pub fn options(&self) -> ComputerOptions {
        let size = self.scaler.api_size();
        ComputerOptions {
            display_width_px: size.width,
            display_height_px: size.height,
            display_number: self.settings.display_number,
        }
    }

    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }

    /// Validates arguments for `action` and performs it.
    pub async fn act(
        &self,
        action: Action,
        text: Option<&str>,
        coordinate: Option<&[i64]>,
    ) -> Result<ActionOutput, ToolError> {
        let invalid = |msg: String| -> Result<ActionOutput, ToolError> {
            Err(ToolError::InvalidArgs(msg))
        };
        debug!(%action, ?coordinate, "Computer action");
        match action {
            Action::MouseMove | Action::LeftClickDrag => {
                let Some(coordinate) = coordinate else {
                    return invalid(format!("coordinate is required for {action}"));
                };
                if text.is_some() {
                    return invalid(format!("text is not accepted for {action}"));
                }
                let (x, y) = validate_coordinate(coordinate)?;
                let (x, y) = self.scaler.scale(ScalingSource::Api, x, y)?;

                if action == Action::MouseMove {
                    self.driver.move_to(x, y).await?;
                    Ok(ActionOutput::text("Mouse moved"))
                } else {
                    self.driver.mouse_down(MouseButton::Left).await?;
                    self.driver.move_to(x, y).await?;
                    self.driver.mouse_up(MouseButton::Left).await?;
                    Ok(ActionOutput::text("Mouse dragged"))
                }
            }
            Action::Key | Action::Type => {
                let Some(text) = text else {
                    return invalid(format!("text is required for {action}"));
                };
                if coordinate.is_some() {
                    return invalid(format!("coordinate is not accepted for {action}"));
                }

                if action == Action::Key {
                    self.driver.press_key(text).await?;
                    return Ok(ActionOutput::text("Key pressed"));
                }
                for chunk in input::chunks(text, self.settings.typing_group_size) {
                    self.driver
                        .type_text(&chunk, self.settings.typing_delay)
                        .await?;
                }
                tokio::time::sleep(self.settings.screenshot_delay).await;
                let shot = self.screenshot().await?;
                Ok(ActionOutput {
                    output: Some("Text typed".to_string()),
                    base64_image: shot.base64_image,
                })
            }
            Action::LeftClick
            | Action::RightClick
            | Action::MiddleClick
            | Action::DoubleClick
            | Action::Screenshot
            | Action::CursorPosition => {
                if text.is_some() {
                    return invalid(format!("text is not accepted for {action}"));
                }
                if coordinate.is_some() {
                    return invalid(format!("coordinate is not accepted for {action}"));
                }

                match action {
                    Action::Screenshot => self.screenshot().await,
                    Action::CursorPosition => {
                        let (x, y) = self.driver.cursor_position().await?;
                        let (x, y) = self.scaler.scale(ScalingSource::Computer, x, y)?;
                        Ok(ActionOutput::text(format!("X={x},Y={y}")))
                    }
                    _ => {
                        let (button, clicks) = match action {
                            Action::RightClick => (MouseButton::Right, 1),
                            Action::MiddleClick => (MouseButton::Middle, 1),
                            Action::DoubleClick => (MouseButton::Left, 2),
                            _ => (MouseButton::Left, 1),
                        };
                        self.driver.click(button, clicks).await?;
                        Ok(ActionOutput::text(format!("{action} performed")))
                    }
                }
            }
        }
    }

    /// Captures the screen in API resolution as base64 PNG.
    pub async fn screenshot(&self) -> Result<ActionOutput, ToolError> {
        let target = self.scaler.enabled().then(|| self.scaler.api_size());
        let png = self.capture.capture_png(target).await?;

        if let Some(dir) = &self.settings.output_dir {
            tokio::fs::create_dir_all(dir).await?;
            let path = dir.join(format!("screenshot_{}.png", Uuid::new_v4().simple()));
            tokio::fs::write(&path, &png).await?;
            debug!(path = %path.display(), "Screenshot saved");
        }

        Ok(ActionOutput {
            output: None,
            base64_image: Some(general_purpose::STANDARD.encode(&png)),
        })
    }
}

fn validate_coordinate(coordinate: &[i64]) -> Result<(u32, u32), ToolError> {
    let [x, y] = coordinate else {
        return Err(ToolError::InvalidArgs(format!(
            "{coordinate:?} must be a sequence of length 2"
        )));
    };
    match (u32::try_from(*x), u32::try_from(*y)) {
        (Ok(x), Ok(y)) => Ok((x, y)),
        _ => Err(ToolError::InvalidArgs(format!(
            "{coordinate:?} must be a sequence of non-negative ints"
        ))),
    }
}

#[async_trait]
impl Tool for ComputerTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Control the computer: take screenshots, move and click the mouse, type text and \
         press keys. Coordinates are in the display size reported with this tool."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let actions: Vec<&str> = Action::ALL.iter().map(|a| a.as_str()).collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": actions,
                    "description": "The action to perform"
                },
                "text": {
                    "type": "string",
                    "description": "Text to type, or key/chord to press (e.g. \"Return\", \"ctrl+s\")"
                },
                "coordinate": {
                    "type": "array",
                    "items": {"type": "integer", "minimum": 0},
                    "minItems": 2,
                    "maxItems": 2,
                    "description": "[x, y] target for mouse_move and left_click_drag"
                }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    fn definition(&self) -> ToolDefinition {
        let options = serde_json::to_value(self.options()).unwrap_or_default();
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
            .with_api_type(API_TYPE)
            .with_options(options)
    }

    async fn execute(&self, call_id: &str, args: serde_json::Value) -> ToolResult {
        let args: ComputerArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                return ToolResult::error(call_id, self.name(), format!("Invalid arguments: {e}"));
            }
        };

        let outcome = match args.action.parse::<Action>() {
            Ok(action) => {
                self.act(action, args.text.as_deref(), args.coordinate.as_deref())
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(out) => {
                let mut result =
                    ToolResult::success(call_id, self.name(), out.output.unwrap_or_default());
                if let Some(image) = out.base64_image {
                    result = result.with_image(image);
                }
                result
            }
            Err(e) => ToolResult::error(call_id, self.name(), e.to_string()),
        }
    }
}
