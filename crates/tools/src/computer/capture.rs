//! Screen capture.

use async_trait::async_trait;
#[cfg(not(target_env = "musl"))]
use image::ImageFormat;
#[cfg(not(target_env = "musl"))]
use image::imageops::FilterType;
use proto::ToolError;
#[cfg(not(target_env = "musl"))]
use screenshots::Screen;
#[cfg(not(target_env = "musl"))]
use std::io::Cursor;

use super::scaling::Resolution;

/// Source of PNG screenshots.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Captures the screen as PNG, resized to `target` when given.
    async fn capture_png(&self, target: Option<Resolution>) -> Result<Vec<u8>, ToolError>;
}

/// Captures a physical display through the `screenshots` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayCapture {
    display_index: usize,
}

impl DisplayCapture {
    pub fn new(display_index: usize) -> Self {
        Self { display_index }
    }
}

#[async_trait]
impl ScreenCapture for DisplayCapture {
    async fn capture_png(&self, target: Option<Resolution>) -> Result<Vec<u8>, ToolError> {
        let display_index = self.display_index;
        tokio::task::spawn_blocking(move || capture_png_sync(display_index, target))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("capture task failed: {e}")))?
            .map_err(ToolError::ExecutionFailed)
    }
}

#[cfg(not(target_env = "musl"))]
fn capture_png_sync(display_index: usize, target: Option<Resolution>) -> Result<Vec<u8>, String> {
    let screens = Screen::all().map_err(|e| format!("Failed to enumerate displays: {e}"))?;
    if screens.is_empty() {
        return Err("No displays found".to_string());
    }

    let screen = screens
        .get(display_index)
        .ok_or_else(|| format!("Display index out of range: {display_index}"))?;

    let mut captured = screen
        .capture()
        .map_err(|e| format!("Screen capture failed: {e}"))?;

    if let Some(target) = target
        && (captured.width(), captured.height()) != (target.width, target.height)
    {
        captured = image::imageops::resize(
            &captured,
            target.width,
            target.height,
            FilterType::Lanczos3,
        );
    }

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(captured)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| format!("Failed to encode PNG: {e}"))?;
    Ok(png)
}

#[cfg(target_env = "musl")]
fn capture_png_sync(_display_index: usize, _target: Option<Resolution>) -> Result<Vec<u8>, String> {
    Err("screen capture is not supported on musl targets".to_string())
}
