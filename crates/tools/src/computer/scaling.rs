//! Coordinate scaling between the physical screen and the API resolution.
//!
//! The model sees the screen downscaled to one of a few standard resolutions
//! picked by aspect ratio; coordinates it sends back are scaled up again.

use proto::ToolError;

/// Width/height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Screen size assumed when detection fails.
pub const FALLBACK_SCREEN: Resolution = Resolution::new(1920, 1080);

/// Downscaling targets, checked in order.
pub const MAX_SCALING_TARGETS: [(&str, Resolution); 3] = [
    ("XGA", Resolution::new(1024, 768)),
    ("WXGA", Resolution::new(1280, 800)),
    ("FWXGA", Resolution::new(1366, 768)),
];

const RATIO_TOLERANCE: f64 = 0.02;
const MAX_SUPPORTED: Resolution = Resolution::new(1920, 1200);
const FWXGA: Resolution = Resolution::new(1366, 768);
const WXGA: Resolution = Resolution::new(1280, 800);

/// Direction of a coordinate conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingSource {
    /// Physical screen coordinates, converted to API space.
    Computer,
    /// API coordinates sent by the model, converted to screen space.
    Api,
}

/// Converts coordinates for one physical screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scaler {
    screen: Resolution,
    enabled: bool,
}

impl Scaler {
    pub fn new(screen: Resolution, enabled: bool) -> Self {
        Self { screen, enabled }
    }

    pub fn screen(&self) -> Resolution {
        self.screen
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Scales `(x, y)` from `source` space into the other space.
    ///
    /// Screens whose aspect ratio matches no target are left unscaled.
    pub fn scale(&self, source: ScalingSource, x: u32, y: u32) -> Result<(u32, u32), ToolError> {
        if !self.enabled {
            return Ok((x, y));
        }

        let ratio = self.screen.ratio();
        let Some(target) = MAX_SCALING_TARGETS
            .iter()
            .map(|(_, r)| *r)
            .find(|r| (r.ratio() - ratio).abs() < RATIO_TOLERANCE)
        else {
            return Ok((x, y));
        };

        let target = if (ratio - 16.0 / 9.0).abs() < RATIO_TOLERANCE {
            FWXGA
        } else if (ratio - 16.0 / 10.0).abs() < RATIO_TOLERANCE {
            WXGA
        } else {
            target
        };

        let (w, h) = (f64::from(self.screen.width), f64::from(self.screen.height));
        let (tw, th) = (f64::from(target.width), f64::from(target.height));
        match source {
            ScalingSource::Api => {
                if x > MAX_SUPPORTED.width || y > MAX_SUPPORTED.height {
                    return Err(ToolError::OutOfBounds { x, y });
                }
                if x > target.width || y > target.height {
                    return Err(ToolError::OutOfBounds { x, y });
                }
                Ok((apply(x, w / tw), apply(y, h / th)))
            }
            ScalingSource::Computer => {
                if self.screen.width > MAX_SUPPORTED.width || self.screen.height > MAX_SUPPORTED.height
                {
                    return Err(ToolError::OutOfBounds { x, y });
                }
                Ok((apply(x, tw / w), apply(y, th / h)))
            }
        }
    }

    /// Screen size as reported to the model.
    pub fn api_size(&self) -> Resolution {
        match self.scale(ScalingSource::Computer, self.screen.width, self.screen.height) {
            Ok((width, height)) => Resolution::new(width, height),
            Err(_) => self.screen,
        }
    }
}

fn apply(value: u32, factor: f64) -> u32 {
    (f64::from(value) * factor) as u32
}
