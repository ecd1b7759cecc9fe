use crate::overlay::types::{Point, Size};
use serde::{Deserialize, Serialize};

/// Rectangle a surface offers for video display, in the surface's own coordinates.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRect {
    pub fn sized(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }
}

/// Where a video of `native` size actually lands inside a display area.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    pub native: Size,
    /// Top-left of the letterboxed video inside the display area.
    pub offset_x: f64,
    pub offset_y: f64,
    /// Size of the letterboxed video.
    pub width: f64,
    pub height: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl ViewportGeometry {
    /// Map a point from native source space to screen space.
    pub fn map_point(&self, p: Point) -> Point {
        Point {
            x: self.offset_x + p.x * self.scale_x,
            y: self.offset_y + p.y * self.scale_y,
        }
    }

    /// Same geometry shifted by the display area's origin.
    pub fn translated(mut self, dx: f64, dy: f64) -> Self {
        self.offset_x += dx;
        self.offset_y += dy;
        self
    }
}

/// Aspect-fit letterboxing.
pub struct ViewportMapper;

impl ViewportMapper {
    /// Fit a `native_width x native_height` video into the display area,
    /// preserving aspect ratio and centering it.
    ///
    /// An unknown native size (either side <= 0) uses the display area as-is.
    pub fn compute(
        native_width: f64,
        native_height: f64,
        display_width: f64,
        display_height: f64,
    ) -> ViewportGeometry {
        let native = Size::new(native_width, native_height);
        if !native.is_known() {
            return ViewportGeometry {
                native,
                offset_x: 0.0,
                offset_y: 0.0,
                width: display_width,
                height: display_height,
                scale_x: 1.0,
                scale_y: 1.0,
            };
        }

        let scale = (display_width / native_width).min(display_height / native_height);
        // min() keeps rounding from pushing the fitted side past the display
        let new_w = (native_width * scale).min(display_width);
        let new_h = (native_height * scale).min(display_height);

        ViewportGeometry {
            native,
            offset_x: ((display_width - new_w) / 2.0).max(0.0),
            offset_y: ((display_height - new_h) / 2.0).max(0.0),
            width: new_w,
            height: new_h,
            scale_x: new_w / native_width,
            scale_y: new_h / native_height,
        }
    }

    /// Compute for a display rectangle that may not sit at the surface origin.
    pub fn compute_in(native: Size, display: DisplayRect) -> ViewportGeometry {
        Self::compute(native.width, native.height, display.width, display.height)
            .translated(display.x, display.y)
    }
}
