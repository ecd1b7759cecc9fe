// Shared data model for annotations and the views they are drawn on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 2D point in whatever space the owner says (source pixels, top-down units, screen).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width/height pair. A size is "unknown" when either side is not positive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_known(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Bounding box in a field camera's native pixel space, min/max corners.
///
/// `x_min <= x_max` and `y_min <= y_max` are expected but not enforced.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BBox {
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self {
            x_min: v[0],
            y_min: v[1],
            x_max: v[2],
            y_max: v[3],
        }
    }
}

/// Which raw field camera produced a detection.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum SourceId {
    Left = 0,
    Right = 1,
}

impl SourceId {
    pub fn label(&self) -> &'static str {
        match self {
            SourceId::Left => "Left Field",
            SourceId::Right => "Right Field",
        }
    }
}

impl TryFrom<u8> for SourceId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SourceId::Left),
            1 => Ok(SourceId::Right),
            other => Err(format!("src must be 0 or 1, got {}", other)),
        }
    }
}

impl From<SourceId> for u8 {
    fn from(src: SourceId) -> Self {
        src as u8
    }
}

/// One detected entity in one frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub source: SourceId,
    pub bbox: BBox,
    /// Center in the shared top-down canvas, before any right-field shift.
    pub topdown_center: Point,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<i64>,
}

/// Native canvas sizes the annotation coordinates are expressed in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub topdown: Size,
    pub field: Size,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            topdown: Size::new(752.0, 300.0),
            field: Size::new(1920.0, 1080.0),
        }
    }
}

impl Canvas {
    pub fn native_for(&self, view: ViewKind) -> Size {
        match view {
            ViewKind::Topdown => self.topdown,
            ViewKind::Left | ViewKind::Right => self.field,
        }
    }
}

/// The three logical views.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Topdown,
    Left,
    Right,
}

impl ViewKind {
    pub const ALL: [ViewKind; 3] = [ViewKind::Topdown, ViewKind::Left, ViewKind::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Topdown => "topdown",
            ViewKind::Left => "left",
            ViewKind::Right => "right",
        }
    }

    /// Whether an object belongs on this view.
    pub fn accepts(&self, source: SourceId) -> bool {
        match self {
            ViewKind::Topdown => true,
            ViewKind::Left => source == SourceId::Left,
            ViewKind::Right => source == SourceId::Right,
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topdown" | "transform" => Ok(ViewKind::Topdown),
            "left" => Ok(ViewKind::Left),
            "right" => Ok(ViewKind::Right),
            other => Err(format!("unknown view: {}", other)),
        }
    }
}

/// A concrete drawing surface: a view either docked in the main window or detached.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Surface {
    pub view: ViewKind,
    pub detached: bool,
}

impl Surface {
    pub fn attached(view: ViewKind) -> Self {
        Self {
            view,
            detached: false,
        }
    }

    pub fn detached(view: ViewKind) -> Self {
        Self {
            view,
            detached: true,
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detached {
            write!(f, "{}-detached", self.view)
        } else {
            write!(f, "{}", self.view)
        }
    }
}

impl FromStr for Surface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_suffix("-detached") {
            Some(view) => Ok(Surface::detached(view.parse()?)),
            None => Ok(Surface::attached(s.parse()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_rejects_third_camera() {
        assert_eq!(SourceId::try_from(0), Ok(SourceId::Left));
        assert_eq!(SourceId::try_from(1), Ok(SourceId::Right));
        assert!(SourceId::try_from(2).is_err());
    }

    #[test]
    fn test_view_partitioning() {
        assert!(ViewKind::Topdown.accepts(SourceId::Left));
        assert!(ViewKind::Topdown.accepts(SourceId::Right));
        assert!(ViewKind::Left.accepts(SourceId::Left));
        assert!(!ViewKind::Left.accepts(SourceId::Right));
        assert!(!ViewKind::Right.accepts(SourceId::Left));
    }

    #[test]
    fn test_surface_names_round_trip() {
        let s: Surface = "right-detached".parse().unwrap();
        assert_eq!(s, Surface::detached(ViewKind::Right));
        assert_eq!(s.to_string(), "right-detached");
        assert_eq!(
            "transform".parse::<Surface>().unwrap(),
            Surface::attached(ViewKind::Topdown)
        );
        assert!("centre".parse::<Surface>().is_err());
    }
}
