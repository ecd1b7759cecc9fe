// Overlay projection: annotation objects -> per-surface screen rectangles.
//
// Each surface owns a fixed pool of overlay slots. The Nth object routed to a
// surface fills the Nth slot; unused slots are hidden and objects beyond the
// pool size are not drawn.

use crate::error::{CoreError, CoreResult};
use crate::overlay::annotations::AnnotationIndex;
use crate::overlay::types::{Canvas, Point, SourceId, Surface, TrackedObject, ViewKind};
use crate::overlay::viewport::ViewportGeometry;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Side of the square marker drawn on the top-down view, in top-down units.
pub const MARKER_SIZE: f64 = 20.0;

/// Right-field detections are authored relative to the left half of the
/// top-down canvas and must be shifted by `width / 2 - RIGHT_FIELD_MARGIN`.
/// Empirical value tied to the current calibration; must match the annotation source.
pub const RIGHT_FIELD_MARGIN: f64 = 20.0;

pub const DEFAULT_SLOT_CAPACITY: usize = 30;

/// Horizontal shift applied to right-field objects on the top-down view.
pub fn right_field_shift(topdown_width: f64) -> f64 {
    topdown_width / 2.0 - RIGHT_FIELD_MARGIN
}

/// Top-down center after the right-field shift, still in top-down units.
pub fn adjusted_topdown_center(obj: &TrackedObject, topdown_width: f64) -> Point {
    let mut x = obj.topdown_center.x;
    if obj.source == SourceId::Right {
        x += right_field_shift(topdown_width);
    }
    Point::new(x, obj.topdown_center.y)
}

/// A rectangle ready to draw, carrying a snapshot of the object it came from.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub source_object: TrackedObject,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum OverlaySlot {
    Visible(ScreenRect),
    Hidden,
}

impl OverlaySlot {
    pub fn rect(&self) -> Option<&ScreenRect> {
        match self {
            OverlaySlot::Visible(r) => Some(r),
            OverlaySlot::Hidden => None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SurfaceOverlays {
    pub surface: Surface,
    pub slots: Vec<OverlaySlot>,
    /// Objects routed to this surface that did not fit in the slot pool.
    pub dropped: usize,
}

impl SurfaceOverlays {
    pub fn visible(&self) -> impl Iterator<Item = &ScreenRect> {
        self.slots.iter().filter_map(OverlaySlot::rect)
    }
}

/// Everything drawn for one frame.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProjectedFrame {
    pub frame: i64,
    pub surfaces: Vec<SurfaceOverlays>,
}

impl ProjectedFrame {
    pub fn get(&self, surface: Surface) -> Option<&SurfaceOverlays> {
        self.surfaces.iter().find(|s| s.surface == surface)
    }
}

/// What a click on an overlay reports.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub source: SourceId,
    pub topdown_position: Point,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<i64>,
}

impl ObjectInfo {
    pub fn of(obj: &TrackedObject, topdown_width: f64) -> Self {
        Self {
            source: obj.source,
            topdown_position: adjusted_topdown_center(obj, topdown_width),
            identity: obj.identity,
        }
    }
}

impl fmt::Display for ObjectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Source: {}, Position: ({:.1}, {:.1})",
            self.source.label(),
            self.topdown_position.x,
            self.topdown_position.y
        )
    }
}

pub struct OverlayProjector {
    index: Arc<AnnotationIndex>,
    canvas: Canvas,
    capacity: usize,
}

impl OverlayProjector {
    pub fn new(index: Arc<AnnotationIndex>, capacity: usize) -> CoreResult<Self> {
        if capacity == 0 {
            return Err(CoreError::Configuration(
                "overlay slot capacity must be at least 1".to_string(),
            ));
        }
        let canvas = index.canvas();
        Ok(Self {
            index,
            canvas,
            capacity,
        })
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn index(&self) -> &AnnotationIndex {
        &self.index
    }

    /// Project `frame` onto every given surface.
    ///
    /// Callers pass only surfaces that are showing and have fresh geometry.
    pub fn project<'a, I>(&self, frame: i64, surfaces: I) -> ProjectedFrame
    where
        I: IntoIterator<Item = (Surface, &'a ViewportGeometry)>,
    {
        let objects = self.index.objects_for(frame);
        let surfaces = surfaces
            .into_iter()
            .map(|(surface, geometry)| self.project_surface(surface, geometry, objects))
            .collect();
        ProjectedFrame { frame, surfaces }
    }

    pub fn project_surface(
        &self,
        surface: Surface,
        geometry: &ViewportGeometry,
        objects: &[TrackedObject],
    ) -> SurfaceOverlays {
        let view = surface.view;
        let mut routed = objects.iter().filter(|o| view.accepts(o.source));

        let slots: Vec<OverlaySlot> = (0..self.capacity)
            .map(|_| match routed.next() {
                Some(obj) => OverlaySlot::Visible(self.screen_rect(view, geometry, obj)),
                None => OverlaySlot::Hidden,
            })
            .collect();
        let dropped = routed.count();

        if dropped > 0 {
            tracing::debug!(
                "{}: {} objects beyond {} overlay slots not drawn",
                surface,
                dropped,
                self.capacity
            );
        }

        SurfaceOverlays {
            surface,
            slots,
            dropped,
        }
    }

    fn screen_rect(&self, view: ViewKind, g: &ViewportGeometry, obj: &TrackedObject) -> ScreenRect {
        let (x, y, width, height) = match view {
            ViewKind::Topdown => {
                let c = adjusted_topdown_center(obj, self.canvas.topdown.width);
                let half = MARKER_SIZE / 2.0;
                (
                    g.offset_x + (c.x - half) * g.scale_x,
                    g.offset_y + (c.y - half) * g.scale_y,
                    MARKER_SIZE * g.scale_x,
                    MARKER_SIZE * g.scale_y,
                )
            }
            ViewKind::Left | ViewKind::Right => (
                g.offset_x + obj.bbox.x_min * g.scale_x,
                g.offset_y + obj.bbox.y_min * g.scale_y,
                obj.bbox.width() * g.scale_x,
                obj.bbox.height() * g.scale_y,
            ),
        };

        ScreenRect {
            x,
            y,
            width,
            height,
            label: obj.identity.map(|id| id.to_string()),
            source_object: obj.clone(),
        }
    }
}
