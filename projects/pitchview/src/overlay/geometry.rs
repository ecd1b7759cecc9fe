use crate::overlay::projector::{ScreenRect, SurfaceOverlays};
use crate::overlay::types::Point;
use geo::Intersects;
use geo_types::{coord, Rect};

/// Convert a projected rectangle to a geo_types Rect (corners are normalized by geo)
fn to_geo_rect(r: &ScreenRect) -> Rect<f64> {
    Rect::new(
        coord! { x: r.x, y: r.y },
        coord! { x: r.x + r.width, y: r.y + r.height },
    )
}

/// Point-in-rectangle including the border, so clicks on the outline count
pub fn rect_contains(rect: &ScreenRect, p: Point) -> bool {
    to_geo_rect(rect).intersects(&coord! { x: p.x, y: p.y })
}

/// Find the overlay under a click. Later slots are drawn on top, so they win.
pub fn hit_test(overlays: &SurfaceOverlays, p: Point) -> Option<&ScreenRect> {
    let visible: Vec<&ScreenRect> = overlays.visible().collect();
    visible.into_iter().rev().find(|r| rect_contains(r, p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::projector::OverlaySlot;
    use crate::overlay::types::{BBox, SourceId, Surface, TrackedObject, ViewKind};

    fn rect(x: f64, y: f64, w: f64, h: f64, id: i64) -> ScreenRect {
        ScreenRect {
            x,
            y,
            width: w,
            height: h,
            label: None,
            source_object: TrackedObject {
                source: SourceId::Left,
                bbox: BBox::from([0.0, 0.0, 1.0, 1.0]),
                topdown_center: Point::new(0.0, 0.0),
                identity: Some(id),
            },
        }
    }

    #[test]
    fn test_rect_contains_border_and_interior() {
        let r = rect(10.0, 10.0, 20.0, 20.0, 1);
        assert!(rect_contains(&r, Point::new(15.0, 15.0)));
        assert!(rect_contains(&r, Point::new(10.0, 30.0)));
        assert!(!rect_contains(&r, Point::new(31.0, 15.0)));
    }

    #[test]
    fn test_hit_test_prefers_topmost_and_skips_hidden() {
        let overlays = SurfaceOverlays {
            surface: Surface::attached(ViewKind::Topdown),
            slots: vec![
                OverlaySlot::Visible(rect(0.0, 0.0, 50.0, 50.0, 1)),
                OverlaySlot::Visible(rect(20.0, 20.0, 50.0, 50.0, 2)),
                OverlaySlot::Hidden,
            ],
            dropped: 0,
        };
        let hit = hit_test(&overlays, Point::new(30.0, 30.0)).unwrap();
        assert_eq!(hit.source_object.identity, Some(2));
        let hit = hit_test(&overlays, Point::new(5.0, 5.0)).unwrap();
        assert_eq!(hit.source_object.identity, Some(1));
        assert!(hit_test(&overlays, Point::new(100.0, 100.0)).is_none());
    }
}
