// The player: one frame clock, one annotation index, a synchronized engine
// group and the surfaces overlays are drawn on.
//
// Everything the UI needs goes through `PlayerSession`. It is driven by
// `tick`, which must run on a single thread of control; callers serialize
// access (the server wraps it in a mutex).

use crate::error::{CoreError, CoreResult, EngineError};
use crate::overlay::annotations::AnnotationIndex;
use crate::overlay::geometry;
use crate::overlay::projector::{
    ObjectInfo, OverlayProjector, ProjectedFrame, DEFAULT_SLOT_CAPACITY,
};
use crate::overlay::types::{Point, Size, Surface, ViewKind};
use crate::overlay::viewport::{DisplayRect, ViewportGeometry, ViewportMapper};
use crate::tracking::homography::{FieldPoint, ReverseHomographyMapper};
use crate::video::clock::{FpsPolicy, FrameClock};
use crate::video::synchronizer::{
    DriftReport, EngineId, PlaybackSynchronizer, SyncConfig, SyncState,
};
use crate::video::{PlaybackEngine, PlaybackState};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub fps_policy: FpsPolicy,
    pub slot_capacity: usize,
    pub sync: SyncConfig,
    /// Used while the primary engine reports no duration.
    pub fallback_duration_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fps_policy: FpsPolicy::default(),
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            sync: SyncConfig::default(),
            fallback_duration_ms: None,
        }
    }
}

#[derive(Debug, Clone)]
struct SurfaceState {
    visible: bool,
    native: Size,
    /// None until the surface reports its display area.
    geometry: Option<ViewportGeometry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurfaceStatus {
    pub surface: Surface,
    pub name: String,
    pub visible: bool,
    pub native: Size,
    pub geometry: Option<ViewportGeometry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub current_frame: u64,
    pub total_frames: u64,
    pub fps: f64,
    pub frame_duration_ms: f64,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub state: PlaybackState,
    pub surfaces: Vec<SurfaceStatus>,
    pub sync: SyncState,
    pub status: Option<String>,
}

pub struct PlayerSession {
    clock: FrameClock,
    projector: OverlayProjector,
    sync: PlaybackSynchronizer,
    engines: HashMap<ViewKind, EngineId>,
    surfaces: BTreeMap<Surface, SurfaceState>,
    /// Frame asked for by the last navigation; reported while the position
    /// still sits on its seek target.
    pinned_frame: Option<u64>,
    last_projection: Option<ProjectedFrame>,
    reverse_mapper: Option<ReverseHomographyMapper>,
    fallback_duration_ms: Option<u64>,
    status: Option<String>,
}

impl PlayerSession {
    pub fn new(index: Arc<AnnotationIndex>, config: SessionConfig) -> CoreResult<Self> {
        let clock = FrameClock::new(config.fps_policy)?;
        let projector = OverlayProjector::new(index, config.slot_capacity)?;
        let canvas = projector.canvas();

        let surfaces = ViewKind::ALL
            .iter()
            .map(|view| {
                (
                    Surface::attached(*view),
                    SurfaceState {
                        visible: true,
                        native: canvas.native_for(*view),
                        geometry: None,
                    },
                )
            })
            .collect();

        let mut session = Self {
            clock,
            projector,
            sync: PlaybackSynchronizer::new(config.sync),
            engines: HashMap::new(),
            surfaces,
            pinned_frame: None,
            last_projection: None,
            reverse_mapper: None,
            fallback_duration_ms: config.fallback_duration_ms,
            status: None,
        };
        session.refresh_duration()?;
        Ok(session)
    }

    pub fn with_reverse_mapper(mut self, mapper: ReverseHomographyMapper) -> Self {
        self.reverse_mapper = Some(mapper);
        self
    }

    /// Bind the engine that plays `view`.
    pub fn add_engine(
        &mut self,
        view: ViewKind,
        engine: Box<dyn PlaybackEngine>,
        is_primary: bool,
    ) -> CoreResult<()> {
        if let Some(native) = engine.native_size().filter(|n| n.is_known()) {
            if let Some(state) = self.surfaces.get_mut(&Surface::attached(view)) {
                state.native = native;
            }
        }
        let id = self.sync.add_engine(engine, is_primary);
        self.engines.insert(view, id);
        self.refresh_duration()
    }

    fn refresh_duration(&mut self) -> CoreResult<()> {
        let duration = self
            .sync
            .duration_ms()
            .filter(|d| *d > 0)
            .or(self.fallback_duration_ms)
            .unwrap_or(0);
        if duration != self.clock.duration_ms() {
            self.clock.set_duration(duration)?;
            info!(
                "Duration {} ms: {} frames at {} fps",
                duration,
                self.clock.total_frames(),
                self.clock.fps()
            );
        }
        Ok(())
    }

    fn note_failures(&mut self, failures: &[EngineError]) {
        if let Some(first) = failures.first() {
            self.status = Some(first.to_string());
        }
    }

    pub fn position_ms(&self) -> u64 {
        self.sync
            .primary()
            .map(|p| p.position())
            .unwrap_or_else(|| self.sync.position_ms())
    }

    pub fn current_frame(&self) -> u64 {
        let position = self.position_ms();
        match self.pinned_frame {
            Some(frame) if self.clock.position_for(frame) == position => frame,
            _ => self.clock.frame_for(position),
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.clock.total_frames()
    }

    pub fn fps(&self) -> f64 {
        self.clock.fps()
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn state(&self) -> PlaybackState {
        self.sync.state()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn play(&mut self) -> Vec<EngineError> {
        self.pinned_frame = None;
        let failures = self.sync.play();
        self.note_failures(&failures);
        failures
    }

    pub fn pause(&mut self) -> Vec<EngineError> {
        let failures = self.sync.pause();
        self.note_failures(&failures);
        failures
    }

    pub fn stop(&mut self) -> Vec<EngineError> {
        self.pinned_frame = None;
        let failures = self.sync.stop();
        self.note_failures(&failures);
        self.project();
        failures
    }

    pub fn seek(&mut self, position_ms: u64) -> Vec<EngineError> {
        self.pinned_frame = None;
        let failures = self.sync.seek(position_ms);
        self.note_failures(&failures);
        self.project();
        failures
    }

    /// Pause if needed and seek every engine to `frame`.
    pub fn go_to_frame(&mut self, frame: i64) -> CoreResult<Vec<EngineError>> {
        self.refresh_duration()?;
        let total = self.clock.total_frames() as i64;
        if frame < 0 || frame >= total {
            let last = total - 1;
            self.status = Some(format!("Frame number out of range (0-{})", last.max(0)));
            return Err(CoreError::FrameOutOfRange { frame, last });
        }

        let mut failures = Vec::new();
        if self.sync.is_playing() {
            failures.extend(self.sync.pause());
        }
        let frame = frame as u64;
        failures.extend(self.sync.seek(self.clock.position_for(frame)));
        self.pinned_frame = Some(frame);
        self.note_failures(&failures);
        self.project();
        Ok(failures)
    }

    /// Move by `delta` frames, clamped to the clip.
    pub fn step(&mut self, delta: i64) -> CoreResult<Vec<EngineError>> {
        let total = self.clock.total_frames() as i64;
        if total == 0 {
            return Ok(Vec::new());
        }
        let target = (self.current_frame() as i64 + delta).clamp(0, total - 1);
        self.go_to_frame(target)
    }

    pub fn next_frame(&mut self) -> CoreResult<Vec<EngineError>> {
        self.step(1)
    }

    pub fn previous_frame(&mut self) -> CoreResult<Vec<EngineError>> {
        self.step(-1)
    }

    fn surface_mut(&mut self, surface: Surface) -> CoreResult<&mut SurfaceState> {
        self.surfaces
            .get_mut(&surface)
            .ok_or_else(|| CoreError::UnknownSurface(surface.to_string()))
    }

    /// A surface was resized or moved. An unknown `native` keeps the last
    /// size seen for the surface.
    pub fn viewport_changed(
        &mut self,
        surface: Surface,
        native: Option<Size>,
        display: DisplayRect,
    ) -> CoreResult<ViewportGeometry> {
        let fallback = self.projector.canvas().native_for(surface.view);
        let state = self.surface_mut(surface)?;
        if let Some(native) = native.filter(|n| n.is_known()) {
            state.native = native;
        }
        if !state.native.is_known() {
            state.native = fallback;
        }
        let geometry = ViewportMapper::compute_in(state.native, display);
        state.geometry = Some(geometry);
        debug!(
            "{}: viewport {}x{} at ({}, {}) scale {:.4}",
            surface,
            geometry.width,
            geometry.height,
            geometry.offset_x,
            geometry.offset_y,
            geometry.scale_x
        );
        Ok(geometry)
    }

    /// Move `view` into its own window. The new surface draws nothing until
    /// it reports a viewport.
    pub fn detach(&mut self, view: ViewKind) -> CoreResult<()> {
        let detached = Surface::detached(view);
        if self.surfaces.contains_key(&detached) {
            return Ok(());
        }
        let attached = self.surface_mut(Surface::attached(view))?;
        attached.visible = false;
        let native = attached.native;
        self.surfaces.insert(
            detached,
            SurfaceState {
                visible: true,
                native,
                geometry: None,
            },
        );
        info!("Detached {} view", view);
        Ok(())
    }

    pub fn reattach(&mut self, view: ViewKind) -> CoreResult<()> {
        if self.surfaces.remove(&Surface::detached(view)).is_none() {
            return Ok(());
        }
        let attached = self.surface_mut(Surface::attached(view))?;
        attached.visible = true;
        // the docked layout changed while detached
        attached.geometry = None;
        info!("Reattached {} view", view);
        Ok(())
    }

    pub fn set_visible(&mut self, surface: Surface, visible: bool) -> CoreResult<()> {
        self.surface_mut(surface)?.visible = visible;
        Ok(())
    }

    pub fn set_muted(&mut self, view: ViewKind, muted: bool) -> CoreResult<()> {
        let id = *self
            .engines
            .get(&view)
            .ok_or_else(|| CoreError::UnknownSurface(view.to_string()))?;
        self.sync.set_muted(id, muted)?;
        Ok(())
    }

    /// Return a view's engine to drift correction after a failure. `false` when
    /// it had no fault recorded.
    pub fn clear_fault(&mut self, view: ViewKind) -> CoreResult<bool> {
        let id = *self
            .engines
            .get(&view)
            .ok_or_else(|| CoreError::UnknownSurface(view.to_string()))?;
        let cleared = self.sync.clear_fault(id);
        if cleared {
            info!("Cleared fault on {} view", view);
        }
        Ok(cleared)
    }

    fn drawable(&self) -> impl Iterator<Item = (Surface, &ViewportGeometry)> {
        self.surfaces
            .iter()
            .filter(|(_, state)| state.visible)
            .filter_map(|(surface, state)| state.geometry.as_ref().map(|g| (*surface, g)))
    }

    /// Project the current frame onto every drawable surface and keep the result.
    pub fn project(&mut self) -> &ProjectedFrame {
        let frame = self.current_frame() as i64;
        let projected = self.projector.project(frame, self.drawable());
        self.last_projection.insert(projected)
    }

    /// Projection of an arbitrary frame against the current surfaces.
    pub fn overlays_for(&self, frame: i64) -> ProjectedFrame {
        self.projector.project(frame, self.drawable())
    }

    pub fn last_projection(&self) -> Option<&ProjectedFrame> {
        self.last_projection.as_ref()
    }

    /// Which object, if any, was drawn under `p` on `surface` in the last projection.
    pub fn hit_test(&mut self, surface: Surface, p: Point) -> CoreResult<Option<ObjectInfo>> {
        if !self.surfaces.contains_key(&surface) {
            return Err(CoreError::UnknownSurface(surface.to_string()));
        }
        let topdown_width = self.projector.canvas().topdown.width;
        let info = self
            .last_projection
            .as_ref()
            .and_then(|frame| frame.get(surface))
            .and_then(|overlays| geometry::hit_test(overlays, p))
            .map(|rect| ObjectInfo::of(&rect.source_object, topdown_width));
        if let Some(info) = &info {
            self.status = Some(info.to_string());
        }
        Ok(info)
    }

    pub fn reverse(&self, p: Point) -> CoreResult<FieldPoint> {
        self.reverse_mapper
            .as_ref()
            .ok_or_else(|| CoreError::Configuration("no calibration loaded".to_string()))?
            .reverse(p)
    }

    /// One pass of the UI refresh loop.
    pub fn tick(&mut self, now: Instant) -> DriftReport {
        if let Err(e) = self.refresh_duration() {
            warn!("Duration refresh failed: {}", e);
            self.status = Some(e.to_string());
        }
        let report = self.sync.tick(now);
        self.note_failures(&report.failures);
        self.project();
        report
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.sync_state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current_frame: self.current_frame(),
            total_frames: self.clock.total_frames(),
            fps: self.clock.fps(),
            frame_duration_ms: self.clock.frame_duration_ms(),
            position_ms: self.position_ms(),
            duration_ms: self.clock.duration_ms(),
            state: self.sync.state(),
            surfaces: self
                .surfaces
                .iter()
                .map(|(surface, state)| SurfaceStatus {
                    surface: *surface,
                    name: surface.to_string(),
                    visible: state.visible,
                    native: state.native,
                    geometry: state.geometry,
                })
                .collect(),
            sync: self.sync.sync_state(),
            status: self.status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::clocked::ClockedEngine;

    const ANNOTATIONS: &str = r#"{
        "metadata": {"width": 752, "height": 300, "field_width": 1920, "field_height": 1080},
        "frames": [
            {"fr": 42, "obj": [
                {"src": 1, "bbox": [100, 200, 300, 400], "t_c": [380, 150]},
                {"src": 0, "bbox": [10, 20, 30, 40], "t_c": [50, 60], "id": 7}
            ]}
        ]
    }"#;

    fn session(duration_ms: u64) -> PlayerSession {
        let index = Arc::new(AnnotationIndex::from_json_str(ANNOTATIONS).unwrap());
        let config = SessionConfig {
            fps_policy: FpsPolicy::Fixed { fps: 30.0 },
            ..SessionConfig::default()
        };
        let mut session = PlayerSession::new(index, config).unwrap();
        for view in ViewKind::ALL {
            let engine = ClockedEngine::new(view.as_str(), duration_ms);
            session
                .add_engine(view, Box::new(engine), view == ViewKind::Topdown)
                .unwrap();
        }
        session
    }

    #[test]
    fn test_duration_comes_from_primary() {
        let s = session(12_000);
        assert_eq!(s.total_frames(), 360);
        assert_eq!(s.fps(), 30.0);
        assert_eq!(s.current_frame(), 0);
    }

    #[test]
    fn test_fallback_duration_when_no_engine() {
        let index = Arc::new(AnnotationIndex::from_json_str(ANNOTATIONS).unwrap());
        let config = SessionConfig {
            fps_policy: FpsPolicy::Fixed { fps: 30.0 },
            fallback_duration_ms: Some(2_000),
            ..SessionConfig::default()
        };
        let s = PlayerSession::new(index, config).unwrap();
        assert_eq!(s.total_frames(), 60);
    }

    #[test]
    fn test_go_to_frame_reports_requested_frame() {
        let mut s = session(12_000);
        // position_for(3) truncates to 99 ms, which alone would read back as frame 2
        s.go_to_frame(3).unwrap();
        assert_eq!(s.position_ms(), 99);
        assert_eq!(s.current_frame(), 3);

        s.seek(99);
        assert_eq!(s.current_frame(), 2);
    }

    #[test]
    fn test_go_to_frame_out_of_range() {
        let mut s = session(12_000);
        let err = s.go_to_frame(360).unwrap_err();
        assert!(matches!(err, CoreError::FrameOutOfRange { frame: 360, last: 359 }));
        assert_eq!(s.status(), Some("Frame number out of range (0-359)"));
        assert!(s.go_to_frame(-1).is_err());
        assert_eq!(s.current_frame(), 0);
    }

    #[test]
    fn test_go_to_frame_pauses_playback() {
        let mut s = session(12_000);
        s.play();
        assert_eq!(s.state(), PlaybackState::Playing);
        s.go_to_frame(10).unwrap();
        assert_eq!(s.state(), PlaybackState::Paused);
        assert_eq!(s.current_frame(), 10);
    }

    #[test]
    fn test_step_is_clamped() {
        let mut s = session(12_000);
        s.previous_frame().unwrap();
        assert_eq!(s.current_frame(), 0);
        s.next_frame().unwrap();
        s.next_frame().unwrap();
        assert_eq!(s.current_frame(), 2);

        s.go_to_frame(359).unwrap();
        s.next_frame().unwrap();
        assert_eq!(s.current_frame(), 359);
    }

    #[test]
    fn test_projection_routes_and_shifts() {
        let mut s = session(10_000);
        s.viewport_changed(
            Surface::attached(ViewKind::Topdown),
            None,
            DisplayRect::sized(752.0, 300.0),
        )
        .unwrap();
        s.viewport_changed(
            Surface::attached(ViewKind::Right),
            Some(Size::new(1920.0, 1080.0)),
            DisplayRect::sized(960.0, 540.0),
        )
        .unwrap();

        s.go_to_frame(42).unwrap();
        let frame = s.last_projection().unwrap();
        assert_eq!(frame.frame, 42);

        let topdown: Vec<_> = frame
            .get(Surface::attached(ViewKind::Topdown))
            .unwrap()
            .visible()
            .collect();
        assert_eq!(topdown.len(), 2);
        // 380 + (752 / 2 - 20) - 10
        assert_eq!((topdown[0].x, topdown[0].y), (726.0, 140.0));
        assert_eq!((topdown[0].width, topdown[0].height), (20.0, 20.0));
        assert_eq!(topdown[1].label.as_deref(), Some("7"));

        let right: Vec<_> = frame
            .get(Surface::attached(ViewKind::Right))
            .unwrap()
            .visible()
            .collect();
        assert_eq!(right.len(), 1);
        assert_eq!(
            (right[0].x, right[0].y, right[0].width, right[0].height),
            (50.0, 100.0, 100.0, 100.0)
        );

        // no viewport reported yet
        assert!(frame.get(Surface::attached(ViewKind::Left)).is_none());
    }

    #[test]
    fn test_hit_test_reports_click_provenance() {
        let mut s = session(10_000);
        let topdown = Surface::attached(ViewKind::Topdown);
        s.viewport_changed(topdown, None, DisplayRect::sized(752.0, 300.0))
            .unwrap();
        s.go_to_frame(42).unwrap();

        let info = s.hit_test(topdown, Point::new(736.0, 150.0)).unwrap().unwrap();
        assert_eq!(info.to_string(), "Source: Right Field, Position: (736.0, 150.0)");
        assert_eq!(s.status(), Some("Source: Right Field, Position: (736.0, 150.0)"));
        assert!(s.hit_test(topdown, Point::new(5.0, 5.0)).unwrap().is_none());
        assert!(matches!(
            s.hit_test(Surface::detached(ViewKind::Left), Point::new(0.0, 0.0)),
            Err(CoreError::UnknownSurface(_))
        ));
    }

    #[test]
    fn test_detach_and_reattach() {
        let mut s = session(10_000);
        let left = Surface::attached(ViewKind::Left);
        let left_detached = Surface::detached(ViewKind::Left);
        s.viewport_changed(left, None, DisplayRect::sized(640.0, 360.0))
            .unwrap();
        s.go_to_frame(42).unwrap();
        assert!(s.last_projection().unwrap().get(left).is_some());

        s.detach(ViewKind::Left).unwrap();
        let frame = s.project();
        assert!(frame.get(left).is_none());
        assert!(frame.get(left_detached).is_none());

        s.viewport_changed(left_detached, None, DisplayRect::sized(1920.0, 1080.0))
            .unwrap();
        let frame = s.project();
        let rect = frame.get(left_detached).unwrap().visible().next().unwrap();
        assert_eq!((rect.x, rect.y), (10.0, 20.0));

        s.reattach(ViewKind::Left).unwrap();
        let frame = s.project();
        assert!(frame.get(left_detached).is_none());
        assert!(frame.get(left).is_none());
        assert!(matches!(
            s.viewport_changed(left_detached, None, DisplayRect::sized(10.0, 10.0)),
            Err(CoreError::UnknownSurface(_))
        ));
    }

    #[test]
    fn test_viewport_changed_is_idempotent() {
        let mut s = session(10_000);
        let right = Surface::attached(ViewKind::Right);
        let native = Some(Size::new(1920.0, 1080.0));
        let display = DisplayRect {
            x: 12.0,
            y: 34.0,
            width: 800.0,
            height: 600.0,
        };
        let first = s.viewport_changed(right, native, display).unwrap();
        let second = s.viewport_changed(right, native, display).unwrap();
        assert_eq!(first, second);

        // a later call without a native size keeps the one already known
        let third = s.viewport_changed(right, None, display).unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn test_clear_fault_needs_an_engine() {
        let mut s = session(10_000);
        assert!(!s.clear_fault(ViewKind::Left).unwrap());

        let index = Arc::new(AnnotationIndex::from_json_str(ANNOTATIONS).unwrap());
        let config = SessionConfig {
            fallback_duration_ms: Some(2_000),
            ..SessionConfig::default()
        };
        let mut bare = PlayerSession::new(index, config).unwrap();
        assert!(matches!(
            bare.clear_fault(ViewKind::Left),
            Err(CoreError::UnknownSurface(_))
        ));
    }

    #[test]
    fn test_hidden_surface_is_not_projected() {
        let mut s = session(10_000);
        let topdown = Surface::attached(ViewKind::Topdown);
        s.viewport_changed(topdown, None, DisplayRect::sized(752.0, 300.0))
            .unwrap();
        s.set_visible(topdown, false).unwrap();
        assert!(s.overlays_for(42).surfaces.is_empty());
    }

    #[test]
    fn test_reverse_requires_calibration() {
        let s = session(10_000);
        assert!(matches!(
            s.reverse(Point::new(400.0, 200.0)),
            Err(CoreError::Configuration(_))
        ));
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let mapper = ReverseHomographyMapper::from_rows(identity, identity).unwrap();
        let s = s.with_reverse_mapper(mapper);
        let out = s.reverse(Point::new(400.0, 200.0)).unwrap();
        assert!(out.is_right_half);
        assert_eq!(out.point, Point::new(53.0, 200.0));
    }

    #[test]
    fn test_snapshot_and_stop() {
        let mut s = session(12_000);
        s.go_to_frame(100).unwrap();
        s.set_muted(ViewKind::Left, true).unwrap();
        let snap = s.snapshot();
        assert_eq!(snap.current_frame, 100);
        assert_eq!(snap.total_frames, 360);
        assert_eq!(snap.surfaces.len(), 3);
        assert_eq!(snap.sync.followers.len(), 2);

        s.stop();
        assert_eq!(s.current_frame(), 0);
        assert_eq!(s.state(), PlaybackState::Stopped);
    }
}
