// Position (ms) <-> frame index conversion for the primary stream.

use crate::error::{CoreError, CoreResult};
use serde::Serialize;

/// Guess fps from clip length: short clips are assumed to be 30 fps, long ones 60.
///
/// This is an approximation that ignores the container; prefer
/// `FpsPolicy::Metadata` when the real rate can be probed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DurationHeuristic {
    pub short_clip_ms: u64,
    pub short_fps: f64,
    pub long_fps: f64,
}

impl Default for DurationHeuristic {
    fn default() -> Self {
        Self {
            short_clip_ms: 10_000,
            short_fps: 30.0,
            long_fps: 60.0,
        }
    }
}

impl DurationHeuristic {
    fn fps_for(&self, duration_ms: u64) -> f64 {
        if duration_ms > 0 && duration_ms < self.short_clip_ms {
            self.short_fps
        } else {
            self.long_fps
        }
    }

    /// Shortest duration whose own guessed rate yields at least `frames`.
    fn duration_for_frames(&self, frames: u64) -> u64 {
        let short = duration_at(frames, self.short_fps);
        if self.fps_for(short) == self.short_fps {
            return short;
        }
        let long = duration_at(frames, self.long_fps);
        if self.fps_for(long) == self.long_fps {
            return long;
        }
        // too long for the short rate, too short for the long one
        long.max(self.short_clip_ms)
    }
}

/// How the clock decides the frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FpsPolicy {
    Fixed { fps: f64 },
    DurationHeuristic(DurationHeuristic),
    /// Rate read from stream metadata; falls back to the heuristic when the
    /// probe found nothing usable.
    Metadata {
        probed: Option<f64>,
        fallback: DurationHeuristic,
    },
}

impl Default for FpsPolicy {
    fn default() -> Self {
        FpsPolicy::DurationHeuristic(DurationHeuristic::default())
    }
}

fn usable(fps: f64) -> bool {
    fps.is_finite() && fps > 0.0
}

fn frames_in(duration_ms: u64, fps: f64) -> u64 {
    (duration_ms as f64 / 1000.0 * fps).floor() as u64
}

/// Smallest whole-ms duration holding `frames` frames at `fps`.
fn duration_at(frames: u64, fps: f64) -> u64 {
    if !usable(fps) {
        return 0;
    }
    let mut duration_ms = (frames as f64 * 1000.0 / fps).ceil() as u64;
    while frames_in(duration_ms, fps) < frames {
        duration_ms += 1;
    }
    duration_ms
}

impl FpsPolicy {
    fn validate(&self) -> CoreResult<()> {
        let rates = match self {
            FpsPolicy::Fixed { fps } => vec![*fps],
            FpsPolicy::DurationHeuristic(h) | FpsPolicy::Metadata { fallback: h, .. } => {
                vec![h.short_fps, h.long_fps]
            }
        };
        match rates.iter().find(|r| !usable(**r)) {
            Some(bad) => Err(CoreError::Configuration(format!(
                "fps must be positive and finite, got {}",
                bad
            ))),
            None => Ok(()),
        }
    }

    pub fn fps_for(&self, duration_ms: u64) -> f64 {
        match self {
            FpsPolicy::Fixed { fps } => *fps,
            FpsPolicy::DurationHeuristic(h) => h.fps_for(duration_ms),
            FpsPolicy::Metadata { probed, fallback } => match probed {
                Some(fps) if usable(*fps) => *fps,
                _ => fallback.fps_for(duration_ms),
            },
        }
    }

    /// Clip duration for which this policy yields at least `frames` frames.
    ///
    /// Exact when the rate it settles on is consistent with the duration; a
    /// heuristic caught between its two rates rounds up to the threshold.
    pub fn duration_for_frames(&self, frames: u64) -> u64 {
        match self {
            FpsPolicy::Fixed { fps } => duration_at(frames, *fps),
            FpsPolicy::DurationHeuristic(h) => h.duration_for_frames(frames),
            FpsPolicy::Metadata { probed, fallback } => match probed {
                Some(fps) if usable(*fps) => duration_at(frames, *fps),
                _ => fallback.duration_for_frames(frames),
            },
        }
    }
}

fn round_ms(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Single source of truth for "which frame is at this position".
///
/// The current frame is never stored; it is derived per query.
#[derive(Debug, Clone, Serialize)]
pub struct FrameClock {
    policy: FpsPolicy,
    duration_ms: u64,
    fps: f64,
    total_frames: u64,
    frame_duration_ms: f64,
}

impl FrameClock {
    pub fn new(policy: FpsPolicy) -> CoreResult<Self> {
        policy.validate()?;
        let mut clock = Self {
            policy,
            duration_ms: 0,
            fps: 0.0,
            total_frames: 0,
            frame_duration_ms: 0.0,
        };
        clock.set_duration(0)?;
        Ok(clock)
    }

    /// Re-derive fps, frame count and frame duration for a new stream duration.
    pub fn set_duration(&mut self, duration_ms: u64) -> CoreResult<()> {
        let fps = self.policy.fps_for(duration_ms);
        if !usable(fps) {
            return Err(CoreError::Configuration(format!(
                "fps must be positive and finite, got {}",
                fps
            )));
        }
        if let FpsPolicy::Metadata { probed, .. } = self.policy {
            if !probed.is_some_and(usable) {
                tracing::warn!(
                    "No usable fps from stream metadata, estimated {} fps from duration",
                    fps
                );
            }
        }

        self.duration_ms = duration_ms;
        self.fps = fps;
        self.total_frames = frames_in(duration_ms, fps);
        self.frame_duration_ms = round_ms(1000.0 / fps);
        Ok(())
    }

    /// Frame at `position_ms`, clamped to the last whole frame.
    pub fn frame_for(&self, position_ms: u64) -> u64 {
        if self.total_frames == 0 {
            return 0;
        }
        let frame = (position_ms as f64 / self.frame_duration_ms).floor() as u64;
        frame.min(self.total_frames - 1)
    }

    /// Seek target for `frame`: `frame * frame_duration_ms`, truncated to whole ms.
    pub fn position_for(&self, frame: u64) -> u64 {
        (frame as f64 * self.frame_duration_ms).trunc() as u64
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn frame_duration_ms(&self) -> f64 {
        self.frame_duration_ms
    }

    pub fn policy(&self) -> FpsPolicy {
        self.policy
    }
}
