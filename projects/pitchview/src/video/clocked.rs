// Engine whose position advances with the wall clock.
//
// Stands in for a real media backend when the core runs headless: it keeps a
// position, a duration and a playback state, nothing else.

use crate::error::EngineError;
use crate::overlay::types::Size;
use crate::video::{PlaybackEngine, PlaybackState};
use std::time::Instant;

pub struct ClockedEngine {
    name: String,
    duration_ms: u64,
    /// Playback speed relative to the wall clock; != 1.0 makes the engine drift.
    rate: f64,
    native: Option<Size>,
    state: PlaybackState,
    anchor_position: u64,
    anchor_time: Option<Instant>,
    muted: bool,
}

impl ClockedEngine {
    pub fn new(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            duration_ms,
            rate: 1.0,
            native: None,
            state: PlaybackState::Stopped,
            anchor_position: 0,
            anchor_time: None,
            muted: false,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_native_size(mut self, size: Size) -> Self {
        self.native = Some(size);
        self
    }

    pub(crate) fn position_at(&self, now: Instant) -> u64 {
        match self.anchor_time {
            Some(started) if self.state == PlaybackState::Playing => {
                let elapsed = now.saturating_duration_since(started).as_secs_f64() * 1000.0;
                let pos = self.anchor_position as f64 + elapsed * self.rate;
                (pos.max(0.0) as u64).min(self.duration_ms)
            }
            _ => self.anchor_position,
        }
    }

    pub(crate) fn state_at(&self, now: Instant) -> PlaybackState {
        if self.state == PlaybackState::Playing && self.position_at(now) >= self.duration_ms {
            // end of media
            PlaybackState::Stopped
        } else {
            self.state
        }
    }

    pub(crate) fn play_at(&mut self, now: Instant) {
        let at_end = self.position_at(now) >= self.duration_ms;
        if self.state_at(now) == PlaybackState::Stopped && at_end {
            self.anchor_position = 0;
        } else {
            self.anchor_position = self.position_at(now);
        }
        self.anchor_time = Some(now);
        self.state = PlaybackState::Playing;
    }

    pub(crate) fn pause_at(&mut self, now: Instant) {
        self.anchor_position = self.position_at(now);
        self.anchor_time = None;
        self.state = PlaybackState::Paused;
    }

    pub(crate) fn seek_at(&mut self, position_ms: u64, now: Instant) {
        self.anchor_position = position_ms.min(self.duration_ms);
        if self.state == PlaybackState::Playing {
            self.anchor_time = Some(now);
        }
    }
}

impl PlaybackEngine for ClockedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn play(&mut self) -> Result<(), EngineError> {
        self.play_at(Instant::now());
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.pause_at(Instant::now());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.anchor_position = 0;
        self.anchor_time = None;
        self.state = PlaybackState::Stopped;
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<(), EngineError> {
        self.seek_at(position_ms, Instant::now());
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position_at(Instant::now())
    }

    fn state(&self) -> PlaybackState {
        self.state_at(Instant::now())
    }

    fn duration(&self) -> Option<u64> {
        Some(self.duration_ms)
    }

    fn native_size(&self) -> Option<Size> {
        self.native
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), EngineError> {
        self.muted = muted;
        Ok(())
    }
}
