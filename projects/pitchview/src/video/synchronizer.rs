// Keeps a group of playback engines on the primary engine's clock.
//
// Transport commands are broadcast to every engine, faulted or not. While
// playing, a periodic drift check seeks any healthy follower that wandered more
// than the threshold away from the primary. Only the primary's position drives
// `SyncState`.

use crate::error::EngineError;
use crate::video::{PlaybackEngine, PlaybackState};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_DRIFT_THRESHOLD_MS: u64 = 50;
pub const DEFAULT_DRIFT_INTERVAL: Duration = Duration::from_millis(500);

pub type EngineId = usize;

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub drift_threshold_ms: u64,
    pub drift_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift_threshold_ms: DEFAULT_DRIFT_THRESHOLD_MS,
            drift_interval: DEFAULT_DRIFT_INTERVAL,
        }
    }
}

/// Periodic timer driven by caller-supplied instants. Armed only while playing.
#[derive(Debug)]
struct DriftTimer {
    interval: Duration,
    armed: bool,
    last_fired: Option<Instant>,
}

impl DriftTimer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            armed: false,
            last_fired: None,
        }
    }

    fn start(&mut self) {
        self.armed = true;
        self.last_fired = None;
    }

    fn stop(&mut self) {
        self.armed = false;
        self.last_fired = None;
    }

    /// First call after `start` only sets the baseline.
    fn due(&mut self, now: Instant) -> bool {
        if !self.armed {
            return false;
        }
        match self.last_fired {
            None => {
                self.last_fired = Some(now);
                false
            }
            Some(last) if now.saturating_duration_since(last) >= self.interval => {
                self.last_fired = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}

struct EngineSlot {
    engine: Box<dyn PlaybackEngine>,
    fault: Option<EngineError>,
    last_drift_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowerStatus {
    pub name: String,
    pub last_drift_ms: Option<i64>,
    pub fault: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncState {
    pub position_ms: u64,
    pub state: PlaybackState,
    pub primary: Option<String>,
    pub followers: Vec<FollowerStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftCorrection {
    pub engine: String,
    pub drift_ms: i64,
    pub target_ms: u64,
}

#[derive(Debug, Default)]
pub struct DriftReport {
    pub corrected: Vec<DriftCorrection>,
    pub failures: Vec<EngineError>,
}

pub struct PlaybackSynchronizer {
    engines: Vec<EngineSlot>,
    primary: Option<EngineId>,
    state: PlaybackState,
    position_ms: u64,
    threshold_ms: u64,
    timer: DriftTimer,
}

impl PlaybackSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            engines: Vec::new(),
            primary: None,
            state: PlaybackState::Stopped,
            position_ms: 0,
            threshold_ms: config.drift_threshold_ms,
            timer: DriftTimer::new(config.drift_interval),
        }
    }

    /// Register an engine. The first one added is primary unless a later one
    /// asks for it.
    pub fn add_engine(&mut self, engine: Box<dyn PlaybackEngine>, is_primary: bool) -> EngineId {
        let id = self.engines.len();
        info!(
            "Adding playback engine '{}' (primary: {})",
            engine.name(),
            is_primary || self.primary.is_none()
        );
        self.engines.push(EngineSlot {
            engine,
            fault: None,
            last_drift_ms: None,
        });
        if is_primary || self.primary.is_none() {
            self.primary = Some(id);
        }
        id
    }

    pub fn primary(&self) -> Option<&dyn PlaybackEngine> {
        self.primary.map(|id| self.engines[id].engine.as_ref())
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn position_ms(&self) -> u64 {
        self.position_ms
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.primary().and_then(|p| p.duration())
    }

    fn is_follower(&self, id: EngineId) -> bool {
        self.primary != Some(id)
    }

    /// Send one command to every engine. A failure is recorded against the
    /// follower and the loop carries on.
    fn broadcast<F>(&mut self, command: &str, mut op: F) -> Vec<EngineError>
    where
        F: FnMut(&mut dyn PlaybackEngine) -> Result<(), EngineError>,
    {
        let mut failures = Vec::new();
        let primary = self.primary;
        for (id, slot) in self.engines.iter_mut().enumerate() {
            if let Err(err) = op(slot.engine.as_mut()) {
                warn!("{} failed on '{}': {}", command, slot.engine.name(), err);
                if primary != Some(id) {
                    slot.fault = Some(err.clone());
                }
                failures.push(err);
            }
        }
        failures
    }

    pub fn play(&mut self) -> Vec<EngineError> {
        let failures = self.broadcast("play", |e| e.play());
        self.state = PlaybackState::Playing;
        self.timer.start();
        failures
    }

    pub fn pause(&mut self) -> Vec<EngineError> {
        let failures = self.broadcast("pause", |e| e.pause());
        self.state = PlaybackState::Paused;
        self.timer.stop();
        failures
    }

    pub fn stop(&mut self) -> Vec<EngineError> {
        let failures = self.broadcast("stop", |e| e.stop());
        self.state = PlaybackState::Stopped;
        self.timer.stop();
        self.position_ms = 0;
        for slot in &mut self.engines {
            slot.last_drift_ms = None;
        }
        failures
    }

    pub fn seek(&mut self, position_ms: u64) -> Vec<EngineError> {
        let failures = self.broadcast("seek", |e| e.seek(position_ms));
        self.position_ms = position_ms;
        failures
    }

    pub fn set_muted(&mut self, id: EngineId, muted: bool) -> Result<(), EngineError> {
        match self.engines.get_mut(id) {
            Some(slot) => slot.engine.set_muted(muted),
            None => Err(EngineError::new(format!("#{id}"), "no such engine")),
        }
    }

    /// Put a faulted follower back under drift correction. Transport commands
    /// reach it either way.
    pub fn clear_fault(&mut self, id: EngineId) -> bool {
        match self.engines.get_mut(id) {
            Some(slot) => slot.fault.take().is_some(),
            None => false,
        }
    }

    /// Pull position and state from the primary. A primary that stopped on its
    /// own (end of media) takes the group with it.
    pub fn poll_primary(&mut self) -> Option<PlaybackState> {
        let primary = self.primary.map(|id| self.engines[id].engine.as_ref())?;
        self.position_ms = primary.position();
        let primary_state = primary.state();
        if primary_state == self.state {
            return None;
        }
        info!(
            "Primary engine '{}' changed state: {:?} -> {:?}",
            primary.name(),
            self.state,
            primary_state
        );
        self.state = primary_state;
        if primary_state == PlaybackState::Playing {
            self.timer.start();
        } else {
            self.timer.stop();
        }
        Some(primary_state)
    }

    /// Compare every follower against the primary and seek the ones past the
    /// threshold. No-op unless the group is playing.
    pub fn check_synchronization(&mut self) -> DriftReport {
        let mut report = DriftReport::default();
        if self.state != PlaybackState::Playing {
            return report;
        }
        let Some(primary_id) = self.primary else {
            return report;
        };
        let target = self.engines[primary_id].engine.position();
        self.position_ms = target;

        for id in 0..self.engines.len() {
            if !self.is_follower(id) {
                continue;
            }
            let slot = &mut self.engines[id];
            if slot.fault.is_some() {
                continue;
            }
            let drift = slot.engine.position() as i64 - target as i64;
            slot.last_drift_ms = Some(drift);
            if drift.unsigned_abs() <= self.threshold_ms {
                continue;
            }
            match slot.engine.seek(target) {
                Ok(()) => {
                    debug!(
                        "Resynced '{}' to {} ms (drift {} ms)",
                        slot.engine.name(),
                        target,
                        drift
                    );
                    report.corrected.push(DriftCorrection {
                        engine: slot.engine.name().to_string(),
                        drift_ms: drift,
                        target_ms: target,
                    });
                }
                Err(err) => {
                    warn!(
                        "Resync of '{}' failed, leaving it out of the group: {}",
                        slot.engine.name(),
                        err
                    );
                    slot.fault = Some(err.clone());
                    report.failures.push(err);
                }
            }
        }
        report
    }

    /// Drive the synchronizer from an external clock.
    pub fn tick(&mut self, now: Instant) -> DriftReport {
        self.poll_primary();
        if self.timer.due(now) {
            self.check_synchronization()
        } else {
            DriftReport::default()
        }
    }

    pub fn sync_state(&self) -> SyncState {
        SyncState {
            position_ms: self.position_ms,
            state: self.state,
            primary: self.primary().map(|p| p.name().to_string()),
            followers: self
                .engines
                .iter()
                .enumerate()
                .filter(|(id, _)| self.is_follower(*id))
                .map(|(_, slot)| FollowerStatus {
                    name: slot.engine.name().to_string(),
                    last_drift_ms: slot.last_drift_ms,
                    fault: slot.fault.as_ref().map(|e| e.to_string()),
                })
                .collect(),
        }
    }
}
