pub mod clock;
pub mod clocked;
#[cfg(feature = "opencv")]
pub mod probe;
pub mod synchronizer;

use crate::error::EngineError;
use crate::overlay::types::Size;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Handle to one media playback engine. Decoding and rendering live behind it;
/// the core only commands it and reads its clock.
pub trait PlaybackEngine: Send {
    fn name(&self) -> &str;
    fn play(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self) -> Result<(), EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
    fn seek(&mut self, position_ms: u64) -> Result<(), EngineError>;
    fn position(&self) -> u64;
    fn state(&self) -> PlaybackState;
    /// None until the media reports its length.
    fn duration(&self) -> Option<u64>;

    /// Native frame size, when the media exposes it.
    fn native_size(&self) -> Option<Size> {
        None
    }

    fn set_muted(&mut self, _muted: bool) -> Result<(), EngineError> {
        Ok(())
    }
}
