// Error taxonomy shared by every core component.
//
// Core components never swallow failures; they hand a typed error to the
// caller, which decides how to present it.

use std::fmt;

/// A failure reported by one playback engine.
///
/// Kept separate from `CoreError` so the synchronizer can return several of
/// them from a single broadcast without stopping the other engines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("engine '{engine}' failed: {message}")]
pub struct EngineError {
    pub engine: String,
    pub message: String,
}

impl EngineError {
    pub fn new(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The annotation (or calibration) source is unreadable or structurally wrong.
    #[error("Invalid data in {source_name}: {reason}")]
    DataFormat { source_name: String, reason: String },

    /// A homography could not be inverted or a perspective divide hit ~0.
    #[error("Singular transform: {0}")]
    SingularTransform(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Frame {frame} out of range (0-{last})")]
    FrameOutOfRange { frame: i64, last: i64 },

    #[error("Unknown surface: {0}")]
    UnknownSurface(String),
}

impl CoreError {
    pub fn data_format(source_name: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::DataFormat {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
