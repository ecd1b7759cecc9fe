use crate::overlay::types::Size;
use anyhow::{anyhow, Result};
use opencv::{
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH,
    },
};
use std::path::Path;

/// Container metadata for one video file.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    /// None when the container does not report a usable rate.
    pub fps: Option<f64>,
    pub frame_count: u64,
    pub native: Size,
    pub duration_ms: Option<u64>,
}

/// Read fps, frame count and frame size without decoding any frames.
pub fn probe(path: &Path) -> Result<StreamInfo> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("Non UTF-8 video path: {}", path.display()))?;
    let capture = VideoCapture::from_file(path_str, CAP_ANY)?;
    if !capture.is_opened()? {
        return Err(anyhow!("Failed to open video file: {}", path_str));
    }

    let fps = capture.get(CAP_PROP_FPS)?;
    let fps = (fps.is_finite() && fps > 0.0).then_some(fps);
    if fps.is_none() {
        tracing::warn!("probe: no fps in metadata for {}", path_str);
    }
    let frame_count = capture.get(CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;
    let native = Size::new(
        capture.get(CAP_PROP_FRAME_WIDTH)?,
        capture.get(CAP_PROP_FRAME_HEIGHT)?,
    );
    let duration_ms = fps
        .filter(|_| frame_count > 0)
        .map(|fps| (frame_count as f64 / fps * 1000.0).round() as u64);

    tracing::info!(
        "probe: {} fps={:?}, frames={}, size={}x{}",
        path_str,
        fps,
        frame_count,
        native.width,
        native.height
    );

    Ok(StreamInfo {
        fps,
        frame_count,
        native,
        duration_ms,
    })
}
