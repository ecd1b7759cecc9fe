// Batch reverse transform of every annotated object to field coordinates.

use crate::overlay::annotations::AnnotationIndex;
use crate::overlay::projector::adjusted_topdown_center;
use crate::tracking::homography::{ReverseHomographyMapper, TOPDOWN_MIDPOINT_X};
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ExportRow {
    frame: u64,
    src: u8,
    id: Option<i64>,
    topdown_x: f64,
    topdown_y: f64,
    is_right_half: bool,
    field_x: Option<f64>,
    field_y: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: usize,
    /// Rows whose transform was degenerate; written with empty field columns.
    pub singular: usize,
}

/// Write one CSV row per object, in frame order.
///
/// The top-down position is the one drawn on screen (right-field shift
/// applied), which is the space the half boundary is defined in.
pub fn write_csv<W: Write>(
    index: &AnnotationIndex,
    mapper: &ReverseHomographyMapper,
    out: W,
) -> Result<ExportSummary> {
    let topdown_width = index.canvas().topdown.width;
    let mut writer = csv::Writer::from_writer(out);
    let mut summary = ExportSummary::default();

    for (frame, objects) in index.iter() {
        for obj in objects {
            let center = adjusted_topdown_center(obj, topdown_width);
            let row = match mapper.reverse(center) {
                Ok(fp) => ExportRow {
                    frame,
                    src: u8::from(obj.source),
                    id: obj.identity,
                    topdown_x: center.x,
                    topdown_y: center.y,
                    is_right_half: fp.is_right_half,
                    field_x: Some(fp.point.x),
                    field_y: Some(fp.point.y),
                },
                Err(e) => {
                    tracing::warn!("frame {}: {}", frame, e);
                    summary.singular += 1;
                    ExportRow {
                        frame,
                        src: u8::from(obj.source),
                        id: obj.identity,
                        topdown_x: center.x,
                        topdown_y: center.y,
                        is_right_half: center.x > TOPDOWN_MIDPOINT_X,
                        field_x: None,
                        field_y: None,
                    }
                }
            };
            writer.serialize(row)?;
            summary.rows += 1;
        }
    }
    writer.flush()?;
    Ok(summary)
}

pub fn export_to_path(
    index: &AnnotationIndex,
    mapper: &ReverseHomographyMapper,
    path: &Path,
) -> Result<ExportSummary> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let summary = write_csv(index, mapper, file)?;
    tracing::info!(
        "Wrote {} rows to {} ({} degenerate)",
        summary.rows,
        path.display(),
        summary.singular
    );
    if summary.singular > 0 && summary.singular == summary.rows {
        tracing::warn!("Every row was degenerate; check the calibration matrices");
    }
    Ok(summary)
}
