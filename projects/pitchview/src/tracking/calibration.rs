use crate::error::{CoreError, CoreResult};
use crate::tracking::homography::ReverseHomographyMapper;
use nalgebra::Matrix3;
use std::path::Path;

/// Homography of the right field half onto the top-down view.
pub const RIGHT_HALF_FILE: &str = "al1_homography_matrix.txt";
/// Homography of the left field half onto the top-down view.
pub const LEFT_HALF_FILE: &str = "al2_homography_matrix.txt";

/// Parse a whitespace separated 3x3 matrix, one row per non-empty line.
pub fn parse_matrix(text: &str, source_name: &str) -> CoreResult<Matrix3<f64>> {
    let mut values = Vec::with_capacity(9);
    let mut rows = 0;
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|s| s.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                CoreError::data_format(source_name, format!("line {}: {}", line_no + 1, e))
            })?;
        if row.len() != 3 {
            return Err(CoreError::data_format(
                source_name,
                format!("line {}: expected 3 values, got {}", line_no + 1, row.len()),
            ));
        }
        values.extend(row);
        rows += 1;
    }
    if rows != 3 {
        return Err(CoreError::data_format(
            source_name,
            format!("expected 3 rows, got {}", rows),
        ));
    }
    Ok(Matrix3::from_row_slice(&values))
}

pub fn load_matrix(path: &Path) -> CoreResult<Matrix3<f64>> {
    let name = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| CoreError::data_format(&name, e))?;
    parse_matrix(&text, &name)
}

/// Load both calibration matrices from `dir` and invert them.
pub fn load_mapper(dir: &Path) -> CoreResult<ReverseHomographyMapper> {
    let right = load_matrix(&dir.join(RIGHT_HALF_FILE))?;
    let left = load_matrix(&dir.join(LEFT_HALF_FILE))?;
    tracing::info!("Loaded calibration matrices from {}", dir.display());
    ReverseHomographyMapper::new(right, left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::types::Point;
    use std::fs;

    #[test]
    fn test_parse_matrix_accepts_numpy_savetxt_output() {
        let text = "1.000000000000000000e+00 0.0 2.5\n\n0 1 -3\n0 0 1\n";
        let m = parse_matrix(text, "h.txt").unwrap();
        assert_eq!(m[(0, 2)], 2.5);
        assert_eq!(m[(1, 2)], -3.0);
        assert_eq!(m[(2, 2)], 1.0);
    }

    #[test]
    fn test_parse_matrix_rejects_bad_shapes() {
        assert!(matches!(
            parse_matrix("1 0 0\n0 1 0\n", "h.txt"),
            Err(CoreError::DataFormat { .. })
        ));
        assert!(parse_matrix("1 0\n0 1 0\n0 0 1\n", "h.txt").is_err());
        assert!(parse_matrix("1 0 x\n0 1 0\n0 0 1\n", "h.txt").is_err());
    }

    #[test]
    fn test_load_mapper_reads_both_halves() {
        let dir = std::env::temp_dir().join(format!("pitchview-calib-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(RIGHT_HALF_FILE), "2 0 0\n0 2 0\n0 0 1\n").unwrap();
        fs::write(dir.join(LEFT_HALF_FILE), "1 0 0\n0 1 0\n0 0 1\n").unwrap();

        let mapper = load_mapper(&dir).unwrap();
        let out = mapper.reverse(Point::new(447.0, 100.0)).unwrap();
        assert!(out.is_right_half);
        assert_eq!(out.point, Point::new(50.0, 50.0));

        fs::remove_file(dir.join(LEFT_HALF_FILE)).unwrap();
        assert!(matches!(load_mapper(&dir), Err(CoreError::DataFormat { .. })));
        fs::remove_dir_all(&dir).ok();
    }
}
