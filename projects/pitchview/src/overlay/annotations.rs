// Per-frame annotation index.
//
// The annotation file is read once; afterwards the index is immutable and can
// be shared between projections without locking.

use crate::error::{CoreError, CoreResult};
use crate::overlay::types::{BBox, Canvas, Point, Size, SourceId, TrackedObject};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// On-disk layout of the annotation document.
#[derive(Deserialize, Debug)]
struct AnnotationFile {
    #[serde(default)]
    metadata: Option<MetadataRecord>,
    frames: Vec<FrameRecord>,
}

#[derive(Deserialize, Debug, Default)]
struct MetadataRecord {
    width: Option<f64>,
    height: Option<f64>,
    field_width: Option<f64>,
    field_height: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct FrameRecord {
    fr: u64,
    obj: Vec<ObjectRecord>,
}

#[derive(Deserialize, Debug)]
struct ObjectRecord {
    src: SourceId,
    bbox: [f64; 4],
    t_c: [f64; 2],
    #[serde(default)]
    id: Option<i64>,
}

impl From<ObjectRecord> for TrackedObject {
    fn from(rec: ObjectRecord) -> Self {
        TrackedObject {
            source: rec.src,
            bbox: BBox::from(rec.bbox),
            topdown_center: Point::new(rec.t_c[0], rec.t_c[1]),
            identity: rec.id,
        }
    }
}

impl MetadataRecord {
    /// Dimensions are only taken as pairs; a lone width or height keeps the default.
    fn apply(&self, canvas: &mut Canvas) {
        if let (Some(w), Some(h)) = (self.width, self.height) {
            canvas.topdown = Size::new(w, h);
        }
        if let (Some(w), Some(h)) = (self.field_width, self.field_height) {
            canvas.field = Size::new(w, h);
        }
    }
}

/// Immutable frame -> objects mapping plus the canvas sizes it was authored against.
#[derive(Debug, Clone, Default)]
pub struct AnnotationIndex {
    frames: HashMap<u64, Vec<TrackedObject>>,
    canvas: Canvas,
    last_frame: Option<u64>,
}

impl AnnotationIndex {
    /// Load from a file on disk using the default canvas sizes.
    pub fn load(path: &Path) -> CoreResult<Self> {
        Self::load_with_defaults(path, Canvas::default())
    }

    pub fn load_with_defaults(path: &Path, defaults: Canvas) -> CoreResult<Self> {
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| CoreError::data_format(&name, e))?;
        let index = Self::from_reader(BufReader::new(file), &name, defaults)?;
        tracing::info!(
            "Loaded {} annotated frames from {} (topdown {}x{}, field {}x{})",
            index.frame_count(),
            name,
            index.canvas.topdown.width,
            index.canvas.topdown.height,
            index.canvas.field.width,
            index.canvas.field.height
        );
        Ok(index)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        source_name: &str,
        defaults: Canvas,
    ) -> CoreResult<Self> {
        let doc: AnnotationFile = serde_json::from_reader(reader)
            .map_err(|e| CoreError::data_format(source_name, e))?;
        Ok(Self::build(doc, source_name, defaults))
    }

    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let doc: AnnotationFile =
            serde_json::from_str(json).map_err(|e| CoreError::data_format("<inline>", e))?;
        Ok(Self::build(doc, "<inline>", Canvas::default()))
    }

    fn build(doc: AnnotationFile, source_name: &str, defaults: Canvas) -> Self {
        let mut canvas = defaults;
        if let Some(meta) = &doc.metadata {
            meta.apply(&mut canvas);
        }

        let mut frames = HashMap::with_capacity(doc.frames.len());
        let mut last_frame = None;
        for record in doc.frames {
            let objects: Vec<TrackedObject> = record.obj.into_iter().map(Into::into).collect();
            if frames.insert(record.fr, objects).is_some() {
                tracing::warn!(
                    "{}: frame {} listed more than once, keeping the last record",
                    source_name,
                    record.fr
                );
            }
            last_frame = last_frame.max(Some(record.fr));
        }

        Self {
            frames,
            canvas,
            last_frame,
        }
    }

    /// Objects annotated for `frame`. Missing frames (including negative
    /// indices) yield an empty slice.
    pub fn objects_for(&self, frame: i64) -> &[TrackedObject] {
        u64::try_from(frame)
            .ok()
            .and_then(|f| self.frames.get(&f))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Highest annotated frame index, if any frame was annotated.
    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    /// All annotated frames in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[TrackedObject])> {
        let mut keys: Vec<u64> = self.frames.keys().copied().collect();
        keys.sort_unstable();
        keys.into_iter().map(move |k| (k, self.frames[&k].as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "metadata": {"width": 800, "height": 320},
        "frames": [
            {"fr": 0, "obj": [
                {"src": 0, "bbox": [10, 20, 50, 80], "t_c": [100, 150], "id": 7},
                {"src": 1, "bbox": [300, 400, 340, 470], "t_c": [400, 150]}
            ]},
            {"fr": 5, "obj": []}
        ]
    }"#;

    #[test]
    fn test_load_and_lookup() {
        let index = AnnotationIndex::from_json_str(SAMPLE).unwrap();
        assert_eq!(index.frame_count(), 2);
        assert_eq!(index.last_frame(), Some(5));

        let objs = index.objects_for(0);
        assert_eq!(objs.len(), 2);
        assert_eq!(objs[0].source, SourceId::Left);
        assert_eq!(objs[0].identity, Some(7));
        assert_eq!(objs[1].source, SourceId::Right);
        assert_eq!(objs[1].identity, None);
        assert_eq!(objs[1].bbox.width(), 40.0);
    }

    #[test]
    fn test_missing_frames_are_empty_not_errors() {
        let index = AnnotationIndex::from_json_str(SAMPLE).unwrap();
        assert!(index.objects_for(1).is_empty());
        assert!(index.objects_for(5).is_empty());
        assert!(index.objects_for(-3).is_empty());
        assert!(index.objects_for(i64::MAX).is_empty());
    }

    #[test]
    fn test_metadata_pairs_override_defaults() {
        let index = AnnotationIndex::from_json_str(SAMPLE).unwrap();
        let canvas = index.canvas();
        assert_eq!(canvas.topdown, Size::new(800.0, 320.0));
        // field dimensions absent -> default kept
        assert_eq!(canvas.field, Size::new(1920.0, 1080.0));

        let lone = r#"{"metadata": {"field_width": 1280}, "frames": []}"#;
        let index = AnnotationIndex::from_json_str(lone).unwrap();
        assert_eq!(index.canvas(), Canvas::default());
    }

    #[test]
    fn test_missing_required_fields_fail() {
        let no_frames = r#"{"metadata": {}}"#;
        assert!(matches!(
            AnnotationIndex::from_json_str(no_frames),
            Err(CoreError::DataFormat { .. })
        ));

        let no_center = r#"{"frames": [{"fr": 1, "obj": [{"src": 0, "bbox": [0,0,1,1]}]}]}"#;
        assert!(matches!(
            AnnotationIndex::from_json_str(no_center),
            Err(CoreError::DataFormat { .. })
        ));

        let bad_src = r#"{"frames": [
            {"fr": 1, "obj": [{"src": 2, "bbox": [0,0,1,1], "t_c": [0,0]}]}
        ]}"#;
        assert!(matches!(
            AnnotationIndex::from_json_str(bad_src),
            Err(CoreError::DataFormat { .. })
        ));
    }

    #[test]
    fn test_unreadable_source_is_data_format_error() {
        let err = AnnotationIndex::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, CoreError::DataFormat { .. }));
    }

    #[test]
    fn test_duplicate_frame_keeps_last() {
        let json = r#"{"frames": [
            {"fr": 3, "obj": [{"src": 0, "bbox": [0,0,1,1], "t_c": [0,0]}]},
            {"fr": 3, "obj": []}
        ]}"#;
        let index = AnnotationIndex::from_json_str(json).unwrap();
        assert!(index.objects_for(3).is_empty());
    }

    #[test]
    fn test_iter_is_sorted() {
        let json = r#"{"frames": [
            {"fr": 9, "obj": []}, {"fr": 2, "obj": []}, {"fr": 4, "obj": []}
        ]}"#;
        let index = AnnotationIndex::from_json_str(json).unwrap();
        let keys: Vec<u64> = index.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![2, 4, 9]);
    }
}
