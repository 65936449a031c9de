use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::annotation::domain::region_sink::{RegionSink, TrackedRegion};

#[derive(Serialize)]
struct FrameRecord<'a> {
    frame: usize,
    regions: &'a [TrackedRegion],
}

/// Writes one JSON object per processed frame, one per line.
pub struct JsonRegionSink<W: Write + Send> {
    out: W,
}

impl JsonRegionSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::create(path)
            .map_err(|e| format!("cannot create region log {}: {e}", path.display()))?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }
}

impl<W: Write + Send> JsonRegionSink<W> {
    pub fn from_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RegionSink for JsonRegionSink<W> {
    fn write(
        &mut self,
        frame_index: usize,
        regions: &[TrackedRegion],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let record = FrameRecord {
            frame: frame_index,
            regions,
        };
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use tempfile::TempDir;

    fn region(track: u32, x: u32) -> TrackedRegion {
        TrackedRegion {
            track,
            bbox: BoundingBox::new(x, 10, 20, 20),
        }
    }

    #[test]
    fn test_writes_one_line_per_frame() {
        let mut sink = JsonRegionSink::from_writer(Vec::new());
        sink.write(0, &[region(0, 10), region(1, 50)]).unwrap();
        sink.write(1, &[]).unwrap();
        sink.close().unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"frame":0,"regions":[{"track":0,"x":10,"y":10,"width":20,"height":20},{"track":1,"x":50,"y":10,"width":20,"height":20}]}"#
        );
        assert_eq!(lines[1], r#"{"frame":1,"regions":[]}"#);
    }

    #[test]
    fn test_lines_parse_back_as_json() {
        let mut sink = JsonRegionSink::from_writer(Vec::new());
        sink.write(7, &[region(3, 1)]).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();

        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["frame"], 7);
        assert_eq!(value["regions"][0]["track"], 3);
        assert_eq!(value["regions"][0]["x"], 1);
    }

    #[test]
    fn test_create_writes_file_on_close() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("regions.jsonl");
        let mut sink = JsonRegionSink::create(&path).unwrap();
        sink.write(0, &[region(0, 0)]).unwrap();
        sink.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(r#"{"frame":0,"#));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing").join("regions.jsonl");
        assert!(JsonRegionSink::create(&path).is_err());
    }
}
