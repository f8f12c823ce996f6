// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测结果 JSON 输出 (普通格式 / Timelapse 格式)

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::error::{CamtrapError, Result};
use crate::{detection_completion_time, Bbox, ImageDetections};

pub const TIMELAPSE_FORMAT_VERSION: &str = "1.3";

#[derive(Debug, Serialize)]
struct DetectionJson<'a> {
    annotations: Vec<Annotation>,
    categories: &'a BTreeMap<usize, String>,
}

#[derive(Debug, Serialize)]
struct Annotation {
    img_id: String,
    bbox: Vec<[i64; 4]>,
    category: Vec<usize>,
    confidence: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct TimelapseJson<'a> {
    info: Map<String, Value>,
    detection_categories: &'a BTreeMap<usize, String>,
    images: Vec<TimelapseImage>,
}

#[derive(Debug, Serialize)]
struct TimelapseImage {
    file: String,
    /// confidence, or "" when nothing was detected
    max_detection_conf: Value,
    detections: Vec<TimelapseDetection>,
}

#[derive(Debug, Serialize)]
struct TimelapseDetection {
    category: String,
    conf: f32,
    /// normalized [x, y, w, h]
    bbox: [f32; 4],
    classifications: Vec<Value>,
}

/// Detections of `r` whose class is not excluded, with their normalized xyxy.
fn kept<'a>(
    r: &'a ImageDetections,
    exclude_category_ids: &'a [usize],
) -> impl Iterator<Item = (&'a Bbox, [f32; 4])> + 'a {
    r.detections
        .iter()
        .zip(r.normalized_coords())
        .filter(move |(b, _)| !exclude_category_ids.contains(&b.id()))
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| CamtrapError::io_at(path, e))?;
    let mut writer = BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    value.serialize(&mut ser)?;
    writer.flush().map_err(|e| CamtrapError::io_at(path, e))
}

/// Write boxes as integer pixel xyxy with parallel category/confidence lists.
pub fn save_detection_json(
    results: &[ImageDetections],
    output_path: &Path,
    categories: &BTreeMap<usize, String>,
    exclude_category_ids: &[usize],
    exclude_file_path: Option<&Path>,
) -> Result<()> {
    let annotations = results
        .iter()
        .map(|r| {
            let mut a = Annotation {
                img_id: r.relative_id(exclude_file_path),
                bbox: Vec::new(),
                category: Vec::new(),
                confidence: Vec::new(),
            };
            for (b, _) in kept(r, exclude_category_ids) {
                let [x1, y1, x2, y2] = b.xyxy();
                a.bbox.push([x1 as i64, y1 as i64, x2 as i64, y2 as i64]);
                a.category.push(b.id());
                a.confidence.push(b.confidence());
            }
            a
        })
        .collect();

    write_pretty(
        output_path,
        &DetectionJson {
            annotations,
            categories,
        },
    )?;
    info!(path = %output_path.display(), images = results.len(), "detection json saved");
    Ok(())
}

/// Write the MegaDetector batch format read by Timelapse.
///
/// `info` is copied as given; `detection_completion_time` and
/// `format_version` are filled in when absent.
pub fn save_detection_timelapse_json(
    results: &[ImageDetections],
    output_path: &Path,
    categories: &BTreeMap<usize, String>,
    exclude_category_ids: &[usize],
    exclude_file_path: Option<&Path>,
    info: Map<String, Value>,
) -> Result<()> {
    let mut info = info;
    info.entry("detection_completion_time")
        .or_insert_with(|| Value::String(detection_completion_time()));
    info.entry("format_version")
        .or_insert_with(|| Value::String(TIMELAPSE_FORMAT_VERSION.to_string()));

    let images = results
        .iter()
        .map(|r| {
            let detections: Vec<TimelapseDetection> = kept(r, exclude_category_ids)
                .map(|(b, [x1, y1, x2, y2])| TimelapseDetection {
                    category: b.id().to_string(),
                    conf: b.confidence(),
                    bbox: [x1, y1, x2 - x1, y2 - y1],
                    classifications: Vec::new(),
                })
                .collect();
            let max_detection_conf = detections
                .iter()
                .map(|d| d.conf)
                .reduce(f32::max)
                .map_or_else(|| json!(""), |c| json!(c));
            TimelapseImage {
                file: r.relative_id(exclude_file_path),
                max_detection_conf,
                detections,
            }
        })
        .collect();

    write_pretty(
        output_path,
        &TimelapseJson {
            info,
            detection_categories: categories,
            images,
        },
    )?;
    info!(path = %output_path.display(), images = results.len(), "timelapse json saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> BTreeMap<usize, String> {
        [(0, "animal"), (1, "person"), (2, "vehicle")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect()
    }

    fn results() -> Vec<ImageDetections> {
        let mut a = ImageDetections::new("/data/imgs/site1/a.JPG", 200, 100);
        a.push(Bbox::new_from_xyxy(20.7, 10.2, 120.9, 60.5, 0, 0.5), "animal 0.50".into());
        a.push(Bbox::new_from_xyxy(0., 0., 10., 10., 1, 0.75), "person 0.75".into());
        let b = ImageDetections::new("/data/imgs/b.JPG", 200, 100);
        vec![a, b]
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn detection_json_shape() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("batch_output.json");
        save_detection_json(&results(), &out, &categories(), &[], None).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("{\n    \"annotations\""));

        let v = read(&out);
        assert_eq!(v["categories"]["0"], "animal");
        assert_eq!(v["categories"]["2"], "vehicle");
        let a = &v["annotations"][0];
        assert_eq!(a["img_id"], "/data/imgs/site1/a.JPG");
        assert_eq!(a["bbox"], json!([[20, 10, 120, 60], [0, 0, 10, 10]]));
        assert_eq!(a["category"], json!([0, 1]));
        assert_eq!(a["confidence"], json!([0.5, 0.75]));
        assert_eq!(v["annotations"][1]["bbox"], json!([]));
    }

    #[test]
    fn detection_json_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");
        save_detection_json(&results(), &out, &categories(), &[1], Some(Path::new("/data/imgs")))
            .unwrap();

        let v = read(&out);
        let a = &v["annotations"][0];
        assert_eq!(a["img_id"], "site1/a.JPG");
        assert_eq!(a["category"], json!([0]));
        assert_eq!(a["confidence"], json!([0.5]));
    }

    #[test]
    fn timelapse_json_shape() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("timelapse.json");
        let mut info = Map::new();
        info.insert("detector".into(), json!("MegaDetectorV5"));
        save_detection_timelapse_json(
            &results(),
            &out,
            &categories(),
            &[],
            Some(Path::new("/data/imgs")),
            info,
        )
        .unwrap();

        let v = read(&out);
        assert_eq!(v["info"]["detector"], "MegaDetectorV5");
        assert_eq!(v["info"]["format_version"], TIMELAPSE_FORMAT_VERSION);
        assert!(v["info"]["detection_completion_time"].is_string());
        assert_eq!(v["detection_categories"]["1"], "person");

        let img = &v["images"][0];
        assert_eq!(img["file"], "site1/a.JPG");
        assert_eq!(img["max_detection_conf"], json!(0.75));
        let d = &img["detections"][1];
        assert_eq!(d["category"], "1");
        assert_eq!(d["classifications"], json!([]));
        let bbox: Vec<f64> = serde_json::from_value(d["bbox"].clone()).unwrap();
        let expected = [0.0, 0.0, 0.05, 0.1];
        for (got, want) in bbox.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6);
        }

        let empty = &v["images"][1];
        assert_eq!(empty["file"], "b.JPG");
        assert_eq!(empty["max_detection_conf"], "");
        assert_eq!(empty["detections"], json!([]));
    }

    #[test]
    fn timelapse_keeps_caller_info_fields() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("timelapse.json");
        let mut info = Map::new();
        info.insert("format_version".into(), json!("1.0"));
        save_detection_timelapse_json(&results(), &out, &categories(), &[0, 1], None, info)
            .unwrap();

        let v = read(&out);
        assert_eq!(v["info"]["format_version"], "1.0");
        assert_eq!(v["images"][0]["max_detection_conf"], "");
    }
}
