// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! MegaDetector v5 camera-trap detection and the active-learning target
//! database initializer.
//!
//! The PostgreSQL tests in `tests/initialize_db.rs` need a live server and are
//! ignored by default:
//!
//! ```sh
//! CAMTRAP_TEST_PG_PASSWORD=postgres PGHOST=localhost cargo test -- --ignored
//! ```

pub mod config; // 命令行参数
pub mod dataset; // 图片目录与批量加载
pub mod db; // 主动学习目标数据库
pub mod error;
pub mod export; // JSON / Timelapse JSON 输出
pub mod models; // 模型接口与 MegaDetector 实现
pub mod ort_backend;
pub mod transforms; // letterbox 预处理
pub mod visualization; // 标注图片与裁剪输出

use std::path::{Path, PathBuf};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::config::{Args, InitDbArgs};
pub use crate::error::{CamtrapError, Result};
pub use crate::models::{MegaDetectorPostprocessor, MegaDetectorV5, Model};
pub use crate::ort_backend::{Engine, OrtBackend, OrtConfig, OrtEP};

/// 非极大值抑制
///
/// Keeps the highest-confidence box of every overlapping cluster. With
/// `class_agnostic == false` only boxes of the same class suppress each other.
pub fn non_max_suppression(xs: &mut Vec<Bbox>, iou_threshold: f32, class_agnostic: bool) {
    xs.sort_by(|b1, b2| b2.confidence().total_cmp(&b1.confidence()));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if !class_agnostic && xs[prev_index].id() != xs[index].id() {
                continue;
            }
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// Local wall-clock time in the format the Timelapse tool expects.
pub fn detection_completion_time() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// 初始化日志: `RUST_LOG` 优先, 否则使用 `default_level`
pub fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .try_init();
}

/// Detections of one image, in original-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageDetections {
    pub img_id: PathBuf,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Bbox>,
    pub labels: Vec<String>,
}

impl ImageDetections {
    pub fn new(img_id: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            img_id: img_id.into(),
            width,
            height,
            ..Default::default()
        }
    }

    pub fn push(&mut self, bbox: Bbox, label: String) {
        self.detections.push(bbox);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// File name component of `img_id`, used for output naming.
    pub fn file_name(&self) -> String {
        self.img_id
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.img_id.to_string_lossy().into_owned())
    }

    /// `img_id` with `prefix` removed when it is a leading path component.
    pub fn relative_id(&self, prefix: Option<&Path>) -> String {
        let path = match prefix {
            Some(prefix) => self.img_id.strip_prefix(prefix).unwrap_or(&self.img_id),
            None => &self.img_id,
        };
        path.to_string_lossy().into_owned()
    }

    /// Boxes as `[x1, y1, x2, y2]` divided by image width/height.
    pub fn normalized_coords(&self) -> Vec<[f32; 4]> {
        let w = self.width.max(1) as f32;
        let h = self.height.max(1) as f32;
        self.detections
            .iter()
            .map(|b| [b.xmin() / w, b.ymin() / h, b.xmax() / w, b.ymax() / h])
            .collect()
    }

    pub fn max_confidence(&self) -> Option<f32> {
        self.detections
            .iter()
            .map(Bbox::confidence)
            .reduce(f32::max)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bbox {
    // a bounding box around an object
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, id: usize, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            id,
            confidence,
        }
    }

    pub fn new_from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32, id: usize, confidence: f32) -> Self {
        Self::new(x1, y1, (x2 - x1).max(0.), (y2 - y1).max(0.), id, confidence)
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn xyxy(&self) -> [f32; 4] {
        [self.xmin, self.ymin, self.xmax(), self.ymax()]
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}
