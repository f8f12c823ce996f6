// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// MegaDetector v5 完整模型实现 (YOLOv5 结构, 3 类: animal / person / vehicle)
// 包含: 模型加载、预处理、推理、后处理

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use image::DynamicImage;
use ndarray::{s, Array, Axis, IxDyn};
use tracing::{debug, info};

use super::Model;
use crate::dataset::ImageLoader;
use crate::error::CamtrapError;
use crate::transforms::{stack_batch, Letterbox, MegaDetectorV5Transform};
use crate::{
    non_max_suppression, Args, Bbox, Engine, ImageDetections, OrtBackend, OrtConfig, OrtEP,
    Result,
};

/// MegaDetector v5 完整模型结构
#[derive(Debug)]
pub struct MegaDetectorV5 {
    engine: Box<dyn Engine>,
    transform: MegaDetectorV5Transform,
    postprocessor: MegaDetectorPostprocessor,
    profile: bool,
}

impl MegaDetectorV5 {
    pub const IMAGE_SIZE: u32 = 1280;
    pub const STRIDE: u32 = 64;
    pub const CLASS_NAMES: [&'static str; 3] = ["animal", "person", "vehicle"];

    /// 从命令行参数创建模型
    pub fn new(args: &Args) -> Result<Self> {
        // execution provider
        let ep = if args.cuda {
            OrtEP::CUDA(args.device_id)
        } else {
            OrtEP::CPU
        };

        let engine = OrtBackend::build(OrtConfig {
            f: args.model.clone(),
            ep,
            image_size: (Self::IMAGE_SIZE, Self::IMAGE_SIZE),
            intra_threads: None,
        })?;

        let postprocessor =
            MegaDetectorPostprocessor::new(Self::CLASS_NAMES.len(), args.conf, args.iou);
        Self::from_engine(engine, postprocessor)
    }

    pub fn from_engine(
        engine: impl Engine + 'static,
        postprocessor: MegaDetectorPostprocessor,
    ) -> Result<Self> {
        let transform = MegaDetectorV5Transform::new(Self::IMAGE_SIZE, Self::STRIDE)?;
        Ok(Self {
            engine: Box::new(engine),
            transform,
            postprocessor,
            profile: tracing::enabled!(tracing::Level::DEBUG),
        })
    }

    pub fn transform(&self) -> MegaDetectorV5Transform {
        self.transform
    }

    /// `{0: "animal", 1: "person", 2: "vehicle"}`
    pub fn categories() -> BTreeMap<usize, String> {
        Self::CLASS_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| (i, name.to_string()))
            .collect()
    }

    /// Detect on one already-loaded RGB image.
    pub fn single_image_detection(
        &mut self,
        img: &DynamicImage,
        img_path: impl Into<PathBuf>,
    ) -> Result<ImageDetections> {
        let (xs, letterboxes) = self.preprocess(std::slice::from_ref(img))?;
        let ys = self.run(xs, self.profile)?;
        let boxes = self.postprocess(ys, &letterboxes)?;
        let boxes = boxes.into_iter().next().unwrap_or_default();
        Ok(self.postprocessor.to_detections(
            img_path.into(),
            &letterboxes[0],
            boxes,
            &Self::CLASS_NAMES,
        ))
    }

    /// Run every batch of `loader`; results follow the loader's file order.
    pub fn batch_image_detection(&mut self, loader: &ImageLoader) -> Result<Vec<ImageDetections>> {
        let n_batches = loader.len();
        let mut results = Vec::with_capacity(loader.dataset().len());
        for (i, batch) in loader.iter().enumerate() {
            let batch = batch?;
            let t = Instant::now();
            let ys = self.run(batch.xs, self.profile)?;
            let boxes = self.postprocess(ys, &batch.letterboxes)?;
            for ((path, letterbox), boxes) in batch
                .paths
                .into_iter()
                .zip(batch.letterboxes.iter())
                .zip(boxes)
            {
                results.push(self.postprocessor.to_detections(
                    path,
                    letterbox,
                    boxes,
                    &Self::CLASS_NAMES,
                ));
            }
            info!(
                batch = i + 1,
                of = n_batches,
                elapsed_ms = t.elapsed().as_millis() as u64,
                "batch detection"
            );
        }
        Ok(results)
    }
}

impl Model for MegaDetectorV5 {
    fn preprocess(
        &mut self,
        images: &[DynamicImage],
    ) -> Result<(Array<f32, IxDyn>, Vec<Letterbox>)> {
        let t_pre = Instant::now();
        let (xs, letterboxes): (Vec<_>, Vec<_>) =
            images.iter().map(|x| self.transform.apply(x)).unzip();
        let xs = stack_batch(&xs)?;
        if self.profile {
            debug!(elapsed = ?t_pre.elapsed(), "preprocess");
        }
        Ok((xs, letterboxes))
    }

    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine.run(xs, profile)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        letterboxes: &[Letterbox],
    ) -> Result<Vec<Vec<Bbox>>> {
        self.postprocessor.postprocess(xs, letterboxes)
    }

    fn summary(&self) {
        info!(
            engine = ?self.engine,
            stride = Self::STRIDE,
            nc = self.postprocessor.nc,
            conf = self.postprocessor.conf,
            iou = self.postprocessor.iou,
            "MegaDetectorV5 summary"
        );
    }
}

/// YOLOv5 后处理器
///
/// Output layout is `[batch, anchors, 5 + nc]` with rows
/// `cx, cy, w, h, objectness, class scores...` in network pixels.
#[derive(Debug, Clone)]
pub struct MegaDetectorPostprocessor {
    nc: usize,
    conf: f32,
    iou: f32,
    max_det: usize,
    class_agnostic: bool,
}

impl MegaDetectorPostprocessor {
    pub const MAX_DET: usize = 300;

    pub fn new(nc: usize, conf: f32, iou: f32) -> Self {
        Self {
            nc,
            conf,
            iou,
            max_det: Self::MAX_DET,
            class_agnostic: false,
        }
    }

    pub fn with_class_agnostic(mut self, class_agnostic: bool) -> Self {
        self.class_agnostic = class_agnostic;
        self
    }

    pub fn conf(&self) -> f32 {
        self.conf
    }

    pub fn iou(&self) -> f32 {
        self.iou
    }

    /// Decode, threshold and NMS every image of the batch; boxes come back
    /// in original-image pixels.
    pub fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        letterboxes: &[Letterbox],
    ) -> Result<Vec<Vec<Bbox>>> {
        const OBJ_OFFSET: usize = 4;
        const CLS_OFFSET: usize = 5;

        let preds = xs
            .into_iter()
            .next()
            .ok_or_else(|| CamtrapError::Ort("model returned no outputs".into()))?;
        let shape = preds.shape().to_vec();
        if shape.len() != 3 || shape[2] < CLS_OFFSET + self.nc {
            return Err(CamtrapError::Ort(format!(
                "unexpected output shape {shape:?} for {} classes",
                self.nc
            )));
        }
        if shape[0] != letterboxes.len() {
            return Err(CamtrapError::Ort(format!(
                "output batch {} does not match {} inputs",
                shape[0],
                letterboxes.len()
            )));
        }

        let mut ys = Vec::with_capacity(shape[0]);
        for (idx, anchor) in preds.axis_iter(Axis(0)).enumerate() {
            let mut data: Vec<Bbox> = Vec::new();
            for pred in anchor.axis_iter(Axis(0)) {
                let objectness = pred[OBJ_OFFSET];
                if objectness <= self.conf {
                    continue;
                }
                let clss = pred.slice(s![CLS_OFFSET..CLS_OFFSET + self.nc]);
                let Some((id, &score)) = clss
                    .into_iter()
                    .enumerate()
                    .reduce(|max, x| if x.1 > max.1 { x } else { max })
                else {
                    continue;
                };

                let confidence = objectness * score;
                if confidence <= self.conf {
                    continue;
                }

                let (cx, cy, w, h) = (pred[0], pred[1], pred[2], pred[3]);
                data.push(Bbox::new(cx - w / 2., cy - h / 2., w, h, id, confidence));
            }

            non_max_suppression(&mut data, self.iou, self.class_agnostic);
            data.truncate(self.max_det);

            let lb = &letterboxes[idx];
            let y_bboxes = data
                .into_iter()
                .map(|b| {
                    let [x1, y1, x2, y2] = lb.scale_xyxy(b.xyxy());
                    Bbox::new_from_xyxy(x1, y1, x2, y2, b.id(), b.confidence())
                })
                .collect();
            ys.push(y_bboxes);
        }

        Ok(ys)
    }

    /// `"animal 0.93"`
    pub fn label(names: &[&str], bbox: &Bbox) -> String {
        let name = names.get(bbox.id()).copied().unwrap_or("unknown");
        format!("{} {:.2}", name, bbox.confidence())
    }

    pub fn to_detections(
        &self,
        img_id: PathBuf,
        letterbox: &Letterbox,
        boxes: Vec<Bbox>,
        names: &[&str],
    ) -> ImageDetections {
        let (w, h) = letterbox.orig_size;
        let mut y = ImageDetections::new(img_id, w, h);
        for b in boxes {
            let label = Self::label(names, &b);
            y.push(b, label);
        }
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn letterbox_2048x1536() -> Letterbox {
        MegaDetectorV5Transform::new(1280, 64)
            .unwrap()
            .geometry(2048, 1536)
    }

    /// rows: cx, cy, w, h, obj, animal, person, vehicle
    fn raw_output(rows: &[[f32; 8]]) -> Vec<Array<f32, IxDyn>> {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        vec![Array3::from_shape_vec((1, rows.len(), 8), flat)
            .unwrap()
            .into_dyn()]
    }

    #[test]
    fn decodes_and_maps_boxes_to_original_pixels() {
        let post = MegaDetectorPostprocessor::new(3, 0.2, 0.45);
        let ys = raw_output(&[[640., 480., 100., 50., 0.9, 0.95, 0.01, 0.01]]);
        let out = post.postprocess(ys, &[letterbox_2048x1536()]).unwrap();

        assert_eq!(out.len(), 1);
        let b = &out[0][0];
        assert_eq!(b.id(), 0);
        assert!((b.confidence() - 0.855).abs() < 1e-4);
        // (590 - 0) / 0.625, (455 - 160) / 0.625
        assert!((b.xmin() - 944.).abs() < 1e-3);
        assert!((b.ymin() - 472.).abs() < 1e-3);
        assert!((b.width() - 160.).abs() < 1e-3);
        assert!((b.height() - 80.).abs() < 1e-3);
    }

    #[test]
    fn objectness_and_score_thresholds_apply() {
        let post = MegaDetectorPostprocessor::new(3, 0.2, 0.45);
        let ys = raw_output(&[
            // objectness below conf
            [100., 300., 20., 20., 0.1, 1.0, 0.0, 0.0],
            // obj * cls = 0.15
            [300., 300., 20., 20., 0.5, 0.3, 0.0, 0.0],
            // person
            [500., 500., 20., 20., 0.8, 0.1, 0.9, 0.0],
        ]);
        let out = post.postprocess(ys, &[letterbox_2048x1536()]).unwrap();
        assert_eq!(out[0].len(), 1);
        assert_eq!(out[0][0].id(), 1);
    }

    #[test]
    fn nms_keeps_best_box_per_class() {
        let post = MegaDetectorPostprocessor::new(3, 0.2, 0.45);
        let ys = raw_output(&[
            [640., 640., 100., 100., 0.9, 0.9, 0.0, 0.0],
            [645., 640., 100., 100., 0.8, 0.9, 0.0, 0.0],
            [640., 640., 100., 100., 0.9, 0.0, 0.8, 0.0],
        ]);
        let out = post.postprocess(ys.clone(), &[letterbox_2048x1536()]).unwrap();
        assert_eq!(out[0].len(), 2);

        let agnostic = MegaDetectorPostprocessor::new(3, 0.2, 0.45).with_class_agnostic(true);
        let out = agnostic.postprocess(ys, &[letterbox_2048x1536()]).unwrap();
        assert_eq!(out[0].len(), 1);
        assert_eq!(out[0][0].id(), 0);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let post = MegaDetectorPostprocessor::new(3, 0.2, 0.45);
        let narrow = vec![Array3::<f32>::zeros((1, 4, 6)).into_dyn()];
        assert!(post.postprocess(narrow, &[letterbox_2048x1536()]).is_err());

        let two = vec![Array3::<f32>::zeros((2, 4, 8)).into_dyn()];
        assert!(post.postprocess(two, &[letterbox_2048x1536()]).is_err());
        assert!(post.postprocess(vec![], &[]).is_err());
    }

    #[test]
    fn labels_and_categories() {
        let b = Bbox::new(0., 0., 1., 1., 2, 0.876);
        assert_eq!(
            MegaDetectorPostprocessor::label(&MegaDetectorV5::CLASS_NAMES, &b),
            "vehicle 0.88"
        );
        let cats = MegaDetectorV5::categories();
        assert_eq!(cats.get(&0).map(String::as_str), Some("animal"));
        assert_eq!(cats.len(), 3);
    }

    #[test]
    fn to_detections_carries_original_size() {
        let post = MegaDetectorPostprocessor::new(3, 0.2, 0.45);
        let lb = letterbox_2048x1536();
        let r = post.to_detections(
            PathBuf::from("imgs/a.JPG"),
            &lb,
            vec![Bbox::new(10., 10., 20., 20., 0, 0.5)],
            &MegaDetectorV5::CLASS_NAMES,
        );
        assert_eq!((r.width, r.height), (2048, 1536));
        assert_eq!(r.labels, vec!["animal 0.50".to_string()]);
    }

    /// Reports one animal per image at a fixed network position and keeps
    /// the input shapes it was called with.
    #[derive(Debug, Default)]
    struct FixedEngine {
        calls: std::rc::Rc<std::cell::RefCell<Vec<Vec<usize>>>>,
    }

    impl Engine for FixedEngine {
        fn run(
            &mut self,
            xs: Array<f32, IxDyn>,
            _profile: bool,
        ) -> Result<Vec<Array<f32, IxDyn>>> {
            let n = xs.shape()[0];
            self.calls.borrow_mut().push(xs.shape().to_vec());
            let row = [640., 640., 200., 100., 0.9, 0.9, 0.05, 0.05];
            let flat: Vec<f32> = (0..n).flat_map(|_| row).collect();
            Ok(vec![Array3::from_shape_vec((n, 1, 8), flat)?.into_dyn()])
        }
    }

    fn model() -> (MegaDetectorV5, std::rc::Rc<std::cell::RefCell<Vec<Vec<usize>>>>) {
        let engine = FixedEngine::default();
        let calls = engine.calls.clone();
        let post = MegaDetectorPostprocessor::new(3, 0.2, 0.45);
        (MegaDetectorV5::from_engine(engine, post).unwrap(), calls)
    }

    fn image_128x64() -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(128, 64, image::Rgb([80, 80, 80])))
    }

    #[test]
    fn single_image_detection_runs_letterboxed_input() {
        let (mut model, calls) = model();
        let r = model
            .single_image_detection(&image_128x64(), "imgs/IMG_0001.JPG")
            .unwrap();

        assert_eq!(*calls.borrow(), vec![vec![1, 3, 1280, 1280]]);
        assert_eq!(r.img_id, PathBuf::from("imgs/IMG_0001.JPG"));
        assert_eq!((r.width, r.height), (128, 64));
        assert_eq!(r.labels, vec!["animal 0.81".to_string()]);
        // ratio 10, top padding 320
        let [x1, y1, x2, y2] = r.detections[0].xyxy();
        assert!((x1 - 54.).abs() < 1e-3 && (x2 - 74.).abs() < 1e-3);
        assert!((y1 - 27.).abs() < 1e-3 && (y2 - 37.).abs() < 1e-3);
    }

    #[test]
    fn forward_returns_boxes_per_image() {
        let (mut model, calls) = model();
        let out = model.forward(&[image_128x64(), image_128x64()]).unwrap();
        assert_eq!(calls.borrow()[0], vec![2, 3, 1280, 1280]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|boxes| boxes.len() == 1 && boxes[0].id() == 0));
    }
}
