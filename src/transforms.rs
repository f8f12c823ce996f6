// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// MegaDetector v5 (YOLOv5) letterbox 预处理

use image::{DynamicImage, GenericImageView};
use ndarray::{Array, Array3, Axis, IxDyn};

use crate::error::{CamtrapError, Result};

pub const PAD_VALUE: u8 = 114;

/// Geometry of one letterboxed image, needed to map boxes back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// resize gain applied to the original image
    pub ratio: f32,
    /// (left, top) padding in network pixels
    pub pad: (f32, f32),
    /// (width, height) of the original image
    pub orig_size: (u32, u32),
    /// (width, height) of the network input
    pub input_size: (u32, u32),
}

impl Letterbox {
    pub fn unletterbox(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad.0) / self.ratio, (y - self.pad.1) / self.ratio)
    }

    /// Map a network-space xyxy box back to the original image and clip it.
    pub fn scale_xyxy(&self, xyxy: [f32; 4]) -> [f32; 4] {
        let (w0, h0) = (self.orig_size.0 as f32, self.orig_size.1 as f32);
        let (x1, y1) = self.unletterbox(xyxy[0], xyxy[1]);
        let (x2, y2) = self.unletterbox(xyxy[2], xyxy[3]);
        [
            x1.clamp(0., w0),
            y1.clamp(0., h0),
            x2.clamp(0., w0),
            y2.clamp(0., h0),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MegaDetectorV5Transform {
    target_size: u32,
    stride: u32,
    auto: bool,
}

impl MegaDetectorV5Transform {
    pub fn new(target_size: u32, stride: u32) -> Result<Self> {
        if stride == 0 || target_size == 0 || target_size % stride != 0 {
            return Err(CamtrapError::Config(format!(
                "target size {target_size} must be a positive multiple of stride {stride}"
            )));
        }
        Ok(Self {
            target_size,
            stride,
            auto: false,
        })
    }

    /// With `auto`, padding is trimmed to the smallest multiple of stride.
    /// Batched inputs then no longer share a shape.
    pub fn with_auto(mut self, auto: bool) -> Self {
        self.auto = auto;
        self
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn geometry(&self, w0: u32, h0: u32) -> Letterbox {
        let t = self.target_size as f32;
        let ratio = (t / h0 as f32).min(t / w0 as f32);
        let new_w = (w0 as f32 * ratio).round();
        let new_h = (h0 as f32 * ratio).round();

        let (mut dw, mut dh) = (t - new_w, t - new_h);
        if self.auto {
            dw %= self.stride as f32;
            dh %= self.stride as f32;
        }
        let (dw, dh) = (dw / 2., dh / 2.);

        let (left, right) = ((dw - 0.1).round(), (dw + 0.1).round());
        let (top, bottom) = ((dh - 0.1).round(), (dh + 0.1).round());

        Letterbox {
            ratio,
            pad: (dw, dh),
            orig_size: (w0, h0),
            input_size: (
                (new_w + left + right) as u32,
                (new_h + top + bottom) as u32,
            ),
        }
    }

    /// RGB image → CHW tensor in [0, 1]
    pub fn apply(&self, x: &DynamicImage) -> (Array3<f32>, Letterbox) {
        let (w0, h0) = x.dimensions();
        let lb = self.geometry(w0, h0);
        let new_w = (w0 as f32 * lb.ratio).round() as u32;
        let new_h = (h0 as f32 * lb.ratio).round() as u32;
        let left = (lb.pad.0 - 0.1).round() as usize;
        let top = (lb.pad.1 - 0.1).round() as usize;

        let img = x
            .resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
            .to_rgb8();

        let (w1, h1) = (lb.input_size.0 as usize, lb.input_size.1 as usize);
        let mut ys = Array::from_elem((3, h1, w1), PAD_VALUE as f32 / 255.0);
        for (x, y, rgb) in img.enumerate_pixels() {
            let (x, y) = (x as usize + left, y as usize + top);
            if x >= w1 || y >= h1 {
                continue;
            }
            let [r, g, b] = rgb.0;
            ys[[0, y, x]] = (r as f32) / 255.0;
            ys[[1, y, x]] = (g as f32) / 255.0;
            ys[[2, y, x]] = (b as f32) / 255.0;
        }

        (ys, lb)
    }
}

/// Stack CHW tensors of identical shape into one NCHW batch.
pub fn stack_batch(xs: &[Array3<f32>]) -> Result<Array<f32, IxDyn>> {
    let views: Vec<_> = xs.iter().map(|x| x.view()).collect();
    Ok(ndarray::stack(Axis(0), &views)?.into_dyn())
}
