// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测结果输出: 标注图片 + 目标裁剪

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use crate::dataset::load_rgb;
use crate::error::{CamtrapError, Result};
use crate::ImageDetections;

const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

pub fn class_color(id: usize) -> Rgb<u8> {
    let (r, g, b) = BRIGHT_COLORS[id % BRIGHT_COLORS.len()];
    Rgb([r, g, b])
}

/// Draws boxes, and labels when a font is available.
pub struct BoxAnnotator {
    thickness: u32,
    text_scale: f32,
    font: Option<FontVec>,
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self {
            thickness: 4,
            text_scale: 32.0,
            font: None,
        }
    }
}

impl BoxAnnotator {
    pub fn new(thickness: u32) -> Self {
        Self {
            thickness: thickness.max(1),
            ..Default::default()
        }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    pub fn load_font(path: &Path) -> Result<FontVec> {
        let bytes = fs::read(path).map_err(|e| CamtrapError::io_at(path, e))?;
        FontVec::try_from_vec(bytes)
            .map_err(|e| CamtrapError::Config(format!("invalid font {}: {e}", path.display())))
    }

    pub fn annotate(&self, img: &mut RgbImage, result: &ImageDetections) {
        let (w, h) = img.dimensions();
        for (bbox, label) in result.detections.iter().zip(result.labels.iter()) {
            let color = class_color(bbox.id());
            let x1 = bbox.xmin().max(0.) as i32;
            let y1 = bbox.ymin().max(0.) as i32;
            let x2 = bbox.xmax().min(w as f32) as i32;
            let y2 = bbox.ymax().min(h as f32) as i32;

            for t in 0..self.thickness as i32 {
                let (bw, bh) = (x2 - x1 - 2 * t, y2 - y1 - 2 * t);
                if bw <= 0 || bh <= 0 {
                    break;
                }
                let rect = Rect::at(x1 + t, y1 + t).of_size(bw as u32, bh as u32);
                draw_hollow_rect_mut(img, rect, color);
            }

            if let Some(font) = &self.font {
                let scale = PxScale::from(self.text_scale);
                let (tw, th) = text_size(scale, font, label);
                let pad = 4;
                let ty = (y1 - th as i32 - 2 * pad).max(0);
                let bg = Rect::at(x1, ty).of_size(tw + 2 * pad as u32, th + 2 * pad as u32);
                draw_filled_rect_mut(img, bg, color);
                draw_text_mut(img, Rgb([0, 0, 0]), x1 + pad, ty + pad, scale, font, label);
            }
        }
    }
}

/// Create `dir`; with `overwrite` an existing directory is emptied first.
fn prepare_dir(dir: &Path, overwrite: bool) -> Result<()> {
    if overwrite && dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| CamtrapError::io_at(dir, e))?;
    }
    fs::create_dir_all(dir).map_err(|e| CamtrapError::io_at(dir, e))
}

/// Write one annotated copy of every source image into `output_dir`, under
/// the source file name.
pub fn save_detection_images(
    results: &[ImageDetections],
    output_dir: &Path,
    overwrite: bool,
    annotator: &BoxAnnotator,
) -> Result<Vec<PathBuf>> {
    prepare_dir(output_dir, overwrite)?;
    let mut written = Vec::with_capacity(results.len());
    for result in results {
        let mut img = load_rgb(&result.img_id)?.to_rgb8();
        annotator.annotate(&mut img, result);
        let out = output_dir.join(result.file_name());
        img.save(&out)?;
        debug!(path = %out.display(), detections = result.len(), "annotated image saved");
        written.push(out);
    }
    info!(dir = %output_dir.display(), count = written.len(), "detection images saved");
    Ok(written)
}

/// Write every detection as its own image, named `<class>_<index>_<file name>`.
pub fn save_crop_images(
    results: &[ImageDetections],
    output_dir: &Path,
    overwrite: bool,
) -> Result<Vec<PathBuf>> {
    prepare_dir(output_dir, overwrite)?;
    let mut written = Vec::new();
    for result in results.iter().filter(|r| !r.is_empty()) {
        let img = load_rgb(&result.img_id)?.to_rgb8();
        let (w, h) = img.dimensions();
        let file_name = result.file_name();
        for (i, bbox) in result.detections.iter().enumerate() {
            let x1 = (bbox.xmin().max(0.) as u32).min(w);
            let y1 = (bbox.ymin().max(0.) as u32).min(h);
            let x2 = (bbox.xmax().max(0.) as u32).min(w);
            let y2 = (bbox.ymax().max(0.) as u32).min(h);
            if x2 <= x1 || y2 <= y1 {
                warn!(img = %result.img_id.display(), index = i, "skipping empty crop");
                continue;
            }
            let crop = image::imageops::crop_imm(&img, x1, y1, x2 - x1, y2 - y1).to_image();
            let out = output_dir.join(format!("{}_{}_{}", bbox.id(), i, file_name));
            crop.save(&out)?;
            written.push(out);
        }
    }
    info!(dir = %output_dir.display(), count = written.len(), "crop images saved");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bbox;

    fn source_image(dir: &Path) -> PathBuf {
        let path = dir.join("src").join("IMG_0001.JPG");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(120, 80, Rgb([0, 0, 0])).save(&path).unwrap();
        path
    }

    fn detections(path: &Path) -> ImageDetections {
        let mut r = ImageDetections::new(path, 120, 80);
        r.push(Bbox::new_from_xyxy(10., 10., 60., 50., 0, 0.9), "animal 0.90".into());
        r.push(Bbox::new_from_xyxy(70., 20., 100., 70., 1, 0.6), "person 0.60".into());
        r
    }

    #[test]
    fn annotate_draws_class_colored_border() {
        let mut img = RgbImage::from_pixel(120, 80, Rgb([0, 0, 0]));
        let r = detections(Path::new("unused.JPG"));
        BoxAnnotator::default().annotate(&mut img, &r);
        assert_eq!(*img.get_pixel(10, 30), class_color(0));
        assert_eq!(*img.get_pixel(13, 30), class_color(0));
        assert_eq!(*img.get_pixel(30, 30), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(70, 40), class_color(1));
    }

    #[test]
    fn detection_images_keep_source_names() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_image(dir.path());
        let out_dir = dir.path().join("batch_output");

        let written =
            save_detection_images(&[detections(&src)], &out_dir, false, &BoxAnnotator::default())
                .unwrap();
        assert_eq!(written, vec![out_dir.join("IMG_0001.JPG")]);
        let saved = image::open(&written[0]).unwrap();
        assert_eq!((saved.width(), saved.height()), (120, 80));
    }

    #[test]
    fn crops_are_named_by_class_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_image(dir.path());
        let out_dir = dir.path().join("crop_output");

        let written = save_crop_images(&[detections(&src)], &out_dir, false).unwrap();
        assert_eq!(
            written,
            vec![
                out_dir.join("0_0_IMG_0001.JPG"),
                out_dir.join("1_1_IMG_0001.JPG")
            ]
        );
        let first = image::open(&written[0]).unwrap();
        assert_eq!((first.width(), first.height()), (50, 40));
    }

    #[test]
    fn overwrite_clears_stale_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_image(dir.path());
        let out_dir = dir.path().join("crop_output");
        fs::create_dir_all(&out_dir).unwrap();
        let stale = out_dir.join("stale.JPG");
        fs::write(&stale, b"old").unwrap();

        save_crop_images(&[detections(&src)], &out_dir, false).unwrap();
        assert!(stale.exists());

        save_crop_images(&[detections(&src)], &out_dir, true).unwrap();
        assert!(!stale.exists());
        assert!(out_dir.join("0_0_IMG_0001.JPG").exists());
    }

    #[test]
    fn missing_font_is_an_error() {
        assert!(BoxAnnotator::load_font(Path::new("no/such/font.ttf")).is_err());
    }
}
