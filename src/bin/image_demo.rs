//! 相机陷阱检测演示 (MegaDetector v5)
//!
//! 1. 单张图片检测 → 标注图片
//! 2. 目录批量检测 → 标注图片 / 目标裁剪 / JSON / Timelapse JSON

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Map};
use tracing::info;

use camtrap_rs::dataset::{load_rgb, DetectionImageFolder, ImageLoader};
use camtrap_rs::export::{save_detection_json, save_detection_timelapse_json};
use camtrap_rs::visualization::{save_crop_images, save_detection_images, BoxAnnotator};
use camtrap_rs::{init_tracing, Args, MegaDetectorV5, Model};

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut model = MegaDetectorV5::new(&args)
        .with_context(|| format!("loading model {}", args.model.display()))?;
    model.summary();

    let annotator = match &args.font {
        Some(path) => BoxAnnotator::default().with_font(BoxAnnotator::load_font(path)?),
        None => BoxAnnotator::default(),
    };

    // ========== 单张图片 ==========
    let img = load_rgb(&args.image)?;
    let result = model.single_image_detection(&img, &args.image)?;
    info!(
        image = %args.image.display(),
        detections = result.len(),
        "single image detection"
    );
    save_detection_images(&[result], &args.output_dir, args.overwrite, &annotator)?;

    // ========== 批量检测 ==========
    let dataset = DetectionImageFolder::new(&args.folder, model.transform(), &args.extension)
        .with_context(|| format!("scanning {}", args.folder.display()))?;
    info!(folder = %args.folder.display(), images = dataset.len(), "batch detection");
    let loader = ImageLoader::new(dataset, args.batch_size, args.num_workers)?;
    let results = model.batch_image_detection(&loader)?;

    save_detection_images(&results, &args.batch_output_dir, args.overwrite, &annotator)?;
    save_crop_images(&results, &args.crop_output_dir, args.overwrite)?;

    let categories = MegaDetectorV5::categories();
    save_detection_json(
        &results,
        &args.json,
        &categories,
        &args.exclude_category_ids,
        None,
    )?;

    let mut timelapse_info = Map::new();
    timelapse_info.insert("detector".into(), json!("MegaDetectorV5"));
    save_detection_timelapse_json(
        &results,
        &args.timelapse_json,
        &categories,
        &args.exclude_category_ids,
        Some(&args.folder),
        timelapse_info,
    )?;

    info!(images = results.len(), "done");
    Ok(())
}
