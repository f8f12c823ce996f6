/// 模型统一接口与实现
///
/// ## Model Trait
/// 统一的模型接口，定义标准流程: preprocess → run → postprocess
///
/// ## 使用示例
/// ```no_run
/// use camtrap_rs::models::{MegaDetectorV5, Model};
/// use camtrap_rs::Args;
/// use clap::Parser;
///
/// # fn main() -> camtrap_rs::Result<()> {
/// let args = Args::parse_from(["image_demo", "--model", "md_v5a.0.0.onnx"]);
/// let mut model = MegaDetectorV5::new(&args)?;
/// let img = image::open("demo_data/imgs/10050028_0.JPG")?;
/// let boxes = model.forward(&[img])?;
/// # Ok(())
/// # }
/// ```
use image::DynamicImage;
use ndarray::{Array, IxDyn};

use crate::transforms::Letterbox;
use crate::{Bbox, Result};

pub mod megadetector;

pub use megadetector::{MegaDetectorPostprocessor, MegaDetectorV5};

/// 统一的检测模型接口
///
/// ```text
/// 原始图片 → preprocess → NCHW张量 + letterbox几何
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 原图坐标下的检测框
/// ```
pub trait Model {
    /// 预处理: 图片 → NCHW 张量 (所有图片共享同一输入尺寸)
    fn preprocess(
        &mut self,
        images: &[DynamicImage],
    ) -> Result<(Array<f32, IxDyn>, Vec<Letterbox>)>;

    /// 推理: 执行模型前向传播
    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后处理: 原始输出 → 每张图片的检测框
    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        letterboxes: &[Letterbox],
    ) -> Result<Vec<Vec<Bbox>>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<Bbox>>> {
        let (xs, letterboxes) = self.preprocess(images)?;
        let ys = self.run(xs, false)?;
        self.postprocess(ys, &letterboxes)
    }

    fn summary(&self);
}
