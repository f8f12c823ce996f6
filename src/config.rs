// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::Parser;

/// 相机陷阱检测演示 (MegaDetector v5, ONNX Runtime)
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "MegaDetector v5 camera-trap detection demo", long_about = None)]
pub struct Args {
    /// ONNX model file (MegaDetector v5 exported from YOLOv5)
    #[arg(long, required = true)]
    pub model: PathBuf,

    /// Image used by the single-image pass
    #[arg(long, default_value = "demo_data/imgs/10050028_0.JPG")]
    pub image: PathBuf,

    /// Folder scanned by the batch pass
    #[arg(long, default_value = "demo_data/imgs")]
    pub folder: PathBuf,

    /// File suffix of batch images (case sensitive)
    #[arg(long, default_value = "JPG")]
    pub extension: String,

    /// Annotated output of the single-image pass
    #[arg(long, default_value = "demo_output")]
    pub output_dir: PathBuf,

    /// Annotated output of the batch pass
    #[arg(long, default_value = "batch_output")]
    pub batch_output_dir: PathBuf,

    /// Cropped detections of the batch pass
    #[arg(long, default_value = "crop_output")]
    pub crop_output_dir: PathBuf,

    /// Detection JSON
    #[arg(long, default_value = "batch_output.json")]
    pub json: PathBuf,

    /// Timelapse JSON
    #[arg(long, default_value = "batch_output_timelapse.json")]
    pub timelapse_json: PathBuf,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Decoder threads; 0 decodes on the calling thread
    #[arg(long, default_value_t = 0)]
    pub num_workers: usize,

    /// confidence threshold
    #[arg(long, default_value_t = 0.2)]
    pub conf: f32,

    /// iou threshold in NMS
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// using CUDA EP
    #[arg(long)]
    pub cuda: bool,

    /// device id
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// Clear output folders before writing
    #[arg(long)]
    pub overwrite: bool,

    /// TrueType font for box labels; boxes are drawn without labels when absent
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Category ids left out of both JSON files
    #[arg(long, value_delimiter = ',')]
    pub exclude_category_ids: Vec<usize>,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Initialize a PostgreSQL database for a dataset of camera trap images to
/// use for active learning for classification.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct InitDbArgs {
    /// Name of the output Postgres DB.
    #[arg(long = "db_name", default_value = "missouricameratraps")]
    pub db_name: String,

    /// Name of the user accessing the Postgres DB.
    #[arg(long = "db_user", default_value = "new_user")]
    pub db_user: String,

    /// Password of the user accessing the Postgres DB.
    #[arg(long = "db_password", default_value = "new_user_password")]
    pub db_password: String,

    /// Path to dataset directory containing all images
    #[arg(long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Path to COCO Camera Traps json file if available
    #[arg(long = "coco_json", value_name = "FILE")]
    pub coco_json: Option<PathBuf>,

    #[arg(long, env = "PGHOST", default_value = "localhost")]
    pub host: String,

    #[arg(long, env = "PGPORT", default_value_t = 5432)]
    pub port: u16,

    /// Superuser used to create the role and database
    #[arg(long = "admin_user", default_value = "postgres")]
    pub admin_user: String,

    #[arg(
        long = "admin_password",
        env = "PGPASSWORD",
        default_value = "postgres",
        hide_env_values = true
    )]
    pub admin_password: String,

    /// Maintenance database the superuser connects to
    #[arg(long = "admin_db", default_value = "postgres")]
    pub admin_db: String,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}
