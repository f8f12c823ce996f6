// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use thiserror::Error as ThisError;

pub type Result<T, E = CamtrapError> = std::result::Result<T, E>;

#[derive(Debug, ThisError)]
pub enum CamtrapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("date_created {value:?} does not match YYYY-MM-DD: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid COCO info field `{field}`: {value}")]
    InvalidInfoField { field: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("loader worker stopped before delivering image #{0}")]
    LoaderDisconnected(usize),
}

impl CamtrapError {
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CamtrapError::IoAt {
            path: path.into(),
            source,
        }
    }

    pub fn ort(e: impl std::fmt::Display) -> Self {
        CamtrapError::Ort(e.to_string())
    }
}
