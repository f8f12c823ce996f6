// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{Array, IxDyn};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info, warn};

use crate::error::{CamtrapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    pub image_size: (u32, u32), // (height, width)
    pub intra_threads: Option<usize>,
}

/// 推理引擎: NCHW 批次 → 原始输出
pub trait Engine: std::fmt::Debug {
    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>>;
}

/// ONNX Runtime 推理后端
pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    f: PathBuf,
    height: u32,
    width: u32,
}

impl std::fmt::Debug for OrtBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtBackend")
            .field("model", &self.f)
            .field("ep", &self.ep)
            .field("height", &self.height)
            .field("width", &self.width)
            .finish()
    }
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        if !config.f.is_file() {
            return Err(CamtrapError::ModelNotFound(config.f));
        }

        let mut builder = Session::builder()
            .map_err(CamtrapError::ort)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(CamtrapError::ort)?;
        if let Some(n) = config.intra_threads {
            builder = builder.with_intra_threads(n).map_err(CamtrapError::ort)?;
        }

        let (builder, ep) = register_ep(builder, config.ep)?;
        let session = builder
            .commit_from_file(&config.f)
            .map_err(CamtrapError::ort)?;

        let (height, width) = config.image_size;
        info!(
            model = %config.f.display(),
            ep = ?ep,
            height,
            width,
            "ONNX session ready"
        );

        Ok(Self {
            session,
            ep,
            f: config.f,
            height,
            width,
        })
    }

    /// One forward pass over an NCHW batch.
    pub fn run(
        &mut self,
        xs: Array<f32, IxDyn>,
        profile: bool,
    ) -> Result<Vec<Array<f32, IxDyn>>> {
        let t_run = Instant::now();
        let shape = xs.shape().to_vec();
        let data: Vec<f32> = xs.iter().copied().collect();
        let input =
            Tensor::from_array((shape, data.into_boxed_slice())).map_err(CamtrapError::ort)?;

        let y = {
            let outputs = self
                .session
                .run(ort::inputs![input])
                .map_err(CamtrapError::ort)?;
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(CamtrapError::ort)?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            Array::from_shape_vec(IxDyn(&dims), data.to_vec())?
        };

        if profile {
            debug!(elapsed = ?t_run.elapsed(), output = ?y.shape(), "inference");
        }
        Ok(vec![y])
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn model_path(&self) -> &Path {
        &self.f
    }
}

impl Engine for OrtBackend {
    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        OrtBackend::run(self, xs, profile)
    }
}

#[cfg(feature = "cuda")]
fn register_ep(builder: SessionBuilder, ep: OrtEP) -> Result<(SessionBuilder, OrtEP)> {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    match ep {
        OrtEP::CUDA(device_id) => {
            let cuda = CUDAExecutionProvider::default().with_device_id(device_id);
            if !cuda.is_available().unwrap_or(false) {
                warn!("CUDA EP unavailable, falling back to CPU");
                return register_ep(builder, OrtEP::CPU);
            }
            let builder = builder
                .with_execution_providers([cuda.build(), CPUExecutionProvider::default().build()])
                .map_err(CamtrapError::ort)?;
            Ok((builder, ep))
        }
        OrtEP::CPU => {
            let builder = builder
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .map_err(CamtrapError::ort)?;
            Ok((builder, OrtEP::CPU))
        }
    }
}

#[cfg(not(feature = "cuda"))]
fn register_ep(builder: SessionBuilder, ep: OrtEP) -> Result<(SessionBuilder, OrtEP)> {
    if let OrtEP::CUDA(device_id) = ep {
        warn!(device_id, "built without the `cuda` feature, using CPU");
    }
    let builder = builder
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(CamtrapError::ort)?;
    Ok((builder, OrtEP::CPU))
}
