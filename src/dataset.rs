// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 图片目录数据集与批量加载器
// 加载线程: 解码 + letterbox → 有界通道 → 按索引顺序重组批次

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver};
use image::DynamicImage;
use ndarray::{Array, Array3, IxDyn};
use tracing::debug;

use crate::error::{CamtrapError, Result};
use crate::transforms::{stack_batch, Letterbox, MegaDetectorV5Transform};

/// Open an image and convert it to 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<DynamicImage> {
    let img = image::open(path).map_err(|source| CamtrapError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

/// Count files under `root` whose name ends with `extension`.
pub fn count_images(root: &Path, extension: &str) -> Result<usize> {
    let mut images = Vec::new();
    collect_images(root, extension, &mut images)?;
    Ok(images.len())
}

fn collect_images(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| CamtrapError::io_at(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CamtrapError::io_at(dir, e))?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_images(&path, extension, out)?;
        } else if entry.file_name().to_string_lossy().ends_with(extension) {
            out.push(path);
        }
    }
    Ok(())
}

/// One decoded, letterboxed image.
#[derive(Debug, Clone)]
pub struct Sample {
    pub xs: Array3<f32>,
    pub path: PathBuf,
    pub letterbox: Letterbox,
}

/// Images under a folder (recursive), matched by a case-sensitive suffix.
#[derive(Debug, Clone)]
pub struct DetectionImageFolder {
    root: PathBuf,
    images: Vec<PathBuf>,
    transform: MegaDetectorV5Transform,
}

impl DetectionImageFolder {
    pub fn new(
        root: impl Into<PathBuf>,
        transform: MegaDetectorV5Transform,
        extension: &str,
    ) -> Result<Self> {
        let root = root.into();
        let mut images = Vec::new();
        collect_images(&root, extension, &mut images)?;
        images.sort();
        debug!(root = %root.display(), extension, count = images.len(), "image folder scanned");
        Ok(Self {
            root,
            images,
            transform,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Sample> {
        let path = self.images.get(index).ok_or_else(|| {
            CamtrapError::Config(format!("index {index} out of range ({})", self.len()))
        })?;
        let img = load_rgb(path)?;
        let (xs, letterbox) = self.transform.apply(&img);
        Ok(Sample {
            xs,
            path: path.clone(),
            letterbox,
        })
    }
}

/// A collated batch, in dataset order.
#[derive(Debug, Clone)]
pub struct Batch {
    pub xs: Array<f32, IxDyn>,
    pub paths: Vec<PathBuf>,
    pub letterboxes: Vec<Letterbox>,
}

impl Batch {
    fn collate(samples: Vec<Sample>) -> Result<Self> {
        let mut tensors = Vec::with_capacity(samples.len());
        let mut paths = Vec::with_capacity(samples.len());
        let mut letterboxes = Vec::with_capacity(samples.len());
        for s in samples {
            tensors.push(s.xs);
            paths.push(s.path);
            letterboxes.push(s.letterbox);
        }
        Ok(Self {
            xs: stack_batch(&tensors)?,
            paths,
            letterboxes,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Sequential batch loader. The last short batch is kept; order is never shuffled.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    dataset: Arc<DetectionImageFolder>,
    batch_size: usize,
    num_workers: usize,
}

impl ImageLoader {
    pub fn new(
        dataset: DetectionImageFolder,
        batch_size: usize,
        num_workers: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(CamtrapError::Config("batch size must be at least 1".into()));
        }
        Ok(Self {
            dataset: Arc::new(dataset),
            batch_size,
            num_workers,
        })
    }

    pub fn dataset(&self) -> &DetectionImageFolder {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches.
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn iter(&self) -> Batches<'_> {
        let source = if self.num_workers == 0 || self.dataset.is_empty() {
            SampleSource::Inline
        } else {
            self.spawn_workers()
        };
        Batches {
            loader: self,
            next_index: 0,
            failed: false,
            source,
        }
    }

    fn spawn_workers(&self) -> SampleSource {
        let (task_tx, task_rx) = unbounded::<usize>();
        for idx in 0..self.dataset.len() {
            let _ = task_tx.send(idx);
        }
        drop(task_tx);

        let (tx, rx) = bounded::<(usize, Result<Sample>)>(self.batch_size * 2);
        for worker in 0..self.num_workers {
            let dataset = Arc::clone(&self.dataset);
            let task_rx = task_rx.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                for idx in task_rx.iter() {
                    if tx.send((idx, dataset.get(idx))).is_err() {
                        // 消费端已退出
                        break;
                    }
                }
                debug!(worker, "loader worker finished");
            });
        }

        SampleSource::Workers {
            rx,
            pending: BTreeMap::new(),
        }
    }
}

impl<'a> IntoIterator for &'a ImageLoader {
    type Item = Result<Batch>;
    type IntoIter = Batches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

enum SampleSource {
    Inline,
    Workers {
        rx: Receiver<(usize, Result<Sample>)>,
        pending: BTreeMap<usize, Result<Sample>>,
    },
}

pub struct Batches<'a> {
    loader: &'a ImageLoader,
    next_index: usize,
    failed: bool,
    source: SampleSource,
}

impl Batches<'_> {
    fn fetch(&mut self, idx: usize) -> Result<Sample> {
        match &mut self.source {
            SampleSource::Inline => self.loader.dataset.get(idx),
            SampleSource::Workers { rx, pending } => loop {
                if let Some(sample) = pending.remove(&idx) {
                    return sample;
                }
                match rx.recv() {
                    Ok((i, sample)) => {
                        pending.insert(i, sample);
                    }
                    Err(_) => return Err(CamtrapError::LoaderDisconnected(idx)),
                }
            },
        }
    }
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.loader.dataset.len();
        if self.failed || self.next_index >= total {
            return None;
        }

        let end = (self.next_index + self.loader.batch_size).min(total);
        let mut samples = Vec::with_capacity(end - self.next_index);
        for idx in self.next_index..end {
            match self.fetch(idx) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        self.next_index = end;
        Some(Batch::collate(samples))
    }
}
