// THEORY:
// The `capture` module defines the boundary between the monitoring engine and
// whatever produces pictures. The engine never drives a device directly; it only
// asks a `FrameSource` for "the current frame" when the sampler decides a
// detection cycle is due. This pull model keeps the frame loop in charge of
// timing and lets sources be swapped (camera, video file, image folder) without
// touching the pipeline.
//
// Key architectural principles:
// 1.  **Pull, Not Push**: `grab` is a synchronous snapshot call. Sources that are
//     naturally streaming (cameras, decoders) keep their latest frame and hand it
//     out on demand.
// 2.  **Fail Early**: Anything that cannot be opened is reported as
//     `SourceUnavailable` at acquisition time, before a session is started.
//     Network streams are rejected outright.
// 3.  **Exclusive Ownership**: A source is moved into the session that uses it and
//     dropped when that session stops, which releases the underlying device.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const SEQUENCE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A single captured picture, cheap to clone.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbImage>,
    /// Monotonic per-source frame number, starting at 0.
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: Arc<RgbImage>, sequence: u64) -> Self {
        Self {
            image,
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Camera { index: i32 },
    VideoFile(PathBuf),
    ImageSequence(PathBuf),
    StillImage(PathBuf),
    NetworkStream(String),
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Camera { index } => write!(f, "camera #{index}"),
            SourceKind::VideoFile(path) => write!(f, "video file {}", path.display()),
            SourceKind::ImageSequence(dir) => write!(f, "image sequence {}", dir.display()),
            SourceKind::StillImage(path) => write!(f, "still image {}", path.display()),
            SourceKind::NetworkStream(url) => write!(f, "network stream {url}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("{source_kind} is unavailable: {reason}")]
    SourceUnavailable { source_kind: String, reason: String },
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl CaptureError {
    pub fn unavailable(kind: &SourceKind, reason: impl Into<String>) -> Self {
        CaptureError::SourceUnavailable {
            source_kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}

/// Anything that can hand out the current visual frame on request.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<Frame, CaptureError>;

    fn describe(&self) -> String;
}

/// Opens the sources this crate can decode on its own.
///
/// Camera and video decoding need a native capture backend and are reported as
/// unavailable here; the `drishti_monitor` binary provides them when built with
/// its `opencv` feature.
pub fn acquire(kind: &SourceKind) -> Result<Box<dyn FrameSource>, CaptureError> {
    match kind {
        SourceKind::NetworkStream(_) => Err(CaptureError::unavailable(
            kind,
            "network streams are not supported, use a camera or a video file",
        )),
        SourceKind::Camera { .. } | SourceKind::VideoFile(_) => Err(CaptureError::unavailable(
            kind,
            "no native capture backend is available",
        )),
        SourceKind::StillImage(path) => Ok(Box::new(StillImageSource::open(path)?)),
        SourceKind::ImageSequence(dir) => Ok(Box::new(ImageSequenceSource::open(dir)?)),
    }
}

/// Serves the same picture on every grab.
pub struct StillImageSource {
    image: Arc<RgbImage>,
    label: String,
    next_sequence: u64,
}

impl StillImageSource {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let kind = SourceKind::StillImage(path.to_path_buf());
        let image = image::open(path)
            .map_err(|e| CaptureError::unavailable(&kind, e.to_string()))?
            .to_rgb8();
        Ok(Self {
            image: Arc::new(image),
            label: kind.to_string(),
            next_sequence: 0,
        })
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
            label: "in-memory image".to_string(),
            next_sequence: 0,
        }
    }
}

impl FrameSource for StillImageSource {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        let frame = Frame::new(Arc::clone(&self.image), self.next_sequence);
        self.next_sequence += 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Plays a directory of images in file-name order, one image per grab.
///
/// Like a video that reached its end, the last image keeps being served once the
/// sequence is exhausted.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    last: Option<Arc<RgbImage>>,
    label: String,
    next_sequence: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, CaptureError> {
        let kind = SourceKind::ImageSequence(dir.to_path_buf());
        let entries =
            std::fs::read_dir(dir).map_err(|e| CaptureError::unavailable(&kind, e.to_string()))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SEQUENCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(CaptureError::unavailable(&kind, "directory contains no images"));
        }

        Ok(Self {
            paths,
            cursor: 0,
            last: None,
            label: kind.to_string(),
            next_sequence: 0,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        let image = match (self.paths.get(self.cursor), &self.last) {
            (Some(path), _) => {
                let decoded = Arc::new(image::open(path)?.to_rgb8());
                self.cursor += 1;
                self.last = Some(Arc::clone(&decoded));
                decoded
            }
            (None, Some(last)) => Arc::clone(last),
            (None, None) => return Err(CaptureError::Read("image sequence is empty".to_string())),
        };
        let frame = Frame::new(image, self.next_sequence);
        self.next_sequence += 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
