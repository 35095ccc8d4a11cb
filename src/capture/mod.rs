//! Frame acquisition and violation detection collaborators.

pub mod replay;
pub mod worker;

use anyhow::Result;
use chrono::{DateTime, Utc};
use image::RgbImage;
use thiserror::Error;

pub use replay::{ImageDirSource, ScriptedDetector};
pub use worker::CaptureWorker;

/// One captured camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self {
            sequence,
            captured_at: Utc::now(),
            image,
        }
    }
}

/// Supplies frames on demand. `read_frame` may block.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Frame>;

    /// Releases the underlying device. Must tolerate repeated calls.
    fn release(&mut self);
}

/// Classifies a frame into zero or more violation labels.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<String>>;
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("frame read failed: {0}")]
    Frame(String),

    #[error("detector failed: {0}")]
    Detection(String),

    #[error("frame read exceeded {0} ms")]
    Timeout(u64),

    #[error("detector exceeded {0} ms")]
    DetectionTimeout(u64),

    #[error("capture worker failed: {0}")]
    Worker(String),
}

impl CaptureError {
    /// Whether the failure came from the frame source rather than the detector.
    ///
    /// Detector failures, slow ones included, mean the frame itself was read.
    pub fn is_source_failure(&self) -> bool {
        !matches!(
            self,
            CaptureError::Detection(_) | CaptureError::DetectionTimeout(_)
        )
    }
}
