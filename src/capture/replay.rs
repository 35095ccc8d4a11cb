//! File-backed collaborators for running the engine without a camera or a
//! vision model: frames come from a directory of images, labels from a
//! script with one frame per line.

use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use image::RgbImage;
use log::info;

use super::{Detector, Frame, FrameSource};

const BLANK_FRAME_WIDTH: u32 = 640;
const BLANK_FRAME_HEIGHT: u32 = 480;
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Cycles through the images of a directory, or yields blank frames when no
/// directory is configured.
pub struct ImageDirSource {
    images: Vec<PathBuf>,
    next: usize,
    sequence: u64,
    released: bool,
}

impl ImageDirSource {
    pub fn blank() -> Self {
        Self {
            images: Vec::new(),
            next: 0,
            sequence: 0,
            released: false,
        }
    }

    pub fn open(dir: &Path) -> Result<Self> {
        let mut images = fs::read_dir(dir)
            .with_context(|| format!("failed to read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        images.sort();

        if images.is_empty() {
            bail!("no images found in {}", dir.display());
        }

        info!("Replaying {} frames from {}", images.len(), dir.display());

        Ok(Self {
            images,
            ..Self::blank()
        })
    }
}

impl FrameSource for ImageDirSource {
    fn read_frame(&mut self) -> Result<Frame> {
        if self.released {
            bail!("frame source released");
        }

        let image = if self.images.is_empty() {
            RgbImage::new(BLANK_FRAME_WIDTH, BLANK_FRAME_HEIGHT)
        } else {
            let path = &self.images[self.next % self.images.len()];
            self.next = self.next.wrapping_add(1);
            image::open(path)
                .with_context(|| format!("failed to decode frame {}", path.display()))?
                .to_rgb8()
        };

        let frame = Frame::new(self.sequence, image);
        self.sequence += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            info!("Frame source released after {} frames", self.sequence);
        }
    }
}

/// Replays detector output from a script.
///
/// Each non-comment line is one frame's label set, comma separated; an empty
/// line is a clean frame. A line reading `!error` makes that call fail. Once
/// the script is exhausted every frame is clean.
pub struct ScriptedDetector {
    frames: VecDeque<Option<Vec<String>>>,
}

impl ScriptedDetector {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read detector script {}", path.display()))?;
        Ok(Self::from_script(&contents))
    }

    pub fn from_script(script: &str) -> Self {
        let frames = script
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .map(|line| match line.trim() {
                "!error" => None,
                labels => Some(
                    labels
                        .split(',')
                        .map(|label| label.trim().to_string())
                        .filter(|label| !label.is_empty())
                        .collect(),
                ),
            })
            .collect();
        Self { frames }
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<String>> {
        match self.frames.pop_front() {
            Some(Some(labels)) => Ok(labels),
            Some(None) => Err(anyhow!("scripted detector failure at frame {}", frame.sequence)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(0, RgbImage::new(1, 1))
    }

    #[test]
    fn script_yields_one_label_set_per_line() {
        let mut detector = ScriptedDetector::from_script(
            "# warm-up\nno-face\n\nmultiple-persons, Phone detected\n!error\n",
        );
        assert_eq!(detector.detect(&frame()).unwrap(), vec!["no-face"]);
        assert!(detector.detect(&frame()).unwrap().is_empty());
        assert_eq!(
            detector.detect(&frame()).unwrap(),
            vec!["multiple-persons", "Phone detected"]
        );
        assert!(detector.detect(&frame()).is_err());
        assert!(detector.detect(&frame()).unwrap().is_empty());
    }

    #[test]
    fn blank_source_counts_frames_until_released() {
        let mut source = ImageDirSource::blank();
        assert_eq!(source.read_frame().unwrap().sequence, 0);
        let second = source.read_frame().unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.image.dimensions(), (BLANK_FRAME_WIDTH, BLANK_FRAME_HEIGHT));

        source.release();
        source.release();
        assert!(source.read_frame().is_err());
    }

    #[test]
    fn directory_source_cycles_images() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(4, 3).save(dir.path().join("a.png")).unwrap();
        RgbImage::new(2, 2).save(dir.path().join("b.png")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        let dims: Vec<_> = (0..3)
            .map(|_| source.read_frame().unwrap().image.dimensions())
            .collect();
        assert_eq!(dims, vec![(4, 3), (2, 2), (4, 3)]);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageDirSource::open(dir.path()).is_err());
    }
}
