// clipscan-source/src/sequence.rs
use crate::{ChannelOrder, RawFrame, Result, SourceError, VideoSource};
use log::{debug, info};
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A directory of still frames, ordered by file name.
///
/// Frame `i` is the `i`-th file after sorting, so zero-padded names
/// (`frame_00042.png`) give the natural capture order.
pub struct ImageSequence {
    root: PathBuf,
    frames: Vec<PathBuf>,
    open: bool,
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| SourceError::ClipOpen {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_frame_file(p))
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(SourceError::ClipOpen {
                path: dir.to_path_buf(),
                reason: "directory holds no png/jpg frames".into(),
            });
        }

        info!("ImageSequence: opened {}, frames={}", dir.display(), frames.len());

        Ok(Self { root: dir.to_path_buf(), frames, open: true })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| FRAME_EXTENSIONS.contains(&s.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl VideoSource for ImageSequence {
    fn total_frame_count(&self) -> usize {
        self.frames.len().max(1)
    }

    fn seek_and_read(&mut self, index: usize) -> Result<RawFrame> {
        if !self.open {
            return Err(SourceError::FrameDecode { index, reason: "clip is closed".into() });
        }
        let path = self.frames.get(index).ok_or_else(|| SourceError::FrameDecode {
            index,
            reason: format!("index past end of sequence ({} frames)", self.frames.len()),
        })?;

        let img = image::open(path)
            .map_err(|e| SourceError::FrameDecode { index, reason: e.to_string() })?
            .to_rgb8();
        debug!("ImageSequence: frame {} <- {}", index, path.display());

        let (w, h) = img.dimensions();
        RawFrame::new(w, h, ChannelOrder::Rgb, img.into_raw())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
