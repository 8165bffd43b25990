// clipscan-source/src/lib.rs
// ============================================================
// Clip reader crate for clipscan
// Opens a recorded incident clip and hands out single frames
// by absolute index (seek + read). No streaming, no capture.
// ------------------------------------------------------------
// Public API:
//   * open_clip(path)                 – pick a backend for `path`
//   * VideoSource::total_frame_count()
//   * VideoSource::seek_and_read(idx) – one RawFrame
//   * VideoSource::close()            – idempotent release
// ------------------------------------------------------------
// Build notes
//   * Image-sequence backend is always compiled (pure Rust).
//   * `--features opencv` adds container files through videoio.
// ============================================================

//! clipscan – clip reader layer
//!
//! A clip is either a directory of numbered still frames or, with the
//! `opencv` feature, a container file decoded by `videoio`. Both are
//! exposed through the same [`VideoSource`] trait so the pipeline never
//! cares where pixels come from.
//!
//! Frames are handed out as owned [`RawFrame`] buffers whose length is
//! checked against `width * height * 3` on construction.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

mod sequence;
pub use sequence::ImageSequence;

#[cfg(feature = "opencv")]
mod capture;
#[cfg(feature = "opencv")]
pub use capture::OpencvClip;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("clip not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported container: {0} (container clips need the `opencv` feature)")]
    UnsupportedContainer(PathBuf),
    #[error("failed to open clip {path}: {reason}")]
    ClipOpen { path: PathBuf, reason: String },
    #[error("failed to decode frame {index}: {reason}")]
    FrameDecode { index: usize, reason: String },
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },
}

impl SourceError {
    /// `true` for errors that only spoil one frame; the clip stays usable.
    pub fn is_frame_scoped(&self) -> bool {
        matches!(self, SourceError::FrameDecode { .. } | SourceError::FrameSize { .. })
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Byte order of the three colour channels in a packed pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Whether converting from `self` to `target` needs the R and B bytes swapped.
    pub fn needs_swap(self, target: ChannelOrder) -> bool {
        self != target
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOrder::Rgb => f.write_str("rgb"),
            ChannelOrder::Bgr => f.write_str("bgr"),
        }
    }
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(format!("unknown channel order `{other}` (expected rgb or bgr)")),
        }
    }
}

/// One decoded frame, packed 3 bytes per pixel, row-major, no padding.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    data: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(SourceError::FrameSize { expected, actual: data.len() });
        }
        Ok(Self { width, height, order, data })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// An opened clip. Frames are addressed by absolute index.
pub trait VideoSource {
    /// Frame count reported by the container; never 0.
    fn total_frame_count(&self) -> usize;

    /// Seek to `index` and decode that one frame.
    fn seek_and_read(&mut self, index: usize) -> Result<RawFrame>;

    /// Release the underlying resource. Safe to call more than once.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Open `path` with the backend that fits it.
///
/// Directories are read as image sequences; anything else is treated as a
/// container file.
pub fn open_clip(path: &Path) -> Result<Box<dyn VideoSource>> {
    if !path.exists() {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }
    if path.is_dir() {
        return Ok(Box::new(ImageSequence::open(path)?));
    }
    open_container(path)
}

#[cfg(feature = "opencv")]
fn open_container(path: &Path) -> Result<Box<dyn VideoSource>> {
    Ok(Box::new(OpencvClip::open(path)?))
}

#[cfg(not(feature = "opencv"))]
fn open_container(path: &Path) -> Result<Box<dyn VideoSource>> {
    Err(SourceError::UnsupportedContainer(path.to_path_buf()))
}

/// Containers that cannot report a frame count still get sampled once.
#[cfg(any(feature = "opencv", test))]
pub(crate) fn frame_count_or_sentinel(raw: f64) -> usize {
    if raw.is_finite() && raw >= 1.0 {
        raw as usize
    } else {
        1
    }
}
