// clipscan-detect/src/lib.rs
// ============================================================
// clipscan-detect  –  Inference boundary for clip analysis
// A detector declares the tensor it wants (size + channel
// order) and pulls the pixels through a `Signal` in chunks.
// ------------------------------------------------------------
// Pipeline: FrameTensor → Signal → Vec<RawDetection>
// ------------------------------------------------------------
// Public API
//   * Detector::input_spec()   – declared input contract
//   * Detector::detect(signal) – Ok(list) or DetectError
//   * TensorSignal::new(t)     – in-memory Signal over a FrameTensor
//   * TractFomo::new(path, c)  – centroid-grid ONNX detector
// ============================================================

//! clipscan – detection layer
//!
//! This crate provides the backend-agnostic [`Detector`] trait plus a
//! concrete [`TractFomo`] implementation that runs a FOMO-style centroid
//! grid model through Tract.
//!
//! Detectors never see the tensor buffer directly. They pull scaled values
//! from a [`Signal`], so a frame could just as well come from disk or a
//! stream without the aggregation side knowing.

use clipscan_preprocess::FrameTensor;
use clipscan_source::ChannelOrder;
use thiserror::Error;
use tract_onnx::prelude::TractError;

mod fomo;
pub use fomo::{decode_grid, grid_view, pack_input, FomoConfig, Layout, TractFomo};

/// Values pulled per `Signal::read` call by [`read_all`].
const PULL_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Model load or inference error: {0}")]
    Tract(#[from] TractError),
    #[error("Signal read out of range: offset {offset} + length {length} > {total}")]
    SignalRange { offset: usize, length: usize, total: usize },
    #[error("Invalid input length: expected {expected} values, got {actual}")]
    InvalidInput { expected: usize, actual: usize },
    #[error("Invalid output shape: {0:?}")]
    InvalidOutputShape(Vec<usize>),
    #[error("Detector failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, DetectError>;

/// Tensor shape and channel order a detector was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
}

impl InputSpec {
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single detector output in tensor pixel space.
///
/// An empty `label` means the model produced a class it has no name for.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Pull-style data supply: the detector asks for `out.len()` values
/// starting at `offset`.
pub trait Signal {
    fn total_len(&self) -> usize;
    fn read(&self, offset: usize, out: &mut [f32]) -> Result<()>;
}

/// In-memory [`Signal`] over raw tensor bytes. Values are the byte
/// magnitudes widened to `f32` (0.0‥255.0), not normalized.
pub struct TensorSignal<'a> {
    bytes: &'a [u8],
}

impl<'a> TensorSignal<'a> {
    pub fn new(tensor: &'a FrameTensor) -> Self {
        Self { bytes: tensor.as_bytes() }
    }

    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl Signal for TensorSignal<'_> {
    fn total_len(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, offset: usize, out: &mut [f32]) -> Result<()> {
        let total = self.bytes.len();
        let end = offset
            .checked_add(out.len())
            .filter(|&end| end <= total)
            .ok_or(DetectError::SignalRange { offset, length: out.len(), total })?;

        for (dst, &src) in out.iter_mut().zip(&self.bytes[offset..end]) {
            *dst = src as f32;
        }
        Ok(())
    }
}

/// Drain a signal into one contiguous buffer, chunk by chunk.
pub fn read_all(signal: &dyn Signal) -> Result<Vec<f32>> {
    let total = signal.total_len();
    let mut values = vec![0.0f32; total];
    let mut offset = 0;
    while offset < total {
        let end = (offset + PULL_CHUNK).min(total);
        signal.read(offset, &mut values[offset..end])?;
        offset = end;
    }
    Ok(values)
}

/// Trait for object detectors.
pub trait Detector {
    /// The tensor this detector expects. Fixed for the detector's lifetime.
    fn input_spec(&self) -> InputSpec;

    fn detect(&mut self, signal: &dyn Signal) -> Result<Vec<RawDetection>>;
}
