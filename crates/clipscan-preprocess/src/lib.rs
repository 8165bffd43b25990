//! clipscan‑preprocess – fit‑shortest resize + center crop + channel reorder.
//!
//! Turns one [`RawFrame`] into the exact tensor a detector declared it
//! wants: `W*H*3` bytes, row‑major, in the detector's channel order. Pixel
//! values are passed through as raw 0‑255 magnitudes, never normalized.
//!
//! The geometry is computed up front by [`ResizePlan`] so it can be checked
//! without touching pixels.

use clipscan_source::{ChannelOrder, RawFrame};
use log::trace;
use ndarray::{s, ArrayView3};
use resize::{new, Pixel, Type};
use rgb::FromSlice;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("{stage}: buffer holds {actual} bytes, expected {expected}")]
    Length { stage: &'static str, expected: usize, actual: usize },
    #[error("resize failed: {0}")]
    Resize(#[from] resize::Error),
    #[error("crop window: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, PreprocessError>;

fn check_len(stage: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(PreprocessError::Length { stage, expected, actual });
    }
    Ok(())
}

/// Geometry of a fit‑shortest resize followed by a center crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePlan {
    /// `max(W/src_w, H/src_h)`.
    pub scale: f64,
    /// `round(src_w * scale)`.
    pub new_w: u32,
    /// `round(src_h * scale)`.
    pub new_h: u32,
    /// Size actually handed to the resizer, never below the target.
    pub resize_w: u32,
    pub resize_h: u32,
    /// Crop origin inside the resized image.
    pub x0: u32,
    pub y0: u32,
}

impl ResizePlan {
    pub fn fit_shortest(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Result<Self> {
        if src_w == 0 || src_h == 0 {
            return Err(PreprocessError::InvalidDimensions { width: src_w, height: src_h });
        }
        if dst_w == 0 || dst_h == 0 {
            return Err(PreprocessError::InvalidDimensions { width: dst_w, height: dst_h });
        }

        let scale = (dst_w as f64 / src_w as f64).max(dst_h as f64 / src_h as f64);
        let new_w = (src_w as f64 * scale).round() as u32;
        let new_h = (src_h as f64 * scale).round() as u32;

        // Rounding can land one pixel short of the target; grow instead of padding.
        let resize_w = new_w.max(dst_w);
        let resize_h = new_h.max(dst_h);

        Ok(Self {
            scale,
            new_w,
            new_h,
            resize_w,
            resize_h,
            x0: (resize_w - dst_w) / 2,
            y0: (resize_h - dst_h) / 2,
        })
    }

    pub fn is_identity(&self, src_w: u32, src_h: u32) -> bool {
        self.resize_w == src_w && self.resize_h == src_h
    }
}

/// Detector‑ready pixels: exactly `width * height * 3` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTensor {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    data: Vec<u8>,
}

impl FrameTensor {
    pub fn new(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Result<Self> {
        check_len("tensor", width as usize * height as usize * 3, data.len())?;
        Ok(Self { width, height, order, data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Preprocessor {
    dst_w: u32,
    dst_h: u32,
    order: ChannelOrder,
}

impl Preprocessor {
    /// Create a pre‑processor that outputs WxH bytes in `order` (0‑255 u8).
    pub fn new(dst_w: u32, dst_h: u32, order: ChannelOrder) -> Result<Self> {
        if dst_w == 0 || dst_h == 0 {
            return Err(PreprocessError::InvalidDimensions { width: dst_w, height: dst_h });
        }
        Ok(Self { dst_w, dst_h, order })
    }

    pub fn target(&self) -> (u32, u32) {
        (self.dst_w, self.dst_h)
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn run(&self, frame: &RawFrame) -> Result<FrameTensor> {
        let (w, h) = (frame.width as usize, frame.height as usize);
        let (dst_w, dst_h) = (self.dst_w as usize, self.dst_h as usize);
        let plan = ResizePlan::fit_shortest(frame.width, frame.height, self.dst_w, self.dst_h)?;
        let (rw, rh) = (plan.resize_w as usize, plan.resize_h as usize);
        trace!("preprocess: {}x{} -> {}x{} crop@({},{})", w, h, rw, rh, plan.x0, plan.y0);

        // 1. capture
        let src = frame.data();
        check_len("capture", w * h * 3, src.len())?;

        // 2. resize (Triangle widens its support when decimating)
        let resized = if plan.is_identity(frame.width, frame.height) {
            src.to_vec()
        } else {
            let mut dst = vec![0u8; rw * rh * 3];
            let mut resizer = new(w, h, rw, rh, Pixel::RGB8, Type::Triangle)?;
            resizer.resize(src.as_rgb(), dst.as_rgb_mut())?;
            dst
        };
        check_len("resize", rw * rh * 3, resized.len())?;

        // 3. center crop
        let (x0, y0) = (plan.x0 as usize, plan.y0 as usize);
        let view = ArrayView3::from_shape((rh, rw, 3), resized.as_slice())?;
        let mut cropped: Vec<u8> = view
            .slice(s![y0..y0 + dst_h, x0..x0 + dst_w, ..])
            .iter()
            .copied()
            .collect();
        check_len("crop", dst_w * dst_h * 3, cropped.len())?;

        // 4. channel reorder
        if frame.order.needs_swap(self.order) {
            for px in cropped.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }

        FrameTensor::new(self.dst_w, self.dst_h, self.order, cropped)
    }
}
