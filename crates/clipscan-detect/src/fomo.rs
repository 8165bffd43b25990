//! Tract-powered FOMO-style detector.
//!
//! FOMO models emit a coarse grid of per-class probabilities instead of
//! anchor boxes. Class 0 is background. Neighbouring cells that agree on a
//! class are merged into one box, so a person spanning three cells comes out
//! as one detection.

use crate::{read_all, DetectError, Detector, InputSpec, RawDetection, Result, Signal};
use clipscan_source::ChannelOrder;
use log::debug;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tract_onnx::prelude::*;
use tract_onnx::prelude::tract_ndarray::{Array4, ArrayView3, ArrayViewD, Axis, Ix3};

/// Memory layout of the model's input (and output) tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Nhwc,
    Nchw,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Nhwc => f.write_str("nhwc"),
            Layout::Nchw => f.write_str("nchw"),
        }
    }
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(Layout::Nhwc),
            "nchw" => Ok(Layout::Nchw),
            other => Err(format!("unknown layout `{other}` (expected nhwc or nchw)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FomoConfig {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub layout: Layout,
    /// Names for classes 1.., background excluded.
    pub labels: Vec<String>,
    /// Cells below this probability are treated as background.
    pub min_score: f32,
}

impl Default for FomoConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 160,
            order: ChannelOrder::Rgb,
            layout: Layout::Nhwc,
            labels: vec!["person".into(), "car".into()],
            min_score: 0.1,
        }
    }
}

pub struct TractFomo {
    model: RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>,
    config: FomoConfig,
}

impl TractFomo {
    /// Load and optimize the ONNX model for a fixed `[1, …]` input.
    pub fn new(model_path: impl AsRef<Path>, config: FomoConfig) -> Result<Self> {
        let (w, h) = (config.width as usize, config.height as usize);
        let shape = match config.layout {
            Layout::Nhwc => tvec![1, h, w, 3],
            Layout::Nchw => tvec![1, 3, h, w],
        };

        let model = tract_onnx::onnx()
            .model_for_path(model_path.as_ref())?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))?
            .into_optimized()?
            .into_runnable()?;

        debug!(
            "TractFomo: loaded {} ({}x{} {} {})",
            model_path.as_ref().display(),
            w,
            h,
            config.layout,
            config.order
        );

        Ok(Self { model, config })
    }

    pub fn config(&self) -> &FomoConfig {
        &self.config
    }
}

impl Detector for TractFomo {
    fn input_spec(&self) -> InputSpec {
        InputSpec { width: self.config.width, height: self.config.height, order: self.config.order }
    }

    fn detect(&mut self, signal: &dyn Signal) -> Result<Vec<RawDetection>> {
        let spec = self.input_spec();
        let values = read_all(signal)?;
        let input = pack_input(&values, spec.width, spec.height, self.config.layout)?;

        let outputs = self.model.run(tvec![input.into()])?;
        let grid = grid_view(outputs[0].to_array_view::<f32>()?, self.config.layout)?;

        let dets = decode_grid(grid, &self.config.labels, self.config.min_score, spec.width, spec.height);
        debug!("TractFomo: grid {:?} -> {} boxes", grid.dim(), dets.len());
        Ok(dets)
    }
}

/// Pack interleaved HWC pixel values into a `[1, …]` model input tensor.
pub fn pack_input(values: &[f32], width: u32, height: u32, layout: Layout) -> Result<Tensor> {
    let (w, h) = (width as usize, height as usize);
    if values.len() != w * h * 3 {
        return Err(DetectError::InvalidInput { expected: w * h * 3, actual: values.len() });
    }

    let px = |y: usize, x: usize, c: usize| values[(y * w + x) * 3 + c];
    let input = match layout {
        Layout::Nhwc => Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| px(y, x, c)),
        Layout::Nchw => Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| px(y, x, c)),
    };
    Ok(input.into_tensor())
}

/// View a `[1, gh, gw, C]` (or `[1, C, gh, gw]`) output as a `[gh, gw, C]` grid.
pub fn grid_view(output: ArrayViewD<'_, f32>, layout: Layout) -> Result<ArrayView3<'_, f32>> {
    let shape = output.shape().to_vec();
    if shape.len() != 4 || shape[0] != 1 {
        return Err(DetectError::InvalidOutputShape(shape));
    }

    let grid = output
        .index_axis_move(Axis(0), 0)
        .into_dimensionality::<Ix3>()
        .map_err(|_| DetectError::InvalidOutputShape(shape))?;
    Ok(match layout {
        Layout::Nhwc => grid,
        Layout::Nchw => grid.permuted_axes([1, 2, 0]),
    })
}

/// Turn a `[gh, gw, classes]` probability grid into boxes in tensor pixels.
///
/// Each cell votes for its best non-background class; 4-connected cells with
/// the same vote become one box carrying the highest cell score. Results are
/// ordered by score, highest first.
pub fn decode_grid(
    grid: ArrayView3<f32>,
    labels: &[String],
    min_score: f32,
    tensor_w: u32,
    tensor_h: u32,
) -> Vec<RawDetection> {
    let (gh, gw, nc) = grid.dim();
    if gh == 0 || gw == 0 || nc < 2 {
        return Vec::new();
    }
    let cell_w = tensor_w as f32 / gw as f32;
    let cell_h = tensor_h as f32 / gh as f32;

    let mut votes: Vec<Option<(usize, f32)>> = vec![None; gh * gw];
    for gy in 0..gh {
        for gx in 0..gw {
            let best = (1..nc)
                .map(|c| (c, grid[[gy, gx, c]]))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((c, score)) = best {
                if score >= min_score {
                    votes[gy * gw + gx] = Some((c, score));
                }
            }
        }
    }

    let mut seen = vec![false; gh * gw];
    let mut dets = Vec::new();
    for start in 0..gh * gw {
        let Some((class, _)) = votes[start] else { continue };
        if seen[start] {
            continue;
        }

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (gw, gh, 0, 0);
        let mut best = 0.0f32;
        let mut stack = vec![start];
        seen[start] = true;

        while let Some(cell) = stack.pop() {
            let (cy, cx) = (cell / gw, cell % gw);
            min_x = min_x.min(cx);
            min_y = min_y.min(cy);
            max_x = max_x.max(cx);
            max_y = max_y.max(cy);
            if let Some((_, score)) = votes[cell] {
                best = best.max(score);
            }

            let mut visit = |ny: usize, nx: usize| {
                let n = ny * gw + nx;
                if !seen[n] && matches!(votes[n], Some((c, _)) if c == class) {
                    seen[n] = true;
                    stack.push(n);
                }
            };
            if cy > 0 {
                visit(cy - 1, cx);
            }
            if cy + 1 < gh {
                visit(cy + 1, cx);
            }
            if cx > 0 {
                visit(cy, cx - 1);
            }
            if cx + 1 < gw {
                visit(cy, cx + 1);
            }
        }

        let x = (min_x as f32 * cell_w).round() as u32;
        let y = (min_y as f32 * cell_h).round() as u32;
        let x_end = ((max_x + 1) as f32 * cell_w).round() as u32;
        let y_end = ((max_y + 1) as f32 * cell_h).round() as u32;

        dets.push(RawDetection {
            label: labels.get(class - 1).cloned().unwrap_or_default(),
            confidence: best,
            x,
            y,
            w: x_end - x,
            h: y_end - y,
        });
    }

    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    dets
}

#[cfg(test)]
mod tests {
    use super::*;
    use tract_onnx::prelude::tract_ndarray::Array3;

    fn labels() -> Vec<String> {
        vec!["person".into(), "car".into()]
    }

    #[test]
    fn adjacent_cells_merge_into_one_box() {
        // 4x4 grid over a 160x160 tensor: 40px cells.
        let mut grid = Array3::<f32>::zeros((4, 4, 3));
        grid[[1, 1, 1]] = 0.7;
        grid[[1, 2, 1]] = 0.9;
        grid[[2, 2, 1]] = 0.6;
        grid[[3, 0, 2]] = 0.8;
        grid[[0, 3, 2]] = 0.05; // below floor

        let dets = decode_grid(grid.view(), &labels(), 0.1, 160, 160);
        assert_eq!(dets.len(), 2);

        assert_eq!(dets[0].label, "person");
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!((dets[0].x, dets[0].y, dets[0].w, dets[0].h), (40, 40, 80, 80));

        assert_eq!(dets[1].label, "car");
        assert_eq!((dets[1].x, dets[1].y, dets[1].w, dets[1].h), (0, 120, 40, 40));
    }

    #[test]
    fn different_classes_do_not_merge() {
        let mut grid = Array3::<f32>::zeros((2, 2, 3));
        grid[[0, 0, 1]] = 0.5;
        grid[[0, 1, 2]] = 0.5;
        let dets = decode_grid(grid.view(), &labels(), 0.1, 20, 20);
        assert_eq!(dets.len(), 2);
    }

    #[test]
    fn unnamed_class_gets_empty_label() {
        let mut grid = Array3::<f32>::zeros((1, 1, 4));
        grid[[0, 0, 3]] = 0.95;
        let dets = decode_grid(grid.view(), &labels(), 0.1, 8, 8);
        assert_eq!(dets.len(), 1);
        assert!(dets[0].label.is_empty());
    }

    #[test]
    fn background_only_grid_yields_nothing() {
        let mut grid = Array3::<f32>::zeros((3, 3, 3));
        grid.index_axis_mut(Axis(2), 0).fill(1.0);
        assert!(decode_grid(grid.view(), &labels(), 0.1, 96, 96).is_empty());
    }

    /// 2x2 image where pixel `p` (row-major) has channel values `p*10 + c`.
    fn two_by_two() -> Vec<f32> {
        (0..4).flat_map(|p| (0..3).map(move |c| (p * 10 + c) as f32)).collect()
    }

    #[test]
    fn nhwc_input_keeps_interleaved_order() {
        let values = two_by_two();
        let tensor = pack_input(&values, 2, 2, Layout::Nhwc).unwrap();
        assert_eq!(tensor.shape(), &[1, 2, 2, 3]);
        assert_eq!(tensor.as_slice::<f32>().unwrap(), values.as_slice());
    }

    #[test]
    fn nchw_input_is_planar() {
        let tensor = pack_input(&two_by_two(), 2, 2, Layout::Nchw).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
        let view = tensor.to_array_view::<f32>().unwrap();
        // pixel (y=1, x=0) is p=2
        assert_eq!(view[[0, 2, 1, 0]], 22.0);
        assert_eq!(view[[0, 0, 0, 1]], 10.0);
        assert_eq!(
            tensor.as_slice::<f32>().unwrap(),
            &[0.0, 10.0, 20.0, 30.0, 1.0, 11.0, 21.0, 31.0, 2.0, 12.0, 22.0, 32.0]
        );
    }

    #[test]
    fn short_input_is_rejected() {
        let err = pack_input(&[0.0; 11], 2, 2, Layout::Nhwc).unwrap_err();
        assert!(matches!(err, DetectError::InvalidInput { expected: 12, actual: 11 }));
    }

    #[test]
    fn nchw_output_decodes_like_its_nhwc_transpose() {
        let mut nhwc = Array3::<f32>::zeros((2, 3, 3));
        nhwc[[0, 0, 1]] = 0.8;
        nhwc[[0, 1, 1]] = 0.6;
        nhwc[[1, 2, 2]] = 0.9;

        let nchw = nhwc.view().permuted_axes([2, 0, 1]).to_owned().insert_axis(Axis(0)).into_dyn();
        assert_eq!(nchw.shape(), &[1, 3, 2, 3]);
        let grid = grid_view(nchw.view(), Layout::Nchw).unwrap();
        assert_eq!(grid.dim(), (2, 3, 3));

        let expected = decode_grid(nhwc.view(), &labels(), 0.1, 96, 64);
        assert_eq!(expected.len(), 2);
        assert_eq!(decode_grid(grid, &labels(), 0.1, 96, 64), expected);

        let batched = nhwc.clone().insert_axis(Axis(0)).into_dyn();
        assert_eq!(decode_grid(grid_view(batched.view(), Layout::Nhwc).unwrap(), &labels(), 0.1, 96, 64), expected);
    }

    #[test]
    fn unbatched_output_is_rejected() {
        let output = Array3::<f32>::zeros((2, 2, 3)).into_dyn();
        let err = grid_view(output.view(), Layout::Nhwc).unwrap_err();
        assert!(matches!(err, DetectError::InvalidOutputShape(shape) if shape == vec![2, 2, 3]));
    }

    #[test]
    fn layout_parses() {
        assert_eq!("NCHW".parse::<Layout>().unwrap(), Layout::Nchw);
        assert!("chw".parse::<Layout>().is_err());
    }

    #[test]
    fn missing_model_file_is_an_error() {
        assert!(TractFomo::new("/no/such/model.onnx", FomoConfig::default()).is_err());
    }
}
