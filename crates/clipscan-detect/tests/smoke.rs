use clipscan_detect::{Detector, FomoConfig, TensorSignal, TractFomo};
use clipscan_preprocess::Preprocessor;
use clipscan_source::{ChannelOrder, RawFrame};

// Needs a real model: CLIPSCAN_MODEL=/path/fomo.onnx cargo test -- --ignored
#[test]
#[ignore]
fn fomo_smoke() -> Result<(), Box<dyn std::error::Error>> {
    let manifest = std::env::var("CARGO_MANIFEST_DIR")?;
    let default = format!("{}/../../models/fomo_160.onnx", manifest);
    let model = std::env::var("CLIPSCAN_MODEL").unwrap_or(default);
    let mut det = TractFomo::new(&model, FomoConfig::default())?;

    // Black 640x480 frame → no detections
    let spec = det.input_spec();
    let frame = RawFrame::new(640, 480, ChannelOrder::Bgr, vec![0; 640 * 480 * 3])?;
    let tensor = Preprocessor::new(spec.width, spec.height, spec.order)?.run(&frame)?;
    let out = det.detect(&TensorSignal::new(&tensor))?;
    assert!(out.is_empty());
    Ok(())
}
