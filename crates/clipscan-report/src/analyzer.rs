//! End-to-end clip analysis: open, sample, preprocess, infer, aggregate.

use crate::aggregate::{Aggregator, Tally};
use crate::config::{AnalysisConfig, ConfigError};
use crate::report::IncidentReport;
use crate::sampler::sample_indices;
use clipscan_detect::{DetectError, Detector, TensorSignal};
use clipscan_preprocess::{PreprocessError, Preprocessor};
use clipscan_source::{open_clip, SourceError, VideoSource};
use log::{debug, info, warn};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("detector input contract rejected: {0}")]
    InputContract(#[from] PreprocessError),
    #[error("clip became unreadable at frame {frame}: {source}")]
    Source { frame: usize, #[source] source: SourceError },
    #[error("inference failed on frame {frame}: {source}")]
    Inference { frame: usize, #[source] source: DetectError },
}

/// Owns the detector and the preprocessing contract derived from it.
///
/// Every call to [`ClipAnalyzer::analyze`] starts from a fresh accumulator,
/// so one analyzer can process clips back to back.
pub struct ClipAnalyzer<D> {
    config: AnalysisConfig,
    preprocessor: Preprocessor,
    detector: D,
}

impl<D: Detector> ClipAnalyzer<D> {
    pub fn new(config: AnalysisConfig, detector: D) -> Result<Self, AnalyzeError> {
        config.validate()?;
        let spec = detector.input_spec();
        let preprocessor = Preprocessor::new(spec.width, spec.height, spec.order)?;
        Ok(Self { config, preprocessor, detector })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Analyze the clip at `path` with the default backends.
    pub fn analyze(&mut self, event_id: &str, path: &Path) -> IncidentReport {
        self.analyze_with(event_id, path, open_clip)
    }

    /// Analyze with a caller-supplied opener. Always returns a report; fatal
    /// conditions become `status = "error"`.
    pub fn analyze_with<F>(&mut self, event_id: &str, path: &Path, open: F) -> IncidentReport
    where
        F: FnOnce(&Path) -> Result<Box<dyn VideoSource>, SourceError>,
    {
        self.analyze_since(Instant::now(), event_id, path, open)
    }

    /// Like [`ClipAnalyzer::analyze_with`], but `latency_ms` is measured from
    /// `started`, so work done before the call (model load) is included.
    pub fn analyze_since<F>(&mut self, started: Instant, event_id: &str, path: &Path, open: F) -> IncidentReport
    where
        F: FnOnce(&Path) -> Result<Box<dyn VideoSource>, SourceError>,
    {
        info!("event {}: analyzing {}", event_id, path.display());

        let mut source = match open(path) {
            Ok(source) => source,
            Err(e) => {
                warn!("event {}: {}", event_id, e);
                return IncidentReport::failed(event_id, &self.config, e.to_string(), elapsed_ms(started));
            }
        };

        let outcome = self.run(source.as_mut());
        source.close();

        match outcome {
            Ok(tally) => {
                info!(
                    "event {}: frames_analyzed={} detections={} summary={:?}",
                    event_id,
                    tally.frames_analyzed,
                    tally.detections.len(),
                    tally.summary
                );
                IncidentReport::completed(event_id, &self.config, tally, elapsed_ms(started))
            }
            Err(e) => {
                warn!("event {}: {}", event_id, e);
                IncidentReport::failed(event_id, &self.config, e.to_string(), elapsed_ms(started))
            }
        }
    }

    fn run(&mut self, source: &mut dyn VideoSource) -> Result<Tally, AnalyzeError> {
        let total = source.total_frame_count();
        let indices = sample_indices(total, self.config.sample_frames);
        debug!("sampling {:?} of {} frames", indices, total);

        let mut agg = Aggregator::new(self.config.threshold, self.config.categories.clone());

        for &index in &indices {
            let frame = match source.seek_and_read(index) {
                Ok(frame) => frame,
                Err(e) if e.is_frame_scoped() => {
                    warn!("skipping frame {}: {}", index, e);
                    continue;
                }
                Err(source) => return Err(AnalyzeError::Source { frame: index, source }),
            };

            let tensor = match self.preprocessor.run(&frame) {
                Ok(tensor) => tensor,
                Err(e) => {
                    warn!("skipping frame {}: {}", index, e);
                    continue;
                }
            };

            let raw = self
                .detector
                .detect(&TensorSignal::new(&tensor))
                .map_err(|source| AnalyzeError::Inference { frame: index, source })?;
            debug!("frame {}: bounding_boxes_count={}", index, raw.len());

            agg.record_frame(index, raw);
        }

        Ok(agg.finish(self.config.max_detections))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
