//! # clipscan-report
//!
//! Turns one recorded incident clip into one bounded incident report.
//!
//! ## Flow
//!
//! - Sample a fixed number of evenly spaced frames ([`sample_indices`])
//! - Preprocess each to the detector's declared input and run it
//! - Keep detections at or above the threshold, count named categories
//!   ([`Aggregator`])
//! - Rank by confidence and cut to `max_detections`
//! - Emit an [`IncidentReport`], written atomically by [`write_report`]
//!
//! A frame that fails to decode is skipped. A detector failure on any frame
//! aborts the run and the report carries `status = "error"` instead.

pub mod aggregate;
pub mod analyzer;
pub mod config;
pub mod report;
pub mod sampler;

pub use aggregate::{rank_and_truncate, Aggregator, BBox, Detection, Tally};
pub use analyzer::{AnalyzeError, ClipAnalyzer};
pub use config::{default_categories, AnalysisConfig, Category, ConfigError};
pub use report::{write_report, IncidentReport, ReportError, ReportStatus};
pub use sampler::sample_indices;
