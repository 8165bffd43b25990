//! Run tunables.
//!
//! Everything here can come from a JSON file; fields left out of the file
//! keep their defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
    #[error("sample_frames must be at least 1")]
    SampleFrames,
    #[error("max_detections must be at least 1")]
    MaxDetections,
    #[error("threshold must be within [0, 1], got {0}")]
    Threshold(f32),
    #[error("category `{0}` has no labels")]
    EmptyCategory(String),
    #[error("category `{0}` is listed more than once")]
    DuplicateCategory(String),
}

/// A named summary counter and the detector labels that feed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub labels: Vec<String>,
}

impl Category {
    pub fn new(name: impl Into<String>, labels: &[&str]) -> Self {
        Self { name: name.into(), labels: labels.iter().map(|l| l.to_string()).collect() }
    }

    pub fn matches(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new("person", &["person"]),
        Category::new("vehicle", &["car", "truck", "bus", "motorcycle", "vehicle"]),
    ]
}

/// Configuration for one clip analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Frames sampled from the clip
    pub sample_frames: usize,
    /// Detections below this confidence are dropped
    pub threshold: f32,
    /// Upper bound on the emitted detection list
    pub max_detections: usize,
    /// Reported as `model` in the output document
    pub model_name: String,
    pub categories: Vec<Category>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_frames: 5,
            threshold: 0.5,
            max_detections: 25,
            model_name: "fomo_tract_local".to_string(),
            categories: default_categories(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        serde_json::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_frames == 0 {
            return Err(ConfigError::SampleFrames);
        }
        if self.max_detections == 0 {
            return Err(ConfigError::MaxDetections);
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Threshold(self.threshold));
        }
        if let Some(empty) = self.categories.iter().find(|c| c.labels.is_empty()) {
            return Err(ConfigError::EmptyCategory(empty.name.clone()));
        }
        let mut names = BTreeSet::new();
        if let Some(dup) = self.categories.iter().find(|c| !names.insert(c.name.as_str())) {
            return Err(ConfigError::DuplicateCategory(dup.name.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_runner_contract() {
        let config = AnalysisConfig::default();
        assert_eq!(config.sample_frames, 5);
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.max_detections, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipscan.json");
        std::fs::write(&path, r#"{ "threshold": 0.2, "model_name": "edge_fomo" }"#).unwrap();

        let config = AnalysisConfig::from_file(&path).unwrap();
        assert_eq!(config.threshold, 0.2);
        assert_eq!(config.model_name, "edge_fomo");
        assert_eq!(config.sample_frames, 5);
        assert_eq!(config.categories, default_categories());
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = AnalysisConfig { sample_frames: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::SampleFrames)));

        config = AnalysisConfig { threshold: f32::NAN, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Threshold(_))));

        config = AnalysisConfig { threshold: 1.5, ..Default::default() };
        assert!(config.validate().is_err());

        config = AnalysisConfig { max_detections: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::MaxDetections)));

        config.max_detections = 3;
        config.categories.push(Category::new("animal", &[]));
        assert!(matches!(config.validate(), Err(ConfigError::EmptyCategory(name)) if name == "animal"));
    }

    #[test]
    fn repeated_category_name_is_rejected() {
        let mut config = AnalysisConfig::default();
        config.categories.push(Category::new("person", &["pedestrian"]));
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateCategory(name)) if name == "person"));
    }

    #[test]
    fn unreadable_and_malformed_files() {
        assert!(matches!(
            AnalysisConfig::from_file(Path::new("/no/such/clipscan.json")),
            Err(ConfigError::Read { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AnalysisConfig::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn category_matching_is_exact() {
        let vehicle = &default_categories()[1];
        assert!(vehicle.matches("car"));
        assert!(!vehicle.matches("Car"));
        assert!(!vehicle.matches("person"));
    }
}
