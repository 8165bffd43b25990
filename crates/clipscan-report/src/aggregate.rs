//! Threshold, tag and count detections across sampled frames.

use crate::config::Category;
use clipscan_detect::RawDetection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Box in tensor pixel space; on the wire it is `[x, y, w, h]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "[u32; 4]", from = "[u32; 4]")]
pub struct BBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl From<BBox> for [u32; 4] {
    fn from(b: BBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}

impl From<[u32; 4]> for BBox {
    fn from([x, y, w, h]: [u32; 4]) -> Self {
        Self { x, y, w, h }
    }
}

/// A retained detection, tagged with the frame it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    #[serde(rename = "conf")]
    pub confidence: f32,
    pub bbox: BBox,
    #[serde(rename = "frame_idx")]
    pub source_frame_index: usize,
}

/// Final counts for one run, detections already ranked and truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally {
    pub frames_analyzed: usize,
    pub summary: BTreeMap<String, u32>,
    pub detections: Vec<Detection>,
}

/// Run-scoped accumulator. One per clip; never shared.
#[derive(Debug)]
pub struct Aggregator {
    threshold: f32,
    categories: Vec<Category>,
    counts: BTreeMap<String, u32>,
    detections: Vec<Detection>,
    frames_analyzed: usize,
}

impl Aggregator {
    pub fn new(threshold: f32, categories: Vec<Category>) -> Self {
        let counts = categories.iter().map(|c| (c.name.clone(), 0)).collect();
        Self { threshold, categories, counts, detections: Vec::new(), frames_analyzed: 0 }
    }

    /// Fold in one frame's successful detector output. Returns how many
    /// detections from this frame were kept.
    pub fn record_frame(&mut self, frame_index: usize, raw: Vec<RawDetection>) -> usize {
        self.frames_analyzed += 1;
        let before = self.detections.len();

        for det in raw {
            // NaN fails this comparison too.
            if det.label.is_empty() || !(det.confidence >= self.threshold) {
                continue;
            }
            // A counter moves at most once per detection, even if several
            // categories share its name.
            let hits: BTreeSet<&str> = self
                .categories
                .iter()
                .filter(|c| c.matches(&det.label))
                .map(|c| c.name.as_str())
                .collect();
            for name in hits {
                if let Some(count) = self.counts.get_mut(name) {
                    *count += 1;
                }
            }
            self.detections.push(Detection {
                label: det.label,
                confidence: det.confidence,
                bbox: BBox { x: det.x, y: det.y, w: det.w, h: det.h },
                source_frame_index: frame_index,
            });
        }

        self.detections.len() - before
    }

    pub fn frames_analyzed(&self) -> usize {
        self.frames_analyzed
    }

    pub fn retained(&self) -> usize {
        self.detections.len()
    }

    /// Close the run: counts cover every retained detection, the list is
    /// ranked and cut to `max_detections`.
    pub fn finish(self, max_detections: usize) -> Tally {
        Tally {
            frames_analyzed: self.frames_analyzed,
            summary: self.counts,
            detections: rank_and_truncate(self.detections, max_detections),
        }
    }
}

/// Stable sort by confidence, highest first, then keep the top `max`.
pub fn rank_and_truncate(mut detections: Vec<Detection>, max: usize) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections.truncate(max);
    detections
}
