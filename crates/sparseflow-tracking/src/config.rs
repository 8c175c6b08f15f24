use serde::{Deserialize, Serialize};

use crate::detector::DetectorAlgorithm;

/// Tunable parameters of the [`OpticalFlowTracker`](crate::tracker::OpticalFlowTracker).
///
/// Values are clamped when applied to a tracker, not when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Corner detection algorithm.
    pub detector_algorithm: DetectorAlgorithm,
    /// Corner quality level relative to the strongest corner, in `[0.001, 1]`.
    pub detector_threshold: f32,
    /// Minimum feature spacing as a fraction of the image width, in `[0, 1]`.
    pub min_distance: f32,
    /// Half size of the tracking window, at least 1.
    pub window_radius: usize,
    /// Index of the coarsest pyramid level used for tracking.
    pub pyramid_levels: usize,
    /// Age at which a feature can produce good vectors.
    pub max_age: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            detector_algorithm: DetectorAlgorithm::Eigenvalues,
            detector_threshold: 0.01,
            min_distance: 0.01,
            window_radius: 10,
            pyramid_levels: 3,
            max_age: 3,
        }
    }
}
