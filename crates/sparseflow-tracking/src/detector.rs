use serde::{Deserialize, Serialize};
use sparseflow_image::{Image, ImageBuffer, ImageSize};

use crate::{
    error::DetectorError,
    primitives::{CornerDetector, EigenCorners},
};

/// Corner detection algorithm used by the [`FeatureDetector`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorAlgorithm {
    /// Minimum eigenvalue of the structure tensor.
    #[default]
    Eigenvalues,
    /// Reserved. Detects nothing.
    Fast,
}

impl DetectorAlgorithm {
    /// Algorithm for a numeric id. Unknown ids select [`DetectorAlgorithm::Eigenvalues`].
    pub fn from_id(id: i32) -> Self {
        match id {
            1 => Self::Fast,
            _ => Self::Eigenvalues,
        }
    }

    /// Numeric id of the algorithm.
    pub fn id(self) -> i32 {
        match self {
            Self::Eigenvalues => 0,
            Self::Fast => 1,
        }
    }
}

/// Proposes new feature candidates for the tracker.
///
/// Every call to [`FeatureDetector::find_features`] moves the current
/// candidates to the previous list before detecting new ones.
#[derive(Debug, Clone)]
pub struct FeatureDetector<C = EigenCorners> {
    corners: C,
    algorithm: DetectorAlgorithm,
    threshold: f32,
    min_distance: f32,
    features: Vec<[f32; 2]>,
    previous_features: Vec<[f32; 2]>,
    eig: ImageBuffer<f32, 1>,
    tmp: ImageBuffer<f32, 1>,
}

impl Default for FeatureDetector<EigenCorners> {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureDetector<EigenCorners> {
    /// Create a detector using minimum eigenvalue corners.
    pub fn new() -> Self {
        Self::with_corner_detector(EigenCorners)
    }
}

impl<C: CornerDetector> FeatureDetector<C> {
    /// Maximum number of candidates returned per call.
    pub const MAX_CANDIDATES: usize = 2048;

    /// Create a detector on top of a custom corner detector.
    pub fn with_corner_detector(corners: C) -> Self {
        Self {
            corners,
            algorithm: DetectorAlgorithm::default(),
            threshold: 0.1,
            min_distance: 0.01,
            features: Vec::with_capacity(Self::MAX_CANDIDATES),
            previous_features: Vec::with_capacity(Self::MAX_CANDIDATES),
            eig: ImageBuffer::new(),
            tmp: ImageBuffer::new(),
        }
    }

    /// Detect candidates in `image`.
    ///
    /// On failure the current candidate list is left empty.
    pub fn find_features(&mut self, image: &Image<u8, 1>) -> Result<(), DetectorError> {
        std::mem::swap(&mut self.features, &mut self.previous_features);
        self.features.clear();

        match self.algorithm {
            DetectorAlgorithm::Fast => Ok(()),
            DetectorAlgorithm::Eigenvalues => self.find_features_eigenvalues(image),
        }
    }

    fn adjust_scratch_size(&mut self, size: ImageSize) -> Result<(), DetectorError> {
        self.tmp
            .ensure_size(size, 0.0)
            .map_err(|source| DetectorError::Allocation {
                what: "tmp",
                source,
            })?;
        self.eig
            .ensure_size(size, 0.0)
            .map_err(|source| DetectorError::Allocation {
                what: "eig",
                source,
            })?;
        Ok(())
    }

    fn find_features_eigenvalues(&mut self, image: &Image<u8, 1>) -> Result<(), DetectorError> {
        self.adjust_scratch_size(image.size())?;

        let (Some(eig), Some(tmp)) = (self.eig.image_mut(), self.tmp.image_mut()) else {
            return Ok(());
        };

        let mut found = self
            .corners
            .detect(
                image,
                eig,
                tmp,
                Self::MAX_CANDIDATES,
                self.threshold,
                self.min_distance * image.cols() as f32,
            )
            .map_err(DetectorError::Detection)?;
        found.truncate(Self::MAX_CANDIDATES);
        self.features = found;

        Ok(())
    }

    /// Candidates of the last call.
    pub fn features(&self) -> &[[f32; 2]] {
        &self.features
    }

    /// Number of candidates of the last call.
    pub fn count(&self) -> usize {
        self.features.len()
    }

    /// Candidates of the call before the last one.
    pub fn previous_features(&self) -> &[[f32; 2]] {
        &self.previous_features
    }

    /// Number of candidates of the call before the last one.
    pub fn previous_count(&self) -> usize {
        self.previous_features.len()
    }

    /// Set the quality level relative to the strongest corner, clamped to `[0.001, 1]`.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(0.001, 1.0);
    }

    /// The quality level.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Set the minimum spacing as a fraction of the image width, clamped to `[0, 1]`.
    pub fn set_min_distance(&mut self, min_distance: f32) {
        self.min_distance = min_distance.clamp(0.0, 1.0);
    }

    /// The minimum spacing as a fraction of the image width.
    pub fn min_distance(&self) -> f32 {
        self.min_distance
    }

    /// Select the detection algorithm.
    pub fn set_algorithm(&mut self, algorithm: DetectorAlgorithm) {
        self.algorithm = algorithm;
    }

    /// The detection algorithm.
    pub fn algorithm(&self) -> DetectorAlgorithm {
        self.algorithm
    }

    /// Drop the candidates and scratch buffers.
    pub fn reset(&mut self) {
        self.features.clear();
        self.previous_features.clear();
        self.eig.release();
        self.tmp.release();
    }
}
