use sparseflow_image::{Image, ImageBuffer, ImageError, ImageSize};
use sparseflow_imgproc::pyramid::Pyramid;

use crate::{
    config::TrackerConfig,
    detector::{DetectorAlgorithm, FeatureDetector},
    error::TrackerError,
    friends::{self, FriendStats},
    index::IndexManager,
    primitives::{CornerDetector, EigenCorners, FlowFlags, PyramidalLk, SparseOpticalFlow},
    vector::Vector,
};

fn try_reserve<T>(
    data: &mut Vec<T>,
    additional: usize,
    what: &'static str,
) -> Result<(), TrackerError> {
    data.try_reserve(additional)
        .map_err(|_| TrackerError::Allocation {
            what,
            source: ImageError::AllocationFailed(
                additional.saturating_mul(std::mem::size_of::<T>()),
            ),
        })
}

fn distance_sq(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// Live features, one entry per feature in every column.
#[derive(Debug, Clone, Default)]
struct FeatureSet {
    positions: Vec<[f32; 2]>,
    new_positions: Vec<[f32; 2]>,
    status: Vec<bool>,
    indices: Vec<u32>,
    ages: Vec<u32>,
}

impl FeatureSet {
    fn try_with_capacity(capacity: usize, what: &'static str) -> Result<Self, TrackerError> {
        let mut set = Self::default();
        try_reserve(&mut set.positions, capacity, what)?;
        try_reserve(&mut set.new_positions, capacity, what)?;
        try_reserve(&mut set.status, capacity, what)?;
        try_reserve(&mut set.indices, capacity, what)?;
        try_reserve(&mut set.ages, capacity, what)?;
        Ok(set)
    }

    fn len(&self) -> usize {
        self.positions.len()
    }

    fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn push(&mut self, position: [f32; 2], index: u32, age: u32) {
        self.positions.push(position);
        self.new_positions.push(position);
        self.status.push(false);
        self.indices.push(index);
        self.ages.push(age);
    }

    fn clear(&mut self) {
        self.positions.clear();
        self.new_positions.clear();
        self.status.clear();
        self.indices.clear();
        self.ages.clear();
    }
}

/// Sparse optical flow tracker with stable feature identities.
///
/// Every call to [`OpticalFlowTracker::process_frame`] detects candidates on
/// the previous frame, merges them with the features tracked so far, tracks
/// the merged set into the new frame and derives one [`Vector`] per tracked
/// feature. Vectors that are old enough and backed by enough similar
/// neighbours are flagged good.
///
/// # Examples
///
/// ```
/// use sparseflow_image::Image;
/// use sparseflow_tracking::OpticalFlowTracker;
///
/// let mut tracker = OpticalFlowTracker::new();
/// let frame = Image::<u8, 1>::from_size_val([64, 48].into(), 0).unwrap();
///
/// tracker.process_frame(&frame).unwrap();
/// assert_eq!(tracker.feature_count(), 0);
/// assert_eq!(tracker.good_vectors().count(), 0);
/// ```
#[derive(Debug)]
pub struct OpticalFlowTracker<C = EigenCorners, F = PyramidalLk> {
    detector: FeatureDetector<C>,
    flow: F,
    index_manager: IndexManager,
    previous_image: ImageBuffer<u8, 1>,
    current_pyramid: Pyramid,
    previous_pyramid: Pyramid,
    flags: FlowFlags,
    features: FeatureSet,
    vectors: Vec<Vector>,
    stats: FriendStats,
    image_size: Option<ImageSize>,
    window_radius: usize,
    pyramid_levels: usize,
    min_distance: f32,
    max_age: u32,
    last_error: Option<String>,
}

impl Default for OpticalFlowTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OpticalFlowTracker {
    /// Create a tracker with the default primitives and configuration.
    pub fn new() -> Self {
        Self::with_primitives(EigenCorners, PyramidalLk::default())
    }

    /// Create a tracker with the default primitives and the given configuration.
    pub fn with_config(config: &TrackerConfig) -> Self {
        let mut tracker = Self::new();
        tracker.apply_config(config);
        tracker
    }
}

impl<C: CornerDetector, F: SparseOpticalFlow> OpticalFlowTracker<C, F> {
    /// Create a tracker on top of custom corner detection and flow primitives.
    pub fn with_primitives(corners: C, flow: F) -> Self {
        let mut tracker = Self {
            detector: FeatureDetector::with_corner_detector(corners),
            flow,
            index_manager: IndexManager::new(),
            previous_image: ImageBuffer::new(),
            current_pyramid: Pyramid::new(),
            previous_pyramid: Pyramid::new(),
            flags: FlowFlags::default(),
            features: FeatureSet::default(),
            vectors: Vec::new(),
            stats: FriendStats::default(),
            image_size: None,
            window_radius: 0,
            pyramid_levels: 0,
            min_distance: 0.0,
            max_age: 0,
            last_error: None,
        };
        tracker.apply_config(&TrackerConfig::default());
        tracker
    }

    /// Apply every parameter of `config`, clamping out of range values.
    pub fn apply_config(&mut self, config: &TrackerConfig) {
        self.set_detector_algorithm(config.detector_algorithm);
        self.set_detector_threshold(config.detector_threshold);
        self.set_min_distance(config.min_distance);
        self.set_window_radius(config.window_radius);
        self.set_pyramid_levels(config.pyramid_levels);
        self.set_max_age(config.max_age);
    }

    /// The current parameters.
    pub fn config(&self) -> TrackerConfig {
        TrackerConfig {
            detector_algorithm: self.detector.algorithm(),
            detector_threshold: self.detector.threshold(),
            min_distance: self.min_distance,
            window_radius: self.window_radius,
            pyramid_levels: self.pyramid_levels,
            max_age: self.max_age,
        }
    }

    /// Process one grayscale frame.
    ///
    /// The frame is only read during the call. On failure the error message
    /// is also kept for [`OpticalFlowTracker::last_error`] and the state
    /// reached by the steps that already ran is kept.
    pub fn process_frame(&mut self, image: &Image<u8, 1>) -> Result<(), TrackerError> {
        let result = self.run_pipeline(image);
        match &result {
            Ok(()) => {
                self.last_error = None;
                log::debug!(
                    "processed {}: {} features, {} vectors, {} good",
                    image.size(),
                    self.features.len(),
                    self.vectors.len(),
                    self.stats.good_count
                );
            }
            Err(err) => {
                log::warn!("could not process frame: {err}");
                self.last_error = Some(err.to_string());
            }
        }
        result
    }

    fn run_pipeline(&mut self, image: &Image<u8, 1>) -> Result<(), TrackerError> {
        self.set_image(image)?;

        let previous = self
            .previous_image
            .image()
            .ok_or(TrackerError::MissingBuffers("find_features"))?;
        self.detector.find_features(previous)?;

        self.update_feature_list(image.cols())?;
        self.track_features(image)?;
        self.calculate_vectors(image.size())?;
        self.find_friends();
        self.store_previous_image(image)
    }

    fn set_image(&mut self, image: &Image<u8, 1>) -> Result<(), TrackerError> {
        if image.cols() == 0 || image.rows() == 0 {
            return Err(TrackerError::MissingImage);
        }
        self.image_size = Some(image.size());
        self.check_images(image.size())
    }

    fn check_images(&mut self, size: ImageSize) -> Result<(), TrackerError> {
        if self.previous_image.size() == Some(size) {
            return Ok(());
        }
        self.rebuild_images(size)
    }

    fn rebuild_images(&mut self, size: ImageSize) -> Result<(), TrackerError> {
        log::debug!("rebuilding image buffers for {size}");
        self.previous_pyramid.release();
        self.current_pyramid.release();
        self.flags = FlowFlags::default();
        self.previous_image
            .ensure_size(size, 0)
            .map_err(|source| TrackerError::Allocation {
                what: "rebuild_images",
                source,
            })?;
        Ok(())
    }

    fn update_feature_list(&mut self, cols: usize) -> Result<(), TrackerError> {
        let candidates = self.detector.features();
        let total = self.features.len() + candidates.len();
        if total == 0 {
            return Ok(());
        }

        let spacing = self.min_distance * cols as f32;
        let d_thresh = spacing * spacing * 1.5;

        let mut merged = FeatureSet::try_with_capacity(total, "update_feature_list")?;
        let old = &self.features;

        for i in 0..old.len() {
            if old.status[i] {
                let position = old.new_positions[i];
                let isolated = old
                    .new_positions
                    .iter()
                    .enumerate()
                    .all(|(j, &other)| j == i || distance_sq(position, other) >= d_thresh);
                if isolated {
                    let age = old.ages[i].saturating_add(1).min(self.max_age);
                    merged.push(position, old.indices[i], age);
                    continue;
                }
            }
            self.index_manager.remove_index(old.indices[i]);
        }

        let carried = merged.len();
        for &candidate in candidates {
            let isolated = merged
                .positions
                .iter()
                .all(|&other| distance_sq(candidate, other) >= d_thresh);
            if isolated {
                let index = self.index_manager.get_index();
                merged.push(candidate, index, 0);
            }
        }

        log::trace!(
            "merged feature list: {} carried, {} dropped, {} added",
            carried,
            old.len() - carried,
            merged.len() - carried
        );

        self.features = merged;
        Ok(())
    }

    fn track_features(&mut self, image: &Image<u8, 1>) -> Result<(), TrackerError> {
        let previous = self
            .previous_image
            .image()
            .ok_or(TrackerError::MissingBuffers("track_features"))?;

        if self.features.is_empty() {
            // the current pyramid is not built, so it cannot be reused next frame
            self.flags.prev_pyramid_ready = false;
            return Ok(());
        }

        let FeatureSet {
            positions,
            new_positions,
            status,
            ..
        } = &mut self.features;

        self.flow.track(
            previous,
            image,
            &mut self.previous_pyramid,
            &mut self.current_pyramid,
            positions.as_slice(),
            new_positions.as_mut_slice(),
            status.as_mut_slice(),
            self.window_radius,
            self.pyramid_levels,
            self.flags,
        )?;
        self.flags.prev_pyramid_ready = true;

        Ok(())
    }

    fn calculate_vectors(&mut self, size: ImageSize) -> Result<(), TrackerError> {
        self.vectors.clear();
        if self.features.is_empty() {
            return Ok(());
        }
        try_reserve(&mut self.vectors, self.features.len(), "calculate_vectors")?;

        let features = &self.features;
        self.vectors.extend(
            (0..features.len())
                .filter(|&i| features.status[i])
                .map(|i| {
                    Vector::from_track(
                        features.positions[i],
                        features.new_positions[i],
                        size,
                        features.ages[i],
                        features.indices[i],
                    )
                }),
        );

        Ok(())
    }

    fn find_friends(&mut self) {
        self.stats = friends::find_friends(&mut self.vectors, self.max_age);
    }

    fn store_previous_image(&mut self, image: &Image<u8, 1>) -> Result<(), TrackerError> {
        self.check_images(image.size())?;
        let previous = self
            .previous_image
            .image_mut()
            .ok_or(TrackerError::MissingBuffers("store_previous_image"))?;
        previous.copy_from(image)?;
        std::mem::swap(&mut self.current_pyramid, &mut self.previous_pyramid);
        Ok(())
    }

    /// Discard every feature, vector, identifier and image buffer.
    ///
    /// The parameters are kept and numbering restarts at 1.
    pub fn reset(&mut self) {
        self.previous_image.release();
        self.current_pyramid.release();
        self.previous_pyramid.release();
        self.detector.reset();
        self.index_manager.reset();
        self.features.clear();
        self.vectors.clear();
        self.stats = FriendStats::default();
        self.flags = FlowFlags::default();
        self.image_size = None;
        self.last_error = None;
    }

    /// Select the corner detection algorithm.
    pub fn set_detector_algorithm(&mut self, algorithm: DetectorAlgorithm) {
        self.detector.set_algorithm(algorithm);
    }

    /// The corner detection algorithm.
    pub fn detector_algorithm(&self) -> DetectorAlgorithm {
        self.detector.algorithm()
    }

    /// Set the detector quality level, clamped to `[0.001, 1]`.
    pub fn set_detector_threshold(&mut self, threshold: f32) {
        self.detector.set_threshold(threshold);
    }

    /// The detector quality level.
    pub fn detector_threshold(&self) -> f32 {
        self.detector.threshold()
    }

    /// Set the minimum feature spacing as a fraction of the image width, clamped to `[0, 1]`.
    pub fn set_min_distance(&mut self, min_distance: f32) {
        self.min_distance = min_distance.clamp(0.0, 1.0);
        self.detector.set_min_distance(self.min_distance);
    }

    /// The minimum feature spacing as a fraction of the image width.
    pub fn min_distance(&self) -> f32 {
        self.min_distance
    }

    /// Set the half size of the tracking window, at least 1.
    pub fn set_window_radius(&mut self, radius: usize) {
        self.window_radius = radius.max(1);
    }

    /// The half size of the tracking window.
    pub fn window_radius(&self) -> usize {
        self.window_radius
    }

    /// Set the index of the coarsest pyramid level used for tracking.
    pub fn set_pyramid_levels(&mut self, levels: usize) {
        self.pyramid_levels = levels;
    }

    /// The index of the coarsest pyramid level used for tracking.
    pub fn pyramid_levels(&self) -> usize {
        self.pyramid_levels
    }

    /// Set the age at which features saturate and can produce good vectors.
    pub fn set_max_age(&mut self, max_age: u32) {
        self.max_age = max_age;
    }

    /// The age at which features saturate.
    pub fn max_age(&self) -> u32 {
        self.max_age
    }

    /// Number of live features.
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Number of vectors of the last frame.
    pub fn vector_count(&self) -> usize {
        self.vectors.len()
    }

    /// Number of good vectors of the last frame.
    pub fn good_vector_count(&self) -> usize {
        self.stats.good_count
    }

    /// Friend quorum of the last frame.
    pub fn max_friends(&self) -> u32 {
        self.stats.max_friends
    }

    /// Vectors of the last frame.
    pub fn vectors(&self) -> &[Vector] {
        &self.vectors
    }

    /// Vector at position `i`.
    pub fn vector_at(&self, i: usize) -> Option<&Vector> {
        self.vectors.get(i)
    }

    /// Whether the vector at position `i` is good. `false` when out of range.
    pub fn is_good_vector(&self, i: usize) -> bool {
        self.vectors
            .get(i)
            .is_some_and(|v| friends::is_good(v, self.max_age, self.stats.max_friends))
    }

    /// Good vectors of the last frame.
    pub fn good_vectors(&self) -> impl Iterator<Item = &Vector> + '_ {
        self.vectors
            .iter()
            .filter(move |v| friends::is_good(v, self.max_age, self.stats.max_friends))
    }

    /// Positions the live features were tracked from, in pixels.
    pub fn features(&self) -> &[[f32; 2]] {
        &self.features.positions
    }

    /// Position feature `i` was tracked from, in pixels.
    pub fn feature(&self, i: usize) -> Option<[f32; 2]> {
        self.features.positions.get(i).copied()
    }

    /// Tracked position of feature `i` in the last frame, in pixels.
    pub fn new_position(&self, i: usize) -> Option<[f32; 2]> {
        self.features.new_positions.get(i).copied()
    }

    /// Whether feature `i` was tracked into the last frame.
    pub fn status(&self, i: usize) -> Option<bool> {
        self.features.status.get(i).copied()
    }

    /// Stable identifier of feature `i`.
    pub fn feature_index(&self, i: usize) -> Option<u32> {
        self.features.indices.get(i).copied()
    }

    /// Age of feature `i`.
    pub fn feature_age(&self, i: usize) -> Option<u32> {
        self.features.ages.get(i).copied()
    }

    /// Copy of the last processed frame.
    pub fn previous_image(&self) -> Option<&Image<u8, 1>> {
        self.previous_image.image()
    }

    /// Size of the last frame.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    /// Message of the last failed frame, cleared by a successful one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
