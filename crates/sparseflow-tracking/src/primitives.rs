use sparseflow_image::{Image, ImageError};
use sparseflow_imgproc::{
    corners::{good_features_to_track, GoodFeaturesParams},
    optical_flow::{calc_optical_flow_pyr_lk, PyrLkParams},
    pyramid::Pyramid,
};

/// Finds strong corners in a grayscale image.
pub trait CornerDetector {
    /// Return up to `max_corners` corners of `image`, strongest first.
    ///
    /// `eig` and `tmp` are scratch images of the same size as `image`.
    /// `threshold` is the quality level relative to the strongest corner and
    /// `min_distance` the minimum spacing between corners in pixels.
    fn detect(
        &mut self,
        image: &Image<u8, 1>,
        eig: &mut Image<f32, 1>,
        tmp: &mut Image<f32, 1>,
        max_corners: usize,
        threshold: f32,
        min_distance: f32,
    ) -> Result<Vec<[f32; 2]>, ImageError>;
}

/// Minimum eigenvalue corners, see [`good_features_to_track`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EigenCorners;

impl CornerDetector for EigenCorners {
    fn detect(
        &mut self,
        image: &Image<u8, 1>,
        eig: &mut Image<f32, 1>,
        tmp: &mut Image<f32, 1>,
        max_corners: usize,
        threshold: f32,
        min_distance: f32,
    ) -> Result<Vec<[f32; 2]>, ImageError> {
        let params = GoodFeaturesParams {
            max_corners,
            quality_level: threshold,
            min_distance,
        };
        good_features_to_track(image, eig, tmp, &params)
    }
}

/// State shared between consecutive calls of a [`SparseOpticalFlow`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowFlags {
    /// The previous pyramid already holds the pyramid of the previous image.
    pub prev_pyramid_ready: bool,
}

/// Tracks points from one image into the next.
pub trait SparseOpticalFlow {
    /// Track `points` from `prev_image` into `curr_image`.
    ///
    /// On return `new_points[i]` holds the tracked position of `points[i]`
    /// and `status[i]` tells whether it was found. The pyramids are scratch
    /// space owned by the caller; `flags` tells whether `prev_pyramid` can be
    /// reused as is.
    #[allow(clippy::too_many_arguments)]
    fn track(
        &mut self,
        prev_image: &Image<u8, 1>,
        curr_image: &Image<u8, 1>,
        prev_pyramid: &mut Pyramid,
        curr_pyramid: &mut Pyramid,
        points: &[[f32; 2]],
        new_points: &mut [[f32; 2]],
        status: &mut [bool],
        window_radius: usize,
        pyramid_levels: usize,
        flags: FlowFlags,
    ) -> Result<(), ImageError>;
}

/// Pyramidal Lucas-Kanade, see [`calc_optical_flow_pyr_lk`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidalLk {
    /// Maximum number of iterations per pyramid level.
    pub max_iterations: usize,
    /// Convergence threshold on the update length, in pixels.
    pub epsilon: f32,
    /// Minimum normalized eigenvalue of the window gradient matrix.
    pub min_eigen_threshold: f32,
}

impl Default for PyramidalLk {
    fn default() -> Self {
        let params = PyrLkParams::default();
        Self {
            max_iterations: params.max_iterations,
            epsilon: params.epsilon,
            min_eigen_threshold: params.min_eigen_threshold,
        }
    }
}

impl SparseOpticalFlow for PyramidalLk {
    fn track(
        &mut self,
        prev_image: &Image<u8, 1>,
        curr_image: &Image<u8, 1>,
        prev_pyramid: &mut Pyramid,
        curr_pyramid: &mut Pyramid,
        points: &[[f32; 2]],
        new_points: &mut [[f32; 2]],
        status: &mut [bool],
        window_radius: usize,
        pyramid_levels: usize,
        flags: FlowFlags,
    ) -> Result<(), ImageError> {
        // levels smaller than the window carry no information
        let min_size = window_radius + 1;

        if !flags.prev_pyramid_ready
            || prev_pyramid.base_size() != Some(prev_image.size())
            || prev_pyramid.num_levels() == 0
        {
            prev_pyramid.build(prev_image, pyramid_levels, min_size)?;
        }
        curr_pyramid.build(curr_image, pyramid_levels, min_size)?;

        let params = PyrLkParams {
            window_radius,
            max_level: pyramid_levels,
            max_iterations: self.max_iterations,
            epsilon: self.epsilon,
            min_eigen_threshold: self.min_eigen_threshold,
        };

        calc_optical_flow_pyr_lk(prev_pyramid, curr_pyramid, points, new_points, status, &params)
    }
}
