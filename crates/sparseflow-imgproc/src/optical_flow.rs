use rayon::iter::{
    IndexedParallelIterator, IntoParallelRefIterator, IntoParallelRefMutIterator, ParallelIterator,
};
use sparseflow_image::ImageError;

use crate::interpolation::bilinear;
use crate::pyramid::{Pyramid, PyramidLevel};

/// Parameters of the sparse pyramidal Lucas-Kanade tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyrLkParams {
    /// Half size of the square integration window, which spans `2 * radius + 1` pixels.
    pub window_radius: usize,
    /// Index of the coarsest pyramid level to use.
    pub max_level: usize,
    /// Maximum number of Gauss-Newton iterations per level.
    pub max_iterations: usize,
    /// Iterations stop once the update is shorter than this, in pixels.
    pub epsilon: f32,
    /// Points whose window has a smaller normalized minimum eigenvalue are lost.
    pub min_eigen_threshold: f32,
}

impl Default for PyrLkParams {
    fn default() -> Self {
        Self {
            window_radius: 10,
            max_level: 3,
            max_iterations: 20,
            epsilon: 0.03,
            min_eigen_threshold: 1e-4,
        }
    }
}

/// Window samples of the previous image around a point.
struct Patch {
    intensity: Vec<f32>,
    grad_x: Vec<f32>,
    grad_y: Vec<f32>,
}

impl Patch {
    fn with_capacity(len: usize) -> Self {
        Self {
            intensity: Vec::with_capacity(len),
            grad_x: Vec::with_capacity(len),
            grad_y: Vec::with_capacity(len),
        }
    }

    fn sample(&mut self, level: &PyramidLevel<'_>, x: f32, y: f32, radius: isize) {
        self.intensity.clear();
        self.grad_x.clear();
        self.grad_y.clear();
        for wy in -radius..=radius {
            for wx in -radius..=radius {
                let (px, py) = (x + wx as f32, y + wy as f32);
                self.intensity.push(bilinear(level.image, px, py));
                self.grad_x.push(bilinear(level.grad_x, px, py));
                self.grad_y.push(bilinear(level.grad_y, px, py));
            }
        }
    }

    /// Spatial gradient matrix `[gxx, gxy, gyy]`.
    fn structure_tensor(&self) -> [f32; 3] {
        self.grad_x
            .iter()
            .zip(self.grad_y.iter())
            .fold([0.0; 3], |[gxx, gxy, gyy], (&ix, &iy)| {
                [gxx + ix * ix, gxy + ix * iy, gyy + iy * iy]
            })
    }
}

fn track_point(
    prev: &Pyramid,
    curr: &Pyramid,
    num_levels: usize,
    point: [f32; 2],
    params: &PyrLkParams,
) -> Option<[f32; 2]> {
    let radius = params.window_radius as isize;
    let window_len = (2 * params.window_radius + 1).pow(2);
    let window_area = window_len as f32;
    let eps2 = params.epsilon * params.epsilon;

    let mut patch = Patch::with_capacity(window_len);
    let mut guess = [0.0f32; 2];

    for level_idx in (0..num_levels).rev() {
        let prev_level = prev.level(level_idx)?;
        let curr_level = curr.level(level_idx)?;

        let scale = 1.0 / (1u32 << level_idx) as f32;
        let (x, y) = (point[0] * scale, point[1] * scale);

        patch.sample(&prev_level, x, y, radius);
        let [gxx, gxy, gyy] = patch.structure_tensor();

        let det = gxx * gyy - gxy * gxy;
        let disc = ((gxx - gyy) * (gxx - gyy) + 4.0 * gxy * gxy).sqrt();
        let min_eig = (gxx + gyy - disc) / (2.0 * window_area);
        if min_eig < params.min_eigen_threshold || det.abs() < f32::EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let mut flow = guess;
        for _ in 0..params.max_iterations {
            let (qx, qy) = (x + flow[0], y + flow[1]);

            let mut bx = 0.0f32;
            let mut by = 0.0f32;
            let mut k = 0;
            for wy in -radius..=radius {
                for wx in -radius..=radius {
                    let i1 = bilinear(curr_level.image, qx + wx as f32, qy + wy as f32);
                    let diff = patch.intensity[k] - i1;
                    bx += patch.grad_x[k] * diff;
                    by += patch.grad_y[k] * diff;
                    k += 1;
                }
            }

            let delta_x = inv_det * (gyy * bx - gxy * by);
            let delta_y = inv_det * (gxx * by - gxy * bx);
            flow[0] += delta_x;
            flow[1] += delta_y;

            if delta_x * delta_x + delta_y * delta_y < eps2 {
                break;
            }
        }

        if !(flow[0].is_finite() && flow[1].is_finite()) {
            return None;
        }

        guess = if level_idx > 0 {
            [2.0 * flow[0], 2.0 * flow[1]]
        } else {
            flow
        };
    }

    let next = [point[0] + guess[0], point[1] + guess[1]];
    let size = curr.base_size()?;
    let inside = next[0] >= 0.0
        && next[1] >= 0.0
        && next[0] <= (size.width - 1) as f32
        && next[1] <= (size.height - 1) as f32;

    inside.then_some(next)
}

/// Track sparse points between two images with pyramidal Lucas-Kanade.
///
/// Both pyramids must already be built. The number of levels used is the
/// smallest of the two pyramid depths and `params.max_level + 1`.
///
/// # Arguments
///
/// * `prev_pyr` - The pyramid of the image the points were found in.
/// * `curr_pyr` - The pyramid of the image to track the points into.
/// * `prev_pts` - The points to track, in pixels.
/// * `next_pts` - The tracked position of each point. Untouched where tracking fails.
/// * `status` - `true` where the point was tracked.
/// * `params` - The tracking parameters.
pub fn calc_optical_flow_pyr_lk(
    prev_pyr: &Pyramid,
    curr_pyr: &Pyramid,
    prev_pts: &[[f32; 2]],
    next_pts: &mut [[f32; 2]],
    status: &mut [bool],
    params: &PyrLkParams,
) -> Result<(), ImageError> {
    if next_pts.len() != prev_pts.len() || status.len() != prev_pts.len() {
        return Err(ImageError::InvalidInput(format!(
            "expected {} output points and statuses, got {} and {}",
            prev_pts.len(),
            next_pts.len(),
            status.len()
        )));
    }

    let num_levels = prev_pyr
        .num_levels()
        .min(curr_pyr.num_levels())
        .min(params.max_level + 1);
    if num_levels == 0 {
        return Err(ImageError::InvalidInput(
            "optical flow needs built pyramids".to_string(),
        ));
    }

    if prev_pyr.base_size() != curr_pyr.base_size() {
        let (prev_size, curr_size) = (
            prev_pyr.base_size().unwrap_or_default(),
            curr_pyr.base_size().unwrap_or_default(),
        );
        return Err(ImageError::InvalidImageSize(
            prev_size.width,
            prev_size.height,
            curr_size.width,
            curr_size.height,
        ));
    }

    next_pts
        .par_iter_mut()
        .zip(status.par_iter_mut())
        .zip(prev_pts.par_iter())
        .for_each(|((next, ok), &point)| {
            match track_point(prev_pyr, curr_pyr, num_levels, point, params) {
                Some(tracked) => {
                    *next = tracked;
                    *ok = true;
                }
                None => *ok = false,
            }
        });

    Ok(())
}
