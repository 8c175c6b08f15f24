use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};
use sparseflow_image::{Image, ImageError};

use crate::filter::{dilate_3x3, spatial_gradient_3x3, SOBEL_KERNELS};

/// Parameters of [`good_features_to_track`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoodFeaturesParams {
    /// Maximum number of corners returned.
    pub max_corners: usize,
    /// Corners weaker than this fraction of the strongest response are discarded.
    pub quality_level: f32,
    /// Minimum Euclidean distance between returned corners, in pixels.
    pub min_distance: f32,
}

impl Default for GoodFeaturesParams {
    fn default() -> Self {
        Self {
            max_corners: 2048,
            quality_level: 0.01,
            min_distance: 1.0,
        }
    }
}

fn check_size(src: &Image<u8, 1>, dst: &Image<f32, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }
    Ok(())
}

/// Compute the minimum eigenvalue of the structure tensor at every pixel.
///
/// The derivatives are 3x3 Sobel on intensities scaled to [0, 1] and the
/// tensor is summed over a 3x3 block. Borders are replicated.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W).
/// * `dst` - The destination image with shape (H, W).
pub fn min_eigen_response(src: &Image<u8, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    check_size(src, dst)?;

    let (cols, rows) = (src.cols(), src.rows());
    if cols == 0 || rows == 0 {
        return Ok(());
    }

    let src_f32 = src.cast_and_scale::<f32>(1.0 / 255.0)?;
    let mut dx = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    let mut dy = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    spatial_gradient_3x3(&src_f32, &mut dx, &mut dy, &SOBEL_KERNELS)?;

    let dx_data = dx.as_slice();
    let dy_data = dy.as_slice();

    dst.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .enumerate()
        .for_each(|(row, dst_row)| {
            let row_idx = [row.saturating_sub(1), row, (row + 1).min(rows - 1)];
            for (col, dst_pixel) in dst_row.iter_mut().enumerate() {
                let col_idx = [col.saturating_sub(1), col, (col + 1).min(cols - 1)];

                let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
                for r in row_idx {
                    for cc in col_idx {
                        let idx = r * cols + cc;
                        let (ix, iy) = (dx_data[idx], dy_data[idx]);
                        a += ix * ix;
                        b += ix * iy;
                        c += iy * iy;
                    }
                }

                *dst_pixel = 0.5 * ((a + c) - ((a - c) * (a - c) + 4.0 * b * b).sqrt());
            }
        });

    Ok(())
}

/// Detect strong corners with the minimum eigenvalue criterion.
///
/// Corners are the local maxima of the response that exceed
/// `quality_level` times the strongest response. They are returned
/// strongest first, at least `min_distance` pixels apart and at most
/// `max_corners` of them. The one pixel border is never reported.
///
/// # Arguments
///
/// * `src` - The grayscale image with shape (H, W).
/// * `eig` - Scratch image with shape (H, W), receives the corner response.
/// * `tmp` - Scratch image with shape (H, W), receives the dilated response.
/// * `params` - The detection parameters.
pub fn good_features_to_track(
    src: &Image<u8, 1>,
    eig: &mut Image<f32, 1>,
    tmp: &mut Image<f32, 1>,
    params: &GoodFeaturesParams,
) -> Result<Vec<[f32; 2]>, ImageError> {
    check_size(src, eig)?;
    check_size(src, tmp)?;

    let (cols, rows) = (src.cols(), src.rows());
    if cols < 3 || rows < 3 || params.max_corners == 0 {
        return Ok(Vec::new());
    }

    min_eigen_response(src, eig)?;
    dilate_3x3(eig, tmp)?;

    let eig_data = eig.as_slice();
    let dilated = tmp.as_slice();

    let max_response = eig_data.iter().copied().fold(0.0f32, f32::max);
    if max_response <= 0.0 {
        return Ok(Vec::new());
    }
    let threshold = max_response * params.quality_level;

    let mut candidates = Vec::new();
    for y in 1..rows - 1 {
        for x in 1..cols - 1 {
            let idx = y * cols + x;
            let val = eig_data[idx];
            if val > threshold && val == dilated[idx] {
                candidates.push((val, x, y));
            }
        }
    }

    // stable, so equal responses keep raster order
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut corners = Vec::new();

    if params.min_distance < 1.0 {
        corners.extend(
            candidates
                .iter()
                .take(params.max_corners)
                .map(|&(_, x, y)| [x as f32, y as f32]),
        );
        return Ok(corners);
    }

    let cell_size = params.min_distance;
    let min_dist2 = params.min_distance * params.min_distance;
    let grid_cols = (cols as f32 / cell_size).ceil() as usize;
    let grid_rows = (rows as f32 / cell_size).ceil() as usize;
    let mut grid: Vec<Vec<[f32; 2]>> = vec![Vec::new(); grid_cols * grid_rows];

    for &(_, x, y) in &candidates {
        let point = [x as f32, y as f32];
        let gx = ((point[0] / cell_size) as usize).min(grid_cols - 1);
        let gy = ((point[1] / cell_size) as usize).min(grid_rows - 1);

        let mut isolated = true;
        'neighbors: for ny in gy.saturating_sub(1)..=(gy + 1).min(grid_rows - 1) {
            for nx in gx.saturating_sub(1)..=(gx + 1).min(grid_cols - 1) {
                for other in &grid[ny * grid_cols + nx] {
                    let dx = other[0] - point[0];
                    let dy = other[1] - point[1];
                    if dx * dx + dy * dy < min_dist2 {
                        isolated = false;
                        break 'neighbors;
                    }
                }
            }
        }

        if isolated {
            grid[gy * grid_cols + gx].push(point);
            corners.push(point);
            if corners.len() >= params.max_corners {
                break;
            }
        }
    }

    Ok(corners)
}
