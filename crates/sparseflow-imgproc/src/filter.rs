use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};
use sparseflow_image::{Image, ImageError};

/// Normalized 3x3 Sobel kernels, (d/dx, d/dy).
pub const SOBEL_KERNELS: ([[f32; 3]; 3], [[f32; 3]; 3]) = (
    [
        [-1.0 / 8.0, 0.0, 1.0 / 8.0],
        [-2.0 / 8.0, 0.0, 2.0 / 8.0],
        [-1.0 / 8.0, 0.0, 1.0 / 8.0],
    ],
    [
        [-1.0 / 8.0, -2.0 / 8.0, -1.0 / 8.0],
        [0.0, 0.0, 0.0],
        [1.0 / 8.0, 2.0 / 8.0, 1.0 / 8.0],
    ],
);

/// Normalized 3x3 Scharr kernels, (d/dx, d/dy).
///
/// ref https://theailearner.com/tag/scharr-operator/
pub const SCHARR_KERNELS: ([[f32; 3]; 3], [[f32; 3]; 3]) = (
    [
        [-3.0 / 32.0, 0.0, 3.0 / 32.0],
        [-10.0 / 32.0, 0.0, 10.0 / 32.0],
        [-3.0 / 32.0, 0.0, 3.0 / 32.0],
    ],
    [
        [-3.0 / 32.0, -10.0 / 32.0, -3.0 / 32.0],
        [0.0, 0.0, 0.0],
        [3.0 / 32.0, 10.0 / 32.0, 3.0 / 32.0],
    ],
);

/// Compute the x and y derivatives of an image with a pair of 3x3 kernels.
///
/// Borders are handled by replicating the edge pixels.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W).
/// * `dx` - The destination for the x derivative with shape (H, W).
/// * `dy` - The destination for the y derivative with shape (H, W).
/// * `kernels` - The (x, y) kernels, e.g. [`SOBEL_KERNELS`] or [`SCHARR_KERNELS`].
///
/// PRECONDITION: `src`, `dx` and `dy` must have the same shape.
pub fn spatial_gradient_3x3(
    src: &Image<f32, 1>,
    dx: &mut Image<f32, 1>,
    dy: &mut Image<f32, 1>,
    kernels: &([[f32; 3]; 3], [[f32; 3]; 3]),
) -> Result<(), ImageError> {
    for dst in [&*dx, &*dy] {
        if dst.size() != src.size() {
            return Err(ImageError::InvalidImageSize(
                src.cols(),
                src.rows(),
                dst.cols(),
                dst.rows(),
            ));
        }
    }

    let (cols, rows) = (src.cols(), src.rows());
    if cols == 0 || rows == 0 {
        return Ok(());
    }

    let src_data = src.as_slice();
    let (kernel_x, kernel_y) = kernels;

    dx.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .zip(dy.as_slice_mut().par_chunks_exact_mut(cols))
        .enumerate()
        .for_each(|(row, (dx_row, dy_row))| {
            let row_idx = [row.saturating_sub(1), row, (row + 1).min(rows - 1)];
            for col in 0..cols {
                let col_idx = [col.saturating_sub(1), col, (col + 1).min(cols - 1)];
                let mut sum_x = 0.0;
                let mut sum_y = 0.0;
                for (ky, &r) in row_idx.iter().enumerate() {
                    let src_row = &src_data[r * cols..(r + 1) * cols];
                    for (kx, &c) in col_idx.iter().enumerate() {
                        let val = src_row[c];
                        sum_x += val * kernel_x[ky][kx];
                        sum_y += val * kernel_y[ky][kx];
                    }
                }
                dx_row[col] = sum_x;
                dy_row[col] = sum_y;
            }
        });

    Ok(())
}

/// Grayscale dilation with a 3x3 square structuring element.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn dilate_3x3(src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let (cols, rows) = (src.cols(), src.rows());
    if cols == 0 || rows == 0 {
        return Ok(());
    }

    let src_data = src.as_slice();

    dst.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .enumerate()
        .for_each(|(row, dst_row)| {
            let r0 = row.saturating_sub(1);
            let r1 = (row + 1).min(rows - 1);
            for (col, dst_pixel) in dst_row.iter_mut().enumerate() {
                let c0 = col.saturating_sub(1);
                let c1 = (col + 1).min(cols - 1);
                let mut max = f32::MIN;
                for r in r0..=r1 {
                    for &val in &src_data[r * cols + c0..=r * cols + c1] {
                        max = max.max(val);
                    }
                }
                *dst_pixel = max;
            }
        });

    Ok(())
}
