use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};
use sparseflow_image::{Image, ImageBuffer, ImageError, ImageSize};

use crate::filter::{spatial_gradient_3x3, SCHARR_KERNELS};

/// 5-tap binomial approximation of a Gaussian with sigma close to 1.
const PYRDOWN_KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Size of the image produced by [`pyrdown`] for a source of the given size.
pub fn pyrdown_size(size: ImageSize) -> ImageSize {
    ImageSize {
        width: size.width.div_ceil(2),
        height: size.height.div_ceil(2),
    }
}

fn filter_at(line: &[f32], center: isize) -> f32 {
    let last = line.len() as isize - 1;
    PYRDOWN_KERNEL
        .iter()
        .enumerate()
        .map(|(k, w)| {
            let idx = (center + k as isize - 2).clamp(0, last) as usize;
            line[idx] * w
        })
        .sum()
}

/// Blur an image with a 5x5 Gaussian kernel and downsample it by a factor of two.
///
/// The output keeps every second pixel of the blurred image, starting at the
/// first one. Borders are replicated.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W).
/// * `dst` - The destination image with shape ((H + 1) / 2, (W + 1) / 2).
pub fn pyrdown(src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    let expected = pyrdown_size(src.size());
    if dst.size() != expected {
        return Err(ImageError::InvalidImageSize(
            expected.width,
            expected.height,
            dst.cols(),
            dst.rows(),
        ));
    }

    let (src_cols, src_rows) = (src.cols(), src.rows());
    let dst_cols = dst.cols();
    if dst_cols == 0 || dst.rows() == 0 {
        return Ok(());
    }

    // horizontal pass, decimating the columns
    let mut horizontal = Image::<f32, 1>::from_size_val([dst_cols, src_rows].into(), 0.0)?;
    let src_data = src.as_slice();
    horizontal
        .as_slice_mut()
        .par_chunks_exact_mut(dst_cols)
        .enumerate()
        .for_each(|(row, out_row)| {
            let line = &src_data[row * src_cols..(row + 1) * src_cols];
            for (col, out) in out_row.iter_mut().enumerate() {
                *out = filter_at(line, 2 * col as isize);
            }
        });

    // vertical pass, decimating the rows
    let last_row = src_rows as isize - 1;
    let horizontal_data = horizontal.as_slice();
    dst.as_slice_mut()
        .par_chunks_exact_mut(dst_cols)
        .enumerate()
        .for_each(|(row, out_row)| {
            let center = 2 * row as isize;
            out_row.fill(0.0);
            for (k, w) in PYRDOWN_KERNEL.iter().enumerate() {
                let r = (center + k as isize - 2).clamp(0, last_row) as usize;
                let line = &horizontal_data[r * dst_cols..(r + 1) * dst_cols];
                out_row
                    .iter_mut()
                    .zip(line.iter())
                    .for_each(|(out, &val)| *out += val * w);
            }
        });

    Ok(())
}

#[derive(Clone, Debug, Default)]
struct LevelStorage {
    image: ImageBuffer<f32, 1>,
    grad_x: ImageBuffer<f32, 1>,
    grad_y: ImageBuffer<f32, 1>,
}

impl LevelStorage {
    fn ensure_size(&mut self, size: ImageSize) -> Result<(), ImageError> {
        self.image.ensure_size(size, 0.0)?;
        self.grad_x.ensure_size(size, 0.0)?;
        self.grad_y.ensure_size(size, 0.0)?;
        Ok(())
    }

    fn compute_gradients(&mut self) -> Result<(), ImageError> {
        let (Some(image), Some(grad_x), Some(grad_y)) = (
            self.image.image(),
            self.grad_x.image_mut(),
            self.grad_y.image_mut(),
        ) else {
            return Err(ImageError::InvalidInput(
                "pyramid level is not allocated".to_string(),
            ));
        };
        spatial_gradient_3x3(image, grad_x, grad_y, &SCHARR_KERNELS)
    }
}

/// A borrowed view of one pyramid level.
#[derive(Clone, Copy, Debug)]
pub struct PyramidLevel<'a> {
    /// The level image, in intensity units of the source.
    pub image: &'a Image<f32, 1>,
    /// Horizontal Scharr derivative of the level image.
    pub grad_x: &'a Image<f32, 1>,
    /// Vertical Scharr derivative of the level image.
    pub grad_y: &'a Image<f32, 1>,
}

/// A Gaussian image pyramid with per-level gradients.
///
/// Level 0 is the full resolution image. The level buffers are kept between
/// builds and reallocated only when the source size changes.
#[derive(Clone, Debug, Default)]
pub struct Pyramid {
    levels: Vec<LevelStorage>,
    num_levels: usize,
}

impl Pyramid {
    /// Create an empty pyramid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the pyramid of `src`.
    ///
    /// # Arguments
    ///
    /// * `src` - The full resolution grayscale image.
    /// * `max_level` - Index of the coarsest level to build.
    /// * `min_size` - Coarser levels are not built once either side would be smaller than this.
    ///
    /// Returns the number of levels built, at least one for a non empty source.
    pub fn build(
        &mut self,
        src: &Image<u8, 1>,
        max_level: usize,
        min_size: usize,
    ) -> Result<usize, ImageError> {
        self.num_levels = 0;
        if src.cols() == 0 || src.rows() == 0 {
            return Err(ImageError::InvalidInput(format!(
                "cannot build a pyramid of an empty image: {}",
                src.size()
            )));
        }

        let mut sizes = vec![src.size()];
        while sizes.len() <= max_level {
            let next = pyrdown_size(sizes[sizes.len() - 1]);
            if next.width < min_size.max(1) || next.height < min_size.max(1) {
                break;
            }
            sizes.push(next);
        }

        if self.levels.len() < sizes.len() {
            self.levels.resize_with(sizes.len(), LevelStorage::default);
        }

        for (storage, size) in self.levels.iter_mut().zip(sizes.iter()) {
            storage.ensure_size(*size)?;
        }

        if let Some(base) = self.levels[0].image.image_mut() {
            base.as_slice_mut()
                .iter_mut()
                .zip(src.as_slice())
                .for_each(|(dst, &val)| *dst = val as f32);
        }

        for level in 1..sizes.len() {
            let (head, tail) = self.levels.split_at_mut(level);
            let (Some(finer), Some(coarser)) = (
                head[level - 1].image.image(),
                tail[0].image.image_mut(),
            ) else {
                return Err(ImageError::InvalidInput(
                    "pyramid level is not allocated".to_string(),
                ));
            };
            pyrdown(finer, coarser)?;
        }

        for storage in self.levels.iter_mut().take(sizes.len()) {
            storage.compute_gradients()?;
        }

        self.num_levels = sizes.len();

        Ok(self.num_levels)
    }

    /// Number of levels produced by the last successful build.
    pub fn num_levels(&self) -> usize {
        self.num_levels
    }

    /// Size of the full resolution level, if the pyramid was built.
    pub fn base_size(&self) -> Option<ImageSize> {
        if self.num_levels == 0 {
            return None;
        }
        self.levels.first().and_then(|storage| storage.image.size())
    }

    /// Borrow one level, or `None` past the last built level.
    pub fn level(&self, index: usize) -> Option<PyramidLevel<'_>> {
        if index >= self.num_levels {
            return None;
        }
        let storage = self.levels.get(index)?;
        Some(PyramidLevel {
            image: storage.image.image()?,
            grad_x: storage.grad_x.image()?,
            grad_y: storage.grad_y.image()?,
        })
    }

    /// Drop every level buffer.
    pub fn release(&mut self) {
        self.levels.clear();
        self.num_levels = 0;
    }
}
