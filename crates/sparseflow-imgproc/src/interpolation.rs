use sparseflow_image::Image;

/// Sample a single channel image at a fractional location.
///
/// The location is clamped to the image domain so samples outside the image
/// replicate the nearest border pixel.
///
/// PRECONDITION: the image must not be empty.
pub fn bilinear(image: &Image<f32, 1>, u: f32, v: f32) -> f32 {
    let (cols, rows) = (image.cols(), image.rows());
    let max_u = (cols - 1) as f32;
    let max_v = (rows - 1) as f32;

    let u = u.clamp(0.0, max_u);
    let v = v.clamp(0.0, max_v);

    let iu = u.trunc() as usize;
    let iv = v.trunc() as usize;

    let frac_u = u - iu as f32;
    let frac_v = v - iv as f32;

    let iu1 = (iu + 1).min(cols - 1);
    let iv1 = (iv + 1).min(rows - 1);

    let data = image.as_slice();
    let val00 = data[iv * cols + iu];
    let val01 = data[iv * cols + iu1];
    let val10 = data[iv1 * cols + iu];
    let val11 = data[iv1 * cols + iu1];

    val00 * (1.0 - frac_u) * (1.0 - frac_v)
        + val01 * frac_u * (1.0 - frac_v)
        + val10 * (1.0 - frac_u) * frac_v
        + val11 * frac_u * frac_v
}
