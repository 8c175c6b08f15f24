use crate::{error::ImageError, image::Image, image::ImageSize};

/// Scratch image storage that is lazily allocated and reallocated only when the
/// requested size changes.
///
/// A buffer is either unallocated or holds an image of exactly the size requested
/// by the last successful [`ImageBuffer::ensure_size`] call. A stale image is
/// dropped before the new one is allocated, and a failed allocation leaves the
/// buffer unallocated.
///
/// # Examples
///
/// ```
/// use sparseflow_image::ImageBuffer;
///
/// let mut buffer = ImageBuffer::<f32, 1>::new();
/// assert!(!buffer.is_allocated());
///
/// assert!(buffer.ensure_size([8, 4].into(), 0.0).unwrap());
/// assert!(!buffer.ensure_size([8, 4].into(), 0.0).unwrap());
/// assert!(buffer.ensure_size([16, 4].into(), 0.0).unwrap());
/// ```
#[derive(Clone, Debug)]
pub struct ImageBuffer<T, const CHANNELS: usize> {
    image: Option<Image<T, CHANNELS>>,
}

impl<T, const CHANNELS: usize> Default for ImageBuffer<T, CHANNELS> {
    fn default() -> Self {
        Self { image: None }
    }
}

impl<T: Clone, const CHANNELS: usize> ImageBuffer<T, CHANNELS> {
    /// Create an unallocated buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure the buffer holds an image of the given size.
    ///
    /// Returns `true` if the buffer was (re)allocated, in which case every pixel is
    /// set to `fill`, and `false` if the existing image already had the right size
    /// and was left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::AllocationFailed`] if the storage cannot be reserved.
    pub fn ensure_size(&mut self, size: ImageSize, fill: T) -> Result<bool, ImageError> {
        if self.size() == Some(size) {
            return Ok(false);
        }

        self.image = None;
        self.image = Some(Image::from_size_val(size, fill)?);

        Ok(true)
    }
}

impl<T, const CHANNELS: usize> ImageBuffer<T, CHANNELS> {
    /// Drop the held image, if any.
    pub fn release(&mut self) {
        self.image = None;
    }

    /// Whether the buffer currently holds an image.
    pub fn is_allocated(&self) -> bool {
        self.image.is_some()
    }

    /// Size of the held image.
    pub fn size(&self) -> Option<ImageSize> {
        self.image.as_ref().map(|img| img.size())
    }

    /// The held image.
    pub fn image(&self) -> Option<&Image<T, CHANNELS>> {
        self.image.as_ref()
    }

    /// The held image, mutably.
    pub fn image_mut(&mut self) -> Option<&mut Image<T, CHANNELS>> {
        self.image.as_mut()
    }
}
