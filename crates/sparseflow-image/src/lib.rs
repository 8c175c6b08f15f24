#![deny(missing_docs)]
//! Image types for feeding grayscale frames through the sparse flow pipeline.

/// image representation for computer vision purposes.
pub mod image;

/// resizable image storage that reallocates only on size changes.
pub mod buffer;

/// Error types for the image module.
pub mod error;

pub use crate::buffer::ImageBuffer;
pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
