use sparseflow_image::ImageError;

/// Errors raised by the [`FeatureDetector`](crate::detector::FeatureDetector).
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// A scratch buffer could not be allocated.
    #[error("FeatureDetector::adjust_scratch_size failed: {what}")]
    Allocation {
        /// Name of the buffer.
        what: &'static str,
        /// The underlying allocation error.
        #[source]
        source: ImageError,
    },

    /// The corner detector rejected its input.
    #[error("FeatureDetector::find_features failed: {0}")]
    Detection(#[source] ImageError),
}

/// Errors raised while processing a frame.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The frame has no pixels.
    #[error("OpticalFlowTracker::set_image failed: empty image")]
    MissingImage,

    /// A pipeline step ran without the image buffers it needs.
    #[error("OpticalFlowTracker::{0} failed: missing image buffers")]
    MissingBuffers(&'static str),

    /// A tracker buffer could not be allocated.
    #[error("OpticalFlowTracker::{what} failed: {source}")]
    Allocation {
        /// The step that allocated.
        what: &'static str,
        /// The underlying allocation error.
        #[source]
        source: ImageError,
    },

    /// Error reported by the feature detector.
    #[error(transparent)]
    Detector(#[from] DetectorError),

    /// Error related to image processing.
    #[error(transparent)]
    Image(#[from] ImageError),
}
