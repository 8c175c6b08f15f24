#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// tracker configuration.
pub mod config;

/// corner candidate detection with double buffering.
pub mod detector;

/// error types for the tracking crate.
pub mod error;

pub mod friends;

/// adapter for host matrix operators.
pub mod host;

/// recycled feature identifiers.
pub mod index;

/// corner detection and optical flow seams.
pub mod primitives;

/// the frame to frame tracker.
pub mod tracker;

/// motion vectors and the fast atan2 approximation.
pub mod vector;

pub use crate::config::TrackerConfig;
pub use crate::detector::{DetectorAlgorithm, FeatureDetector};
pub use crate::error::{DetectorError, TrackerError};
pub use crate::index::IndexManager;
pub use crate::primitives::{
    CornerDetector, EigenCorners, FlowFlags, PyramidalLk, SparseOpticalFlow,
};
pub use crate::tracker::OpticalFlowTracker;
pub use crate::vector::Vector;
