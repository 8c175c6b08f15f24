#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// corner response and good-features-to-track selection.
pub mod corners;

/// image gradient filters.
pub mod filter;

/// utilities for interpolation.
pub mod interpolation;

/// sparse pyramidal Lucas-Kanade optical flow.
pub mod optical_flow;

/// Pyramid operations
pub mod pyramid;
