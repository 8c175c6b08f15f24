#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use sparseflow_image as image;

#[doc(inline)]
pub use sparseflow_imgproc as imgproc;

#[doc(inline)]
pub use sparseflow_tracking as tracking;
