use sparseflow_image::{ImageBuffer, ImageError, ImageSize};

use crate::{error::TrackerError, tracker::OpticalFlowTracker};

/// Number of values in one output record: `[x, y, x2, y2, alpha, theta, index]`.
pub const RECORD_LEN: usize = 7;

/// Age used by the adapter for every frame.
pub const HOST_MAX_AGE: u32 = 3;

/// Element type of a host matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixType {
    /// Unsigned 8 bit.
    Char,
    /// Signed 32 bit.
    Long,
    /// 32 bit float.
    Float32,
    /// 64 bit float.
    Float64,
}

/// Layout of a host matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixInfo {
    /// Number of dimensions.
    pub dim_count: usize,
    /// Extent of the first two dimensions, columns first.
    pub dims: [usize; 2],
    /// Number of planes per cell.
    pub plane_count: usize,
    /// Element type.
    pub data_type: MatrixType,
    /// Bytes between the starts of two consecutive rows.
    pub row_stride: usize,
}

impl MatrixInfo {
    /// Layout of a tightly packed single plane `u8` image.
    pub fn grayscale(cols: usize, rows: usize) -> Self {
        Self {
            dim_count: 2,
            dims: [cols, rows],
            plane_count: 1,
            data_type: MatrixType::Char,
            row_stride: cols,
        }
    }
}

/// Errors returned by [`FlowObject::matrix_calc`].
#[derive(thiserror::Error, Debug)]
pub enum HostError {
    /// The input does not have two dimensions.
    #[error("matrix_calc failed: expected 2 dimensions, got {0}")]
    MismatchDim(usize),

    /// The input does not have a single plane.
    #[error("matrix_calc failed: expected 1 plane, got {0}")]
    MismatchPlane(usize),

    /// The input elements are not `u8`.
    #[error("matrix_calc failed: expected char data, got {0:?}")]
    MismatchType(MatrixType),

    /// The input data is missing or shorter than its layout.
    #[error("matrix_calc failed: {0}")]
    InvalidInput(String),

    /// The tracker could not process the frame.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// The input could not be copied into a frame.
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Adapter exposing the tracker as a host matrix operator.
///
/// The attributes are pushed into the tracker on every frame, so changes
/// made between frames take effect on the next one.
#[derive(Debug)]
pub struct FlowObject {
    tracker: OpticalFlowTracker,
    frame: ImageBuffer<u8, 1>,
    threshold: f64,
    distance: f32,
    radius: i64,
}

impl Default for FlowObject {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowObject {
    /// Create an operator with the default attributes.
    pub fn new() -> Self {
        Self {
            tracker: OpticalFlowTracker::new(),
            frame: ImageBuffer::new(),
            threshold: 0.01,
            distance: 0.01,
            radius: 7,
        }
    }

    /// Set the detector threshold, clipped to `[0, 1]`.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold.clamp(0.0, 1.0);
    }

    /// The detector threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Set the minimum feature distance, clipped to be non negative.
    pub fn set_distance(&mut self, distance: f32) {
        self.distance = distance.max(0.0);
    }

    /// The minimum feature distance.
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Set the tracking window radius, clipped to at least 1.
    pub fn set_radius(&mut self, radius: i64) {
        self.radius = radius.max(1);
    }

    /// The tracking window radius.
    pub fn radius(&self) -> i64 {
        self.radius
    }

    /// The wrapped tracker.
    pub fn tracker(&self) -> &OpticalFlowTracker {
        &self.tracker
    }

    /// Forget every feature.
    pub fn reset(&mut self) {
        self.tracker.reset();
    }

    /// Process one input matrix and return one record per good vector.
    ///
    /// Inputs with a dimension smaller than 2 are skipped and produce no
    /// records.
    pub fn matrix_calc(
        &mut self,
        info: &MatrixInfo,
        data: Option<&[u8]>,
    ) -> Result<Vec<[f32; RECORD_LEN]>, HostError> {
        if info.dim_count != 2 {
            return Err(HostError::MismatchDim(info.dim_count));
        }
        if info.plane_count != 1 {
            return Err(HostError::MismatchPlane(info.plane_count));
        }
        if info.data_type != MatrixType::Char {
            return Err(HostError::MismatchType(info.data_type));
        }

        let [cols, rows] = info.dims;
        if cols < 2 || rows < 2 {
            return Ok(Vec::new());
        }

        let data = data.ok_or_else(|| HostError::InvalidInput("no input data".to_string()))?;
        self.load_frame(info, data)?;

        self.tracker.set_detector_threshold(self.threshold as f32);
        self.tracker.set_min_distance(self.distance);
        self.tracker
            .set_window_radius(usize::try_from(self.radius).unwrap_or(1));
        self.tracker.set_max_age(HOST_MAX_AGE);

        let frame = self
            .frame
            .image()
            .ok_or_else(|| HostError::InvalidInput("frame is not allocated".to_string()))?;
        self.tracker.process_frame(frame)?;

        Ok(self
            .tracker
            .good_vectors()
            .map(|v| [v.x, v.y, v.x2, v.y2, v.alpha, v.theta, v.index as f32])
            .collect())
    }

    fn load_frame(&mut self, info: &MatrixInfo, data: &[u8]) -> Result<(), HostError> {
        let [cols, rows] = info.dims;
        if info.row_stride < cols {
            return Err(HostError::InvalidInput(format!(
                "row stride {} is smaller than the width {cols}",
                info.row_stride
            )));
        }
        let needed = (rows - 1) * info.row_stride + cols;
        if data.len() < needed {
            return Err(HostError::InvalidInput(format!(
                "expected at least {needed} bytes, got {}",
                data.len()
            )));
        }

        self.frame.ensure_size(ImageSize::from([cols, rows]), 0)?;
        let Some(frame) = self.frame.image_mut() else {
            return Err(HostError::InvalidInput("frame is not allocated".to_string()));
        };
        frame
            .as_slice_mut()
            .chunks_exact_mut(cols)
            .zip(data.chunks(info.row_stride))
            .for_each(|(dst, src)| dst.copy_from_slice(&src[..cols]));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_clipped() {
        let mut object = FlowObject::new();
        assert_eq!(object.threshold(), 0.01);
        assert_eq!(object.distance(), 0.01);
        assert_eq!(object.radius(), 7);

        object.set_threshold(3.0);
        assert_eq!(object.threshold(), 1.0);
        object.set_threshold(-3.0);
        assert_eq!(object.threshold(), 0.0);
        object.set_distance(-0.5);
        assert_eq!(object.distance(), 0.0);
        object.set_distance(2.0);
        assert_eq!(object.distance(), 2.0);
        object.set_radius(0);
        assert_eq!(object.radius(), 1);
    }

    #[test]
    fn rejects_bad_layouts() {
        let mut object = FlowObject::new();
        let data = vec![0u8; 16];

        let info = MatrixInfo {
            dim_count: 3,
            ..MatrixInfo::grayscale(4, 4)
        };
        assert!(matches!(
            object.matrix_calc(&info, Some(&data)),
            Err(HostError::MismatchDim(3))
        ));

        let info = MatrixInfo {
            plane_count: 4,
            ..MatrixInfo::grayscale(4, 4)
        };
        assert!(matches!(
            object.matrix_calc(&info, Some(&data)),
            Err(HostError::MismatchPlane(4))
        ));

        let info = MatrixInfo {
            data_type: MatrixType::Float32,
            ..MatrixInfo::grayscale(4, 4)
        };
        assert!(matches!(
            object.matrix_calc(&info, Some(&data)),
            Err(HostError::MismatchType(MatrixType::Float32))
        ));

        let info = MatrixInfo::grayscale(4, 4);
        assert!(matches!(
            object.matrix_calc(&info, None),
            Err(HostError::InvalidInput(_))
        ));
        assert!(matches!(
            object.matrix_calc(&info, Some(&data[..10])),
            Err(HostError::InvalidInput(_))
        ));
    }

    #[test]
    fn tiny_inputs_are_skipped() -> Result<(), HostError> {
        let mut object = FlowObject::new();
        let records = object.matrix_calc(&MatrixInfo::grayscale(1, 8), None)?;
        assert!(records.is_empty());
        assert!(object.tracker().image_size().is_none());
        Ok(())
    }

    #[test]
    fn strided_input_pushes_attributes() -> Result<(), HostError> {
        let mut object = FlowObject::new();
        object.set_radius(4);
        object.set_threshold(0.5);

        // 4x3 image stored with two bytes of padding per row
        let data = [
            1, 2, 3, 4, 0, 0, //
            5, 6, 7, 8, 0, 0, //
            9, 10, 11, 12,
        ];
        let info = MatrixInfo {
            row_stride: 6,
            ..MatrixInfo::grayscale(4, 3)
        };
        let records = object.matrix_calc(&info, Some(&data))?;
        assert!(records.is_empty());

        let tracker = object.tracker();
        assert_eq!(tracker.window_radius(), 4);
        assert_eq!(tracker.detector_threshold(), 0.5);
        assert_eq!(tracker.max_age(), HOST_MAX_AGE);
        let previous = tracker.previous_image().map(|img| img.as_slice().to_vec());
        assert_eq!(previous, Some((1..=12).collect::<Vec<u8>>()));

        object.reset();
        assert!(object.tracker().previous_image().is_none());
        Ok(())
    }
}
