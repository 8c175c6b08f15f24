use serde::{Deserialize, Serialize};
use sparseflow_image::ImageSize;

const ATAN2_P1: f32 = 0.999_787_84 * (180.0 / std::f32::consts::PI);
const ATAN2_P3: f32 = -0.325_808_4 * (180.0 / std::f32::consts::PI);
const ATAN2_P5: f32 = 0.155_578_66 * (180.0 / std::f32::consts::PI);
const ATAN2_P7: f32 = -0.044_326_555 * (180.0 / std::f32::consts::PI);

/// Angle of the vector `(x, y)` in degrees, in `[0, 360)`.
///
/// Polynomial approximation of `atan2` accurate to about 0.01 degrees.
///
/// # Examples
///
/// ```
/// use sparseflow_tracking::vector::fast_atan2;
///
/// assert_eq!(fast_atan2(0.0, 1.0), 0.0);
/// assert!((fast_atan2(1.0, 1.0) - 45.0).abs() < 0.02);
/// ```
pub fn fast_atan2(y: f32, x: f32) -> f32 {
    const EPS: f32 = f64::EPSILON as f32;

    let ax = x.abs();
    let ay = y.abs();

    let mut a = if ax >= ay {
        let c = ay / (ax + EPS);
        let c2 = c * c;
        (((ATAN2_P7 * c2 + ATAN2_P5) * c2 + ATAN2_P3) * c2 + ATAN2_P1) * c
    } else {
        let c = ax / (ay + EPS);
        let c2 = c * c;
        90.0 - (((ATAN2_P7 * c2 + ATAN2_P5) * c2 + ATAN2_P3) * c2 + ATAN2_P1) * c
    };

    if x < 0.0 {
        a = 180.0 - a;
    }
    if y < 0.0 {
        a = 360.0 - a;
    }
    a
}

/// Displacement of one tracked feature between two consecutive frames.
///
/// Coordinates are normalized per axis by the image size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    /// Origin x, in `[0, 1]`.
    pub x: f32,
    /// Origin y, in `[0, 1]`.
    pub y: f32,
    /// Destination x, in `[0, 1]`.
    pub x2: f32,
    /// Destination y, in `[0, 1]`.
    pub y2: f32,
    /// Length of the displacement in normalized units.
    pub alpha: f32,
    /// Direction in degrees, measured on origin minus destination.
    pub theta: f32,
    /// Number of similar vectors found by the clustering pass.
    pub friends: u32,
    /// Age of the feature the vector was computed from.
    pub age: u32,
    /// Stable identifier of the feature.
    pub index: u32,
}

impl Vector {
    /// Build the vector of a feature tracked from `origin` to `destination`, in pixels.
    pub fn from_track(
        origin: [f32; 2],
        destination: [f32; 2],
        size: ImageSize,
        age: u32,
        index: u32,
    ) -> Self {
        let scale_x = 1.0 / size.width as f32;
        let scale_y = 1.0 / size.height as f32;

        let (x, y) = (origin[0] * scale_x, origin[1] * scale_y);
        let (x2, y2) = (destination[0] * scale_x, destination[1] * scale_y);
        let (dx, dy) = (x - x2, y - y2);

        Self {
            x,
            y,
            x2,
            y2,
            alpha: (dx * dx + dy * dy).sqrt(),
            theta: fast_atan2(dy, dx),
            friends: 0,
            age,
            index,
        }
    }

    /// Origin in pixel coordinates of an image of the given size.
    pub fn origin_px(&self, size: ImageSize) -> [f32; 2] {
        [self.x * size.width as f32, self.y * size.height as f32]
    }

    /// Destination in pixel coordinates of an image of the given size.
    pub fn destination_px(&self, size: ImageSize) -> [f32; 2] {
        [self.x2 * size.width as f32, self.y2 * size.height as f32]
    }
}
