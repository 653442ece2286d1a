//! Conversions between normalized display coordinates, screen pixels and
//! visual angle. All functions are pure; geometry is validated once up front.

use crate::error::{GazeTrackerError, Result};
use crate::types::DisplayGeometry;

impl DisplayGeometry {
    pub fn new(
        pixel_width: f64,
        pixel_height: f64,
        physical_width_cm: f64,
        physical_height_cm: f64,
        viewing_distance_cm: f64,
    ) -> Result<Self> {
        let geom = Self {
            pixel_width,
            pixel_height,
            physical_width_cm,
            physical_height_cm,
            viewing_distance_cm,
        };
        geom.validate()?;
        Ok(geom)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("pixel_width", self.pixel_width),
            ("pixel_height", self.pixel_height),
            ("physical_width_cm", self.physical_width_cm),
            ("physical_height_cm", self.physical_height_cm),
            ("viewing_distance_cm", self.viewing_distance_cm),
        ];
        for (name, value) in fields {
            if value <= 0.0 {
                return Err(GazeTrackerError::InvalidGeometry(format!(
                    "{} must be > 0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Average of horizontal and vertical pixel density. An approximation on
    /// purpose: pixels may be non-square on mismeasured setups, and a single
    /// density keeps all angle conversions on one scale.
    pub fn pixels_per_cm(&self) -> f64 {
        (self.pixel_width / self.physical_width_cm + self.pixel_height / self.physical_height_cm)
            / 2.0
    }
}

/// Normalized display-area position to screen pixels.
/// Rounds to nearest integer, ties away from zero.
pub fn norm_to_pixel(point: (f64, f64), geom: &DisplayGeometry) -> (f64, f64) {
    (
        (point.0 * geom.pixel_width).round(),
        (point.1 * geom.pixel_height).round(),
    )
}

/// Screen pixels back to normalized display-area position. No rounding.
pub fn pixel_to_norm(point: (f64, f64), geom: &DisplayGeometry) -> (f64, f64) {
    (point.0 / geom.pixel_width, point.1 / geom.pixel_height)
}

/// Visual angle in degrees to on-screen pixels at the given viewing distance.
pub fn degrees_to_pixels(distance_cm: f64, angle_deg: f64, px_per_cm: f64) -> f64 {
    px_per_cm * angle_deg.to_radians().tan() * distance_cm
}
