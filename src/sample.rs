//! Sample - the atomic input unit of the scattered-point index.

use glam::Vec3;

/// A weighted scattered point with a local density hint.
///
/// Positions live in the normalized unit cube `[0, 1)³`. `weight` is the
/// measured intensity; `spacing` estimates the distance to the nearest
/// neighboring sample of the same frame and drives all resolution decisions.
/// Samples are immutable once produced and owned by copy after insertion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
  /// Position in the normalized unit cube.
  pub position: Vec3,
  /// Intensity carried by this point.
  pub weight: f32,
  /// Local sample-spacing estimate (interdistance).
  pub spacing: f32,
}

impl Sample {
  /// Create a new sample.
  pub fn new(position: Vec3, weight: f32, spacing: f32) -> Self {
    Self {
      position,
      weight,
      spacing,
    }
  }

  /// Check whether the position lies inside the normalized unit cube.
  ///
  /// The upper faces are exclusive: a point exactly at 1.0 on any axis has
  /// no owning octant and is treated as out of range by insertion.
  #[inline]
  pub fn in_unit_cube(&self) -> bool {
    self.position.x >= 0.0
      && self.position.x < 1.0
      && self.position.y >= 0.0
      && self.position.y < 1.0
      && self.position.z >= 0.0
      && self.position.z < 1.0
  }
}
