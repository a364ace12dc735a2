//! NodeCoord - immutable value type identifying a node position.
//!
//! A node is identified by (level, x, y, z); its cubic extent is fully
//! determined by those integers: origin `coord * 2^-level`, side `2^-level`.
//! Level 0 is the root unit cube; higher levels are finer.

use glam::Vec3;

/// Octree node coordinate - immutable value type.
///
/// Grid coordinates are at the node's own level, so a child is always
/// `(level + 1, 2 * coord + octant_offset)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeCoord {
  /// Subdivision level (0 = root cube, higher = finer).
  pub level: u32,
  /// Grid X position at this node's level.
  pub x: u32,
  /// Grid Y position at this node's level.
  pub y: u32,
  /// Grid Z position at this node's level.
  pub z: u32,
}

impl NodeCoord {
  /// The root cube covering `[0, 1)³`.
  pub const ROOT: Self = Self {
    level: 0,
    x: 0,
    y: 0,
    z: 0,
  };

  /// Create a coordinate at the given level and grid position.
  pub fn new(level: u32, x: u32, y: u32, z: u32) -> Self {
    Self { level, x, y, z }
  }

  /// Side length of this node's extent.
  #[inline]
  pub fn size(&self) -> f32 {
    0.5_f32.powi(self.level as i32)
  }

  /// Minimum corner of this node's extent.
  #[inline]
  pub fn min(&self) -> Vec3 {
    Vec3::new(self.x as f32, self.y as f32, self.z as f32) * self.size()
  }

  /// Center of this node's extent.
  #[inline]
  pub fn center(&self) -> Vec3 {
    self.min() + Vec3::splat(self.size() * 0.5)
  }

  /// Maximum corner of this node's extent (exclusive).
  #[inline]
  pub fn max(&self) -> Vec3 {
    self.min() + Vec3::splat(self.size())
  }

  /// Child coordinate for an octant.
  ///
  /// Octant bits follow the +X (bit 0), +Y (bit 1), +Z (bit 2) convention.
  pub fn child(&self, octant: u8) -> Self {
    Self {
      level: self.level + 1,
      x: self.x * 2 + (octant & 1) as u32,
      y: self.y * 2 + ((octant >> 1) & 1) as u32,
      z: self.z * 2 + ((octant >> 2) & 1) as u32,
    }
  }

  /// Parent coordinate, or `None` at the root.
  pub fn parent(&self) -> Option<Self> {
    if self.level == 0 {
      return None;
    }
    Some(Self {
      level: self.level - 1,
      x: self.x / 2,
      y: self.y / 2,
      z: self.z / 2,
    })
  }

  /// Octant of this node that contains a descendant coordinate.
  ///
  /// `target` must be at a strictly deeper level inside this node.
  pub fn octant_of_coord(&self, target: &NodeCoord) -> u8 {
    let shift = target.level - self.level - 1;
    let cx = ((target.x >> shift) & 1) as u8;
    let cy = ((target.y >> shift) & 1) as u8;
    let cz = ((target.z >> shift) & 1) as u8;
    cx | (cy << 1) | (cz << 2)
  }

  /// Octant of a position inside this node's extent.
  ///
  /// Three independent half-space tests against the center planes. A point
  /// exactly on a center plane deterministically lands in the upper octant.
  /// Returns `None` when the derived index falls outside `[0, 2)` on any
  /// axis, which means the position is not inside this node's extent.
  pub fn octant_of(&self, position: Vec3) -> Option<u8> {
    let half = self.size() * 0.5;
    let rel = (position - self.min()) / half;

    let ix = rel.x.floor() as i32;
    let iy = rel.y.floor() as i32;
    let iz = rel.z.floor() as i32;

    if !(0..2).contains(&ix) || !(0..2).contains(&iy) || !(0..2).contains(&iz) {
      return None;
    }
    Some((ix | (iy << 1) | (iz << 2)) as u8)
  }

  /// Check whether a position lies inside this node's half-open extent.
  #[inline]
  pub fn contains(&self, position: Vec3) -> bool {
    let min = self.min();
    let max = self.max();
    position.x >= min.x
      && position.x < max.x
      && position.y >= min.y
      && position.y < max.y
      && position.z >= min.z
      && position.z < max.z
  }

  /// Check whether this node's extent intersects an axis-aligned box.
  #[inline]
  pub fn intersects(&self, box_min: Vec3, box_max: Vec3) -> bool {
    let min = self.min();
    let max = self.max();
    min.x <= box_max.x
      && max.x >= box_min.x
      && min.y <= box_max.y
      && max.y >= box_min.y
      && min.z <= box_max.z
      && max.z >= box_min.z
  }

  /// Same-level neighbor offset by one grid step per axis.
  ///
  /// Returns `None` when the neighbor would leave the unit cube.
  pub fn neighbor(&self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
    let side = 1i64 << self.level;
    let nx = self.x as i64 + dx as i64;
    let ny = self.y as i64 + dy as i64;
    let nz = self.z as i64 + dz as i64;
    if nx < 0 || nx >= side || ny < 0 || ny >= side || nz < 0 || nz >= side {
      return None;
    }
    Some(Self {
      level: self.level,
      x: nx as u32,
      y: ny as u32,
      z: nz as u32,
    })
  }
}

#[cfg(test)]
#[path = "coord_test.rs"]
mod coord_test;
