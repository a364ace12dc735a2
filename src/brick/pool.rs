//! Flat brick pool - the contiguous value store the assembly stage fills.
//!
//! Bricks are fixed-size `dim^3` grids of f32 values appended in assembly
//! order. A brick's pool coordinate is its index into the pool, so the
//! metadata stays a plain integer per node.

/// Append-only store of equally sized bricks with a hard capacity.
#[derive(Debug)]
pub struct BrickPool {
  data: Vec<f32>,
  brick_dim: usize,
  capacity_bricks: u32,
  len_bricks: u32,
  /// Allocation granularity: `finalize` pads the pool to a multiple of
  /// this many bricks.
  block: u32,
}

impl BrickPool {
  pub fn new(brick_dim: usize, capacity_bricks: u32, block: u32) -> Self {
    Self {
      data: Vec::new(),
      brick_dim,
      capacity_bricks,
      len_bricks: 0,
      block: block.max(1),
    }
  }

  /// Values per brick.
  pub fn brick_len(&self) -> usize {
    self.brick_dim * self.brick_dim * self.brick_dim
  }

  pub fn brick_dim(&self) -> usize {
    self.brick_dim
  }

  pub fn len_bricks(&self) -> u32 {
    self.len_bricks
  }

  pub fn capacity_bricks(&self) -> u32 {
    self.capacity_bricks
  }

  pub fn is_exhausted(&self) -> bool {
    self.len_bricks >= self.capacity_bricks
  }

  /// Bytes currently held by brick values.
  pub fn used_bytes(&self) -> u64 {
    self.len_bricks as u64 * self.brick_len() as u64 * std::mem::size_of::<f32>() as u64
  }

  /// Append one brick, returning its pool coordinate, or `None` once the
  /// capacity is reached. `values` must hold exactly `brick_len` entries.
  pub fn try_push(&mut self, values: &[f32]) -> Option<u32> {
    debug_assert_eq!(values.len(), self.brick_len());
    if self.is_exhausted() {
      return None;
    }
    let coordinate = self.len_bricks;
    self.data.extend_from_slice(values);
    self.len_bricks += 1;
    Some(coordinate)
  }

  /// Roll the pool back to `bricks` entries. Used when a cancelled or
  /// exhausted level is unwound to its start.
  pub fn truncate(&mut self, bricks: u32) {
    if bricks < self.len_bricks {
      self.data.truncate(bricks as usize * self.brick_len());
      self.len_bricks = bricks;
    }
  }

  /// Pad the pool with zero bricks up to the next block boundary. Padding
  /// bricks are not addressable through metadata.
  pub fn finalize(&mut self) {
    let rem = self.len_bricks % self.block;
    if rem == 0 {
      return;
    }
    let pad = self.block - rem;
    self
      .data
      .resize(self.data.len() + pad as usize * self.brick_len(), 0.0);
    self.len_bricks += pad;
  }

  /// The brick at `coordinate`.
  pub fn brick(&self, coordinate: u32) -> &[f32] {
    let len = self.brick_len();
    let start = coordinate as usize * len;
    &self.data[start..start + len]
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn into_data(self) -> Vec<f32> {
    self.data
  }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod pool_test;
