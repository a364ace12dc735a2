//! scatter_octree - Adaptive octree merging for scattered reciprocal-space
//! samples.
//!
//! This crate merges large scattered point sets `(x, y, z, weight,
//! spacing)` living in the unit cube into an octree whose depth follows the
//! finest spacing hints seen locally, then flattens the result into the
//! breadth-first brick metadata + brick pool pair a volume renderer uploads
//! directly.
//!
//! # Features
//!
//! - **Concurrent insertion**: producers share one `&Octree`; splits
//!   publish atomically and never expose half-built branches
//! - **IDW interpolation**: Gaussian-decay inverse-distance weighting
//!   scaled by each sample's local spacing hint
//! - **Squeeze/recombine**: statistical verdicts that stop refinement on
//!   locally flat data and collapse branches that turned out uniform
//! - **Brick assembly**: clustered, rayon-parallel flattening with progress
//!   events, cancellation, and a hard pool byte budget
//!
//! # Example
//!
//! ```ignore
//! use std::sync::atomic::AtomicBool;
//! use scatter_octree::{assemble, Octree, Sample, TreeConfig};
//! use glam::Vec3;
//!
//! let mut tree = Octree::new(TreeConfig::default());
//! tree.insert(Sample::new(Vec3::splat(0.5), 1.0, 0.01));
//!
//! tree.squeeze_pass();
//! let cancel = AtomicBool::new(false);
//! let output = assemble(&mut tree, 6, None, &cancel);
//! println!("{} nodes, {} bricks", output.nodes.len(),
//!     output.stats.bricks_written);
//! ```

pub mod config;
pub mod events;
pub mod sample;

// Re-export commonly used items
pub use config::TreeConfig;
pub use events::{EventSender, ProgressEvent};
pub use sample::Sample;

// Adaptive octree over the unit cube
pub mod octree;
pub use octree::{LeafPayload, NodeCoord, Octree, SpacingStats};

// Brick-pool flattening
pub mod brick;
pub use brick::{
  assemble, AssemblyOutcome, AssemblyOutput, AssemblyStats, BrickNode, BrickPool,
};
