//! Adaptive Octree over the Unit Cube
//!
//! Scattered reciprocal-space samples are merged into an octree whose depth
//! adapts to the finest spacing hint seen locally.
//!
//! ```text
//! ┌────────┐     ┌─────────┐     ┌─────────────┐     ┌───────────┐
//! │ insert ├────►│ squeeze ├────►│ interpolate ├────►│ recombine │
//! └────────┘     └─────────┘     └─────────────┘     └───────────┘
//!  concurrent     split/resolve   grids per node      collapse flat
//!  producers      verdicts        (IDW kernel)        branches
//! ```
//!
//! Insertion is the only concurrent phase; the maintenance passes take the
//! tree exclusively.

pub mod coord;
pub mod payload;
pub mod tree;

// Maintenance passes
pub mod interpolate;
pub mod squeeze;

pub use coord::NodeCoord;
pub use payload::{LeafPayload, SpacingStats};
pub use tree::Octree;
