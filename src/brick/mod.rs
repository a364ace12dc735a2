//! Brick-Pool Flattening
//!
//! Converts the merged octree into the flat form a renderer consumes: a
//! breadth-first array of `BrickNode` metadata plus one contiguous pool of
//! `brick_dim³` value bricks.
//!
//! ```text
//! ┌─────────┐     ┌───────────────────┐     ┌──────────┐
//! │ cluster ├────►│ interpolate_bricks├────►│ pool push│
//! └─────────┘     └───────────────────┘     └──────────┘
//!  gather per       rayon batch, pure        populate /
//!  level radius     per-brick stats          spawn / stop
//! ```

pub mod pool;

pub mod batch;

pub mod assemble;

pub use assemble::{
  assemble, AssemblyOutcome, AssemblyOutput, AssemblyStats, BrickNode, NO_BRICK, NO_CHILDREN,
};
pub use batch::{interpolate_bricks, BrickJob, BrickResult};
pub use pool::BrickPool;
