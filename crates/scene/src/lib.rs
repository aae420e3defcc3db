//! Scene model: an ordered collection of wall segments plus the camera pose.
//!
//! # Invariants
//! - Walls are immutable once constructed; derived texture-space fields are
//!   a pure function of the defining fields.
//! - Paint order is vector order (painter's algorithm, no depth test).

mod wall;

pub use wall::{CameraPose, Scene, Wall, TEXELS_PER_TILE, WORLD_PER_TILE};
