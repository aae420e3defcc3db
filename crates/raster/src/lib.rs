//! CPU scanline rasterizer for the wallcast frame pipeline.
//!
//! Consumes the scene model plus a camera pose and fully overwrites a packed
//! framebuffer each tick: perspective projection of wall segments, painter's
//! order, perspective-correct horizontal texture lookup.
//!
//! # Invariants
//! - Rendering never fails; out-of-range geometry is clipped or skipped.
//! - The framebuffer is column-major: all rows of column 0, then column 1.
//! - Texture sampling is total and wraps on both axes.

mod framebuffer;
mod raster;
mod texture;

pub use framebuffer::{Framebuffer, BACKGROUND};
pub use raster::Rasterizer;
pub use texture::{LoadError, Texture};
