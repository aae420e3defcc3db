//! Vulkan-backed presentation pipeline for the wallcast renderer.
//!
//! The CPU rasterizer and the GPU consumer overlap across an N-slot frame
//! ring: each slot owns a staging buffer, a device-local samples buffer and
//! the semaphores/fence that order transfer, composite and present against
//! slot reuse.
//!
//! # Invariants
//! - A slot's fence is waited (or the slot was never submitted) before its
//!   staging buffer or command buffers are touched again; the fence is
//!   reset immediately after the wait succeeds.
//! - Within one slot: transfer happens-before composite happens-before
//!   present. Across slots there is no ordering; up to N frames in flight.
//! - All per-frame failures are fatal and propagate as [`SubmitError`].

mod buffer;
mod context;
mod driver;
mod ring;
mod shaders;

pub use context::{SetupError, VulkanContext};
pub use driver::{PipelineDriver, SubmitError, Tick};
pub use ring::{Acquired, FrameRing, FRAME_MAX};
