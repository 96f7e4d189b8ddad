// SPDX-License-Identifier: CEPL-1.0
use mandel_math::ColorMode;

use crate::{ChainDescriptor, FractalUniforms, FrameResult, RenderSize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    /// `suboptimal` images are still rendered and presented; the chain is
    /// rebuilt afterwards.
    Image { index: u32, suboptimal: bool },
    /// The chain no longer matches the surface and must be rebuilt before use.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presented {
    Shown,
    Stale,
}

/// CPU side of the per-slot fences.
pub trait SlotFences {
    /// Blocks until the work last submitted from `slot` has finished.
    fn wait_slot(&mut self, slot: usize) -> FrameResult<()>;
    /// Unsignals the slot fence ahead of a submit.
    fn reset_slot(&mut self, slot: usize) -> FrameResult<()>;
}

/// Everything the frame driver needs from a GPU backend.
///
/// Image chain, per-image resource sets and the graphics pipeline live behind
/// this trait; the driver decides when each is built, used and destroyed.
/// Destroy calls are only made after [`FrameBackend::wait_idle`].
pub trait FrameBackend: SlotFences {
    fn wait_idle(&mut self) -> FrameResult<()>;

    /// Builds the image chain for `size`, retiring the previous one if any.
    fn build_chain(&mut self, size: RenderSize) -> FrameResult<ChainDescriptor>;
    fn destroy_chain(&mut self);

    /// Builds one resource set per chain image and returns how many it made.
    fn build_resource_sets(&mut self, chain: &ChainDescriptor) -> FrameResult<usize>;
    fn destroy_resource_sets(&mut self);

    /// Whether the current graphics pipeline was built for `color`.
    fn pipeline_matches(&self, color: ColorMode) -> bool;
    fn rebuild_pipeline(&mut self, color: ColorMode) -> FrameResult<()>;

    /// Records every image's command buffer against the current pipeline.
    fn record_commands(&mut self) -> FrameResult<()>;

    fn acquire_next(&mut self, slot: usize, timeout_ns: u64) -> FrameResult<Acquire>;
    fn update_uniforms(&mut self, image: u32, uniforms: &FractalUniforms) -> FrameResult<()>;
    fn submit(&mut self, slot: usize, image: u32) -> FrameResult<()>;
    fn present(&mut self, slot: usize, image: u32) -> FrameResult<Presented>;
}
