// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic half of the renderer: the frame pipeline driver, its
//! synchronization bookkeeping and the seam a GPU backend plugs into.
use anyhow::Result;
use mandel_math::ViewState;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod backend;
mod chain;
mod error;
mod frame;
mod sync;
mod uniforms;

#[cfg(test)]
mod testing;

pub use backend::{Acquire, FrameBackend, Presented, SlotFences};
pub use chain::{ChainDescriptor, SurfaceLimits};
pub use error::{FrameError, FrameResult};
pub use frame::{FrameOutcome, FramePipeline, Rebuild, SurfaceHost, WindowSignals};
pub use sync::{FrameSyncController, SlotState};
pub use uniforms::FractalUniforms;

/// Frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// How long `acquire_next` may block before the driver treats it as a failure.
pub const ACQUIRE_TIMEOUT_NS: u64 = u64::MAX;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True while the window is minimized or not yet laid out.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;

    /// Draws one frame of `view`. `Suspended` means nothing can be shown
    /// until the window gets a nonzero size again.
    fn render(&mut self, view: &ViewState) -> Result<FrameOutcome>;

    fn set_vsync(&mut self, _on: bool) {}

    /// The next `render` returns `Closed` without touching the GPU.
    fn request_close(&mut self);

    fn backend_name(&self) -> &'static str;
}
