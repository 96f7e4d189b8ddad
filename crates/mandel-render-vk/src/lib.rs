// SPDX-License-Identifier: CEPL-1.0
//! Vulkan (ash) backend: dynamic rendering, one full-screen quad per frame.
use anyhow::{Context, Result};
use ash::vk;
use mandel_math::{ColorMode, ViewState};
use mandel_render::{
    FrameError, FrameOutcome, FramePipeline, Rebuild, RenderSize, Renderer, SurfaceHost,
    WindowSignals,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{info, warn};

mod backend;
mod chain;
mod context;
mod pipeline;
mod record;
mod resources;
mod rollback;
mod sync;

pub use backend::VkFrameBackend;
pub use chain::{PresentPrefs, VkVsyncMode};

pub(crate) fn vk_err(op: &str, e: vk::Result) -> FrameError {
    match e {
        vk::Result::ERROR_DEVICE_LOST => FrameError::DeviceLost,
        vk::Result::ERROR_SURFACE_LOST_KHR => FrameError::SurfaceUnavailable(format!("{op}: surface lost")),
        other => FrameError::backend(op, format!("{other:?}")),
    }
}

pub struct VkRenderer {
    frames: FramePipeline<VkFrameBackend>,
    signals: WindowSignals,
    paused: bool,
}

impl VkRenderer {
    pub fn set_vsync_mode(&mut self, mode: VkVsyncMode) {
        let prefs = self.frames.backend().prefs();
        self.apply_prefs(PresentPrefs { mode, ..prefs });
    }

    fn apply_prefs(&mut self, prefs: PresentPrefs) {
        if self.frames.backend().prefs() == prefs {
            return;
        }
        info!("vk: present prefs {:?}, rebuilding swapchain", prefs);
        self.frames.backend_mut().set_prefs(prefs);
        self.frames.schedule(Rebuild::CHAIN);
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self> {
        let backend = unsafe { VkFrameBackend::new(window, display, PresentPrefs::default())? };
        let mut frames = FramePipeline::new(backend);
        let mut signals = WindowSignals::new(size);
        frames
            .rebuild(&mut signals, ColorMode::default())
            .context("initial swapchain build")?;
        Ok(Self {
            frames,
            signals,
            paused: false,
        })
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        if size.is_empty() != self.paused {
            self.paused = size.is_empty();
            info!("vk: resize to {}x{} → paused={}", size.width, size.height, self.paused);
        }
        self.signals.notify_resize(size);
        Ok(())
    }

    fn render(&mut self, view: &ViewState) -> Result<FrameOutcome> {
        let closing = self.signals.close_requested();
        if !closing && (self.paused || self.frames.backend().surface_is_empty()?) {
            return Ok(FrameOutcome::Suspended);
        }
        Ok(self.frames.draw_frame(&mut self.signals, view)?)
    }

    fn set_vsync(&mut self, on: bool) {
        let prefs = self.frames.backend().prefs();
        self.apply_prefs(PresentPrefs { vsync: on, ..prefs });
    }

    fn request_close(&mut self) {
        self.signals.request_close();
    }

    fn backend_name(&self) -> &'static str {
        "vulkan"
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.frames.shutdown() {
            warn!("vk: shutdown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_loss_is_its_own_error() {
        assert!(matches!(
            vk_err("queue_submit", vk::Result::ERROR_DEVICE_LOST),
            FrameError::DeviceLost
        ));
        assert!(matches!(
            vk_err("acquire_next_image", vk::Result::ERROR_SURFACE_LOST_KHR),
            FrameError::SurfaceUnavailable(_)
        ));
        let e = vk_err("queue_submit", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert_eq!(
            e.to_string(),
            "backend call failed: queue_submit: ERROR_OUT_OF_DEVICE_MEMORY"
        );
    }
}
