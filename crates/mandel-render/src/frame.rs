// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;
use mandel_math::{ColorMode, ViewState};
use tracing::{debug, info, trace, warn};

use crate::{
    Acquire, ChainDescriptor, FractalUniforms, FrameBackend, FrameError, FrameResult,
    FrameSyncController, Presented, RenderSize, ACQUIRE_TIMEOUT_NS, MAX_FRAMES_IN_FLIGHT,
};

/// Consecutive stale acquires before the driver starts complaining.
const STALE_WARN_STREAK: u32 = 8;

bitflags! {
    /// Work scheduled for the start of the next frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Rebuild: u8 {
        /// Image chain and everything sized by it.
        const CHAIN = 1 << 0;
        /// Graphics pipeline and the recorded command buffers only.
        const COMMANDS = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// The chain was stale and has been rebuilt; nothing was drawn.
    Rebuilt,
    /// The drawable is empty (minimized). Wait for window events.
    Suspended,
    Closed,
}

/// What the driver needs to know about the window it draws into.
pub trait SurfaceHost {
    /// Current drawable size in pixels; zero while minimized.
    fn drawable_size(&self) -> RenderSize;
    /// Returns and clears the "window was resized" flag.
    fn take_resized(&mut self) -> bool;
    fn close_requested(&self) -> bool {
        false
    }
    /// Called when a rebuild has to wait for a nonzero drawable. Hosts driven
    /// by an event loop return immediately and get `Suspended` back instead.
    fn wait_for_events(&mut self) {}
}

/// [`SurfaceHost`] fed from the outside, one call per window event.
#[derive(Clone, Debug, Default)]
pub struct WindowSignals {
    size: RenderSize,
    resized: bool,
    close: bool,
}

impl WindowSignals {
    pub fn new(size: RenderSize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    pub fn notify_resize(&mut self, size: RenderSize) {
        if size != self.size {
            self.resized = true;
        }
        self.size = size;
    }

    pub fn request_close(&mut self) {
        self.close = true;
    }
}

impl SurfaceHost for WindowSignals {
    fn drawable_size(&self) -> RenderSize {
        self.size
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn close_requested(&self) -> bool {
        self.close
    }

    fn wait_for_events(&mut self) {
        trace!("drawable empty, handing control back to the event loop");
    }
}

/// Drives acquire, update, submit and present once per call and rebuilds the
/// chain-sized object graph whenever the surface stops matching it.
pub struct FramePipeline<B: FrameBackend> {
    backend: B,
    sync: FrameSyncController,
    slot: usize,
    pending: Rebuild,
    chain: Option<ChainDescriptor>,
    stale_streak: u32,
}

impl<B: FrameBackend> FramePipeline<B> {
    /// Nothing is built yet; the first `draw_frame` (or an explicit
    /// [`FramePipeline::rebuild`]) creates the chain.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            sync: FrameSyncController::new(0),
            slot: 0,
            pending: Rebuild::CHAIN,
            chain: None,
            stale_streak: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn sync(&self) -> &FrameSyncController {
        &self.sync
    }

    pub fn chain(&self) -> Option<&ChainDescriptor> {
        self.chain.as_ref()
    }

    pub fn image_count(&self) -> usize {
        self.chain.as_ref().map_or(0, |c| c.image_count)
    }

    pub fn current_slot(&self) -> usize {
        self.slot
    }

    pub fn pending(&self) -> Rebuild {
        self.pending
    }

    pub fn schedule(&mut self, what: Rebuild) {
        self.pending |= what;
    }

    pub fn draw_frame<H: SurfaceHost>(
        &mut self,
        host: &mut H,
        view: &ViewState,
    ) -> FrameResult<FrameOutcome> {
        if host.close_requested() {
            return Ok(FrameOutcome::Closed);
        }
        if host.take_resized() {
            self.pending |= Rebuild::CHAIN;
        }
        if !self.backend.pipeline_matches(view.color) {
            self.pending |= Rebuild::COMMANDS;
        }
        if !self.pending.is_empty() && !self.rebuild(host, view.color)? {
            return Ok(FrameOutcome::Suspended);
        }

        let slot = self.slot;
        self.sync.begin_frame(&mut self.backend, slot)?;

        let (image, suboptimal) = match self.backend.acquire_next(slot, ACQUIRE_TIMEOUT_NS)? {
            Acquire::Image { index, suboptimal } => (index, suboptimal),
            Acquire::Stale => {
                self.stale_streak += 1;
                if self.stale_streak == STALE_WARN_STREAK {
                    warn!(streak = self.stale_streak, "image chain keeps going stale");
                }
                self.pending |= Rebuild::CHAIN;
                return Ok(if self.rebuild(host, view.color)? {
                    FrameOutcome::Rebuilt
                } else {
                    FrameOutcome::Suspended
                });
            }
        };
        self.stale_streak = 0;

        self.sync.claim_image(&mut self.backend, slot, image as usize)?;
        self.backend
            .update_uniforms(image, &FractalUniforms::from_view(view))?;
        self.sync.submit(&mut self.backend, slot, image)?;

        let presented = self.backend.present(slot, image)?;
        if suboptimal || presented == Presented::Stale {
            debug!(suboptimal, "chain out of date after present, rebuilding next frame");
            self.pending |= Rebuild::CHAIN;
        }

        self.slot = (slot + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(FrameOutcome::Presented)
    }

    /// Runs whatever rebuild is pending. Returns `false` when the drawable is
    /// empty and the work stays scheduled.
    pub fn rebuild<H: SurfaceHost>(&mut self, host: &mut H, color: ColorMode) -> FrameResult<bool> {
        if self.pending.contains(Rebuild::CHAIN) || self.chain.is_none() {
            let size = host.drawable_size();
            if size.is_empty() {
                debug!("drawable is empty, deferring chain rebuild");
                self.pending |= Rebuild::CHAIN;
                host.wait_for_events();
                return Ok(false);
            }
            self.rebuild_chain(size, color)?;
        } else if self.pending.contains(Rebuild::COMMANDS) {
            self.backend.wait_idle()?;
            self.sync.mark_all_complete();
            if !self.backend.pipeline_matches(color) {
                self.backend.rebuild_pipeline(color)?;
            }
            self.backend.record_commands()?;
            debug!(color = color.name(), "commands re-recorded");
        }
        self.pending = Rebuild::empty();
        Ok(true)
    }

    fn rebuild_chain(&mut self, size: RenderSize, color: ColorMode) -> FrameResult<()> {
        // STRICT ORDER: idle, tear down top-down, build bottom-up.
        self.backend.wait_idle()?;
        self.sync.mark_all_complete();
        self.release();

        let chain = self.backend.build_chain(size)?;
        let image_count = chain.image_count;
        self.chain = Some(chain);
        if image_count == 0 {
            return Err(FrameError::creation("image chain", "surface handed out zero images"));
        }

        if !self.backend.pipeline_matches(color) {
            self.backend.rebuild_pipeline(color)?;
        }

        let Some(chain) = self.chain.as_ref() else {
            return Err(FrameError::creation("image chain", "chain vanished during rebuild"));
        };
        let sets = self.backend.build_resource_sets(chain)?;
        if sets != image_count {
            return Err(FrameError::creation(
                "frame resource sets",
                format!("{sets} sets for {image_count} images"),
            ));
        }
        self.backend.record_commands()?;
        self.sync.reset_images(image_count);

        info!(
            generation = chain.generation,
            images = image_count,
            width = chain.extent.width,
            height = chain.extent.height,
            format = %chain.format,
            present_mode = %chain.present_mode,
            "image chain built"
        );
        Ok(())
    }

    fn release(&mut self) {
        if self.chain.take().is_some() {
            self.backend.destroy_resource_sets();
            self.backend.destroy_chain();
        }
    }

    /// Waits for the device to drain and releases the chain and its resource
    /// sets. Safe to call more than once.
    pub fn shutdown(&mut self) -> FrameResult<()> {
        if self.chain.is_none() {
            return Ok(());
        }
        let idle = self.backend.wait_idle();
        self.sync.mark_all_complete();
        self.release();
        self.pending |= Rebuild::CHAIN;
        idle
    }
}
