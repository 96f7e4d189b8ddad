// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use anyhow::Result;
use ash::vk;
use mandel_math::ColorMode;
use mandel_render::{
    Acquire, ChainDescriptor, FractalUniforms, FrameBackend, FrameError, FrameResult, Presented,
    RenderSize, SlotFences,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};

use crate::chain::{PresentPrefs, SurfaceImageChain};
use crate::context::GpuContext;
use crate::pipeline::{create_or_load_pipeline_cache, pipeline_cache_path, save_pipeline_cache, FractalPipeline};
use crate::record::{record_frame, RecordTarget};
use crate::resources::{create_command_pool, create_uniform_set_layout, FrameResources};
use crate::sync::{create_frame_slots, destroy_frame_slots, FrameSlot};
use crate::vk_err;

/// Vulkan side of the frame pipeline. Owns every device object; the driver
/// in `mandel-render` decides when they are built and torn down.
pub struct VkFrameBackend {
    slots: Vec<FrameSlot>,
    chain: Option<SurfaceImageChain>,
    /// Swapchain whose views are gone, kept to seed the next build.
    retired: vk::SwapchainKHR,
    resources: Option<FrameResources>,
    pipeline: Option<FractalPipeline>,
    set_layout: vk::DescriptorSetLayout,
    cmd_pool: vk::CommandPool,
    pipeline_cache: vk::PipelineCache,
    cache_path: PathBuf,
    prefs: PresentPrefs,
    generation: u64,
    // Last field: dropped after `Drop::drop` has released the objects above.
    ctx: GpuContext,
}

impl VkFrameBackend {
    pub unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        prefs: PresentPrefs,
    ) -> Result<Self> {
        let ctx = GpuContext::new(window, display)?;
        let props = ctx.properties();
        let cache_path = pipeline_cache_path(&props);
        let pipeline_cache = create_or_load_pipeline_cache(&ctx.device, &props, &cache_path)?;
        let set_layout = create_uniform_set_layout(&ctx.device)?;
        let cmd_pool = create_command_pool(&ctx)?;
        let slots = create_frame_slots(&ctx.device)?;

        Ok(Self {
            slots,
            chain: None,
            retired: vk::SwapchainKHR::null(),
            resources: None,
            pipeline: None,
            set_layout,
            cmd_pool,
            pipeline_cache,
            cache_path,
            prefs,
            generation: 0,
            ctx,
        })
    }

    pub fn prefs(&self) -> PresentPrefs {
        self.prefs
    }

    /// Takes effect on the next chain build.
    pub fn set_prefs(&mut self, prefs: PresentPrefs) {
        self.prefs = prefs;
    }

    /// True while the surface itself reports a zero extent (minimized on
    /// platforms that do not resize the window to zero).
    pub fn surface_is_empty(&self) -> FrameResult<bool> {
        surface_caps_empty(unsafe {
            self.ctx
                .surface_loader
                .get_physical_device_surface_capabilities(self.ctx.phys, self.ctx.surface)
        })
    }

    fn slot(&self, slot: usize) -> FrameResult<&FrameSlot> {
        self.slots
            .get(slot)
            .ok_or_else(|| FrameError::backend("frame slot", format!("{slot} out of range")))
    }

    fn live_chain(&self) -> FrameResult<&SurfaceImageChain> {
        self.chain
            .as_ref()
            .ok_or_else(|| FrameError::backend("image chain", "not built"))
    }

    unsafe fn destroy_retired(&mut self) {
        if self.retired != vk::SwapchainKHR::null() {
            self.ctx
                .swapchain_loader
                .destroy_swapchain(self.retired, None);
            self.retired = vk::SwapchainKHR::null();
        }
    }
}

/// A failed capability query is fatal, never "minimized".
fn surface_caps_empty(caps: ash::prelude::VkResult<vk::SurfaceCapabilitiesKHR>) -> FrameResult<bool> {
    let caps = caps.map_err(|e| vk_err("get_physical_device_surface_capabilities", e))?;
    Ok(caps.current_extent.width == 0 || caps.current_extent.height == 0)
}

impl SlotFences for VkFrameBackend {
    fn wait_slot(&mut self, slot: usize) -> FrameResult<()> {
        let fence = self.slot(slot)?.in_flight;
        unsafe { self.ctx.device.wait_for_fences(&[fence], true, u64::MAX) }
            .map_err(|e| vk_err("wait_for_fences", e))
    }

    fn reset_slot(&mut self, slot: usize) -> FrameResult<()> {
        let fence = self.slot(slot)?.in_flight;
        unsafe { self.ctx.device.reset_fences(&[fence]) }.map_err(|e| vk_err("reset_fences", e))
    }
}

impl FrameBackend for VkFrameBackend {
    fn wait_idle(&mut self) -> FrameResult<()> {
        unsafe { self.ctx.device.device_wait_idle() }.map_err(|e| vk_err("device_wait_idle", e))
    }

    fn build_chain(&mut self, size: RenderSize) -> FrameResult<ChainDescriptor> {
        unsafe {
            // A chain still alive here gets retired first; its handle seeds the new one.
            if let Some(old) = self.chain.take() {
                self.destroy_retired();
                self.retired = old.retire(&self.ctx);
            }

            self.generation += 1;
            let chain = SurfaceImageChain::build(
                &self.ctx,
                size,
                self.prefs,
                self.retired,
                self.generation,
            );
            self.destroy_retired();
            let chain = chain?;

            // Pipeline depends on the color format only.
            if let Some(old) = self.pipeline.take() {
                if old.format == chain.format.format {
                    self.pipeline = Some(old);
                } else {
                    debug!("vk: swapchain format changed, rebuilding pipeline");
                    let rebuilt = FractalPipeline::create(
                        &self.ctx.device,
                        self.pipeline_cache,
                        chain.format.format,
                        self.set_layout,
                        old.color,
                    );
                    old.destroy(&self.ctx.device);
                    self.pipeline = Some(rebuilt?);
                }
            }

            let desc = chain.descriptor();
            self.chain = Some(chain);
            Ok(desc)
        }
    }

    fn destroy_chain(&mut self) {
        if let Some(chain) = self.chain.take() {
            unsafe {
                self.destroy_retired();
                self.retired = chain.retire(&self.ctx);
            }
        }
    }

    fn build_resource_sets(&mut self, chain: &ChainDescriptor) -> FrameResult<usize> {
        if let Some(old) = self.resources.take() {
            unsafe { old.destroy(&self.ctx, self.cmd_pool) };
        }
        let res = unsafe {
            FrameResources::build(&self.ctx, self.set_layout, self.cmd_pool, chain.image_count)?
        };
        let n = res.len();
        self.resources = Some(res);
        Ok(n)
    }

    fn destroy_resource_sets(&mut self) {
        if let Some(res) = self.resources.take() {
            unsafe { res.destroy(&self.ctx, self.cmd_pool) };
        }
    }

    fn pipeline_matches(&self, color: ColorMode) -> bool {
        self.pipeline.as_ref().is_some_and(|p| p.color == color)
    }

    fn rebuild_pipeline(&mut self, color: ColorMode) -> FrameResult<()> {
        let format = self.live_chain()?.format.format;
        let fresh = unsafe {
            FractalPipeline::create(
                &self.ctx.device,
                self.pipeline_cache,
                format,
                self.set_layout,
                color,
            )?
        };
        if let Some(old) = self.pipeline.replace(fresh) {
            unsafe { old.destroy(&self.ctx.device) };
        }
        Ok(())
    }

    fn record_commands(&mut self) -> FrameResult<()> {
        let chain = self.live_chain()?;
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| FrameError::backend("record_commands", "no pipeline"))?;
        let res = self
            .resources
            .as_ref()
            .ok_or_else(|| FrameError::backend("record_commands", "no resource sets"))?;
        if res.len() != chain.images.len() {
            return Err(FrameError::creation(
                "command buffers",
                format!("{} resource sets for {} images", res.len(), chain.images.len()),
            ));
        }

        for (i, set) in res.sets.iter().enumerate() {
            let target = RecordTarget {
                image: chain.images[i],
                view: chain.views[i],
                extent: chain.extent,
            };
            unsafe { record_frame(&self.ctx.device, set.cmd, &target, pipeline, set.descriptor)? };
        }
        Ok(())
    }

    fn acquire_next(&mut self, slot: usize, timeout_ns: u64) -> FrameResult<Acquire> {
        let sem = self.slot(slot)?.image_acquired;
        unsafe { self.live_chain()?.acquire(&self.ctx, sem, timeout_ns) }
    }

    fn update_uniforms(&mut self, image: u32, uniforms: &FractalUniforms) -> FrameResult<()> {
        let res = self
            .resources
            .as_ref()
            .ok_or_else(|| FrameError::backend("update_uniforms", "no resource sets"))?;
        unsafe { res.update(&self.ctx, image as usize, uniforms) }
    }

    // STRICT PER-FRAME ORDER:
    // acquire signals image_acquired -> submit waits on it and signals
    // render_complete + in_flight -> present waits on render_complete.
    fn submit(&mut self, slot: usize, image: u32) -> FrameResult<()> {
        let s = self.slot(slot)?;
        let cmd = self
            .resources
            .as_ref()
            .and_then(|r| r.sets.get(image as usize))
            .map(|set| set.cmd)
            .ok_or_else(|| FrameError::backend("submit", format!("no command buffer for image {image}")))?;
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.image_acquired,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.render_complete,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.queue, std::slice::from_ref(&submit), s.in_flight)
        }
        .map_err(|e| vk_err("queue_submit", e))
    }

    fn present(&mut self, slot: usize, image: u32) -> FrameResult<Presented> {
        let wait = self.slot(slot)?.render_complete;
        unsafe { self.live_chain()?.present(&self.ctx, wait, image) }
    }
}

// STRICT TEARDOWN ORDER:
// - device_wait_idle()
// - Resource sets (command buffers, descriptor pool, UBOs)
// - Pipeline, then swapchain views + swapchain
// - Frame slot syncs, command pool, set layout
// - Pipeline cache (saved first)
// - GpuContext drops last: device, surface, instance.
impl Drop for VkFrameBackend {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();

            if let Some(res) = self.resources.take() {
                res.destroy(&self.ctx, self.cmd_pool);
            }
            if let Some(p) = self.pipeline.take() {
                p.destroy(&self.ctx.device);
            }
            self.destroy_chain();
            self.destroy_retired();

            destroy_frame_slots(&self.ctx.device, &self.slots);
            self.slots.clear();
            self.ctx.device.destroy_command_pool(self.cmd_pool, None);
            self.ctx
                .device
                .destroy_descriptor_set_layout(self.set_layout, None);

            if let Err(e) = save_pipeline_cache(&self.ctx.device, self.pipeline_cache, &self.cache_path) {
                warn!("vk: could not save pipeline cache: {e:#}");
            }
            self.ctx
                .device
                .destroy_pipeline_cache(self.pipeline_cache, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(width: u32, height: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width, height },
            ..Default::default()
        }
    }

    #[test]
    fn zero_extent_reads_as_empty() {
        assert!(surface_caps_empty(Ok(caps(0, 0))).unwrap());
        assert!(surface_caps_empty(Ok(caps(800, 0))).unwrap());
        assert!(!surface_caps_empty(Ok(caps(800, 600))).unwrap());
    }

    #[test]
    fn failed_caps_query_is_an_error() {
        assert!(matches!(
            surface_caps_empty(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(FrameError::SurfaceUnavailable(_))
        ));
        assert!(matches!(
            surface_caps_empty(Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY)),
            Err(FrameError::Backend(_))
        ));
    }
}
