// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use mandel_render::{Acquire, ChainDescriptor, FrameError, FrameResult, Presented, RenderSize, SurfaceLimits};
use tracing::{debug, info};

use crate::context::GpuContext;
use crate::vk_err;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VkVsyncMode {
    /// Target monitor refresh rate.
    Fifo,
    /// Smart vsync, fps uncapped.
    #[default]
    Mailbox,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentPrefs {
    pub vsync: bool,
    pub mode: VkVsyncMode,
}

impl Default for PresentPrefs {
    fn default() -> Self {
        Self {
            vsync: true,
            mode: VkVsyncMode::Mailbox,
        }
    }
}

/// Swapchain plus one view per image, all sized to the same extent.
pub struct SurfaceImageChain {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub generation: u64,
}

impl SurfaceImageChain {
    /// `old` is the retired swapchain (or null); the caller destroys it once
    /// this returns.
    pub unsafe fn build(
        ctx: &GpuContext,
        want: RenderSize,
        prefs: PresentPrefs,
        old: vk::SwapchainKHR,
        generation: u64,
    ) -> FrameResult<Self> {
        let caps = ctx
            .surface_loader
            .get_physical_device_surface_capabilities(ctx.phys, ctx.surface)
            .map_err(|e| vk_err("get_physical_device_surface_capabilities", e))?;
        let formats = ctx
            .surface_loader
            .get_physical_device_surface_formats(ctx.phys, ctx.surface)
            .map_err(|e| vk_err("get_physical_device_surface_formats", e))?;
        let modes = ctx
            .surface_loader
            .get_physical_device_surface_present_modes(ctx.phys, ctx.surface)
            .map_err(|e| vk_err("get_physical_device_surface_present_modes", e))?;

        let (surf_format, pick_reason) = pick_surface_format(&formats)
            .ok_or_else(|| FrameError::SurfaceUnavailable("surface reports no formats".into()))?;
        let present_mode = choose_present_mode(&modes, prefs)
            .ok_or_else(|| FrameError::SurfaceUnavailable("surface reports no present modes".into()))?;

        let limits = limits_from_caps(&caps);
        let size = limits.extent(want);
        let extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };
        let min_count = limits.image_count();

        debug!(
            "reason: {}, format: {}, present_mode: {}, vsync={}, mode={:?}, extent: {}x{}, images(min={} → picked={})",
            pick_reason,
            fmt_name(surf_format.format),
            pm_name(present_mode),
            prefs.vsync,
            prefs.mode,
            extent.width,
            extent.height,
            caps.min_image_count,
            min_count,
        );

        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface,
            min_image_count: min_count,
            image_format: surf_format.format,
            image_color_space: surf_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };
        let swapchain = ctx
            .swapchain_loader
            .create_swapchain(&swap_info, None)
            .map_err(|e| FrameError::creation("swapchain", format!("{e:?}")))?;
        let images = ctx
            .swapchain_loader
            .get_swapchain_images(swapchain)
            .map_err(|e| vk_err("get_swapchain_images", e))?;

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: surf_format.format,
                subresource_range: color_range(),
                ..Default::default()
            };
            let view = ctx
                .device
                .create_image_view(&iv_info, None)
                .map_err(|e| FrameError::creation("swapchain image view", format!("{e:?}")))?;
            views.push(view);
        }

        info!(
            "vk: swapchain gen {} {}x{} {} images, {} / {}",
            generation,
            extent.width,
            extent.height,
            images.len(),
            fmt_name(surf_format.format),
            pm_name(present_mode)
        );

        Ok(Self {
            swapchain,
            format: surf_format,
            present_mode,
            extent,
            images,
            views,
            generation,
        })
    }

    pub fn descriptor(&self) -> ChainDescriptor {
        ChainDescriptor {
            image_count: self.images.len(),
            extent: RenderSize::new(self.extent.width, self.extent.height),
            generation: self.generation,
            format: fmt_name(self.format.format).to_owned(),
            present_mode: pm_name(self.present_mode).to_owned(),
        }
    }

    pub unsafe fn acquire(
        &self,
        ctx: &GpuContext,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> FrameResult<Acquire> {
        match ctx.swapchain_loader.acquire_next_image(
            self.swapchain,
            timeout_ns,
            signal,
            vk::Fence::null(),
        ) {
            Ok((index, suboptimal)) => Ok(Acquire::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::Stale),
            Err(e) => Err(vk_err("acquire_next_image", e)),
        }
    }

    pub unsafe fn present(
        &self,
        ctx: &GpuContext,
        wait: vk::Semaphore,
        image: u32,
    ) -> FrameResult<Presented> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &self.swapchain,
            p_image_indices: &image,
            ..Default::default()
        };
        match ctx.swapchain_loader.queue_present(ctx.queue, &present) {
            Ok(false) => Ok(Presented::Shown),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::Stale),
            Err(e) => Err(vk_err("queue_present", e)),
        }
    }

    /// Destroys the image views and hands back the swapchain so the next
    /// build can pass it as `old_swapchain`. Device must be idle.
    pub unsafe fn retire(self, ctx: &GpuContext) -> vk::SwapchainKHR {
        for &view in &self.views {
            ctx.device.destroy_image_view(view, None);
        }
        self.swapchain
    }
}

pub fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub fn limits_from_caps(caps: &vk::SurfaceCapabilitiesKHR) -> SurfaceLimits {
    let fixed = caps.current_extent.width != u32::MAX;
    SurfaceLimits {
        min_image_count: caps.min_image_count,
        max_image_count: caps.max_image_count,
        current_extent: fixed
            .then(|| RenderSize::new(caps.current_extent.width, caps.current_extent.height)),
        min_extent: RenderSize::new(caps.min_image_extent.width, caps.min_image_extent.height),
        max_extent: RenderSize::new(caps.max_image_extent.width, caps.max_image_extent.height),
    }
}

pub fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, &'static str)> {
    if let Some(f) = formats
        .iter()
        .copied()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB)
    {
        return Some((f, "bgra8_srgb"));
    }
    if let Some(f) = formats
        .iter()
        .copied()
        .find(|f| f.format == vk::Format::R8G8B8A8_SRGB)
    {
        return Some((f, "rgba8_srgb"));
    }
    if let Some(f) = formats.iter().copied().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    }) {
        return Some((f, "bgra8_unorm_srgbcs"));
    }
    formats.first().map(|&f| (f, "driver_default"))
}

/// `None` only when the surface lists no modes at all.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    prefs: PresentPrefs,
) -> Option<vk::PresentModeKHR> {
    if modes.is_empty() {
        return None;
    }
    let order: &[vk::PresentModeKHR] = match (prefs.vsync, prefs.mode) {
        (false, _) => &[
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ],
        (true, VkVsyncMode::Mailbox) => &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
        (true, VkVsyncMode::Fifo) => &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    };
    // FIFO support is mandatory, so falling back to it is always valid.
    Some(
        order
            .iter()
            .copied()
            .find(|m| modes.contains(m))
            .unwrap_or(vk::PresentModeKHR::FIFO),
    )
}

// Info only
pub fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
        _ => "OTHER",
    }
}

pub fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn prefers_srgb_formats_in_order() {
        let formats = [
            sf(vk::Format::B8G8R8A8_UNORM),
            sf(vk::Format::R8G8B8A8_SRGB),
            sf(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(pick_surface_format(&formats).unwrap().0.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(pick_surface_format(&formats[..2]).unwrap().0.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(pick_surface_format(&formats[..1]).unwrap().0.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn falls_back_to_first_reported_format() {
        let formats = [sf(vk::Format::A2B10G10R10_UNORM_PACK32), sf(vk::Format::R16G16B16A16_SFLOAT)];
        let (f, reason) = pick_surface_format(&formats).unwrap();
        assert_eq!(f.format, vk::Format::A2B10G10R10_UNORM_PACK32);
        assert_eq!(reason, "driver_default");
        assert!(pick_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_follows_vsync_prefs() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        let off = PresentPrefs { vsync: false, mode: VkVsyncMode::Fifo };
        let mailbox = PresentPrefs::default();
        let fifo = PresentPrefs { vsync: true, mode: VkVsyncMode::Fifo };

        assert_eq!(choose_present_mode(&all, off), Some(vk::PresentModeKHR::IMMEDIATE));
        assert_eq!(choose_present_mode(&all, mailbox), Some(vk::PresentModeKHR::MAILBOX));
        assert_eq!(choose_present_mode(&all, fifo), Some(vk::PresentModeKHR::FIFO));

        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&fifo_only, off), Some(vk::PresentModeKHR::FIFO));
        assert_eq!(choose_present_mode(&fifo_only, mailbox), Some(vk::PresentModeKHR::FIFO));
        assert_eq!(choose_present_mode(&[], mailbox), None);
    }

    #[test]
    fn caps_translate_to_limits() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 2048, height: 2048 },
            ..Default::default()
        };
        let limits = limits_from_caps(&caps);
        assert_eq!(limits.current_extent, None);
        assert_eq!(limits.image_count(), 3);
        assert_eq!(limits.extent(RenderSize::new(4000, 300)), RenderSize::new(2048, 300));

        caps.current_extent = vk::Extent2D { width: 800, height: 600 };
        let limits = limits_from_caps(&caps);
        assert_eq!(limits.current_extent, Some(RenderSize::new(800, 600)));
    }
}
