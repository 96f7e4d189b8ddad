// SPDX-License-Identifier: CEPL-1.0
//! Command recording for one chain image: clear, draw the quad, hand to present.
use ash::vk;
use mandel_render::FrameResult;

use crate::chain::color_range;
use crate::pipeline::FractalPipeline;
use crate::vk_err;

const CLEAR: vk::ClearValue = vk::ClearValue {
    color: vk::ClearColorValue {
        float32: [0.0, 0.0, 0.0, 1.0],
    },
};

pub struct RecordTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

pub unsafe fn record_frame(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    target: &RecordTarget,
    pipeline: &FractalPipeline,
    set: vk::DescriptorSet,
) -> FrameResult<()> {
    device
        .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        .map_err(|e| vk_err("reset_command_buffer", e))?;
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .map_err(|e| vk_err("begin_command_buffer", e))?;

    transition_to_color(device, cmd, target.image);
    begin_rendering(device, cmd, target);
    draw_quad(device, cmd, target.extent, pipeline, set);
    device.cmd_end_rendering(cmd);
    transition_to_present(device, cmd, target.image);

    device
        .end_command_buffer(cmd)
        .map_err(|e| vk_err("end_command_buffer", e))
}

#[inline]
unsafe fn transition_to_color(device: &ash::Device, cmd: vk::CommandBuffer, image: vk::Image) {
    let barrier = vk::ImageMemoryBarrier2 {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
        src_stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags2::empty(),
        dst_stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        dst_access_mask: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        image,
        subresource_range: color_range(),
        ..Default::default()
    };
    let dep = vk::DependencyInfo {
        s_type: vk::StructureType::DEPENDENCY_INFO,
        image_memory_barrier_count: 1,
        p_image_memory_barriers: &barrier,
        ..Default::default()
    };
    device.cmd_pipeline_barrier2(cmd, &dep);
}

#[inline]
unsafe fn begin_rendering(device: &ash::Device, cmd: vk::CommandBuffer, target: &RecordTarget) {
    let color_att = vk::RenderingAttachmentInfo {
        s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
        image_view: target.view,
        image_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        clear_value: CLEAR,
        ..Default::default()
    };
    let rendering_info = vk::RenderingInfo {
        s_type: vk::StructureType::RENDERING_INFO,
        render_area: vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        },
        layer_count: 1,
        color_attachment_count: 1,
        p_color_attachments: &color_att,
        ..Default::default()
    };
    device.cmd_begin_rendering(cmd, &rendering_info);
}

#[inline]
unsafe fn draw_quad(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    extent: vk::Extent2D,
    pipeline: &FractalPipeline,
    set: vk::DescriptorSet,
) {
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);

    let vp = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&vp));
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));

    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        pipeline.layout,
        0,
        std::slice::from_ref(&set),
        &[],
    );
    device.cmd_draw(cmd, 4, 1, 0, 0);
}

#[inline]
unsafe fn transition_to_present(device: &ash::Device, cmd: vk::CommandBuffer, image: vk::Image) {
    let barrier = vk::ImageMemoryBarrier2 {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
        src_stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        dst_stage_mask: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
        dst_access_mask: vk::AccessFlags2::empty(),
        old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        image,
        subresource_range: color_range(),
        ..Default::default()
    };
    let dep = vk::DependencyInfo {
        s_type: vk::StructureType::DEPENDENCY_INFO,
        image_memory_barrier_count: 1,
        p_image_memory_barriers: &barrier,
        ..Default::default()
    };
    device.cmd_pipeline_barrier2(cmd, &dep);
}
