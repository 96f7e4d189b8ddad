// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use mandel_render::{FrameError, FrameResult, MAX_FRAMES_IN_FLIGHT};

use crate::rollback::Rollback;

/// Semaphores and fence for one frame in flight.
pub struct FrameSlot {
    pub image_acquired: vk::Semaphore,
    pub render_complete: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// Fences start signalled so the first wait on every slot returns at once.
pub unsafe fn create_frame_slots(device: &ash::Device) -> FrameResult<Vec<FrameSlot>> {
    let sem_ci = vk::SemaphoreCreateInfo::default();
    let fence_ci = vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    };

    let mut rollback = Rollback::new();
    let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        let slot = create_frame_slot(device, &sem_ci, &fence_ci, &mut rollback)
            .map_err(|e| FrameError::creation("frame slot sync objects", format!("{e:?}")))?;
        slots.push(slot);
    }
    rollback.commit();
    Ok(slots)
}

unsafe fn create_frame_slot<'a>(
    device: &'a ash::Device,
    sem_ci: &vk::SemaphoreCreateInfo,
    fence_ci: &vk::FenceCreateInfo,
    rollback: &mut Rollback<'a>,
) -> VkResult<FrameSlot> {
    let image_acquired = device.create_semaphore(sem_ci, None)?;
    rollback.push(move || device.destroy_semaphore(image_acquired, None));
    let render_complete = device.create_semaphore(sem_ci, None)?;
    rollback.push(move || device.destroy_semaphore(render_complete, None));
    let in_flight = device.create_fence(fence_ci, None)?;
    rollback.push(move || device.destroy_fence(in_flight, None));
    Ok(FrameSlot {
        image_acquired,
        render_complete,
        in_flight,
    })
}

pub unsafe fn destroy_frame_slots(device: &ash::Device, slots: &[FrameSlot]) {
    for s in slots {
        device.destroy_fence(s.in_flight, None);
        device.destroy_semaphore(s.render_complete, None);
        device.destroy_semaphore(s.image_acquired, None);
    }
}
