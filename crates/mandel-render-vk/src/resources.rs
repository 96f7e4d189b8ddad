// SPDX-License-Identifier: CEPL-1.0
//! Per-image uniform buffer, descriptor set and command buffer.
use ash::vk;
use mandel_render::{FractalUniforms, FrameError, FrameResult};

use crate::context::GpuContext;
use crate::rollback::Rollback;
use crate::vk_err;

pub struct FrameResourceSet {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub descriptor: vk::DescriptorSet,
    pub cmd: vk::CommandBuffer,
}

/// One [`FrameResourceSet`] per chain image, sharing a descriptor pool.
pub struct FrameResources {
    pool: vk::DescriptorPool,
    pub sets: Vec<FrameResourceSet>,
}

impl FrameResources {
    pub unsafe fn build(
        ctx: &GpuContext,
        set_layout: vk::DescriptorSetLayout,
        cmd_pool: vk::CommandPool,
        image_count: usize,
    ) -> FrameResult<Self> {
        let ubo_size = FractalUniforms::SIZE as vk::DeviceSize;
        let d = &ctx.device;
        // Sets die with their pool; command buffers are allocated last.
        let mut rollback = Rollback::new();

        // 1) UBOs
        let mut buffers = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            let (buffer, memory) = create_host_visible_ubo(ctx, ubo_size)?;
            rollback.push(move || {
                d.destroy_buffer(buffer, None);
                d.free_memory(memory, None);
            });
            buffers.push((buffer, memory));
        }

        // 2) Pool sized to the image count
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: image_count as u32,
        }];
        let pool_ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: image_count as u32,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        let pool = d
            .create_descriptor_pool(&pool_ci, None)
            .map_err(|e| FrameError::creation("descriptor pool", format!("{e:?}")))?;
        rollback.push(move || d.destroy_descriptor_pool(pool, None));

        // 3) Sets
        let layouts = vec![set_layout; image_count];
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: pool,
            descriptor_set_count: image_count as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        let descriptors = d
            .allocate_descriptor_sets(&alloc)
            .map_err(|e| FrameError::creation("descriptor sets", format!("{e:?}")))?;

        // 4) Point each set at its buffer
        let infos: Vec<vk::DescriptorBufferInfo> = buffers
            .iter()
            .map(|&(buffer, _)| vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range: ubo_size,
            })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = descriptors
            .iter()
            .zip(&infos)
            .map(|(&dst_set, info)| vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: info,
                ..Default::default()
            })
            .collect();
        d.update_descriptor_sets(&writes, &[]);

        // 5) Command buffers, recorded later
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: cmd_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: image_count as u32,
            ..Default::default()
        };
        let cmds = d
            .allocate_command_buffers(&alloc_info)
            .map_err(|e| FrameError::creation("command buffers", format!("{e:?}")))?;

        rollback.commit();

        let sets = buffers
            .into_iter()
            .zip(descriptors)
            .zip(cmds)
            .map(|(((buffer, memory), descriptor), cmd)| FrameResourceSet {
                buffer,
                memory,
                descriptor,
                cmd,
            })
            .collect();
        Ok(Self { pool, sets })
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Copies the uniform block into `image`'s buffer. The previous GPU work
    /// on that image must have finished.
    pub unsafe fn update(
        &self,
        ctx: &GpuContext,
        image: usize,
        uniforms: &FractalUniforms,
    ) -> FrameResult<()> {
        let set = self
            .sets
            .get(image)
            .ok_or_else(|| FrameError::backend("update_uniforms", format!("no resource set {image}")))?;
        let bytes = uniforms.as_bytes();
        let ptr = ctx
            .device
            .map_memory(
                set.memory,
                0,
                bytes.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )
            .map_err(|e| vk_err("map_memory", e))?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        ctx.device.unmap_memory(set.memory);
        Ok(())
    }

    /// Device must be idle.
    pub unsafe fn destroy(self, ctx: &GpuContext, cmd_pool: vk::CommandPool) {
        let d = &ctx.device;
        let cmds: Vec<vk::CommandBuffer> = self.sets.iter().map(|s| s.cmd).collect();
        if !cmds.is_empty() {
            d.free_command_buffers(cmd_pool, &cmds);
        }
        // Sets go with their pool.
        d.destroy_descriptor_pool(self.pool, None);
        for set in &self.sets {
            d.destroy_buffer(set.buffer, None);
            d.free_memory(set.memory, None);
        }
    }
}

pub unsafe fn create_uniform_set_layout(device: &ash::Device) -> FrameResult<vk::DescriptorSetLayout> {
    let binding = vk::DescriptorSetLayoutBinding {
        binding: 0,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::FRAGMENT,
        ..Default::default()
    };
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: 1,
        p_bindings: &binding,
        ..Default::default()
    };
    device
        .create_descriptor_set_layout(&ci, None)
        .map_err(|e| FrameError::creation("descriptor set layout", format!("{e:?}")))
}

pub unsafe fn create_command_pool(ctx: &GpuContext) -> FrameResult<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        queue_family_index: ctx.queue_family,
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        ..Default::default()
    };
    ctx.device
        .create_command_pool(&pool_info, None)
        .map_err(|e| FrameError::creation("command pool", format!("{e:?}")))
}

pub fn find_memory_type(
    mem: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..mem.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0 && mem.memory_types[i as usize].property_flags.contains(req)
    })
}

unsafe fn create_host_visible_ubo(
    ctx: &GpuContext,
    size: vk::DeviceSize,
) -> FrameResult<(vk::Buffer, vk::DeviceMemory)> {
    let d = &ctx.device;
    let bci = vk::BufferCreateInfo {
        s_type: vk::StructureType::BUFFER_CREATE_INFO,
        size,
        usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        ..Default::default()
    };
    let buf = d
        .create_buffer(&bci, None)
        .map_err(|e| FrameError::creation("uniform buffer", format!("{e:?}")))?;
    let mut rollback = Rollback::new();
    rollback.push(move || d.destroy_buffer(buf, None));
    let req = d.get_buffer_memory_requirements(buf);
    let mem_props = ctx
        .instance
        .get_physical_device_memory_properties(ctx.phys);
    let Some(mem_type) = find_memory_type(
        &mem_props,
        req.memory_type_bits,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    ) else {
        return Err(FrameError::creation(
            "uniform buffer memory",
            "no host-visible coherent memory type",
        ));
    };
    let mai = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: mem_type,
        ..Default::default()
    };
    let mem = d
        .allocate_memory(&mai, None)
        .map_err(|e| FrameError::creation("uniform buffer memory", format!("{e:?}")))?;
    rollback.push(move || d.free_memory(mem, None));
    d.bind_buffer_memory(buf, mem, 0)
        .map_err(|e| vk_err("bind_buffer_memory", e))?;
    rollback.commit();
    Ok((buf, mem))
}
