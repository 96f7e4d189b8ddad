// SPDX-License-Identifier: CEPL-1.0
use std::io::Cursor;
use std::{fs, path::Path, path::PathBuf};

use anyhow::Result;
use ash::util::read_spv;
use ash::vk;
use mandel_math::ColorMode;
use mandel_render::{FrameError, FrameResult};
use tracing::{debug, warn};

/// Graphics pipeline for the fractal quad, specialized on the color mode.
pub struct FractalPipeline {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub color: ColorMode,
    pub format: vk::Format,
}

impl FractalPipeline {
    // STRICT: color_attachment_formats MUST match the current swapchain format.
    // On swapchain format change the pipeline must be rebuilt before recording.
    pub unsafe fn create(
        device: &ash::Device,
        cache: vk::PipelineCache,
        color_format: vk::Format,
        set_layout: vk::DescriptorSetLayout,
        color: ColorMode,
    ) -> FrameResult<Self> {
        let fail = |what: &'static str| move |e: vk::Result| FrameError::creation(what, format!("{e:?}"));

        let vs_bytes = include_bytes!(concat!(env!("OUT_DIR"), "/quad.vert.spv"));
        let fs_bytes = include_bytes!(concat!(env!("OUT_DIR"), "/mandel.frag.spv"));
        let vs_code = read_spv(&mut Cursor::new(&vs_bytes[..]))
            .map_err(|e| FrameError::creation("vertex shader", e))?;
        let fs_code = read_spv(&mut Cursor::new(&fs_bytes[..]))
            .map_err(|e| FrameError::creation("fragment shader", e))?;
        let vs_ci = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            p_code: vs_code.as_ptr(),
            code_size: vs_code.len() * 4,
            ..Default::default()
        };
        let fs_ci = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            p_code: fs_code.as_ptr(),
            code_size: fs_code.len() * 4,
            ..Default::default()
        };
        let vs = device
            .create_shader_module(&vs_ci, None)
            .map_err(fail("vertex shader module"))?;
        let fs = match device.create_shader_module(&fs_ci, None) {
            Ok(m) => m,
            Err(e) => {
                device.destroy_shader_module(vs, None);
                return Err(fail("fragment shader module")(e));
            }
        };

        // COLOR_MODE, constant_id 0
        let color_tag = color.tag();
        let spec_entry = vk::SpecializationMapEntry {
            constant_id: 0,
            offset: 0,
            size: std::mem::size_of::<u32>(),
        };
        let spec_data = bytemuck::bytes_of(&color_tag);
        let spec = vk::SpecializationInfo {
            map_entry_count: 1,
            p_map_entries: &spec_entry,
            data_size: spec_data.len(),
            p_data: spec_data.as_ptr().cast(),
            ..Default::default()
        };

        let entry = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: vs,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fs,
                p_name: entry.as_ptr(),
                p_specialization_info: &spec,
                ..Default::default()
            },
        ];

        // No vertex buffers: the quad comes from gl_VertexIndex.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
            ..Default::default()
        };
        let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: dyn_states.len() as u32,
            p_dynamic_states: dyn_states.as_ptr(),
            ..Default::default()
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        let color_blend_att = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_blend_att,
            ..Default::default()
        };

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: 1,
            p_set_layouts: &set_layout,
            ..Default::default()
        };
        let layout = match device.create_pipeline_layout(&layout_info, None) {
            Ok(l) => l,
            Err(e) => {
                device.destroy_shader_module(vs, None);
                device.destroy_shader_module(fs, None);
                return Err(fail("pipeline layout")(e));
            }
        };

        let rendering = vk::PipelineRenderingCreateInfo {
            s_type: vk::StructureType::PIPELINE_RENDERING_CREATE_INFO,
            color_attachment_count: 1,
            p_color_attachment_formats: &color_format,
            ..Default::default()
        };
        let pipeline_info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            p_next: (&rendering as *const vk::PipelineRenderingCreateInfo) as *const _,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            p_dynamic_state: &dynamic_state,
            layout,
            ..Default::default()
        };

        let created =
            device.create_graphics_pipelines(cache, std::slice::from_ref(&pipeline_info), None);
        device.destroy_shader_module(vs, None);
        device.destroy_shader_module(fs, None);
        let pipeline = match created {
            Ok(p) => p[0],
            Err((_, e)) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(fail("graphics pipeline")(e));
            }
        };

        debug!(color = color.name(), "vk: fractal pipeline built");
        Ok(Self {
            layout,
            pipeline,
            color,
            format: color_format,
        })
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

fn hex_bytes(b: &[u8]) -> String {
    let mut s = String::with_capacity(b.len() * 2);
    for x in b {
        use std::fmt::Write as _;
        let _ = write!(&mut s, "{:02x}", x);
    }
    s
}

pub fn pipeline_cache_path(props: &vk::PhysicalDeviceProperties) -> PathBuf {
    let uuid = hex_bytes(&props.pipeline_cache_uuid);
    PathBuf::from(format!(
        "mandel_pipeline_cache_{:04x}_{:04x}_{:08x}_{}.bin",
        props.vendor_id, props.device_id, props.driver_version, uuid
    ))
}

/// Checks the VkPipelineCacheHeaderVersionOne prefix against this device.
pub fn cache_header_matches(data: &[u8], props: &vk::PhysicalDeviceProperties) -> bool {
    if data.len() < 32 {
        return false;
    }
    let word = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    word(0) as usize <= data.len()
        && word(4) == vk::PipelineCacheHeaderVersion::ONE.as_raw() as u32
        && word(8) == props.vendor_id
        && word(12) == props.device_id
        && data[16..32] == props.pipeline_cache_uuid
}

pub unsafe fn create_or_load_pipeline_cache(
    device: &ash::Device,
    props: &vk::PhysicalDeviceProperties,
    path: &Path,
) -> FrameResult<vk::PipelineCache> {
    let data = fs::read(path)
        .ok()
        .filter(|bytes| {
            let ok = cache_header_matches(bytes, props);
            if !ok {
                warn!("vk: ignoring stale pipeline cache {}", path.display());
            }
            ok
        })
        .unwrap_or_default();

    let ci = vk::PipelineCacheCreateInfo {
        s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
        initial_data_size: data.len(),
        p_initial_data: if data.is_empty() {
            std::ptr::null()
        } else {
            data.as_ptr().cast()
        },
        ..Default::default()
    };
    device
        .create_pipeline_cache(&ci, None)
        .map_err(|e| FrameError::creation("pipeline cache", format!("{e:?}")))
}

pub unsafe fn save_pipeline_cache(
    device: &ash::Device,
    cache: vk::PipelineCache,
    path: &Path,
) -> Result<()> {
    // Drivers may refuse on an empty cache or a lost device; nothing to save then.
    if let Ok(bytes) = device.get_pipeline_cache_data(cache) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        fs::write(path, &bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> vk::PhysicalDeviceProperties {
        vk::PhysicalDeviceProperties {
            vendor_id: 0x10de,
            device_id: 0x2684,
            driver_version: 0x1234_5678,
            pipeline_cache_uuid: [0xab; 16],
            ..Default::default()
        }
    }

    fn header(p: &vk::PhysicalDeviceProperties) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend_from_slice(&32u32.to_le_bytes());
        h.extend_from_slice(&1u32.to_le_bytes());
        h.extend_from_slice(&p.vendor_id.to_le_bytes());
        h.extend_from_slice(&p.device_id.to_le_bytes());
        h.extend_from_slice(&p.pipeline_cache_uuid);
        h
    }

    #[test]
    fn cache_path_names_the_device() {
        let path = pipeline_cache_path(&props());
        let name = path.to_string_lossy();
        assert!(name.starts_with("mandel_pipeline_cache_10de_2684_12345678_abab"));
        assert!(name.ends_with(".bin"));
    }

    #[test]
    fn cache_header_is_checked_against_device() {
        let p = props();
        assert!(cache_header_matches(&header(&p), &p));

        let mut other = props();
        other.device_id = 1;
        assert!(!cache_header_matches(&header(&other), &p));

        let mut uuid = header(&p);
        uuid[20] ^= 0xff;
        assert!(!cache_header_matches(&uuid, &p));

        assert!(!cache_header_matches(&header(&p)[..20], &p));
    }
}
