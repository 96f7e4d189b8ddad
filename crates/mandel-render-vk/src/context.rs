// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface and logical device: everything that outlives a rebuild.
use std::ffi::{c_char, CStr};

use anyhow::{anyhow, bail, Context, Result};
#[cfg(debug_assertions)]
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::info;

use crate::rollback::Rollback;

#[cfg(debug_assertions)]
type DebugState = vk::DebugUtilsMessengerEXT;
#[cfg(not(debug_assertions))]
type DebugState = ();

pub struct GpuContext {
    entry: Entry,
    pub instance: Instance,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family: u32,
    pub swapchain_loader: swapchain::Device,
    debug: DebugState,
}

impl GpuContext {
    // STRICT ORDER:
    // 1) Instance with the platform WSI extensions
    // 2) Surface from that instance
    // 3) Physical device + queue family checked for present support on that surface
    // 4) Device with sync2 + dynamic rendering + float64
    pub unsafe fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();

        let entry = Entry::linked();
        let (instance, has_debug_utils) = create_instance(&entry, dh).context("create_instance")?;
        let surface_loader = surface::Instance::new(&entry, &instance);
        let (e, i, sl) = (&entry, &instance, &surface_loader);
        let mut rollback = Rollback::new();
        rollback.push(move || i.destroy_instance(None));

        let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
            .context("ash_window::create_surface")?;
        rollback.push(move || sl.destroy_surface(surface, None));
        let debug = create_debug_messenger(&entry, &instance, has_debug_utils)?;
        rollback.push(move || destroy_debug_messenger(e, i, debug));

        let (phys, queue_family) = pick_device_and_queue(&instance, &surface_loader, surface)?;
        let device = create_device(&instance, phys, queue_family)?;
        rollback.commit();

        let queue = device.get_device_queue(queue_family, 0);
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        Ok(Self {
            entry,
            instance,
            surface_loader,
            surface,
            phys,
            device,
            queue,
            queue_family,
            swapchain_loader,
            debug,
        })
    }

    pub fn properties(&self) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(self.phys) }
    }
}

// Device before surface, instance last. The backend has already released
// everything created from the device.
impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            destroy_debug_messenger(&self.entry, &self.instance, self.debug);
            self.instance.destroy_instance(None);
        }
    }
}

/// Also reports whether VK_EXT_debug_utils got enabled.
unsafe fn create_instance(entry: &Entry, display_raw: RawDisplayHandle) -> Result<(Instance, bool)> {
    let name = c"mandelview";
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: name.as_ptr(),
        application_version: 0,
        p_engine_name: name.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_3,
        ..Default::default()
    };

    let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();

    let mut layers: Vec<*const c_char> = Vec::new();
    let mut has_debug_utils = false;
    if cfg!(debug_assertions) {
        let available_exts = entry
            .enumerate_instance_extension_properties(None)
            .context("enumerate_instance_extension_properties")?;
        has_debug_utils = available_exts.iter().any(|e| {
            CStr::from_ptr(e.extension_name.as_ptr()) == ash::ext::debug_utils::NAME
        });
        if has_debug_utils {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let validation = c"VK_LAYER_KHRONOS_validation";
        let has_validation = entry
            .enumerate_instance_layer_properties()
            .unwrap_or_default()
            .iter()
            .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == validation);
        if has_validation {
            layers.push(validation.as_ptr());
        } else {
            info!("vk: validation layer not installed, running without it");
        }
    }

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    Ok((entry.create_instance(&create_info, None)?, has_debug_utils))
}

fn api_at_least_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

/// First device that can run the fractal shader and present to `surface`.
unsafe fn pick_device_and_queue(
    instance: &Instance,
    surf_i: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    for phys in instance.enumerate_physical_devices()? {
        let props = instance.get_physical_device_properties(phys);
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !api_at_least_1_3(props.api_version) {
            info!("vk: skipping {name}: Vulkan 1.3 required");
            continue;
        }
        if instance.get_physical_device_features(phys).shader_float64 != vk::TRUE {
            info!("vk: skipping {name}: no shaderFloat64");
            continue;
        }

        let qprops = instance.get_physical_device_queue_family_properties(phys);
        for (i, q) in qprops.iter().enumerate() {
            if q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && surf_i
                    .get_physical_device_surface_support(phys, i as u32, surface)
                    .unwrap_or(false)
            {
                info!("vk: using {name}, queue family {i}");
                return Ok((phys, i as u32));
            }
        }
    }
    Err(anyhow!("no device with Vulkan 1.3, shaderFloat64 and a present-capable graphics queue"))
}

unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let qinfo = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };

    let ext_props = instance
        .enumerate_device_extension_properties(phys)
        .context("enumerate_device_extension_properties")?;
    let has_swapchain = ext_props
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == swapchain::NAME);
    if !has_swapchain {
        bail!("device lacks {:?}", swapchain::NAME);
    }
    let device_exts = [swapchain::NAME.as_ptr()];

    // STRICT ORDER (pNext): feats2 -> feats13. Structs must outlive create_device.
    let mut feats13 = vk::PhysicalDeviceVulkan13Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES,
        synchronization2: vk::TRUE,
        dynamic_rendering: vk::TRUE,
        ..Default::default()
    };
    let feats2 = vk::PhysicalDeviceFeatures2 {
        s_type: vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
        p_next: (&mut feats13) as *mut _ as *mut _,
        features: vk::PhysicalDeviceFeatures {
            shader_float64: vk::TRUE,
            ..Default::default()
        },
        ..Default::default()
    };

    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        p_next: (&feats2 as *const vk::PhysicalDeviceFeatures2) as *const _,
        queue_create_info_count: 1,
        p_queue_create_infos: &qinfo,
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };
    instance
        .create_device(phys, &dinfo, None)
        .context("create_device")
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::debug!(target: "vulkan", "{msg}");
    } else {
        tracing::trace!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

#[cfg(debug_assertions)]
unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
    enabled: bool,
) -> Result<DebugState> {
    if !enabled {
        return Ok(vk::DebugUtilsMessengerEXT::null());
    }
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    Ok(loader.create_debug_utils_messenger(&ci, None)?)
}

#[cfg(not(debug_assertions))]
unsafe fn create_debug_messenger(
    _entry: &Entry,
    _instance: &Instance,
    _enabled: bool,
) -> Result<DebugState> {
    Ok(())
}

#[cfg(debug_assertions)]
unsafe fn destroy_debug_messenger(entry: &Entry, instance: &Instance, dbg: DebugState) {
    if dbg != vk::DebugUtilsMessengerEXT::null() {
        ext_debug::Instance::new(entry, instance).destroy_debug_utils_messenger(dbg, None);
    }
}

#[cfg(not(debug_assertions))]
unsafe fn destroy_debug_messenger(_entry: &Entry, _instance: &Instance, _dbg: DebugState) {}
