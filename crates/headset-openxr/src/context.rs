//! OpenXR instance/system plus the Vulkan device the runtime asked for.

use std::ffi::{c_char, CString};

use ash::vk::{self, Handle};
use ash::Entry as VkEntry;
use openxr as xr;
use tracing::{debug, info};

use headset_core::{HeadsetError, HeadsetResult, RuntimeError, ViewConfiguration};

/// Lowest Vulkan version with core multiview.
const MIN_VULKAN_VERSION: u32 = vk::API_VERSION_1_1;

const MIN_SAMPLE_COUNT: u32 = 2;
/// `VK_SAMPLE_COUNT_64_BIT`.
const MAX_SAMPLE_SHIFT: u32 = 6;

pub struct XrContext {
    pub instance: xr::Instance,
    pub system: xr::SystemId,
    pub view_configuration: ViewConfiguration,
    pub sample_count: u32,

    // Kept alive for the lifetime of `vk_instance`.
    _vk_entry: VkEntry,
    pub vk_instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
}

impl XrContext {
    /// Connects to the active OpenXR runtime and creates a Vulkan device on
    /// the GPU it drives. `requested_samples` is clamped to a count of at
    /// least 2 that the device supports for both color and depth
    /// attachments.
    pub fn new(
        application_name: &str,
        view_configuration: ViewConfiguration,
        requested_samples: u32,
    ) -> HeadsetResult<Self> {
        let entry = unsafe { xr::Entry::load() }
            .map_err(|e| HeadsetError::unsupported(format!("OpenXR loader: {e}")))?;
        let available_exts = entry
            .enumerate_extensions()
            .map_err(|e| RuntimeError::from_debug("enumerate_extensions", e))?;
        if !available_exts.khr_vulkan_enable {
            return Err(HeadsetError::unsupported(
                "OpenXR KHR_vulkan_enable not available",
            ));
        }

        let mut exts = xr::ExtensionSet::default();
        exts.khr_vulkan_enable = true;

        let app_info = xr::ApplicationInfo {
            application_name,
            application_version: 1,
            engine_name: application_name,
            engine_version: 1,
            api_version: xr::Version::new(1, 0, 0),
        };
        let instance = entry
            .create_instance(&app_info, &exts, &[])
            .map_err(|e| RuntimeError::from_debug("create_instance", e))?;
        if let Ok(props) = instance.properties() {
            info!(
                runtime = %props.runtime_name,
                version = ?props.runtime_version,
                "OpenXR runtime connected"
            );
        }

        let system = instance
            .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
            .map_err(|e| RuntimeError::from_debug("get_system", e))?;

        let view_types = instance
            .enumerate_view_configurations(system)
            .map_err(|e| RuntimeError::from_debug("enumerate_view_configurations", e))?;
        if !view_types.contains(&view_configuration_type(view_configuration)) {
            return Err(HeadsetError::unsupported(format!(
                "view configuration {view_configuration:?}"
            )));
        }

        let vk_entry = unsafe { VkEntry::load() }
            .map_err(|e| HeadsetError::unsupported(format!("Vulkan loader: {e}")))?;

        let reqs = instance
            .graphics_requirements::<xr::Vulkan>(system)
            .map_err(|e| RuntimeError::from_debug("graphics_requirements", e))?;
        let api_version = vk::make_api_version(
            0,
            reqs.min_api_version_supported.major() as u32,
            reqs.min_api_version_supported.minor() as u32,
            reqs.min_api_version_supported.patch(),
        )
        .max(MIN_VULKAN_VERSION);

        let instance_exts = instance
            .vulkan_legacy_instance_extensions(system)
            .map_err(|e| RuntimeError::from_debug("vulkan_legacy_instance_extensions", e))?;
        let instance_exts = parse_extension_list(&instance_exts)?;
        let instance_ext_ptrs: Vec<*const c_char> =
            instance_exts.iter().map(|s| s.as_ptr()).collect();

        let app_name = c_string(application_name)?;
        let vk_app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .engine_name(&app_name)
            .api_version(api_version);
        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&vk_app_info)
            .enabled_extension_names(&instance_ext_ptrs);
        let vk_instance = unsafe { vk_entry.create_instance(&create_info, None) }
            .map_err(|e| RuntimeError::new("vkCreateInstance", e))?;

        let physical_device = match unsafe {
            instance.vulkan_graphics_device(system, vk_instance.handle().as_raw() as *const _)
        } {
            Ok(device) => vk::PhysicalDevice::from_raw(device as u64),
            Err(e) => {
                unsafe { vk_instance.destroy_instance(None) };
                return Err(RuntimeError::from_debug("vulkan_graphics_device", e).into());
            }
        };

        let (device, queue_family_index) =
            match create_device(&instance, system, &vk_instance, physical_device) {
                Ok(created) => created,
                Err(err) => {
                    unsafe { vk_instance.destroy_instance(None) };
                    return Err(err);
                }
            };
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let sample_count =
            match supported_sample_count(&vk_instance, physical_device, requested_samples) {
                Some(samples) => samples,
                None => {
                    unsafe {
                        device.destroy_device(None);
                        vk_instance.destroy_instance(None);
                    }
                    return Err(HeadsetError::unsupported(
                        "multisampled color and depth attachments",
                    ));
                }
            };
        if sample_count != requested_samples {
            debug!(requested_samples, sample_count, "multisample count clamped");
        }

        info!(
            ?view_configuration,
            sample_count,
            vulkan = %format_version(api_version),
            "headset device ready"
        );

        Ok(Self {
            instance,
            system,
            view_configuration,
            sample_count,
            _vk_entry: vk_entry,
            vk_instance,
            physical_device,
            device,
            queue,
            queue_family_index,
        })
    }

    pub fn session_create_info(&self) -> xr::vulkan::SessionCreateInfo {
        xr::vulkan::SessionCreateInfo {
            instance: self.vk_instance.handle().as_raw() as *const _,
            physical_device: self.physical_device.as_raw() as *const _,
            device: self.device.handle().as_raw() as *const _,
            queue_family_index: self.queue_family_index,
            queue_index: 0,
        }
    }

    pub fn view_configuration_type(&self) -> xr::ViewConfigurationType {
        view_configuration_type(self.view_configuration)
    }

    pub(crate) fn find_memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        let mem = unsafe {
            self.vk_instance
                .get_physical_device_memory_properties(self.physical_device)
        };
        (0..mem.memory_type_count).find(|&i| {
            (type_bits & (1 << i)) != 0
                && mem.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
    }
}

impl Drop for XrContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.vk_instance.destroy_instance(None);
        }
    }
}

pub fn view_configuration_type(views: ViewConfiguration) -> xr::ViewConfigurationType {
    match views {
        ViewConfiguration::Mono => xr::ViewConfigurationType::PRIMARY_MONO,
        ViewConfiguration::PrimaryStereo => xr::ViewConfigurationType::PRIMARY_STEREO,
    }
}

fn create_device(
    xr_instance: &xr::Instance,
    system: xr::SystemId,
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> HeadsetResult<(ash::Device, u32)> {
    let queue_family_index = find_graphics_queue_family(instance, physical_device)?;

    let device_exts = xr_instance
        .vulkan_legacy_device_extensions(system)
        .map_err(|e| RuntimeError::from_debug("vulkan_legacy_device_extensions", e))?;
    let device_exts = parse_extension_list(&device_exts)?;
    let device_ext_ptrs: Vec<*const c_char> = device_exts.iter().map(|s| s.as_ptr()).collect();

    let mut multiview = vk::PhysicalDeviceMultiviewFeatures::default();
    let mut features = vk::PhysicalDeviceFeatures2::builder().push_next(&mut multiview);
    unsafe { instance.get_physical_device_features2(physical_device, &mut features) };
    if multiview.multiview == vk::FALSE {
        return Err(HeadsetError::unsupported("Vulkan multiview"));
    }

    let priorities = [1.0f32];
    let queue_info = vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_family_index)
        .queue_priorities(&priorities);

    let mut enable_multiview = vk::PhysicalDeviceMultiviewFeatures::builder().multiview(true);
    let device_create = vk::DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_info))
        .enabled_extension_names(&device_ext_ptrs)
        .push_next(&mut enable_multiview);

    let device = unsafe { instance.create_device(physical_device, &device_create, None) }
        .map_err(|e| RuntimeError::new("vkCreateDevice", e))?;
    Ok((device, queue_family_index))
}

fn parse_extension_list(list: &str) -> HeadsetResult<Vec<CString>> {
    list.split_whitespace()
        .filter(|s| !s.is_empty())
        .map(c_string)
        .collect()
}

fn c_string(s: &str) -> HeadsetResult<CString> {
    CString::new(s).map_err(|e| HeadsetError::config(format!("invalid name {s:?}: {e}")))
}

fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> HeadsetResult<u32> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    families
        .iter()
        .enumerate()
        .find(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(idx, _)| idx as u32)
        .ok_or_else(|| HeadsetError::unsupported("Vulkan graphics queue family"))
}

fn supported_sample_count(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    requested: u32,
) -> Option<u32> {
    let limits = unsafe { instance.get_physical_device_properties(physical_device) }.limits;
    let supported = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    clamp_sample_count(supported.as_raw(), requested)
}

/// Largest supported power of two from 2 up to `requested`, else the
/// smallest supported one above it. The color attachment always resolves
/// into the swapchain image, so a single sample is never returned.
fn clamp_sample_count(supported: u32, requested: u32) -> Option<u32> {
    let requested = requested.clamp(MIN_SAMPLE_COUNT, 1 << MAX_SAMPLE_SHIFT);
    let mut samples = requested.next_power_of_two();
    if samples > requested {
        samples >>= 1;
    }
    let below = (0u32..)
        .map(|shift| samples >> shift)
        .take_while(|&s| s >= MIN_SAMPLE_COUNT)
        .find(|&s| supported & s != 0);
    below.or_else(|| {
        (1..=MAX_SAMPLE_SHIFT)
            .map(|shift| 1u32 << shift)
            .find(|&s| s > samples && supported & s != 0)
    })
}

fn format_version(version: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(version),
        vk::api_version_minor(version),
        vk::api_version_patch(version)
    )
}
