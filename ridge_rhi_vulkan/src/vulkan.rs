/// VulkanRenderingContext - Vulkan implementation of the RenderingContext trait
///
/// Owns the Vulkan instance. Devices created from it keep the instance alive
/// through their shared context.

use ash::vk;
use ridge_rhi::ridge::rhi::{Config, Device, DeviceDesc, RenderingContext, RenderingContextDesc, ValidationStats};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_err, ridge_info, ridge_warn};
use std::ffi::{CStr, CString};
use std::sync::Arc;

use crate::vulkan_context::{vk_error, DebugMessenger, VulkanInstance, SOURCE};
use crate::vulkan_device::VulkanDevice;

/// Platform surface extensions, enabled when the loader offers them
const PLATFORM_SURFACE_EXTENSIONS: [&CStr; 6] = [
    ash::khr::win32_surface::NAME,
    ash::khr::xlib_surface::NAME,
    ash::khr::xcb_surface::NAME,
    ash::khr::wayland_surface::NAME,
    ash::khr::android_surface::NAME,
    ash::ext::metal_surface::NAME,
];

#[cfg(feature = "vulkan-validation")]
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance extensions to enable among `available`, plus whether portability
/// enumeration is needed (MoltenVK)
pub(crate) fn instance_extensions(available: &[&CStr]) -> Result<(Vec<&'static CStr>, bool)> {
    if !available.contains(&ash::khr::surface::NAME) {
        return Err(ridge_err!(SOURCE, UnsupportedFeature, "The Vulkan loader offers no VK_KHR_surface"));
    }
    let mut extensions = vec![ash::khr::surface::NAME];
    extensions.extend(
        PLATFORM_SURFACE_EXTENSIONS
            .iter()
            .copied()
            .filter(|extension| available.contains(extension)),
    );
    let portability = available.contains(&ash::khr::portability_enumeration::NAME);
    if portability {
        extensions.push(ash::khr::portability_enumeration::NAME);
    }
    Ok((extensions, portability))
}

/// Vulkan rendering context
pub struct VulkanRenderingContext {
    name: String,
    instance: Arc<VulkanInstance>,
}

impl VulkanRenderingContext {
    pub fn new(desc: &RenderingContextDesc) -> Result<Self> {
        desc.validate()?;
        let config = &desc.config;

        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| ridge_err!(SOURCE, UnsupportedFeature, "Failed to load the Vulkan library: {}", e))?;

        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(|e| vk_error("enumerate instance extensions", e))?;
        let available_names: Vec<&CStr> = available
            .iter()
            .map(|extension| unsafe { CStr::from_ptr(extension.extension_name.as_ptr()) })
            .collect();
        let (mut extensions, portability) = instance_extensions(&available_names)?;

        let validation = validation_requested(&entry, config);
        if validation {
            extensions.push(ash::ext::debug_utils::NAME);
        }
        #[cfg(feature = "vulkan-validation")]
        let layers = if validation { vec![VALIDATION_LAYER.as_ptr()] } else { Vec::new() };
        #[cfg(not(feature = "vulkan-validation"))]
        let layers: Vec<*const std::os::raw::c_char> = Vec::new();

        let application_name = CString::new(config.application_name.as_str())
            .map_err(|_| ridge_err!(SOURCE, InvalidValue, "Application name contains a NUL byte"))?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(c"Ridge")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);
        let extension_pointers: Vec<_> = extensions.iter().map(|extension| extension.as_ptr()).collect();
        let flags = if portability {
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            vk::InstanceCreateFlags::empty()
        };
        let create_info = vk::InstanceCreateInfo::default()
            .flags(flags)
            .application_info(&app_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extension_pointers);
        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| vk_error("create Vulkan instance", e))?;

        let debug_messenger = if validation {
            match create_debug_messenger(&entry, &instance, config) {
                Ok(messenger) => messenger,
                Err(error) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(error);
                }
            }
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        ridge_info!(
            SOURCE,
            "Rendering context '{}' created ({} instance extensions, validation {})",
            desc.name,
            extensions.len(),
            if validation { "on" } else { "off" }
        );
        Ok(Self {
            name: desc.name.to_string(),
            instance: Arc::new(VulkanInstance {
                entry,
                instance,
                surface_loader,
                debug_messenger,
            }),
        })
    }
}

#[cfg(feature = "vulkan-validation")]
fn validation_requested(entry: &ash::Entry, config: &Config) -> bool {
    if !config.enable_validation {
        return false;
    }
    let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    let available = layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
    if !available {
        ridge_warn!(SOURCE, "Validation requested but {:?} is not installed", VALIDATION_LAYER);
    }
    available
}

#[cfg(not(feature = "vulkan-validation"))]
fn validation_requested(_entry: &ash::Entry, config: &Config) -> bool {
    if config.enable_validation {
        ridge_warn!(SOURCE, "Validation requested but ridge_rhi_vulkan was built without the vulkan-validation feature");
    }
    false
}

#[cfg(feature = "vulkan-validation")]
fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
    config: &Config,
) -> Result<Option<DebugMessenger>> {
    let reporter = Box::new(crate::debug::DebugReporter::new(config));
    let loader = ash::ext::debug_utils::Instance::new(entry, instance);
    let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(crate::debug::messenger_severities(config.debug_severity))
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(crate::debug::vulkan_debug_callback))
        .user_data(reporter.as_ref() as *const crate::debug::DebugReporter as *mut std::os::raw::c_void);
    let messenger = unsafe { loader.create_debug_utils_messenger(&messenger_info, None) }
        .map_err(|e| vk_error("create debug messenger", e))?;
    Ok(Some(DebugMessenger {
        loader,
        messenger,
        reporter,
    }))
}

#[cfg(not(feature = "vulkan-validation"))]
fn create_debug_messenger(
    _entry: &ash::Entry,
    _instance: &ash::Instance,
    _config: &Config,
) -> Result<Option<DebugMessenger>> {
    Ok(None)
}

impl VulkanRenderingContext {
    /// Print this context's validation message counters to stdout
    pub fn print_validation_stats_report(&self) {
        match self.instance.debug_reporter() {
            Some(reporter) => reporter.print_report(),
            None => println!("Validation is disabled for rendering context '{}'", self.name),
        }
    }
}

crate::vulkan_resource!(VulkanRenderingContext);

impl RenderingContext for VulkanRenderingContext {
    fn create_device(&self, desc: &DeviceDesc) -> Result<Box<dyn Device>> {
        desc.validate()?;
        Ok(Box::new(VulkanDevice::new(Arc::clone(&self.instance), desc)?))
    }

    fn validation_stats(&self) -> ValidationStats {
        self.instance
            .debug_reporter()
            .map(|reporter| reporter.stats())
            .unwrap_or_default()
    }
}
