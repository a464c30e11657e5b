/// Device - Vulkan implementation of the Device trait
///
/// Picks the most capable physical device, creates one queue on every family
/// and builds the shared [`GpuContext`]. Factories validate descriptors
/// through the core before touching Vulkan.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use ridge_rhi::ridge::rhi::{
    select_queue_family, Buffer, BufferDesc, ComputePipeline, ComputePipelineDesc, Device, DeviceDesc, DeviceLimits,
    DeviceType, GraphicsPipeline, GraphicsPipelineDesc, Image, ImageDesc, ImageFormat, ImageSampling, ImageUsage,
    Queue, QueueDesc, QueueFamilyCandidate, QueueOperations, RenderPass, RenderPassDesc, ResourceTable,
    ResourceTableCapacities, ResourceTableDesc, Sampler, SamplerAnisotropy, SamplerDesc, Shader, ShaderDesc,
    Swapchain, SwapchainDesc,
};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_bail, ridge_ensure, ridge_err, ridge_info, ridge_warn};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::{lock, vk_error, GpuContext, QueueFamily, VulkanInstance, SOURCE};
use crate::vulkan_format::{image_format_to_vk, required_format_features, sampling_to_vk};
use crate::vulkan_image::VulkanImage;
use crate::vulkan_pipeline::{VulkanComputePipeline, VulkanGraphicsPipeline};
use crate::vulkan_queue::VulkanQueue;
use crate::vulkan_render_pass::VulkanRenderPass;
use crate::vulkan_resource_table::{create_resource_table_layout, VulkanResourceTable};
use crate::vulkan_sampler::VulkanSampler;
use crate::vulkan_shader::VulkanShader;
use crate::vulkan_swapchain::VulkanSwapchain;

/// Update-after-bind descriptor limits of a physical device
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DescriptorLimits {
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub sampled_images: u32,
    pub storage_images: u32,
    pub samplers: u32,
    /// Every binding of the layout is visible to every stage
    pub per_stage_resources: u32,
}

/// Shrink the default capacities to what the device can hold in one set
pub(crate) fn clamp_capacities(defaults: ResourceTableCapacities, limits: &DescriptorLimits) -> ResourceTableCapacities {
    let mut capacities = ResourceTableCapacities {
        uniform_buffers: defaults.uniform_buffers.min(limits.uniform_buffers),
        storage_buffers: defaults.storage_buffers.min(limits.storage_buffers),
        sampled_images: defaults.sampled_images.min(limits.sampled_images),
        storage_images: defaults.storage_images.min(limits.storage_images),
        samplers: defaults.samplers.min(limits.samplers),
    };
    let total = capacities.uniform_buffers as u64
        + capacities.storage_buffers as u64
        + capacities.sampled_images as u64
        + capacities.storage_images as u64
        + capacities.samplers as u64;
    if total > limits.per_stage_resources as u64 {
        let scale = |count: u32| (count as u64 * limits.per_stage_resources as u64 / total) as u32;
        capacities = ResourceTableCapacities {
            uniform_buffers: scale(capacities.uniform_buffers),
            storage_buffers: scale(capacities.storage_buffers),
            sampled_images: scale(capacities.sampled_images),
            storage_images: scale(capacities.storage_images),
            samplers: scale(capacities.samplers),
        };
    }
    capacities
}

pub(crate) fn device_type_from_vk(device_type: vk::PhysicalDeviceType) -> DeviceType {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => DeviceType::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceType::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => DeviceType::Virtual,
        vk::PhysicalDeviceType::CPU => DeviceType::Cpu,
        _ => DeviceType::Other,
    }
}

/// Preference between suitable physical devices, higher first
pub(crate) fn device_type_score(device_type: DeviceType) -> u32 {
    match device_type {
        DeviceType::Discrete => 4,
        DeviceType::Integrated => 3,
        DeviceType::Virtual => 2,
        DeviceType::Cpu => 1,
        DeviceType::Other => 0,
    }
}

/// Graphics and compute queues accept transfers even when not advertised
pub(crate) fn queue_operations_from_vk(flags: vk::QueueFlags) -> QueueOperations {
    let mut operations = QueueOperations::empty();
    if flags.contains(vk::QueueFlags::GRAPHICS) {
        operations |= QueueOperations::GRAPHICS | QueueOperations::TRANSFER;
    }
    if flags.contains(vk::QueueFlags::COMPUTE) {
        operations |= QueueOperations::COMPUTE | QueueOperations::TRANSFER;
    }
    if flags.contains(vk::QueueFlags::TRANSFER) {
        operations |= QueueOperations::TRANSFER;
    }
    operations
}

/// What the selection needs to know about a physical device
struct PhysicalDeviceInfo {
    physical_device: vk::PhysicalDevice,
    name: String,
    device_type: DeviceType,
    properties: vk::PhysicalDeviceProperties,
    descriptor_limits: DescriptorLimits,
    anisotropy_supported: bool,
    wireframe_supported: bool,
    uniform_update_after_bind: bool,
    queue_families: Vec<(u32, QueueOperations)>,
}

impl PhysicalDeviceInfo {
    /// `Ok(None)` when the device lacks something the backend requires
    fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Result<Option<Self>> {
        let mut properties12 = vk::PhysicalDeviceVulkan12Properties::default();
        let mut properties2 = vk::PhysicalDeviceProperties2::default().push_next(&mut properties12);
        unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };
        let properties = properties2.properties;
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        if vk::api_version_major(properties.api_version) == 1 && vk::api_version_minor(properties.api_version) < 2 {
            ridge_info!(SOURCE, "Skipping '{}': Vulkan 1.2 is required", name);
            return Ok(None);
        }

        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features12);
        unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
        let features = features2.features;
        let required = [
            ("timelineSemaphore", features12.timeline_semaphore),
            ("descriptorBindingPartiallyBound", features12.descriptor_binding_partially_bound),
            ("descriptorBindingStorageBufferUpdateAfterBind", features12.descriptor_binding_storage_buffer_update_after_bind),
            ("descriptorBindingSampledImageUpdateAfterBind", features12.descriptor_binding_sampled_image_update_after_bind),
            ("descriptorBindingStorageImageUpdateAfterBind", features12.descriptor_binding_storage_image_update_after_bind),
        ];
        if let Some((feature, _)) = required.iter().find(|(_, supported)| *supported == vk::FALSE) {
            ridge_info!(SOURCE, "Skipping '{}': {} is not supported", name, feature);
            return Ok(None);
        }

        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .map_err(|e| vk_error(format_args!("enumerate extensions of '{}'", name), e))?;
        let has_swapchain = extensions.iter().any(|extension| {
            (unsafe { CStr::from_ptr(extension.extension_name.as_ptr()) }) == ash::khr::swapchain::NAME
        });
        if !has_swapchain {
            ridge_info!(SOURCE, "Skipping '{}': VK_KHR_swapchain is not supported", name);
            return Ok(None);
        }

        let queue_families: Vec<(u32, QueueOperations)> =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) }
                .iter()
                .enumerate()
                .map(|(index, family)| (index as u32, queue_operations_from_vk(family.queue_flags)))
                .filter(|(_, operations)| !operations.is_empty())
                .collect();
        if !queue_families
            .iter()
            .any(|(_, operations)| operations.contains(QueueOperations::GRAPHICS))
        {
            ridge_info!(SOURCE, "Skipping '{}': no graphics queue", name);
            return Ok(None);
        }

        Ok(Some(Self {
            physical_device,
            name,
            device_type: device_type_from_vk(properties.device_type),
            properties,
            descriptor_limits: DescriptorLimits {
                uniform_buffers: properties12.max_descriptor_set_update_after_bind_uniform_buffers,
                storage_buffers: properties12.max_descriptor_set_update_after_bind_storage_buffers,
                sampled_images: properties12.max_descriptor_set_update_after_bind_sampled_images,
                storage_images: properties12.max_descriptor_set_update_after_bind_storage_images,
                samplers: properties12.max_descriptor_set_update_after_bind_samplers,
                per_stage_resources: properties12.max_per_stage_update_after_bind_resources,
            },
            anisotropy_supported: features.sampler_anisotropy == vk::TRUE,
            wireframe_supported: features.fill_mode_non_solid == vk::TRUE,
            uniform_update_after_bind: features12.descriptor_binding_uniform_buffer_update_after_bind == vk::TRUE,
            queue_families,
        }))
    }
}

/// Vulkan device implementation
pub struct VulkanDevice {
    ctx: Arc<GpuContext>,
    name: String,
    hardware_name: String,
    device_type: DeviceType,
    limits: DeviceLimits,
    /// Sample counts usable by both color and depth attachments
    sample_counts: vk::SampleCountFlags,
    /// 0 when anisotropic filtering is unavailable
    max_anisotropy: f32,
    wireframe_supported: bool,
    /// Queues created so far on each family
    queue_use_counts: Mutex<FxHashMap<u32, u32>>,
}

impl VulkanDevice {
    pub(crate) fn new(instance: Arc<VulkanInstance>, desc: &DeviceDesc) -> Result<Self> {
        let physical_devices = unsafe { instance.instance.enumerate_physical_devices() }
            .map_err(|e| vk_error("enumerate physical devices", e))?;
        let mut candidates = Vec::new();
        for physical_device in physical_devices {
            if let Some(info) = PhysicalDeviceInfo::query(&instance.instance, physical_device)? {
                candidates.push(info);
            }
        }
        // Ties keep enumeration order
        let info = candidates
            .into_iter()
            .rev()
            .max_by_key(|info| device_type_score(info.device_type))
            .ok_or_else(|| ridge_err!(SOURCE, UnsupportedFeature, "No suitable Vulkan device found"))?;

        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = info
            .queue_families
            .iter()
            .map(|&(index, _)| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&priorities)
            })
            .collect();
        let extensions = [ash::khr::swapchain::NAME.as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(info.anisotropy_supported)
            .fill_mode_non_solid(info.wireframe_supported);
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default()
            .timeline_semaphore(true)
            .descriptor_indexing(true)
            .runtime_descriptor_array(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_uniform_buffer_update_after_bind(info.uniform_update_after_bind)
            .descriptor_binding_storage_buffer_update_after_bind(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .descriptor_binding_storage_image_update_after_bind(true);
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut features12);
        let device = unsafe { instance.instance.create_device(info.physical_device, &device_info, None) }
            .map_err(|e| vk_error(format_args!("create logical device on '{}'", info.name), e))?;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: device.clone(),
            physical_device: info.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                ridge_bail!(SOURCE, BackendError, "Failed to create GPU allocator on '{}': {:?}", info.name, e);
            }
        };

        let capacities = clamp_capacities(ResourceTableCapacities::default(), &info.descriptor_limits);
        let layout = match create_resource_table_layout(&device, &capacities, info.uniform_update_after_bind) {
            Ok(layout) => layout,
            Err(error) => {
                drop(allocator);
                unsafe { device.destroy_device(None) };
                return Err(error);
            }
        };

        let queue_families = info
            .queue_families
            .iter()
            .map(|&(index, operations)| QueueFamily {
                index,
                operations,
                queue: Mutex::new(unsafe { device.get_device_queue(index, 0) }),
            })
            .collect();
        let debug_utils = instance
            .validation_enabled()
            .then(|| ash::ext::debug_utils::Device::new(&instance.instance, &device));

        let limits = &info.properties.limits;
        let device_limits = DeviceLimits {
            max_uniform_buffer_size: limits.max_uniform_buffer_range as u64,
            max_storage_buffer_size: limits.max_storage_buffer_range as u64,
            max_render_pass_width: limits.max_framebuffer_width,
            max_render_pass_height: limits.max_framebuffer_height,
            max_push_constant_size: limits.max_push_constants_size,
            resource_table_capacities: capacities,
        };
        let sample_counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
        let max_anisotropy = if info.anisotropy_supported {
            limits.max_sampler_anisotropy
        } else {
            0.0
        };

        ridge_info!(
            SOURCE,
            "Device '{}' created on '{}' ({:?}, Vulkan {}.{})",
            desc.name,
            info.name,
            info.device_type,
            vk::api_version_major(info.properties.api_version),
            vk::api_version_minor(info.properties.api_version)
        );
        if !info.uniform_update_after_bind {
            ridge_warn!(
                SOURCE,
                "'{}' cannot update uniform buffer bindings after bind; rebinding a bound slot requires the GPU to be idle",
                info.name
            );
        }

        let ctx = Arc::new(GpuContext::new(
            instance,
            info.physical_device,
            device,
            allocator,
            debug_utils,
            queue_families,
            layout,
        ));
        Ok(Self {
            ctx,
            name: desc.name.to_string(),
            hardware_name: info.name,
            device_type: info.device_type,
            limits: device_limits,
            sample_counts,
            max_anisotropy,
            wireframe_supported: info.wireframe_supported,
            queue_use_counts: Mutex::new(FxHashMap::default()),
        })
    }

    fn ensure_image_supported(&self, desc: &ImageDesc) -> Result<()> {
        ridge_ensure!(
            self.is_image_format_supported(desc.format, desc.usage),
            SOURCE,
            UnsupportedFeature,
            "Format {:?} with usage {:?} of image '{}' is not supported by '{}'",
            desc.format,
            desc.usage,
            desc.name,
            self.hardware_name
        );
        ridge_ensure!(
            self.is_image_sampling_supported(desc.sampling),
            SOURCE,
            UnsupportedFeature,
            "Sampling {:?} of image '{}' is not supported by '{}'",
            desc.sampling,
            desc.name,
            self.hardware_name
        );
        Ok(())
    }
}

crate::vulkan_resource!(VulkanDevice);

impl Device for VulkanDevice {
    fn hardware_name(&self) -> &str {
        &self.hardware_name
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn is_image_format_supported(&self, format: ImageFormat, usage: ImageUsage) -> bool {
        if format == ImageFormat::Undefined {
            return false;
        }
        let properties = unsafe {
            self.ctx
                .instance
                .instance
                .get_physical_device_format_properties(self.ctx.physical_device, image_format_to_vk(format))
        };
        properties
            .optimal_tiling_features
            .contains(required_format_features(usage))
            && !properties.optimal_tiling_features.is_empty()
    }

    fn is_image_sampling_supported(&self, sampling: ImageSampling) -> bool {
        self.sample_counts.contains(sampling_to_vk(sampling))
    }

    fn is_sampler_anisotropy_supported(&self, anisotropy: SamplerAnisotropy) -> bool {
        anisotropy == SamplerAnisotropy::X1 || anisotropy.ratio() <= self.max_anisotropy
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Box<dyn Buffer>> {
        desc.validate(&self.limits)?;
        Ok(Box::new(VulkanBuffer::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<Box<dyn Image>> {
        desc.validate()?;
        self.ensure_image_supported(desc)?;
        Ok(Box::new(VulkanImage::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Box<dyn Sampler>> {
        desc.validate()?;
        ridge_ensure!(
            self.is_sampler_anisotropy_supported(desc.anisotropy),
            SOURCE,
            UnsupportedFeature,
            "Anisotropy {:?} of sampler '{}' is not supported by '{}'",
            desc.anisotropy,
            desc.name,
            self.hardware_name
        );
        Ok(Box::new(VulkanSampler::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Box<dyn RenderPass>> {
        let extent = desc.validate(&self.limits)?;
        Ok(Box::new(VulkanRenderPass::new(Arc::clone(&self.ctx), desc, extent)?))
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<Box<dyn Swapchain>> {
        desc.validate()?;
        Ok(Box::new(VulkanSwapchain::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_shader(&self, desc: &ShaderDesc) -> Result<Box<dyn Shader>> {
        desc.validate()?;
        Ok(Box::new(VulkanShader::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Box<dyn GraphicsPipeline>> {
        desc.validate()?;
        ridge_ensure!(
            desc.push_constant_size <= self.limits.max_push_constant_size,
            SOURCE,
            UnsupportedFeature,
            "Push constant size {} of pipeline '{}' exceeds the device limit of {}",
            desc.push_constant_size,
            desc.name,
            self.limits.max_push_constant_size
        );
        Ok(Box::new(VulkanGraphicsPipeline::new(
            Arc::clone(&self.ctx),
            desc,
            self.wireframe_supported,
        )?))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<Box<dyn ComputePipeline>> {
        desc.validate()?;
        ridge_ensure!(
            desc.push_constant_size <= self.limits.max_push_constant_size,
            SOURCE,
            UnsupportedFeature,
            "Push constant size {} of pipeline '{}' exceeds the device limit of {}",
            desc.push_constant_size,
            desc.name,
            self.limits.max_push_constant_size
        );
        Ok(Box::new(VulkanComputePipeline::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_resource_table(&self, desc: &ResourceTableDesc) -> Result<Box<dyn ResourceTable>> {
        desc.validate()?;
        Ok(Box::new(VulkanResourceTable::new(
            Arc::clone(&self.ctx),
            desc,
            self.limits.resource_table_capacities,
        )?))
    }

    fn create_queue(&self, desc: &QueueDesc) -> Result<Box<dyn Queue>> {
        desc.validate()?;
        let mut use_counts = lock(&self.queue_use_counts);
        let candidates: Vec<QueueFamilyCandidate> = self
            .ctx
            .queue_families
            .iter()
            .map(|family| QueueFamilyCandidate {
                index: family.index,
                operations: family.operations,
                use_count: use_counts.get(&family.index).copied().unwrap_or(0),
            })
            .collect();
        let family_index = select_queue_family(&candidates, desc.operations, desc.priority).ok_or_else(|| {
            ridge_err!(
                SOURCE,
                UnsupportedFeature,
                "No queue family of '{}' supports {:?} for queue '{}'",
                self.hardware_name,
                desc.operations,
                desc.name
            )
        })?;

        let queue = VulkanQueue::new(Arc::clone(&self.ctx), desc.name, family_index, desc.operations)?;
        *use_counts.entry(family_index).or_insert(0) += 1;
        Ok(Box::new(queue))
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.ctx.device.device_wait_idle() }.map_err(|e| vk_error("wait for device idle", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generous_limits() -> DescriptorLimits {
        DescriptorLimits {
            uniform_buffers: 500_000,
            storage_buffers: 500_000,
            sampled_images: 500_000,
            storage_images: 500_000,
            samplers: 500_000,
            per_stage_resources: 2_000_000,
        }
    }

    #[test]
    fn test_capacities_kept_on_large_devices() {
        let defaults = ResourceTableCapacities::default();
        assert_eq!(clamp_capacities(defaults, &generous_limits()), defaults);
    }

    #[test]
    fn test_capacities_clamped_per_category() {
        let limits = DescriptorLimits {
            uniform_buffers: 72,
            ..generous_limits()
        };
        let capacities = clamp_capacities(ResourceTableCapacities::default(), &limits);
        assert_eq!(capacities.uniform_buffers, 72);
        assert_eq!(capacities.storage_buffers, ResourceTableCapacities::default().storage_buffers);
    }

    #[test]
    fn test_capacities_scaled_to_stage_budget() {
        let limits = DescriptorLimits {
            per_stage_resources: 1000,
            ..generous_limits()
        };
        let capacities = clamp_capacities(ResourceTableCapacities::default(), &limits);
        let total = capacities.uniform_buffers
            + capacities.storage_buffers
            + capacities.sampled_images
            + capacities.storage_images
            + capacities.samplers;
        assert!(total <= 1000);
        assert!(capacities.samplers > 0);
    }

    #[test]
    fn test_device_preference() {
        assert!(device_type_score(DeviceType::Discrete) > device_type_score(DeviceType::Integrated));
        assert!(device_type_score(DeviceType::Integrated) > device_type_score(DeviceType::Cpu));
        assert_eq!(device_type_from_vk(vk::PhysicalDeviceType::VIRTUAL_GPU), DeviceType::Virtual);
    }

    #[test]
    fn test_queue_operations() {
        let graphics = queue_operations_from_vk(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE);
        assert!(graphics.contains(QueueOperations::GRAPHICS | QueueOperations::COMPUTE | QueueOperations::TRANSFER));
        assert_eq!(queue_operations_from_vk(vk::QueueFlags::TRANSFER), QueueOperations::TRANSFER);
        assert!(queue_operations_from_vk(vk::QueueFlags::SPARSE_BINDING).is_empty());
    }
}
