/// Device trait: resource factories and capability queries

use crate::error::Result;
use crate::rhi::buffer::{Buffer, BufferDesc};
use crate::rhi::image::{Image, ImageDesc, ImageSampling, ImageUsage};
use crate::rhi::image_format::ImageFormat;
use crate::rhi::pipeline::{ComputePipeline, ComputePipelineDesc, GraphicsPipeline, GraphicsPipelineDesc, MAX_PUSH_CONSTANT_SIZE};
use crate::rhi::queue::{Queue, QueueDesc};
use crate::rhi::render_pass::{RenderPass, RenderPassDesc};
use crate::rhi::rendering_resource::{validate_name, RenderingResource};
use crate::rhi::resource_table::{ResourceTable, ResourceTableCapacities, ResourceTableDesc};
use crate::rhi::sampler::{Sampler, SamplerAnisotropy, SamplerDesc};
use crate::rhi::shader::{Shader, ShaderDesc};
use crate::rhi::swapchain::{Swapchain, SwapchainDesc};

/// Hardware limits the core validates against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_uniform_buffer_size: u64,
    pub max_storage_buffer_size: u64,
    pub max_render_pass_width: u32,
    pub max_render_pass_height: u32,
    pub max_push_constant_size: u32,
    pub resource_table_capacities: ResourceTableCapacities,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_uniform_buffer_size: 64 * 1024,
            max_storage_buffer_size: 128 * 1024 * 1024,
            max_render_pass_width: 16384,
            max_render_pass_height: 16384,
            max_push_constant_size: MAX_PUSH_CONSTANT_SIZE,
            resource_table_capacities: ResourceTableCapacities::default(),
        }
    }
}

/// Kind of physical adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

/// Descriptor for creating a device
#[derive(Debug, Clone)]
pub struct DeviceDesc<'a> {
    pub name: &'a str,
}

impl DeviceDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        validate_name("Device", self.name)
    }
}

/// Logical device trait
///
/// Every resource of a backend is created here. Resources are owned by the
/// returned `Box` and reference the device internally, so the device outlives
/// nothing in particular.
pub trait Device: RenderingResource {
    /// Name of the physical adapter
    fn hardware_name(&self) -> &str;

    fn device_type(&self) -> DeviceType;

    fn limits(&self) -> &DeviceLimits;

    fn is_image_format_supported(&self, format: ImageFormat, usage: ImageUsage) -> bool;

    fn is_image_sampling_supported(&self, sampling: ImageSampling) -> bool;

    fn is_sampler_anisotropy_supported(&self, anisotropy: SamplerAnisotropy) -> bool;

    /// First format of `preferred.fallback_candidates(usage)` the device supports
    fn get_supported_image_format(&self, preferred: ImageFormat, usage: ImageUsage) -> Option<ImageFormat> {
        preferred
            .fallback_candidates(usage)
            .into_iter()
            .find(|&candidate| self.is_image_format_supported(candidate, usage))
    }

    fn get_highest_image_sampling_supported(&self) -> ImageSampling {
        ImageSampling::DESCENDING
            .into_iter()
            .find(|&sampling| self.is_image_sampling_supported(sampling))
            .unwrap_or(ImageSampling::X1)
    }

    fn get_highest_sampler_anisotropy_supported(&self) -> SamplerAnisotropy {
        SamplerAnisotropy::DESCENDING
            .into_iter()
            .find(|&anisotropy| self.is_sampler_anisotropy_supported(anisotropy))
            .unwrap_or(SamplerAnisotropy::X1)
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Box<dyn Buffer>>;

    fn create_image(&self, desc: &ImageDesc) -> Result<Box<dyn Image>>;

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Box<dyn Sampler>>;

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Box<dyn RenderPass>>;

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<Box<dyn Swapchain>>;

    fn create_shader(&self, desc: &ShaderDesc) -> Result<Box<dyn Shader>>;

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Box<dyn GraphicsPipeline>>;

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<Box<dyn ComputePipeline>>;

    fn create_resource_table(&self, desc: &ResourceTableDesc) -> Result<Box<dyn ResourceTable>>;

    fn create_queue(&self, desc: &QueueDesc) -> Result<Box<dyn Queue>>;

    /// Block until all submitted work finished
    fn wait_idle(&self) -> Result<()>;
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
