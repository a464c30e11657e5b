/// Device - Metal implementation of the Device trait
///
/// Wraps the system default `MTLDevice`. Metal exposes no queue families, so
/// the device reports one family able to do everything and every queue is a
/// separate command queue on it.

use objc2_metal::{MTLArgumentBuffersTier, MTLCreateSystemDefaultDevice, MTLDevice, MTLGPUFamily};
use ridge_rhi::ridge::rhi::{
    select_queue_family, Buffer, BufferDesc, ComputePipeline, ComputePipelineDesc, Device, DeviceDesc, DeviceLimits,
    DeviceType, GraphicsPipeline, GraphicsPipelineDesc, Image, ImageDesc, ImageFormat, ImageSampling, ImageUsage,
    Queue, QueueDesc, QueueFamilyCandidate, QueueOperations, RenderPass, RenderPassDesc, ResourceTable,
    ResourceTableDesc, Sampler, SamplerAnisotropy, SamplerDesc, Shader, ShaderDesc, Swapchain, SwapchainDesc,
    MAX_PUSH_CONSTANT_SIZE,
};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_ensure, ridge_err, ridge_info};
use std::sync::{Arc, Mutex};

use crate::metal::MetalInstance;
use crate::metal_buffer::MetalBuffer;
use crate::metal_context::{lock, MetalContext};
use crate::metal_format::{is_format_supported, FormatCapabilities};
use crate::metal_image::MetalImage;
use crate::metal_layout::{RESOURCE_TABLE_CAPACITIES, SOURCE};
use crate::metal_pipeline::{MetalComputePipeline, MetalGraphicsPipeline};
use crate::metal_queue::MetalQueue;
use crate::metal_render_pass::MetalRenderPass;
use crate::metal_resource_table::MetalResourceTable;
use crate::metal_sampler::MetalSampler;
use crate::metal_shader::MetalShader;
use crate::metal_swapchain::MetalSwapchain;

/// The single family every Metal queue lives on
const QUEUE_FAMILY_INDEX: u32 = 0;
const QUEUE_OPERATIONS: QueueOperations = QueueOperations::GRAPHICS
    .union(QueueOperations::COMPUTE)
    .union(QueueOperations::TRANSFER);

/// Metal samplers go up to 16x anisotropy on every GPU
const MAX_ANISOTROPY: f32 = 16.0;

pub(crate) fn device_type(unified_memory: bool, removable: bool) -> DeviceType {
    if unified_memory && !removable {
        DeviceType::Integrated
    } else {
        DeviceType::Discrete
    }
}

/// Largest attachment side: 16384 from Apple3 and on Mac GPUs, 8192 before
pub(crate) fn max_render_pass_side(large_textures: bool) -> u32 {
    if large_textures {
        16384
    } else {
        8192
    }
}

/// Metal device implementation
pub struct MetalDevice {
    ctx: Arc<MetalContext>,
    name: String,
    hardware_name: String,
    device_type: DeviceType,
    limits: DeviceLimits,
    /// Samples per pixel the device can render with
    sample_counts: Vec<ImageSampling>,
    /// Queues created so far on the single family
    queue_use_count: Mutex<u32>,
}

impl MetalDevice {
    pub(crate) fn new(instance: Arc<MetalInstance>, desc: &DeviceDesc) -> Result<Self> {
        let device = unsafe { MTLCreateSystemDefaultDevice() }
            .ok_or_else(|| ridge_err!(SOURCE, UnsupportedFeature, "No Metal device found"))?;
        let hardware_name = unsafe { device.name() }.to_string();

        // Resource tables are argument buffers holding whole texture arrays
        ridge_ensure!(
            unsafe { device.argumentBuffersSupport() } == MTLArgumentBuffersTier::Tier2,
            SOURCE,
            UnsupportedFeature,
            "'{}' does not support tier 2 argument buffers",
            hardware_name
        );

        let supports = |family: MTLGPUFamily| unsafe { device.supportsFamily(family) };
        let capabilities = FormatCapabilities {
            bc_compression: unsafe { device.supportsBCTextureCompression() },
            astc_compression: supports(MTLGPUFamily::Apple2),
            float32_filtering: unsafe { device.supports32BitFloatFiltering() },
            apple_gpu: supports(MTLGPUFamily::Apple2),
        };
        let unified_memory = unsafe { device.hasUnifiedMemory() };
        let device_type = device_type(unified_memory, unsafe { device.isRemovable() });

        let max_buffer_length = unsafe { device.maxBufferLength() } as u64;
        let side = max_render_pass_side(supports(MTLGPUFamily::Apple3) || supports(MTLGPUFamily::Mac2));
        let limits = DeviceLimits {
            // Both buffer kinds are reached through argument buffer pointers
            max_uniform_buffer_size: max_buffer_length,
            max_storage_buffer_size: max_buffer_length,
            max_render_pass_width: side,
            max_render_pass_height: side,
            max_push_constant_size: MAX_PUSH_CONSTANT_SIZE,
            resource_table_capacities: RESOURCE_TABLE_CAPACITIES,
        };
        let sample_counts = ImageSampling::DESCENDING
            .into_iter()
            .filter(|sampling| unsafe { device.supportsTextureSampleCount(sampling.sample_count() as usize) })
            .collect();

        ridge_info!(
            SOURCE,
            "Device '{}' created on '{}' ({:?}, unified memory {})",
            desc.name,
            hardware_name,
            device_type,
            unified_memory
        );

        let ctx = Arc::new(MetalContext::new(instance, device, capabilities, unified_memory));
        Ok(Self {
            ctx,
            name: desc.name.to_string(),
            hardware_name,
            device_type,
            limits,
            sample_counts,
            queue_use_count: Mutex::new(0),
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

    fn ensure_push_constant_size(&self, name: &str, size: u32) -> Result<()> {
        ridge_ensure!(
            size <= self.limits.max_push_constant_size,
            SOURCE,
            UnsupportedFeature,
            "Push constant size {} of pipeline '{}' exceeds the device limit of {}",
            size,
            name,
            self.limits.max_push_constant_size
        );
        Ok(())
    }
}

crate::metal_resource!(MetalDevice);

impl Device for MetalDevice {
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
        is_format_supported(format, usage, &self.ctx.capabilities)
    }

    fn is_image_sampling_supported(&self, sampling: ImageSampling) -> bool {
        self.sample_counts.contains(&sampling)
    }

    fn is_sampler_anisotropy_supported(&self, anisotropy: SamplerAnisotropy) -> bool {
        anisotropy.ratio() <= MAX_ANISOTROPY
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Box<dyn Buffer>> {
        desc.validate(&self.limits)?;
        Ok(Box::new(MetalBuffer::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<Box<dyn Image>> {
        desc.validate()?;
        self.ensure_image_supported(desc)?;
        Ok(Box::new(MetalImage::new(Arc::clone(&self.ctx), desc)?))
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
        Ok(Box::new(MetalSampler::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Box<dyn RenderPass>> {
        let extent = desc.validate(&self.limits)?;
        Ok(Box::new(MetalRenderPass::new(Arc::clone(&self.ctx), desc, extent)?))
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<Box<dyn Swapchain>> {
        desc.validate()?;
        Ok(Box::new(MetalSwapchain::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_shader(&self, desc: &ShaderDesc) -> Result<Box<dyn Shader>> {
        desc.validate()?;
        Ok(Box::new(MetalShader::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Box<dyn GraphicsPipeline>> {
        desc.validate()?;
        self.ensure_push_constant_size(desc.name, desc.push_constant_size)?;
        Ok(Box::new(MetalGraphicsPipeline::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<Box<dyn ComputePipeline>> {
        desc.validate()?;
        self.ensure_push_constant_size(desc.name, desc.push_constant_size)?;
        Ok(Box::new(MetalComputePipeline::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_resource_table(&self, desc: &ResourceTableDesc) -> Result<Box<dyn ResourceTable>> {
        desc.validate()?;
        Ok(Box::new(MetalResourceTable::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_queue(&self, desc: &QueueDesc) -> Result<Box<dyn Queue>> {
        desc.validate()?;
        let mut use_count = lock(&self.queue_use_count);
        let candidates = [QueueFamilyCandidate {
            index: QUEUE_FAMILY_INDEX,
            operations: QUEUE_OPERATIONS,
            use_count: *use_count,
        }];
        select_queue_family(&candidates, desc.operations, desc.priority).ok_or_else(|| {
            ridge_err!(
                SOURCE,
                UnsupportedFeature,
                "No queue family of '{}' supports {:?} for queue '{}'",
                self.hardware_name,
                desc.operations,
                desc.name
            )
        })?;

        let queue = MetalQueue::new(Arc::clone(&self.ctx), desc.name, desc.operations)?;
        *use_count += 1;
        Ok(Box::new(queue))
    }

    fn wait_idle(&self) -> Result<()> {
        self.ctx.wait_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type() {
        assert_eq!(device_type(true, false), DeviceType::Integrated);
        assert_eq!(device_type(false, false), DeviceType::Discrete);
        assert_eq!(device_type(true, true), DeviceType::Discrete);
    }

    #[test]
    fn test_render_pass_side() {
        assert_eq!(max_render_pass_side(true), 16384);
        assert_eq!(max_render_pass_side(false), 8192);
    }

    #[test]
    fn test_single_family_serves_every_request() {
        let candidates = [QueueFamilyCandidate {
            index: QUEUE_FAMILY_INDEX,
            operations: QUEUE_OPERATIONS,
            use_count: 3,
        }];
        for operations in [QueueOperations::GRAPHICS, QueueOperations::COMPUTE, QueueOperations::TRANSFER] {
            assert_eq!(
                select_queue_family(&candidates, operations, Default::default()),
                Some(QUEUE_FAMILY_INDEX)
            );
        }
    }
}
