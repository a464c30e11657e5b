/// Image - Vulkan implementation of the Image trait

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use ridge_rhi::ridge::rhi::{
    Image, ImageDesc, ImageFormat, ImageMemoryLocation, ImageSampling, ImageType, ImageUsage,
};
use ridge_rhi::ridge::Result;
use std::sync::Arc;

use crate::vulkan_buffer::allocation_error;
use crate::vulkan_context::{vk_error, GpuContext};
use crate::vulkan_format::{
    image_aspect, image_format_to_vk, image_type_to_vk, image_usage_to_vk, image_view_type, sampling_to_vk,
};

/// Vulkan image implementation
///
/// Swapchain images are wrapped without owning the `vk::Image`; only their
/// view is destroyed here.
pub struct VulkanImage {
    ctx: Arc<GpuContext>,
    name: String,
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    allocation: Option<Allocation>,
    owns_image: bool,
    width: u32,
    height: u32,
    depth: u32,
    image_type: ImageType,
    format: ImageFormat,
    level_count: u32,
    layer_count: u32,
    sampling: ImageSampling,
    usage: ImageUsage,
    memory_location: ImageMemoryLocation,
}

impl VulkanImage {
    /// Create the image, its memory and a view over every level and layer.
    /// `desc` is already validated and its format known to be supported.
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &ImageDesc) -> Result<Self> {
        let flags = if desc.image_type == ImageType::Cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let tiling = match desc.memory_location {
            ImageMemoryLocation::Cpu => vk::ImageTiling::LINEAR,
            ImageMemoryLocation::Gpu => vk::ImageTiling::OPTIMAL,
        };
        let families = ctx.sharing_family_indices();
        let mut image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(image_type_to_vk(desc.image_type))
            .format(image_format_to_vk(desc.format))
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: desc.depth,
            })
            .mip_levels(desc.level_count)
            .array_layers(desc.layer_count)
            .samples(sampling_to_vk(desc.sampling))
            .tiling(tiling)
            .usage(image_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        if families.len() > 1 {
            image_info = image_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families);
        }

        let image = unsafe { ctx.device.create_image(&image_info, None) }
            .map_err(|e| vk_error(format_args!("create image '{}'", desc.name), e))?;
        let requirements = unsafe { ctx.device.get_image_memory_requirements(image) };

        let location = match desc.memory_location {
            ImageMemoryLocation::Cpu => MemoryLocation::CpuToGpu,
            ImageMemoryLocation::Gpu => MemoryLocation::GpuOnly,
        };
        let allocation = ctx.allocator().allocate(&AllocationCreateDesc {
            name: desc.name,
            requirements,
            location,
            linear: tiling == vk::ImageTiling::LINEAR,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(error) => {
                unsafe { ctx.device.destroy_image(image, None) };
                return Err(allocation_error(desc.name, error));
            }
        };

        let bound = unsafe { ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()) };
        let view = bound
            .map_err(|e| vk_error(format_args!("bind memory of image '{}'", desc.name), e))
            .and_then(|()| {
                create_view(
                    &ctx,
                    image,
                    desc.name,
                    desc.image_type,
                    desc.format,
                    desc.level_count,
                    desc.layer_count,
                )
            });
        let view = match view {
            Ok(view) => view,
            Err(error) => {
                let _ = ctx.allocator().free(allocation);
                unsafe { ctx.device.destroy_image(image, None) };
                return Err(error);
            }
        };
        ctx.set_object_name(image, desc.name);

        Ok(Self {
            ctx,
            name: desc.name.to_string(),
            image,
            view,
            allocation: Some(allocation),
            owns_image: true,
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            image_type: desc.image_type,
            format: desc.format,
            level_count: desc.level_count,
            layer_count: desc.layer_count,
            sampling: desc.sampling,
            usage: desc.usage,
            memory_location: desc.memory_location,
        })
    }

    /// Wrap an image owned by a swapchain
    pub(crate) fn from_swapchain(
        ctx: Arc<GpuContext>,
        name: String,
        image: vk::Image,
        format: ImageFormat,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let view = create_view(&ctx, image, &name, ImageType::Plane, format, 1, 1)?;
        Ok(Self {
            ctx,
            name,
            image,
            view,
            allocation: None,
            owns_image: false,
            width: extent.width,
            height: extent.height,
            depth: 1,
            image_type: ImageType::Plane,
            format,
            level_count: 1,
            layer_count: 1,
            sampling: ImageSampling::X1,
            usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::DESTINATION_MEMORY,
            memory_location: ImageMemoryLocation::Gpu,
        })
    }

    pub(crate) fn subresource_range(
        &self,
        base_level: u32,
        level_count: u32,
        base_layer: u32,
        layer_count: u32,
    ) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: image_aspect(self.format),
            base_mip_level: base_level,
            level_count,
            base_array_layer: base_layer,
            layer_count,
        }
    }
}

fn create_view(
    ctx: &GpuContext,
    image: vk::Image,
    name: &str,
    image_type: ImageType,
    format: ImageFormat,
    level_count: u32,
    layer_count: u32,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(image_view_type(image_type, layer_count))
        .format(image_format_to_vk(format))
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: image_aspect(format),
            base_mip_level: 0,
            level_count,
            base_array_layer: 0,
            layer_count,
        });
    let view = unsafe { ctx.device.create_image_view(&view_info, None) }
        .map_err(|e| vk_error(format_args!("create view of image '{}'", name), e))?;
    ctx.set_object_name(view, name);
    Ok(view)
}

crate::vulkan_resource!(VulkanImage);

impl Image for VulkanImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn depth(&self) -> u32 {
        self.depth
    }

    fn image_type(&self) -> ImageType {
        self.image_type
    }

    fn format(&self) -> ImageFormat {
        self.format
    }

    fn level_count(&self) -> u32 {
        self.level_count
    }

    fn layer_count(&self) -> u32 {
        self.layer_count
    }

    fn sampling(&self) -> ImageSampling {
        self.sampling
    }

    fn usage(&self) -> ImageUsage {
        self.usage
    }

    fn memory_location(&self) -> ImageMemoryLocation {
        self.memory_location
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let _ = self.ctx.allocator().free(allocation);
        }
        if self.owns_image {
            unsafe {
                self.ctx.device.destroy_image(self.image, None);
            }
        }
    }
}
