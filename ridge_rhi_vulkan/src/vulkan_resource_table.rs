/// ResourceTable - Vulkan implementation of the ResourceTable trait
///
/// Every table is one descriptor set of the device-wide bindless layout,
/// allocated from a pool of its own. Bindings are written immediately with
/// update-after-bind semantics, so a table may be rebound while recorded
/// command buffers referencing other slots are pending.

use ash::vk;
use ridge_rhi::ridge::rhi::{
    downcast_resource, validate_binding_index, validate_buffer_binding, validate_image_binding, Buffer, GraphicsApi,
    Image, ResourceTable, ResourceTableCapacities, ResourceTableCategory, ResourceTableDesc, Sampler,
};
use ridge_rhi::ridge::Result;
use std::sync::Arc;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::{vk_error, GpuContext};
use crate::vulkan_image::VulkanImage;
use crate::vulkan_sampler::VulkanSampler;

/// Descriptor type of each category, in binding order
pub(crate) fn category_descriptor_type(category: ResourceTableCategory) -> vk::DescriptorType {
    match category {
        ResourceTableCategory::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        ResourceTableCategory::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        ResourceTableCategory::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        ResourceTableCategory::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        ResourceTableCategory::Sampler => vk::DescriptorType::SAMPLER,
    }
}

/// Create the bindless set layout shared by every table and pipeline layout.
/// Uniform buffers get update-after-bind only when the device allows it.
pub(crate) fn create_resource_table_layout(
    device: &ash::Device,
    capacities: &ResourceTableCapacities,
    uniform_update_after_bind: bool,
) -> Result<vk::DescriptorSetLayout> {
    let bindings = ResourceTableCategory::ALL.map(|category| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(category.binding())
            .descriptor_type(category_descriptor_type(category))
            .descriptor_count(capacities.get(category))
            .stage_flags(vk::ShaderStageFlags::ALL)
    });
    let binding_flags = ResourceTableCategory::ALL.map(|category| {
        if category == ResourceTableCategory::UniformBuffer && !uniform_update_after_bind {
            vk::DescriptorBindingFlags::PARTIALLY_BOUND
        } else {
            vk::DescriptorBindingFlags::PARTIALLY_BOUND | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
        }
    });
    let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
    let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
        .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
        .bindings(&bindings)
        .push_next(&mut flags_info);

    unsafe { device.create_descriptor_set_layout(&layout_info, None) }
        .map_err(|e| vk_error("create resource table layout", e))
}

/// Vulkan resource table implementation
pub struct VulkanResourceTable {
    ctx: Arc<GpuContext>,
    name: String,
    pool: vk::DescriptorPool,
    pub(crate) set: vk::DescriptorSet,
    capacities: ResourceTableCapacities,
}

impl VulkanResourceTable {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &ResourceTableDesc, capacities: ResourceTableCapacities) -> Result<Self> {
        let pool_sizes = ResourceTableCategory::ALL.map(|category| vk::DescriptorPoolSize {
            ty: category_descriptor_type(category),
            descriptor_count: capacities.get(category),
        });
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { ctx.device.create_descriptor_pool(&pool_info, None) }
            .map_err(|e| vk_error(format_args!("create descriptor pool of resource table '{}'", desc.name), e))?;

        let layouts = [ctx.resource_table_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let set = match unsafe { ctx.device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets[0],
            Err(e) => {
                unsafe { ctx.device.destroy_descriptor_pool(pool, None) };
                return Err(vk_error(format_args!("allocate resource table '{}'", desc.name), e));
            }
        };
        ctx.set_object_name(set, desc.name);

        Ok(Self {
            ctx,
            name: desc.name.to_string(),
            pool,
            set,
            capacities,
        })
    }

    fn write_buffer(
        &mut self,
        category: ResourceTableCategory,
        index: u32,
        buffer: &dyn Buffer,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        let size = validate_buffer_binding(&self.name, &self.capacities, category, index, buffer, offset, size)?;
        let buffer = downcast_resource::<VulkanBuffer, _>(buffer, GraphicsApi::Vulkan)?;

        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: buffer.buffer,
            offset,
            range: size,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(category.binding())
            .dst_array_element(index)
            .descriptor_type(category_descriptor_type(category))
            .buffer_info(&buffer_info);
        unsafe { self.ctx.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    fn write_image(&mut self, category: ResourceTableCategory, index: u32, image: &dyn Image) -> Result<()> {
        validate_image_binding(&self.name, &self.capacities, category, index, image)?;
        let image = downcast_resource::<VulkanImage, _>(image, GraphicsApi::Vulkan)?;

        // Storage images are only accessed in GENERAL layout
        let image_layout = match category {
            ResourceTableCategory::SampledImage => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            _ => vk::ImageLayout::GENERAL,
        };
        let image_info = [vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: image.view,
            image_layout,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(category.binding())
            .dst_array_element(index)
            .descriptor_type(category_descriptor_type(category))
            .image_info(&image_info);
        unsafe { self.ctx.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }
}

crate::vulkan_resource!(VulkanResourceTable);

impl ResourceTable for VulkanResourceTable {
    fn bind_uniform_buffer(&mut self, index: u32, buffer: &dyn Buffer, offset: u64, size: u64) -> Result<()> {
        self.write_buffer(ResourceTableCategory::UniformBuffer, index, buffer, offset, size)
    }

    fn bind_storage_buffer(&mut self, index: u32, buffer: &dyn Buffer, offset: u64, size: u64) -> Result<()> {
        self.write_buffer(ResourceTableCategory::StorageBuffer, index, buffer, offset, size)
    }

    fn bind_sampled_image(&mut self, index: u32, image: &dyn Image) -> Result<()> {
        self.write_image(ResourceTableCategory::SampledImage, index, image)
    }

    fn bind_storage_image(&mut self, index: u32, image: &dyn Image) -> Result<()> {
        self.write_image(ResourceTableCategory::StorageImage, index, image)
    }

    fn bind_sampler(&mut self, index: u32, sampler: &dyn Sampler) -> Result<()> {
        validate_binding_index(&self.name, &self.capacities, ResourceTableCategory::Sampler, index)?;
        let sampler = downcast_resource::<VulkanSampler, _>(sampler, GraphicsApi::Vulkan)?;

        let image_info = [vk::DescriptorImageInfo {
            sampler: sampler.sampler,
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::UNDEFINED,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(ResourceTableCategory::Sampler.binding())
            .dst_array_element(index)
            .descriptor_type(vk::DescriptorType::SAMPLER)
            .image_info(&image_info);
        unsafe { self.ctx.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    fn capacities(&self) -> &ResourceTableCapacities {
        &self.capacities
    }
}

impl Drop for VulkanResourceTable {
    fn drop(&mut self) {
        // Destroying the pool frees the set
        unsafe {
            self.ctx.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}
