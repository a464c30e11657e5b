/// Bindless resource table: one fixed-capacity index space per resource category

use crate::error::Result;
use crate::rhi::buffer::{Buffer, BufferUsage};
use crate::rhi::image::{Image, ImageUsage};
use crate::rhi::rendering_resource::{validate_name, RenderingResource};
use crate::utils::slot_allocator::SlotAllocator;
use crate::{ridge_ensure, ridge_err};

/// Kind of slot inside a resource table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTableCategory {
    UniformBuffer,
    StorageBuffer,
    SampledImage,
    StorageImage,
    Sampler,
}

impl ResourceTableCategory {
    pub const ALL: [ResourceTableCategory; 5] = [
        ResourceTableCategory::UniformBuffer,
        ResourceTableCategory::StorageBuffer,
        ResourceTableCategory::SampledImage,
        ResourceTableCategory::StorageImage,
        ResourceTableCategory::Sampler,
    ];

    /// Position of the category in [`ResourceTableCategory::ALL`]
    pub fn binding(self) -> u32 {
        match self {
            ResourceTableCategory::UniformBuffer => 0,
            ResourceTableCategory::StorageBuffer => 1,
            ResourceTableCategory::SampledImage => 2,
            ResourceTableCategory::StorageImage => 3,
            ResourceTableCategory::Sampler => 4,
        }
    }
}

/// Slot count of every category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTableCapacities {
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub sampled_images: u32,
    pub storage_images: u32,
    pub samplers: u32,
}

impl ResourceTableCapacities {
    pub fn get(&self, category: ResourceTableCategory) -> u32 {
        match category {
            ResourceTableCategory::UniformBuffer => self.uniform_buffers,
            ResourceTableCategory::StorageBuffer => self.storage_buffers,
            ResourceTableCategory::SampledImage => self.sampled_images,
            ResourceTableCategory::StorageImage => self.storage_images,
            ResourceTableCategory::Sampler => self.samplers,
        }
    }
}

impl Default for ResourceTableCapacities {
    fn default() -> Self {
        Self {
            uniform_buffers: 8192,
            storage_buffers: 8192,
            sampled_images: 8192,
            storage_images: 8192,
            samplers: 1024,
        }
    }
}

/// Descriptor for creating a resource table
#[derive(Debug, Clone)]
pub struct ResourceTableDesc<'a> {
    pub name: &'a str,
}

impl ResourceTableDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        validate_name("Resource table", self.name)
    }
}

/// Bindless table of buffers, images and samplers
///
/// Binding writes a reference at a caller-chosen index and overwrites any
/// previous binding there. The table never owns what it references.
pub trait ResourceTable: RenderingResource {
    /// Bind `size` bytes of `buffer` starting at `offset` (`size == 0` binds to the end)
    fn bind_uniform_buffer(&mut self, index: u32, buffer: &dyn Buffer, offset: u64, size: u64) -> Result<()>;

    /// Bind `size` bytes of `buffer` starting at `offset` (`size == 0` binds to the end)
    fn bind_storage_buffer(&mut self, index: u32, buffer: &dyn Buffer, offset: u64, size: u64) -> Result<()>;

    fn bind_sampled_image(&mut self, index: u32, image: &dyn Image) -> Result<()>;

    fn bind_storage_image(&mut self, index: u32, image: &dyn Image) -> Result<()>;

    fn bind_sampler(&mut self, index: u32, sampler: &dyn crate::rhi::sampler::Sampler) -> Result<()>;

    fn capacities(&self) -> &ResourceTableCapacities;

    fn capacity(&self, category: ResourceTableCategory) -> u32 {
        self.capacities().get(category)
    }
}

const SOURCE: &str = "ridge::rhi::ResourceTable";

/// Check `index` against the capacity of `category`
pub fn validate_binding_index(
    table_name: &str,
    capacities: &ResourceTableCapacities,
    category: ResourceTableCategory,
    index: u32,
) -> Result<()> {
    let capacity = capacities.get(category);
    ridge_ensure!(
        index < capacity,
        SOURCE,
        ValueOutOfRange,
        "Cannot bind {:?} at index {} of resource table '{}', capacity is {}",
        category,
        index,
        table_name,
        capacity
    );
    Ok(())
}

/// Validate a uniform or storage buffer binding and resolve its size
pub fn validate_buffer_binding(
    table_name: &str,
    capacities: &ResourceTableCapacities,
    category: ResourceTableCategory,
    index: u32,
    buffer: &dyn Buffer,
    offset: u64,
    size: u64,
) -> Result<u64> {
    validate_binding_index(table_name, capacities, category, index)?;

    let required = match category {
        ResourceTableCategory::UniformBuffer => BufferUsage::UNIFORM,
        _ => BufferUsage::STORAGE,
    };
    ridge_ensure!(
        buffer.usage().contains(required),
        SOURCE,
        InvalidConfiguration,
        "Buffer '{}' bound as {:?} in resource table '{}' lacks {:?} usage",
        buffer.name(),
        category,
        table_name,
        required
    );

    let memory_size = buffer.memory_size();
    let size = if size == 0 { memory_size.saturating_sub(offset) } else { size };
    ridge_ensure!(
        size > 0 && offset.checked_add(size).is_some_and(|end| end <= memory_size),
        SOURCE,
        InvalidRange,
        "Binding [{}, +{}) of buffer '{}' ({} bytes) in resource table '{}' is out of bounds",
        offset,
        size,
        buffer.name(),
        memory_size,
        table_name
    );
    Ok(size)
}

/// Validate a sampled or storage image binding
pub fn validate_image_binding(
    table_name: &str,
    capacities: &ResourceTableCapacities,
    category: ResourceTableCategory,
    index: u32,
    image: &dyn Image,
) -> Result<()> {
    validate_binding_index(table_name, capacities, category, index)?;

    let required = match category {
        ResourceTableCategory::SampledImage => ImageUsage::SAMPLE,
        _ => ImageUsage::STORAGE,
    };
    ridge_ensure!(
        image.usage().contains(required),
        SOURCE,
        InvalidConfiguration,
        "Image '{}' bound as {:?} in resource table '{}' lacks {:?} usage",
        image.name(),
        category,
        table_name,
        required
    );
    Ok(())
}

/// Hands out free indices of a resource table, one pool per category
#[derive(Debug, Clone)]
pub struct ResourceTableIndexAllocator {
    slots: [SlotAllocator; 5],
}

impl ResourceTableIndexAllocator {
    pub fn new(capacities: &ResourceTableCapacities) -> Self {
        Self {
            slots: ResourceTableCategory::ALL.map(|category| SlotAllocator::with_capacity(capacities.get(category))),
        }
    }

    /// Reserve a free index of `category`
    pub fn allocate(&mut self, category: ResourceTableCategory) -> Result<u32> {
        let slots = &mut self.slots[category.binding() as usize];
        slots.alloc().ok_or_else(|| {
            ridge_err!(
                SOURCE,
                ValueOutOfRange,
                "All {} {:?} slots of the resource table are in use",
                slots.capacity(),
                category
            )
        })
    }

    /// Release `index`; false if it was not allocated
    pub fn free(&mut self, category: ResourceTableCategory, index: u32) -> bool {
        self.slots[category.binding() as usize].free(index)
    }

    pub fn allocated_count(&self, category: ResourceTableCategory) -> u32 {
        self.slots[category.binding() as usize].len()
    }
}

#[cfg(test)]
#[path = "resource_table_tests.rs"]
mod tests;
