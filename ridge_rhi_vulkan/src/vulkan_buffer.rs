/// Buffer - Vulkan implementation of the Buffer trait

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use ridge_rhi::ridge::rhi::{validate_host_access, Buffer, BufferDesc, BufferMemoryLocation, BufferUsage};
use ridge_rhi::ridge::{Error, Result};
use ridge_rhi::{ridge_err, ridge_error};
use std::sync::Arc;

use crate::vulkan_context::{vk_error, GpuContext, SOURCE};
use crate::vulkan_format::buffer_usage_to_vk;

/// Map a gpu-allocator failure to an [`Error`]
pub(crate) fn allocation_error(name: &str, error: gpu_allocator::AllocationError) -> Error {
    ridge_error!(SOURCE, "Failed to allocate memory for '{}': {:?}", name, error);
    match error {
        gpu_allocator::AllocationError::OutOfMemory => Error::OutOfMemory,
        other => Error::BackendError(format!("Failed to allocate memory for '{}': {:?}", name, other)),
    }
}

/// Vulkan buffer implementation
pub struct VulkanBuffer {
    ctx: Arc<GpuContext>,
    name: String,
    pub(crate) buffer: vk::Buffer,
    /// Taken on drop
    allocation: Option<Allocation>,
    memory_size: u64,
    usage: BufferUsage,
    memory_location: BufferMemoryLocation,
}

impl VulkanBuffer {
    /// Create the buffer and bind its memory. `desc` is already validated.
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &BufferDesc) -> Result<Self> {
        let families = ctx.sharing_family_indices();
        let mut buffer_info = vk::BufferCreateInfo::default()
            .size(desc.memory_size)
            .usage(buffer_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        if families.len() > 1 {
            buffer_info = buffer_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families);
        }

        let buffer = unsafe { ctx.device.create_buffer(&buffer_info, None) }
            .map_err(|e| vk_error(format_args!("create buffer '{}'", desc.name), e))?;
        let requirements = unsafe { ctx.device.get_buffer_memory_requirements(buffer) };

        let location = match desc.memory_location {
            BufferMemoryLocation::Cpu => MemoryLocation::CpuToGpu,
            BufferMemoryLocation::Gpu => MemoryLocation::GpuOnly,
        };
        let allocation = ctx.allocator().allocate(&AllocationCreateDesc {
            name: desc.name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(error) => {
                unsafe { ctx.device.destroy_buffer(buffer, None) };
                return Err(allocation_error(desc.name, error));
            }
        };

        if let Err(e) = unsafe { ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) } {
            let _ = ctx.allocator().free(allocation);
            unsafe { ctx.device.destroy_buffer(buffer, None) };
            return Err(vk_error(format_args!("bind memory of buffer '{}'", desc.name), e));
        }
        ctx.set_object_name(buffer, desc.name);

        Ok(Self {
            ctx,
            name: desc.name.to_string(),
            buffer,
            allocation: Some(allocation),
            memory_size: desc.memory_size,
            usage: desc.usage,
            memory_location: desc.memory_location,
        })
    }

    fn mapped_ptr(&self) -> Result<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .map(|ptr| ptr.as_ptr() as *mut u8)
            .ok_or_else(|| ridge_err!(SOURCE, BackendError, "Buffer '{}' is not mapped", self.name))
    }
}

crate::vulkan_resource!(VulkanBuffer);

impl Buffer for VulkanBuffer {
    fn memory_size(&self) -> u64 {
        self.memory_size
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn memory_location(&self) -> BufferMemoryLocation {
        self.memory_location
    }

    fn copy_from_memory(&self, data: &[u8], offset: u64) -> Result<()> {
        validate_host_access(self, offset, data.len() as u64)?;
        let mapped = self.mapped_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
        }
        Ok(())
    }

    fn copy_to_memory(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        validate_host_access(self, offset, out.len() as u64)?;
        let mapped = self.mapped_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(mapped.add(offset as usize), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let _ = self.ctx.allocator().free(allocation);
        }
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
