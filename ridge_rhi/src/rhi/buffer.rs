/// Buffer trait and buffer descriptor

use bitflags::bitflags;
use crate::error::Result;
use crate::rhi::device::DeviceLimits;
use crate::rhi::rendering_resource::{validate_name, RenderingResource};
use crate::ridge_ensure;

bitflags! {
    /// How a buffer may be used on the GPU
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Source of copy commands
        const SOURCE_MEMORY = 0x01;
        /// Destination of copy commands
        const DESTINATION_MEMORY = 0x02;
        const UNIFORM = 0x04;
        const STORAGE = 0x08;
        const INDEX = 0x10;
        const VERTEX = 0x20;
    }
}

/// Where the buffer memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferMemoryLocation {
    /// Host visible, mapped for `copy_from_memory` / `copy_to_memory`
    Cpu,
    /// Device local, only reachable through commands
    Gpu,
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub name: &'a str,
    /// Size in bytes
    pub memory_size: u64,
    pub usage: BufferUsage,
    pub memory_location: BufferMemoryLocation,
}

impl BufferDesc<'_> {
    /// Check the descriptor against the device limits
    pub fn validate(&self, limits: &DeviceLimits) -> Result<()> {
        validate_name("Buffer", self.name)?;
        ridge_ensure!(
            self.memory_size > 0,
            "ridge::rhi::Buffer",
            InvalidValue,
            "Cannot create buffer '{}' with a memory size of 0",
            self.name
        );
        ridge_ensure!(
            !self.usage.is_empty(),
            "ridge::rhi::Buffer",
            InvalidValue,
            "Cannot create buffer '{}' without any usage",
            self.name
        );
        ridge_ensure!(
            !self.usage.contains(BufferUsage::UNIFORM | BufferUsage::STORAGE),
            "ridge::rhi::Buffer",
            InvalidConfiguration,
            "Buffer '{}' cannot be both a uniform and a storage buffer",
            self.name
        );
        if self.usage.contains(BufferUsage::UNIFORM) {
            ridge_ensure!(
                self.memory_size <= limits.max_uniform_buffer_size,
                "ridge::rhi::Buffer",
                ValueOutOfRange,
                "Uniform buffer '{}' of {} bytes exceeds the device limit of {} bytes",
                self.name,
                self.memory_size,
                limits.max_uniform_buffer_size
            );
        }
        if self.usage.contains(BufferUsage::STORAGE) {
            ridge_ensure!(
                self.memory_size <= limits.max_storage_buffer_size,
                "ridge::rhi::Buffer",
                ValueOutOfRange,
                "Storage buffer '{}' of {} bytes exceeds the device limit of {} bytes",
                self.name,
                self.memory_size,
                limits.max_storage_buffer_size
            );
        }
        Ok(())
    }
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types. The buffer is destroyed when
/// dropped; use `CommandBuffer::queue_buffer_for_destruction` while commands
/// may still reference it.
pub trait Buffer: RenderingResource {
    fn memory_size(&self) -> u64;

    fn usage(&self) -> BufferUsage;

    fn memory_location(&self) -> BufferMemoryLocation;

    /// Write `data` at `offset` (CPU buffers only)
    fn copy_from_memory(&self, data: &[u8], offset: u64) -> Result<()>;

    /// Read `out.len()` bytes starting at `offset` (CPU buffers only)
    fn copy_to_memory(&self, offset: u64, out: &mut [u8]) -> Result<()>;
}

/// Range and location checks shared by the `copy_*_memory` implementations
pub fn validate_host_access(buffer: &dyn Buffer, offset: u64, size: u64) -> Result<()> {
    ridge_ensure!(
        buffer.memory_location() == BufferMemoryLocation::Cpu,
        "ridge::rhi::Buffer",
        InvalidOperation,
        "Buffer '{}' lives in GPU memory and cannot be accessed from the host",
        buffer.name()
    );
    ridge_ensure!(
        offset.checked_add(size).is_some_and(|end| end <= buffer.memory_size()),
        "ridge::rhi::Buffer",
        InvalidRange,
        "Host access of {} bytes at offset {} overflows buffer '{}' of {} bytes",
        size,
        offset,
        buffer.name(),
        buffer.memory_size()
    );
    Ok(())
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
