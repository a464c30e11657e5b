/// Buffer - Metal implementation of the Buffer trait

use objc2::runtime::ProtocolObject;
use objc2_metal::{MTLBuffer, MTLDevice, MTLResource, MTLResourceOptions};
use ridge_rhi::ridge::rhi::{validate_host_access, Buffer, BufferDesc, BufferMemoryLocation, BufferUsage};
use ridge_rhi::ridge::Result;
use std::sync::Arc;

use crate::metal_context::{label, nil_error, MetalContext};
use crate::metal_handle::MetalHandle;

pub(crate) type NativeBuffer = ProtocolObject<dyn MTLBuffer>;

/// Storage mode of a buffer: CPU buffers are shared with the host, GPU
/// buffers are private to the device
pub(crate) fn buffer_options(location: BufferMemoryLocation) -> MTLResourceOptions {
    match location {
        BufferMemoryLocation::Cpu => MTLResourceOptions::StorageModeShared | MTLResourceOptions::HazardTrackingModeTracked,
        BufferMemoryLocation::Gpu => MTLResourceOptions::StorageModePrivate | MTLResourceOptions::HazardTrackingModeTracked,
    }
}

/// Metal buffer implementation
pub struct MetalBuffer {
    _ctx: Arc<MetalContext>,
    name: String,
    pub(crate) buffer: MetalHandle<NativeBuffer>,
    memory_size: u64,
    usage: BufferUsage,
    memory_location: BufferMemoryLocation,
}

impl MetalBuffer {
    /// `desc` is already validated
    pub(crate) fn new(ctx: Arc<MetalContext>, desc: &BufferDesc) -> Result<Self> {
        let buffer = unsafe {
            ctx.device
                .newBufferWithLength_options(desc.memory_size as usize, buffer_options(desc.memory_location))
        }
        .ok_or_else(|| nil_error(format_args!("create buffer '{}' of {} bytes", desc.name, desc.memory_size)))?;
        unsafe { buffer.setLabel(Some(&label(desc.name))) };

        Ok(Self {
            _ctx: ctx,
            name: desc.name.to_string(),
            buffer: MetalHandle::new(buffer),
            memory_size: desc.memory_size,
            usage: desc.usage,
            memory_location: desc.memory_location,
        })
    }

    /// Host address of shared storage
    fn contents(&self) -> *mut u8 {
        unsafe { self.buffer.contents() }.as_ptr() as *mut u8
    }
}

crate::metal_resource!(MetalBuffer);

impl Buffer for MetalBuffer {
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
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.contents().add(offset as usize), data.len());
        }
        Ok(())
    }

    fn copy_to_memory(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        validate_host_access(self, offset, out.len() as u64)?;
        unsafe {
            std::ptr::copy_nonoverlapping(self.contents().add(offset as usize), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }
}
