/// ResourceTable - Metal implementation of the ResourceTable trait
///
/// Every table is one argument buffer written through its own argument
/// encoder. Categories are consecutive argument id ranges, see
/// [`argument_base`]. Argument buffers do not keep their resources resident,
/// so the table remembers what it references and the command buffer declares
/// those resources when the table is bound.

use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_foundation::NSArray;
use objc2_metal::{
    MTLArgumentDescriptor, MTLArgumentEncoder, MTLBindingAccess, MTLBuffer, MTLDataType, MTLDevice, MTLResource,
    MTLResourceUsage, MTLTextureType,
};
use ridge_rhi::ridge::rhi::{
    downcast_resource, validate_binding_index, validate_buffer_binding, validate_image_binding, Buffer,
    BufferMemoryLocation, GraphicsApi, Image, ResourceTable, ResourceTableCapacities, ResourceTableCategory,
    ResourceTableDesc, Sampler,
};
use ridge_rhi::ridge::Result;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::metal_buffer::{buffer_options, MetalBuffer, NativeBuffer};
use crate::metal_context::{label, nil_error, MetalContext};
use crate::metal_handle::MetalHandle;
use crate::metal_image::MetalImage;
use crate::metal_layout::{argument_base, argument_index, RESOURCE_TABLE_CAPACITIES};
use crate::metal_sampler::MetalSampler;

pub(crate) type NativeResource = ProtocolObject<dyn MTLResource>;

fn argument_descriptor(category: ResourceTableCategory, capacity: u32) -> Retained<MTLArgumentDescriptor> {
    let (data_type, access) = match category {
        ResourceTableCategory::UniformBuffer => (MTLDataType::Pointer, MTLBindingAccess::ReadOnly),
        ResourceTableCategory::StorageBuffer => (MTLDataType::Pointer, MTLBindingAccess::ReadWrite),
        ResourceTableCategory::SampledImage => (MTLDataType::Texture, MTLBindingAccess::ReadOnly),
        ResourceTableCategory::StorageImage => (MTLDataType::Texture, MTLBindingAccess::ReadWrite),
        ResourceTableCategory::Sampler => (MTLDataType::Sampler, MTLBindingAccess::ReadOnly),
    };
    let descriptor = unsafe { MTLArgumentDescriptor::new() };
    unsafe {
        descriptor.setDataType(data_type);
        descriptor.setIndex(argument_base(category) as usize);
        descriptor.setArrayLength(capacity as usize);
        descriptor.setAccess(access);
        if data_type == MTLDataType::Texture {
            descriptor.setTextureType(MTLTextureType::Type2D);
        }
    }
    descriptor
}

fn resource_usage(category: ResourceTableCategory) -> MTLResourceUsage {
    match category {
        ResourceTableCategory::StorageBuffer | ResourceTableCategory::StorageImage => {
            MTLResourceUsage::Read | MTLResourceUsage::Write
        }
        _ => MTLResourceUsage::Read,
    }
}

/// Resource referenced by a slot of the table
#[derive(Clone)]
pub(crate) struct Resident {
    pub resource: MetalHandle<NativeResource>,
    pub usage: MTLResourceUsage,
}

/// Metal resource table implementation
pub struct MetalResourceTable {
    _ctx: Arc<MetalContext>,
    name: String,
    encoder: MetalHandle<ProtocolObject<dyn MTLArgumentEncoder>>,
    pub(crate) argument_buffer: MetalHandle<NativeBuffer>,
    /// Keyed by argument id
    residents: FxHashMap<u64, Resident>,
    capacities: ResourceTableCapacities,
}

impl MetalResourceTable {
    pub(crate) fn new(ctx: Arc<MetalContext>, desc: &ResourceTableDesc) -> Result<Self> {
        let capacities = RESOURCE_TABLE_CAPACITIES;
        let descriptors: Vec<Retained<MTLArgumentDescriptor>> = ResourceTableCategory::ALL
            .iter()
            .map(|category| argument_descriptor(*category, capacities.get(*category)))
            .collect();
        let descriptors = NSArray::from_retained_slice(&descriptors);
        let encoder = unsafe { ctx.device.newArgumentEncoderWithArguments(&descriptors) }
            .ok_or_else(|| nil_error(format_args!("create argument encoder of resource table '{}'", desc.name)))?;

        let length = unsafe { encoder.encodedLength() };
        let argument_buffer = unsafe {
            ctx.device
                .newBufferWithLength_options(length, buffer_options(BufferMemoryLocation::Cpu))
        }
        .ok_or_else(|| nil_error(format_args!("create argument buffer of resource table '{}'", desc.name)))?;
        unsafe {
            argument_buffer.setLabel(Some(&label(desc.name)));
            encoder.setLabel(Some(&label(desc.name)));
            encoder.setArgumentBuffer_offset(Some(&argument_buffer), 0);
        }

        Ok(Self {
            _ctx: ctx,
            name: desc.name.to_string(),
            encoder: MetalHandle::new(encoder),
            argument_buffer: MetalHandle::new(argument_buffer),
            residents: FxHashMap::default(),
            capacities,
        })
    }

    /// Resources the GPU reaches through this table
    pub(crate) fn residents(&self) -> impl Iterator<Item = &Resident> {
        self.residents.values()
    }

    fn write_buffer(
        &mut self,
        category: ResourceTableCategory,
        index: u32,
        buffer: &dyn Buffer,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        validate_buffer_binding(&self.name, &self.capacities, category, index, buffer, offset, size)?;
        let buffer = downcast_resource::<MetalBuffer, _>(buffer, GraphicsApi::Metal)?;
        let id = argument_index(category, index);
        unsafe {
            self.encoder
                .setBuffer_offset_atIndex(Some(&buffer.buffer), offset as usize, id as usize)
        };
        let native = buffer.buffer.retain();
        self.residents.insert(
            id,
            Resident {
                resource: MetalHandle::new(ProtocolObject::from_retained(native)),
                usage: resource_usage(category),
            },
        );
        Ok(())
    }

    fn write_image(&mut self, category: ResourceTableCategory, index: u32, image: &dyn Image) -> Result<()> {
        validate_image_binding(&self.name, &self.capacities, category, index, image)?;
        let image = downcast_resource::<MetalImage, _>(image, GraphicsApi::Metal)?;
        let id = argument_index(category, index);
        unsafe { self.encoder.setTexture_atIndex(Some(&image.texture), id as usize) };
        let native = image.texture.retain();
        self.residents.insert(
            id,
            Resident {
                resource: MetalHandle::new(ProtocolObject::from_retained(native)),
                usage: resource_usage(category),
            },
        );
        Ok(())
    }
}

crate::metal_resource!(MetalResourceTable);

impl ResourceTable for MetalResourceTable {
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
        let sampler = downcast_resource::<MetalSampler, _>(sampler, GraphicsApi::Metal)?;
        let id = argument_index(ResourceTableCategory::Sampler, index);
        unsafe { self.encoder.setSamplerState_atIndex(Some(&sampler.sampler), id as usize) };
        Ok(())
    }

    fn capacities(&self) -> &ResourceTableCapacities {
        &self.capacities
    }
}
