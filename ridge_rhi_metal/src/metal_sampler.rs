/// Sampler - Metal implementation of the Sampler trait

use objc2::runtime::ProtocolObject;
use objc2_metal::{MTLDevice, MTLSamplerDescriptor, MTLSamplerState};
use ridge_rhi::ridge::rhi::{Sampler, SamplerDesc};
use ridge_rhi::ridge::Result;
use std::sync::Arc;

use crate::metal_context::{label, nil_error, MetalContext};
use crate::metal_format::{address_mode, border_color, compare_function, min_mag_filter, mip_filter};
use crate::metal_handle::MetalHandle;

/// Metal sampler implementation
pub struct MetalSampler {
    _ctx: Arc<MetalContext>,
    name: String,
    pub(crate) sampler: MetalHandle<ProtocolObject<dyn MTLSamplerState>>,
}

impl MetalSampler {
    /// `desc` is already validated and its anisotropy supported
    pub(crate) fn new(ctx: Arc<MetalContext>, desc: &SamplerDesc) -> Result<Self> {
        let filter = min_mag_filter(desc.filter);
        let address = address_mode(desc.address_mode);

        let descriptor = unsafe { MTLSamplerDescriptor::new() };
        unsafe {
            descriptor.setMinFilter(filter);
            descriptor.setMagFilter(filter);
            descriptor.setMipFilter(mip_filter(desc.filter));
            descriptor.setSAddressMode(address);
            descriptor.setTAddressMode(address);
            descriptor.setRAddressMode(address);
            descriptor.setMaxAnisotropy(desc.anisotropy.ratio() as usize);
            descriptor.setCompareFunction(compare_function(desc.compare_operation));
            descriptor.setBorderColor(border_color(desc.border_color));
            // Samplers are only reachable through resource table argument buffers
            descriptor.setSupportArgumentBuffers(true);
            descriptor.setLabel(Some(&label(desc.name)));
        }

        let sampler = unsafe { ctx.device.newSamplerStateWithDescriptor(&descriptor) }
            .ok_or_else(|| nil_error(format_args!("create sampler '{}'", desc.name)))?;

        Ok(Self {
            _ctx: ctx,
            name: desc.name.to_string(),
            sampler: MetalHandle::new(sampler),
        })
    }
}

crate::metal_resource!(MetalSampler);

impl Sampler for MetalSampler {}
