/// Sampler - Vulkan implementation of the Sampler trait

use ash::vk;
use ridge_rhi::ridge::rhi::{
    Sampler, SamplerAddressMode, SamplerAnisotropy, SamplerBorderColor, SamplerCompareOperation, SamplerDesc,
    SamplerFilter,
};
use ridge_rhi::ridge::Result;
use std::sync::Arc;

use crate::vulkan_context::{vk_error, GpuContext};

/// Vulkan sampler implementation
pub struct VulkanSampler {
    ctx: Arc<GpuContext>,
    name: String,
    pub(crate) sampler: vk::Sampler,
}

impl VulkanSampler {
    /// `desc` is already validated and its anisotropy supported
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &SamplerDesc) -> Result<Self> {
        let (filter, mipmap_mode) = filter_to_vk(desc.filter);
        let address_mode = address_mode_to_vk(desc.address_mode);
        let compare_op = compare_operation_to_vk(desc.compare_operation);

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(desc.anisotropy != SamplerAnisotropy::X1)
            .max_anisotropy(desc.anisotropy.ratio())
            .compare_enable(compare_op.is_some())
            .compare_op(compare_op.unwrap_or(vk::CompareOp::ALWAYS))
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(border_color_to_vk(desc.border_color))
            .unnormalized_coordinates(false);

        let sampler = unsafe { ctx.device.create_sampler(&sampler_info, None) }
            .map_err(|e| vk_error(format_args!("create sampler '{}'", desc.name), e))?;
        ctx.set_object_name(sampler, desc.name);

        Ok(Self {
            ctx,
            name: desc.name.to_string(),
            sampler,
        })
    }
}

fn filter_to_vk(filter: SamplerFilter) -> (vk::Filter, vk::SamplerMipmapMode) {
    match filter {
        SamplerFilter::Nearest => (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST),
        SamplerFilter::Linear => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
    }
}

fn address_mode_to_vk(mode: SamplerAddressMode) -> vk::SamplerAddressMode {
    match mode {
        SamplerAddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        SamplerAddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        SamplerAddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        SamplerAddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

/// `None` disables comparison
fn compare_operation_to_vk(operation: SamplerCompareOperation) -> Option<vk::CompareOp> {
    match operation {
        SamplerCompareOperation::None => None,
        SamplerCompareOperation::Equal => Some(vk::CompareOp::EQUAL),
        SamplerCompareOperation::NotEqual => Some(vk::CompareOp::NOT_EQUAL),
        SamplerCompareOperation::Less => Some(vk::CompareOp::LESS),
        SamplerCompareOperation::Greater => Some(vk::CompareOp::GREATER),
        SamplerCompareOperation::LessOrEqual => Some(vk::CompareOp::LESS_OR_EQUAL),
        SamplerCompareOperation::GreaterOrEqual => Some(vk::CompareOp::GREATER_OR_EQUAL),
    }
}

fn border_color_to_vk(color: SamplerBorderColor) -> vk::BorderColor {
    match color {
        SamplerBorderColor::Transparent => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        SamplerBorderColor::White => vk::BorderColor::FLOAT_OPAQUE_WHITE,
        SamplerBorderColor::Black => vk::BorderColor::FLOAT_OPAQUE_BLACK,
    }
}

crate::vulkan_resource!(VulkanSampler);

impl Sampler for VulkanSampler {}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_sampler(self.sampler, None);
        }
    }
}
