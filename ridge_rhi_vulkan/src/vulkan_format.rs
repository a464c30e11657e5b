/// Conversions between core enums and their Vulkan counterparts
///
/// Pure lookup functions, unit tested without a GPU.

use ash::vk;
use ridge_rhi::ridge::rhi::{
    BufferCommandUsage, BufferUsage, ImageCommandUsage, ImageFormat, ImageMemoryType, ImageSampling, ImageType,
    ImageUsage, VertexInput,
};

// ============================================================================
// FORMATS
// ============================================================================

/// Vulkan format of `format` (`vk::Format::UNDEFINED` when there is none)
pub(crate) fn image_format_to_vk(format: ImageFormat) -> vk::Format {
    use ImageFormat as F;
    match format {
        F::Undefined => vk::Format::UNDEFINED,

        F::R8_INT => vk::Format::R8_SINT,
        F::R8_UINT => vk::Format::R8_UINT,
        F::R8_NORM => vk::Format::R8_SNORM,
        F::R8_UNORM => vk::Format::R8_UNORM,
        F::R8_SRGB => vk::Format::R8_SRGB,
        F::R8G8_INT => vk::Format::R8G8_SINT,
        F::R8G8_UINT => vk::Format::R8G8_UINT,
        F::R8G8_NORM => vk::Format::R8G8_SNORM,
        F::R8G8_UNORM => vk::Format::R8G8_UNORM,
        F::R8G8_SRGB => vk::Format::R8G8_SRGB,
        F::R8G8B8_INT => vk::Format::R8G8B8_SINT,
        F::R8G8B8_UINT => vk::Format::R8G8B8_UINT,
        F::R8G8B8_NORM => vk::Format::R8G8B8_SNORM,
        F::R8G8B8_UNORM => vk::Format::R8G8B8_UNORM,
        F::R8G8B8_SRGB => vk::Format::R8G8B8_SRGB,
        F::R8G8B8A8_INT => vk::Format::R8G8B8A8_SINT,
        F::R8G8B8A8_UINT => vk::Format::R8G8B8A8_UINT,
        F::R8G8B8A8_NORM => vk::Format::R8G8B8A8_SNORM,
        F::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        F::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        F::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        F::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,

        F::R16_INT => vk::Format::R16_SINT,
        F::R16_UINT => vk::Format::R16_UINT,
        F::R16_NORM => vk::Format::R16_SNORM,
        F::R16_UNORM => vk::Format::R16_UNORM,
        F::R16_FLOAT => vk::Format::R16_SFLOAT,
        F::R16G16_INT => vk::Format::R16G16_SINT,
        F::R16G16_UINT => vk::Format::R16G16_UINT,
        F::R16G16_NORM => vk::Format::R16G16_SNORM,
        F::R16G16_UNORM => vk::Format::R16G16_UNORM,
        F::R16G16_FLOAT => vk::Format::R16G16_SFLOAT,
        F::R16G16B16_INT => vk::Format::R16G16B16_SINT,
        F::R16G16B16_UINT => vk::Format::R16G16B16_UINT,
        F::R16G16B16_NORM => vk::Format::R16G16B16_SNORM,
        F::R16G16B16_UNORM => vk::Format::R16G16B16_UNORM,
        F::R16G16B16_FLOAT => vk::Format::R16G16B16_SFLOAT,
        F::R16G16B16A16_INT => vk::Format::R16G16B16A16_SINT,
        F::R16G16B16A16_UINT => vk::Format::R16G16B16A16_UINT,
        F::R16G16B16A16_NORM => vk::Format::R16G16B16A16_SNORM,
        F::R16G16B16A16_UNORM => vk::Format::R16G16B16A16_UNORM,
        F::R16G16B16A16_FLOAT => vk::Format::R16G16B16A16_SFLOAT,

        F::R32_INT => vk::Format::R32_SINT,
        F::R32_UINT => vk::Format::R32_UINT,
        F::R32_FLOAT => vk::Format::R32_SFLOAT,
        F::R32G32_INT => vk::Format::R32G32_SINT,
        F::R32G32_UINT => vk::Format::R32G32_UINT,
        F::R32G32_FLOAT => vk::Format::R32G32_SFLOAT,
        F::R32G32B32_INT => vk::Format::R32G32B32_SINT,
        F::R32G32B32_UINT => vk::Format::R32G32B32_UINT,
        F::R32G32B32_FLOAT => vk::Format::R32G32B32_SFLOAT,
        F::R32G32B32A32_INT => vk::Format::R32G32B32A32_SINT,
        F::R32G32B32A32_UINT => vk::Format::R32G32B32A32_UINT,
        F::R32G32B32A32_FLOAT => vk::Format::R32G32B32A32_SFLOAT,

        F::R64_INT => vk::Format::R64_SINT,
        F::R64_UINT => vk::Format::R64_UINT,
        F::R64_FLOAT => vk::Format::R64_SFLOAT,
        F::R64G64_INT => vk::Format::R64G64_SINT,
        F::R64G64_UINT => vk::Format::R64G64_UINT,
        F::R64G64_FLOAT => vk::Format::R64G64_SFLOAT,
        F::R64G64B64_INT => vk::Format::R64G64B64_SINT,
        F::R64G64B64_UINT => vk::Format::R64G64B64_UINT,
        F::R64G64B64_FLOAT => vk::Format::R64G64B64_SFLOAT,
        F::R64G64B64A64_INT => vk::Format::R64G64B64A64_SINT,
        F::R64G64B64A64_UINT => vk::Format::R64G64B64A64_UINT,
        F::R64G64B64A64_FLOAT => vk::Format::R64G64B64A64_SFLOAT,

        F::D16_UNORM => vk::Format::D16_UNORM,
        F::D32_FLOAT => vk::Format::D32_SFLOAT,

        F::BC1_RGB_UNORM => vk::Format::BC1_RGB_UNORM_BLOCK,
        F::BC1_RGB_SRGB => vk::Format::BC1_RGB_SRGB_BLOCK,
        F::BC1_RGBA_UNORM => vk::Format::BC1_RGBA_UNORM_BLOCK,
        F::BC1_RGBA_SRGB => vk::Format::BC1_RGBA_SRGB_BLOCK,
        F::BC3_RGBA_UNORM => vk::Format::BC3_UNORM_BLOCK,
        F::BC3_RGBA_SRGB => vk::Format::BC3_SRGB_BLOCK,
        F::BC4_R_NORM => vk::Format::BC4_SNORM_BLOCK,
        F::BC4_R_UNORM => vk::Format::BC4_UNORM_BLOCK,
        F::BC5_RG_NORM => vk::Format::BC5_SNORM_BLOCK,
        F::BC5_RG_UNORM => vk::Format::BC5_UNORM_BLOCK,
        F::BC6H_RGB_FLOAT => vk::Format::BC6H_SFLOAT_BLOCK,
        F::BC6H_RGB_UFLOAT => vk::Format::BC6H_UFLOAT_BLOCK,
        F::BC7_RGB_UNORM | F::BC7_RGBA_UNORM => vk::Format::BC7_UNORM_BLOCK,
        F::BC7_RGB_SRGB | F::BC7_RGBA_SRGB => vk::Format::BC7_SRGB_BLOCK,

        F::ASTC_4X4_UNORM => vk::Format::ASTC_4X4_UNORM_BLOCK,
        F::ASTC_4X4_SRGB => vk::Format::ASTC_4X4_SRGB_BLOCK,
        F::ASTC_8X8_UNORM => vk::Format::ASTC_8X8_UNORM_BLOCK,
        F::ASTC_8X8_SRGB => vk::Format::ASTC_8X8_SRGB_BLOCK,
    }
}

/// Surface formats a swapchain may fall back to, in order
pub(crate) const SWAPCHAIN_FALLBACK_FORMATS: [ImageFormat; 6] = [
    ImageFormat::B8G8R8A8_UNORM,
    ImageFormat::R8G8B8A8_UNORM,
    ImageFormat::B8G8R8A8_SRGB,
    ImageFormat::R8G8B8A8_SRGB,
    ImageFormat::R16G16B16A16_FLOAT,
    ImageFormat::R16G16B16A16_UNORM,
];

pub(crate) fn vertex_input_to_vk(input: VertexInput) -> vk::Format {
    match input {
        VertexInput::Float => vk::Format::R32_SFLOAT,
        VertexInput::Float2 => vk::Format::R32G32_SFLOAT,
        VertexInput::Float3 => vk::Format::R32G32B32_SFLOAT,
        VertexInput::Float4 => vk::Format::R32G32B32A32_SFLOAT,
    }
}

// ============================================================================
// IMAGES
// ============================================================================

pub(crate) fn image_usage_to_vk(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(ImageUsage::SOURCE_MEMORY) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(ImageUsage::DESTINATION_MEMORY) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(ImageUsage::STORAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.intersects(ImageUsage::SAMPLE | ImageUsage::FILTER) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.intersects(ImageUsage::COLOR_ATTACHMENT | ImageUsage::RESOLVER_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(ImageUsage::DEPTH_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(ImageUsage::INPUT_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
    }
    if usage.contains(ImageUsage::TRANSIENT_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::TRANSIENT_ATTACHMENT;
    }
    flags
}

/// Format features an image of `usage` needs with optimal tiling
pub(crate) fn required_format_features(usage: ImageUsage) -> vk::FormatFeatureFlags {
    let mut features = vk::FormatFeatureFlags::empty();
    if usage.contains(ImageUsage::SOURCE_MEMORY) {
        features |= vk::FormatFeatureFlags::TRANSFER_SRC;
    }
    if usage.contains(ImageUsage::DESTINATION_MEMORY) {
        features |= vk::FormatFeatureFlags::TRANSFER_DST;
    }
    if usage.contains(ImageUsage::STORAGE) {
        features |= vk::FormatFeatureFlags::STORAGE_IMAGE;
    }
    if usage.contains(ImageUsage::SAMPLE) {
        features |= vk::FormatFeatureFlags::SAMPLED_IMAGE;
    }
    if usage.contains(ImageUsage::FILTER) {
        features |= vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR;
    }
    if usage.intersects(ImageUsage::COLOR_ATTACHMENT | ImageUsage::RESOLVER_ATTACHMENT) {
        features |= vk::FormatFeatureFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(ImageUsage::DEPTH_ATTACHMENT) {
        features |= vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    features
}

pub(crate) fn sampling_to_vk(sampling: ImageSampling) -> vk::SampleCountFlags {
    // Sample count bits are the counts themselves
    vk::SampleCountFlags::from_raw(sampling.sample_count())
}

pub(crate) fn image_type_to_vk(image_type: ImageType) -> vk::ImageType {
    match image_type {
        ImageType::Line => vk::ImageType::TYPE_1D,
        ImageType::Plane | ImageType::Cube => vk::ImageType::TYPE_2D,
        ImageType::Volume => vk::ImageType::TYPE_3D,
    }
}

pub(crate) fn image_view_type(image_type: ImageType, layer_count: u32) -> vk::ImageViewType {
    match image_type {
        ImageType::Line if layer_count > 1 => vk::ImageViewType::TYPE_1D_ARRAY,
        ImageType::Line => vk::ImageViewType::TYPE_1D,
        ImageType::Plane if layer_count > 1 => vk::ImageViewType::TYPE_2D_ARRAY,
        ImageType::Plane => vk::ImageViewType::TYPE_2D,
        ImageType::Volume => vk::ImageViewType::TYPE_3D,
        ImageType::Cube if layer_count > 6 => vk::ImageViewType::CUBE_ARRAY,
        ImageType::Cube => vk::ImageViewType::CUBE,
    }
}

pub(crate) fn image_aspect(format: ImageFormat) -> vk::ImageAspectFlags {
    if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

// ============================================================================
// BUFFERS
// ============================================================================

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::SOURCE_MEMORY) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::DESTINATION_MEMORY) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    flags
}

// ============================================================================
// SYNCHRONIZATION
// ============================================================================

/// Pipeline stages and memory accesses of a buffer usage
pub(crate) fn buffer_usage_barrier(usage: BufferCommandUsage) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    let graphics_stages = vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER;
    match usage {
        BufferCommandUsage::None => (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
        BufferCommandUsage::MemoryRead => (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_READ),
        BufferCommandUsage::MemoryWrite => (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
        BufferCommandUsage::VertexRead => (
            vk::PipelineStageFlags::VERTEX_INPUT,
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
        ),
        BufferCommandUsage::IndexRead => (vk::PipelineStageFlags::VERTEX_INPUT, vk::AccessFlags::INDEX_READ),
        BufferCommandUsage::GraphicsRead => (
            graphics_stages,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::UNIFORM_READ,
        ),
        BufferCommandUsage::GraphicsWrite => (graphics_stages, vk::AccessFlags::SHADER_WRITE),
        BufferCommandUsage::ComputeRead => (
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::UNIFORM_READ,
        ),
        BufferCommandUsage::ComputeWrite => (vk::PipelineStageFlags::COMPUTE_SHADER, vk::AccessFlags::SHADER_WRITE),
    }
}

/// Pipeline stages, memory accesses and layout of an image usage
pub(crate) fn image_usage_barrier(
    usage: ImageCommandUsage,
) -> (vk::PipelineStageFlags, vk::AccessFlags, vk::ImageLayout) {
    let graphics_stages = vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER;
    let depth_stages = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    match usage {
        ImageCommandUsage::None => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::ImageLayout::UNDEFINED,
        ),
        ImageCommandUsage::MemoryRead => (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_READ,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ),
        ImageCommandUsage::MemoryWrite => (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ),
        ImageCommandUsage::ColorRead => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_READ,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ),
        ImageCommandUsage::ColorWrite => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ),
        ImageCommandUsage::DepthRead => (
            depth_stages,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ),
        ImageCommandUsage::DepthWrite => (
            depth_stages,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ),
        ImageCommandUsage::GraphicsRead => (
            graphics_stages,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::INPUT_ATTACHMENT_READ,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        ImageCommandUsage::GraphicsWrite => (
            graphics_stages,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            vk::ImageLayout::GENERAL,
        ),
        ImageCommandUsage::ComputeRead => (
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        ImageCommandUsage::ComputeWrite => (
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            vk::ImageLayout::GENERAL,
        ),
        ImageCommandUsage::Present => (
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::ImageLayout::PRESENT_SRC_KHR,
        ),
    }
}

/// Filter for mip chain blits; integer formats cannot be filtered linearly
pub(crate) fn blit_filter(format: ImageFormat) -> vk::Filter {
    match format.decompose().map(|(_, memory_type)| memory_type) {
        Some(
            ImageMemoryType::Int8
            | ImageMemoryType::UInt8
            | ImageMemoryType::Int16
            | ImageMemoryType::UInt16
            | ImageMemoryType::Int32
            | ImageMemoryType::UInt32
            | ImageMemoryType::Int64
            | ImageMemoryType::UInt64
            | ImageMemoryType::Float64,
        ) => vk::Filter::NEAREST,
        _ => vk::Filter::LINEAR,
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
