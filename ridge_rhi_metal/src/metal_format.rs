//! Format support rules and conversions to Metal enums
//!
//! Which format and usage combinations a Metal device accepts follows the
//! Metal feature set tables. The rules only depend on a few device
//! capabilities, gathered in [`FormatCapabilities`], so they are checked on
//! every host. The native conversions exist on Apple targets only.

use ridge_rhi::ridge::rhi::{ImageChannels, ImageFormat, ImageMemoryType, ImageUsage};

/// Device capabilities the format rules depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatCapabilities {
    /// BC1 to BC7 sampling (Mac family GPUs)
    pub bc_compression: bool,
    /// ASTC LDR sampling (Apple family GPUs)
    pub astc_compression: bool,
    /// Filtering and resolving of 32-bit float formats
    pub float32_filtering: bool,
    /// Apple family GPU: sRGB shader writes and single channel sRGB
    pub apple_gpu: bool,
}

/// Usages a block-compressed format can serve
const COMPRESSED_USAGES: ImageUsage = ImageUsage::SOURCE_MEMORY
    .union(ImageUsage::DESTINATION_MEMORY)
    .union(ImageUsage::SAMPLE)
    .union(ImageUsage::FILTER);

/// Whether `format` can back an image with `usage` on a device with `capabilities`
pub fn is_format_supported(format: ImageFormat, usage: ImageUsage, capabilities: &FormatCapabilities) -> bool {
    if format == ImageFormat::Undefined {
        return false;
    }

    if format.is_compressed() {
        let family_supported = if is_astc(format) {
            capabilities.astc_compression
        } else {
            capabilities.bc_compression
        };
        return family_supported && COMPRESSED_USAGES.contains(usage);
    }

    let Some((channels, memory_type)) = format.decompose() else {
        return false;
    };

    // Metal has no three-channel or 64-bit pixel formats
    if channels == ImageChannels::RGB {
        return false;
    }
    if matches!(memory_type, ImageMemoryType::Int64 | ImageMemoryType::UInt64 | ImageMemoryType::Float64) {
        return false;
    }

    if channels == ImageChannels::D {
        return !usage.intersects(ImageUsage::COLOR_ATTACHMENT | ImageUsage::STORAGE | ImageUsage::RESOLVER_ATTACHMENT);
    }
    if usage.contains(ImageUsage::DEPTH_ATTACHMENT) {
        return false;
    }

    match memory_type {
        ImageMemoryType::Int8
        | ImageMemoryType::UInt8
        | ImageMemoryType::Int16
        | ImageMemoryType::UInt16
        | ImageMemoryType::Int32
        | ImageMemoryType::UInt32 => !usage.intersects(ImageUsage::FILTER | ImageUsage::RESOLVER_ATTACHMENT),
        ImageMemoryType::Norm16 | ImageMemoryType::UNorm16 => !usage.contains(ImageUsage::RESOLVER_ATTACHMENT),
        ImageMemoryType::Float32 => {
            capabilities.float32_filtering || !usage.intersects(ImageUsage::FILTER | ImageUsage::RESOLVER_ATTACHMENT)
        }
        ImageMemoryType::SRGB8 => {
            let layout_supported = match channels {
                ImageChannels::R | ImageChannels::RG => capabilities.apple_gpu,
                _ => true,
            };
            layout_supported && (capabilities.apple_gpu || !usage.contains(ImageUsage::STORAGE))
        }
        _ => true,
    }
}

fn is_astc(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::ASTC_4X4_UNORM | ImageFormat::ASTC_4X4_SRGB | ImageFormat::ASTC_8X8_UNORM | ImageFormat::ASTC_8X8_SRGB
    )
}

/// Pixel formats a `CAMetalLayer` can present
pub const LAYER_FORMATS: [ImageFormat; 3] = [
    ImageFormat::B8G8R8A8_UNORM,
    ImageFormat::B8G8R8A8_SRGB,
    ImageFormat::R16G16B16A16_FLOAT,
];

/// First preferred format a layer can present, 8-bit BGRA otherwise
pub fn layer_format(preferred: &[ImageFormat]) -> ImageFormat {
    preferred
        .iter()
        .copied()
        .find(|format| LAYER_FORMATS.contains(format))
        .unwrap_or(ImageFormat::B8G8R8A8_UNORM)
}

#[cfg(target_vendor = "apple")]
mod native {
    use objc2_metal::{
        MTLCompareFunction, MTLPixelFormat, MTLSamplerAddressMode, MTLSamplerBorderColor, MTLSamplerMinMagFilter,
        MTLSamplerMipFilter, MTLTextureType, MTLTextureUsage, MTLVertexFormat,
    };
    use ridge_rhi::ridge::rhi::{
        ImageFormat, ImageType, ImageUsage, SamplerAddressMode, SamplerBorderColor, SamplerCompareOperation,
        SamplerFilter, VertexInput,
    };

    /// Native pixel format, `None` where Metal has no equivalent
    pub(crate) fn pixel_format(format: ImageFormat) -> Option<MTLPixelFormat> {
        use ImageFormat as F;
        let pixel_format = match format {
            F::R8_INT => MTLPixelFormat::R8Sint,
            F::R8_UINT => MTLPixelFormat::R8Uint,
            F::R8_NORM => MTLPixelFormat::R8Snorm,
            F::R8_UNORM => MTLPixelFormat::R8Unorm,
            F::R8_SRGB => MTLPixelFormat::R8Unorm_sRGB,
            F::R8G8_INT => MTLPixelFormat::RG8Sint,
            F::R8G8_UINT => MTLPixelFormat::RG8Uint,
            F::R8G8_NORM => MTLPixelFormat::RG8Snorm,
            F::R8G8_UNORM => MTLPixelFormat::RG8Unorm,
            F::R8G8_SRGB => MTLPixelFormat::RG8Unorm_sRGB,
            F::R8G8B8A8_INT => MTLPixelFormat::RGBA8Sint,
            F::R8G8B8A8_UINT => MTLPixelFormat::RGBA8Uint,
            F::R8G8B8A8_NORM => MTLPixelFormat::RGBA8Snorm,
            F::R8G8B8A8_UNORM => MTLPixelFormat::RGBA8Unorm,
            F::R8G8B8A8_SRGB => MTLPixelFormat::RGBA8Unorm_sRGB,
            F::B8G8R8A8_UNORM => MTLPixelFormat::BGRA8Unorm,
            F::B8G8R8A8_SRGB => MTLPixelFormat::BGRA8Unorm_sRGB,

            F::R16_INT => MTLPixelFormat::R16Sint,
            F::R16_UINT => MTLPixelFormat::R16Uint,
            F::R16_NORM => MTLPixelFormat::R16Snorm,
            F::R16_UNORM => MTLPixelFormat::R16Unorm,
            F::R16_FLOAT => MTLPixelFormat::R16Float,
            F::R16G16_INT => MTLPixelFormat::RG16Sint,
            F::R16G16_UINT => MTLPixelFormat::RG16Uint,
            F::R16G16_NORM => MTLPixelFormat::RG16Snorm,
            F::R16G16_UNORM => MTLPixelFormat::RG16Unorm,
            F::R16G16_FLOAT => MTLPixelFormat::RG16Float,
            F::R16G16B16A16_INT => MTLPixelFormat::RGBA16Sint,
            F::R16G16B16A16_UINT => MTLPixelFormat::RGBA16Uint,
            F::R16G16B16A16_NORM => MTLPixelFormat::RGBA16Snorm,
            F::R16G16B16A16_UNORM => MTLPixelFormat::RGBA16Unorm,
            F::R16G16B16A16_FLOAT => MTLPixelFormat::RGBA16Float,

            F::R32_INT => MTLPixelFormat::R32Sint,
            F::R32_UINT => MTLPixelFormat::R32Uint,
            F::R32_FLOAT => MTLPixelFormat::R32Float,
            F::R32G32_INT => MTLPixelFormat::RG32Sint,
            F::R32G32_UINT => MTLPixelFormat::RG32Uint,
            F::R32G32_FLOAT => MTLPixelFormat::RG32Float,
            F::R32G32B32A32_INT => MTLPixelFormat::RGBA32Sint,
            F::R32G32B32A32_UINT => MTLPixelFormat::RGBA32Uint,
            F::R32G32B32A32_FLOAT => MTLPixelFormat::RGBA32Float,

            F::D16_UNORM => MTLPixelFormat::Depth16Unorm,
            F::D32_FLOAT => MTLPixelFormat::Depth32Float,

            // BC1 without alpha samples with an opaque alpha
            F::BC1_RGB_UNORM | F::BC1_RGBA_UNORM => MTLPixelFormat::BC1_RGBA,
            F::BC1_RGB_SRGB | F::BC1_RGBA_SRGB => MTLPixelFormat::BC1_RGBA_sRGB,
            F::BC3_RGBA_UNORM => MTLPixelFormat::BC3_RGBA,
            F::BC3_RGBA_SRGB => MTLPixelFormat::BC3_RGBA_sRGB,
            F::BC4_R_NORM => MTLPixelFormat::BC4_RSnorm,
            F::BC4_R_UNORM => MTLPixelFormat::BC4_RUnorm,
            F::BC5_RG_NORM => MTLPixelFormat::BC5_RGSnorm,
            F::BC5_RG_UNORM => MTLPixelFormat::BC5_RGUnorm,
            F::BC6H_RGB_FLOAT => MTLPixelFormat::BC6H_RGBFloat,
            F::BC6H_RGB_UFLOAT => MTLPixelFormat::BC6H_RGBUfloat,
            F::BC7_RGB_UNORM | F::BC7_RGBA_UNORM => MTLPixelFormat::BC7_RGBAUnorm,
            F::BC7_RGB_SRGB | F::BC7_RGBA_SRGB => MTLPixelFormat::BC7_RGBAUnorm_sRGB,

            F::ASTC_4X4_UNORM => MTLPixelFormat::ASTC_4x4_LDR,
            F::ASTC_4X4_SRGB => MTLPixelFormat::ASTC_4x4_sRGB,
            F::ASTC_8X8_UNORM => MTLPixelFormat::ASTC_8x8_LDR,
            F::ASTC_8X8_SRGB => MTLPixelFormat::ASTC_8x8_sRGB,

            _ => return None,
        };
        Some(pixel_format)
    }

    pub(crate) fn texture_usage(usage: ImageUsage) -> MTLTextureUsage {
        let mut native = MTLTextureUsage::empty();
        if usage.intersects(ImageUsage::SAMPLE | ImageUsage::FILTER | ImageUsage::INPUT_ATTACHMENT) {
            native |= MTLTextureUsage::ShaderRead;
        }
        if usage.contains(ImageUsage::STORAGE) {
            native |= MTLTextureUsage::ShaderRead | MTLTextureUsage::ShaderWrite;
        }
        if usage.intersects(
            ImageUsage::COLOR_ATTACHMENT
                | ImageUsage::DEPTH_ATTACHMENT
                | ImageUsage::RESOLVER_ATTACHMENT
                | ImageUsage::INPUT_ATTACHMENT,
        ) {
            native |= MTLTextureUsage::RenderTarget;
        }
        native
    }

    /// Texture type of an image; multisampled planes use the multisample type
    pub(crate) fn texture_type(image_type: ImageType, layer_count: u32, multisampled: bool) -> MTLTextureType {
        match image_type {
            ImageType::Line if layer_count > 1 => MTLTextureType::Type1DArray,
            ImageType::Line => MTLTextureType::Type1D,
            ImageType::Plane if multisampled && layer_count > 1 => MTLTextureType::Type2DMultisampleArray,
            ImageType::Plane if multisampled => MTLTextureType::Type2DMultisample,
            ImageType::Plane if layer_count > 1 => MTLTextureType::Type2DArray,
            ImageType::Plane => MTLTextureType::Type2D,
            ImageType::Volume => MTLTextureType::Type3D,
            ImageType::Cube if layer_count > 6 => MTLTextureType::TypeCubeArray,
            ImageType::Cube => MTLTextureType::TypeCube,
        }
    }

    pub(crate) fn vertex_format(input: VertexInput) -> MTLVertexFormat {
        match input {
            VertexInput::Float => MTLVertexFormat::Float,
            VertexInput::Float2 => MTLVertexFormat::Float2,
            VertexInput::Float3 => MTLVertexFormat::Float3,
            VertexInput::Float4 => MTLVertexFormat::Float4,
        }
    }

    pub(crate) fn min_mag_filter(filter: SamplerFilter) -> MTLSamplerMinMagFilter {
        match filter {
            SamplerFilter::Nearest => MTLSamplerMinMagFilter::Nearest,
            SamplerFilter::Linear => MTLSamplerMinMagFilter::Linear,
        }
    }

    pub(crate) fn mip_filter(filter: SamplerFilter) -> MTLSamplerMipFilter {
        match filter {
            SamplerFilter::Nearest => MTLSamplerMipFilter::Nearest,
            SamplerFilter::Linear => MTLSamplerMipFilter::Linear,
        }
    }

    pub(crate) fn address_mode(mode: SamplerAddressMode) -> MTLSamplerAddressMode {
        match mode {
            SamplerAddressMode::Repeat => MTLSamplerAddressMode::Repeat,
            SamplerAddressMode::MirroredRepeat => MTLSamplerAddressMode::MirrorRepeat,
            SamplerAddressMode::ClampToEdge => MTLSamplerAddressMode::ClampToEdge,
            SamplerAddressMode::ClampToBorder => MTLSamplerAddressMode::ClampToBorderColor,
        }
    }

    pub(crate) fn compare_function(operation: SamplerCompareOperation) -> MTLCompareFunction {
        match operation {
            SamplerCompareOperation::None => MTLCompareFunction::Never,
            SamplerCompareOperation::Equal => MTLCompareFunction::Equal,
            SamplerCompareOperation::NotEqual => MTLCompareFunction::NotEqual,
            SamplerCompareOperation::Less => MTLCompareFunction::Less,
            SamplerCompareOperation::LessOrEqual => MTLCompareFunction::LessEqual,
            SamplerCompareOperation::Greater => MTLCompareFunction::Greater,
            SamplerCompareOperation::GreaterOrEqual => MTLCompareFunction::GreaterEqual,
        }
    }

    pub(crate) fn border_color(color: SamplerBorderColor) -> MTLSamplerBorderColor {
        match color {
            SamplerBorderColor::White => MTLSamplerBorderColor::OpaqueWhite,
            SamplerBorderColor::Black => MTLSamplerBorderColor::OpaqueBlack,
            SamplerBorderColor::Transparent => MTLSamplerBorderColor::TransparentBlack,
        }
    }
}

#[cfg(target_vendor = "apple")]
pub(crate) use native::*;

#[cfg(test)]
#[path = "metal_format_tests.rs"]
mod tests;
