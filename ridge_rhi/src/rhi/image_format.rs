/// Image formats, their memory metadata and the fallback order used by
/// `Device::get_supported_image_format`.
///
/// Uncompressed formats decompose into a channel layout and a per-channel
/// memory type. Block-compressed formats are opaque: they only report their
/// block metrics.

use crate::rhi::image::ImageUsage;

/// Pixel format of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(non_camel_case_types)]
pub enum ImageFormat {
    #[default]
    Undefined,

    R8_INT,
    R8_UINT,
    R8_NORM,
    R8_UNORM,
    R8_SRGB,
    R8G8_INT,
    R8G8_UINT,
    R8G8_NORM,
    R8G8_UNORM,
    R8G8_SRGB,
    R8G8B8_INT,
    R8G8B8_UINT,
    R8G8B8_NORM,
    R8G8B8_UNORM,
    R8G8B8_SRGB,
    R8G8B8A8_INT,
    R8G8B8A8_UINT,
    R8G8B8A8_NORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,

    R16_INT,
    R16_UINT,
    R16_NORM,
    R16_UNORM,
    R16_FLOAT,
    R16G16_INT,
    R16G16_UINT,
    R16G16_NORM,
    R16G16_UNORM,
    R16G16_FLOAT,
    R16G16B16_INT,
    R16G16B16_UINT,
    R16G16B16_NORM,
    R16G16B16_UNORM,
    R16G16B16_FLOAT,
    R16G16B16A16_INT,
    R16G16B16A16_UINT,
    R16G16B16A16_NORM,
    R16G16B16A16_UNORM,
    R16G16B16A16_FLOAT,

    R32_INT,
    R32_UINT,
    R32_FLOAT,
    R32G32_INT,
    R32G32_UINT,
    R32G32_FLOAT,
    R32G32B32_INT,
    R32G32B32_UINT,
    R32G32B32_FLOAT,
    R32G32B32A32_INT,
    R32G32B32A32_UINT,
    R32G32B32A32_FLOAT,

    R64_INT,
    R64_UINT,
    R64_FLOAT,
    R64G64_INT,
    R64G64_UINT,
    R64G64_FLOAT,
    R64G64B64_INT,
    R64G64B64_UINT,
    R64G64B64_FLOAT,
    R64G64B64A64_INT,
    R64G64B64A64_UINT,
    R64G64B64A64_FLOAT,

    D16_UNORM,
    D32_FLOAT,

    BC1_RGB_UNORM,
    BC1_RGB_SRGB,
    BC1_RGBA_UNORM,
    BC1_RGBA_SRGB,
    BC3_RGBA_UNORM,
    BC3_RGBA_SRGB,
    BC4_R_NORM,
    BC4_R_UNORM,
    BC5_RG_NORM,
    BC5_RG_UNORM,
    BC6H_RGB_FLOAT,
    BC6H_RGB_UFLOAT,
    BC7_RGB_UNORM,
    BC7_RGB_SRGB,
    BC7_RGBA_UNORM,
    BC7_RGBA_SRGB,

    ASTC_4X4_UNORM,
    ASTC_4X4_SRGB,
    ASTC_8X8_UNORM,
    ASTC_8X8_SRGB,
}

/// Channel layout of an uncompressed format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageChannels {
    R,
    RG,
    RGB,
    RGBA,
    BGRA,
    D,
}

impl ImageChannels {
    pub fn count(self) -> u32 {
        match self {
            ImageChannels::R | ImageChannels::D => 1,
            ImageChannels::RG => 2,
            ImageChannels::RGB => 3,
            ImageChannels::RGBA | ImageChannels::BGRA => 4,
        }
    }

    /// This layout followed by every layout holding strictly more channels
    /// in the same order (R, RG, RGB, RGBA). BGRA and depth have no supersets.
    pub fn supersets(self) -> &'static [ImageChannels] {
        match self {
            ImageChannels::R => &[ImageChannels::R, ImageChannels::RG, ImageChannels::RGB, ImageChannels::RGBA],
            ImageChannels::RG => &[ImageChannels::RG, ImageChannels::RGB, ImageChannels::RGBA],
            ImageChannels::RGB => &[ImageChannels::RGB, ImageChannels::RGBA],
            ImageChannels::RGBA => &[ImageChannels::RGBA],
            ImageChannels::BGRA => &[ImageChannels::BGRA],
            ImageChannels::D => &[ImageChannels::D],
        }
    }
}

/// Per-channel storage of an uncompressed format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMemoryType {
    Int8,
    UInt8,
    Norm8,
    UNorm8,
    SRGB8,
    Int16,
    UInt16,
    Norm16,
    UNorm16,
    Float16,
    Int32,
    UInt32,
    Float32,
    Int64,
    UInt64,
    Float64,
}

impl ImageMemoryType {
    /// Bytes taken by one channel
    pub fn channel_size(self) -> u32 {
        match self {
            ImageMemoryType::Int8
            | ImageMemoryType::UInt8
            | ImageMemoryType::Norm8
            | ImageMemoryType::UNorm8
            | ImageMemoryType::SRGB8 => 1,
            ImageMemoryType::Int16
            | ImageMemoryType::UInt16
            | ImageMemoryType::Norm16
            | ImageMemoryType::UNorm16
            | ImageMemoryType::Float16 => 2,
            ImageMemoryType::Int32 | ImageMemoryType::UInt32 | ImageMemoryType::Float32 => 4,
            ImageMemoryType::Int64 | ImageMemoryType::UInt64 | ImageMemoryType::Float64 => 8,
        }
    }

    /// This type followed by the types able to hold every value of it,
    /// narrowest first. sRGB has no lossless substitute.
    pub fn widenings(self) -> &'static [ImageMemoryType] {
        use ImageMemoryType::*;
        match self {
            Int8 => &[Int8, Int16, Int32, Int64, Float32, Float64],
            UInt8 => &[UInt8, UInt16, UInt32, UInt64, Float32, Float64],
            Norm8 => &[Norm8, Norm16, Float16, Float32, Float64],
            UNorm8 => &[UNorm8, UNorm16, Float16, Float32, Float64],
            SRGB8 => &[SRGB8],
            Int16 => &[Int16, Int32, Int64, Float32, Float64],
            UInt16 => &[UInt16, UInt32, UInt64, Float32, Float64],
            Norm16 => &[Norm16, Float32, Float64],
            UNorm16 => &[UNorm16, Float32, Float64],
            Float16 => &[Float16, Float32, Float64],
            Int32 => &[Int32, Int64, Float64],
            UInt32 => &[UInt32, UInt64, Float64],
            Float32 => &[Float32, Float64],
            Int64 => &[Int64],
            UInt64 => &[UInt64],
            Float64 => &[Float64],
        }
    }
}

use ImageChannels as C;
use ImageMemoryType as M;

pub(crate) const UNCOMPRESSED_FORMATS: &[(ImageFormat, ImageChannels, ImageMemoryType)] = &[
    (ImageFormat::R8_INT, C::R, M::Int8),
    (ImageFormat::R8_UINT, C::R, M::UInt8),
    (ImageFormat::R8_NORM, C::R, M::Norm8),
    (ImageFormat::R8_UNORM, C::R, M::UNorm8),
    (ImageFormat::R8_SRGB, C::R, M::SRGB8),
    (ImageFormat::R8G8_INT, C::RG, M::Int8),
    (ImageFormat::R8G8_UINT, C::RG, M::UInt8),
    (ImageFormat::R8G8_NORM, C::RG, M::Norm8),
    (ImageFormat::R8G8_UNORM, C::RG, M::UNorm8),
    (ImageFormat::R8G8_SRGB, C::RG, M::SRGB8),
    (ImageFormat::R8G8B8_INT, C::RGB, M::Int8),
    (ImageFormat::R8G8B8_UINT, C::RGB, M::UInt8),
    (ImageFormat::R8G8B8_NORM, C::RGB, M::Norm8),
    (ImageFormat::R8G8B8_UNORM, C::RGB, M::UNorm8),
    (ImageFormat::R8G8B8_SRGB, C::RGB, M::SRGB8),
    (ImageFormat::R8G8B8A8_INT, C::RGBA, M::Int8),
    (ImageFormat::R8G8B8A8_UINT, C::RGBA, M::UInt8),
    (ImageFormat::R8G8B8A8_NORM, C::RGBA, M::Norm8),
    (ImageFormat::R8G8B8A8_UNORM, C::RGBA, M::UNorm8),
    (ImageFormat::R8G8B8A8_SRGB, C::RGBA, M::SRGB8),
    (ImageFormat::B8G8R8A8_UNORM, C::BGRA, M::UNorm8),
    (ImageFormat::B8G8R8A8_SRGB, C::BGRA, M::SRGB8),
    (ImageFormat::R16_INT, C::R, M::Int16),
    (ImageFormat::R16_UINT, C::R, M::UInt16),
    (ImageFormat::R16_NORM, C::R, M::Norm16),
    (ImageFormat::R16_UNORM, C::R, M::UNorm16),
    (ImageFormat::R16_FLOAT, C::R, M::Float16),
    (ImageFormat::R16G16_INT, C::RG, M::Int16),
    (ImageFormat::R16G16_UINT, C::RG, M::UInt16),
    (ImageFormat::R16G16_NORM, C::RG, M::Norm16),
    (ImageFormat::R16G16_UNORM, C::RG, M::UNorm16),
    (ImageFormat::R16G16_FLOAT, C::RG, M::Float16),
    (ImageFormat::R16G16B16_INT, C::RGB, M::Int16),
    (ImageFormat::R16G16B16_UINT, C::RGB, M::UInt16),
    (ImageFormat::R16G16B16_NORM, C::RGB, M::Norm16),
    (ImageFormat::R16G16B16_UNORM, C::RGB, M::UNorm16),
    (ImageFormat::R16G16B16_FLOAT, C::RGB, M::Float16),
    (ImageFormat::R16G16B16A16_INT, C::RGBA, M::Int16),
    (ImageFormat::R16G16B16A16_UINT, C::RGBA, M::UInt16),
    (ImageFormat::R16G16B16A16_NORM, C::RGBA, M::Norm16),
    (ImageFormat::R16G16B16A16_UNORM, C::RGBA, M::UNorm16),
    (ImageFormat::R16G16B16A16_FLOAT, C::RGBA, M::Float16),
    (ImageFormat::R32_INT, C::R, M::Int32),
    (ImageFormat::R32_UINT, C::R, M::UInt32),
    (ImageFormat::R32_FLOAT, C::R, M::Float32),
    (ImageFormat::R32G32_INT, C::RG, M::Int32),
    (ImageFormat::R32G32_UINT, C::RG, M::UInt32),
    (ImageFormat::R32G32_FLOAT, C::RG, M::Float32),
    (ImageFormat::R32G32B32_INT, C::RGB, M::Int32),
    (ImageFormat::R32G32B32_UINT, C::RGB, M::UInt32),
    (ImageFormat::R32G32B32_FLOAT, C::RGB, M::Float32),
    (ImageFormat::R32G32B32A32_INT, C::RGBA, M::Int32),
    (ImageFormat::R32G32B32A32_UINT, C::RGBA, M::UInt32),
    (ImageFormat::R32G32B32A32_FLOAT, C::RGBA, M::Float32),
    (ImageFormat::R64_INT, C::R, M::Int64),
    (ImageFormat::R64_UINT, C::R, M::UInt64),
    (ImageFormat::R64_FLOAT, C::R, M::Float64),
    (ImageFormat::R64G64_INT, C::RG, M::Int64),
    (ImageFormat::R64G64_UINT, C::RG, M::UInt64),
    (ImageFormat::R64G64_FLOAT, C::RG, M::Float64),
    (ImageFormat::R64G64B64_INT, C::RGB, M::Int64),
    (ImageFormat::R64G64B64_UINT, C::RGB, M::UInt64),
    (ImageFormat::R64G64B64_FLOAT, C::RGB, M::Float64),
    (ImageFormat::R64G64B64A64_INT, C::RGBA, M::Int64),
    (ImageFormat::R64G64B64A64_UINT, C::RGBA, M::UInt64),
    (ImageFormat::R64G64B64A64_FLOAT, C::RGBA, M::Float64),
    (ImageFormat::D16_UNORM, C::D, M::UNorm16),
    (ImageFormat::D32_FLOAT, C::D, M::Float32),
];

impl ImageFormat {
    /// Channel layout and memory type, `None` for `Undefined` and compressed formats
    pub fn decompose(self) -> Option<(ImageChannels, ImageMemoryType)> {
        UNCOMPRESSED_FORMATS
            .iter()
            .find(|(format, _, _)| *format == self)
            .map(|&(_, channels, memory_type)| (channels, memory_type))
    }

    /// Inverse of [`ImageFormat::decompose`]
    pub fn compose(channels: ImageChannels, memory_type: ImageMemoryType) -> Option<ImageFormat> {
        UNCOMPRESSED_FORMATS
            .iter()
            .find(|(_, c, m)| *c == channels && *m == memory_type)
            .map(|&(format, _, _)| format)
    }

    pub fn is_compressed(self) -> bool {
        self.block_size() > 1
    }

    pub fn is_depth(self) -> bool {
        matches!(self, ImageFormat::D16_UNORM | ImageFormat::D32_FLOAT)
    }

    pub fn is_srgb(self) -> bool {
        matches!(
            self,
            ImageFormat::R8_SRGB
                | ImageFormat::R8G8_SRGB
                | ImageFormat::R8G8B8_SRGB
                | ImageFormat::R8G8B8A8_SRGB
                | ImageFormat::B8G8R8A8_SRGB
                | ImageFormat::BC1_RGB_SRGB
                | ImageFormat::BC1_RGBA_SRGB
                | ImageFormat::BC3_RGBA_SRGB
                | ImageFormat::BC7_RGB_SRGB
                | ImageFormat::BC7_RGBA_SRGB
                | ImageFormat::ASTC_4X4_SRGB
                | ImageFormat::ASTC_8X8_SRGB
        )
    }

    /// Number of color (or depth) channels, 0 for `Undefined`
    pub fn channel_count(self) -> u32 {
        if let Some((channels, _)) = self.decompose() {
            return channels.count();
        }
        match self {
            ImageFormat::Undefined => 0,
            ImageFormat::BC4_R_NORM | ImageFormat::BC4_R_UNORM => 1,
            ImageFormat::BC5_RG_NORM | ImageFormat::BC5_RG_UNORM => 2,
            ImageFormat::BC1_RGB_UNORM
            | ImageFormat::BC1_RGB_SRGB
            | ImageFormat::BC6H_RGB_FLOAT
            | ImageFormat::BC6H_RGB_UFLOAT
            | ImageFormat::BC7_RGB_UNORM
            | ImageFormat::BC7_RGB_SRGB => 3,
            _ => 4,
        }
    }

    /// Edge length in pixels of one compression block (1 for uncompressed formats)
    pub fn block_size(self) -> u32 {
        match self {
            ImageFormat::BC1_RGB_UNORM
            | ImageFormat::BC1_RGB_SRGB
            | ImageFormat::BC1_RGBA_UNORM
            | ImageFormat::BC1_RGBA_SRGB
            | ImageFormat::BC3_RGBA_UNORM
            | ImageFormat::BC3_RGBA_SRGB
            | ImageFormat::BC4_R_NORM
            | ImageFormat::BC4_R_UNORM
            | ImageFormat::BC5_RG_NORM
            | ImageFormat::BC5_RG_UNORM
            | ImageFormat::BC6H_RGB_FLOAT
            | ImageFormat::BC6H_RGB_UFLOAT
            | ImageFormat::BC7_RGB_UNORM
            | ImageFormat::BC7_RGB_SRGB
            | ImageFormat::BC7_RGBA_UNORM
            | ImageFormat::BC7_RGBA_SRGB
            | ImageFormat::ASTC_4X4_UNORM
            | ImageFormat::ASTC_4X4_SRGB => 4,
            ImageFormat::ASTC_8X8_UNORM | ImageFormat::ASTC_8X8_SRGB => 8,
            _ => 1,
        }
    }

    /// Bytes per pixel for uncompressed formats, bytes per block otherwise.
    /// 0 for `Undefined`.
    pub fn block_memory_size(self) -> u32 {
        if let Some((channels, memory_type)) = self.decompose() {
            return channels.count() * memory_type.channel_size();
        }
        match self {
            ImageFormat::Undefined => 0,
            ImageFormat::BC1_RGB_UNORM
            | ImageFormat::BC1_RGB_SRGB
            | ImageFormat::BC1_RGBA_UNORM
            | ImageFormat::BC1_RGBA_SRGB
            | ImageFormat::BC4_R_NORM
            | ImageFormat::BC4_R_UNORM => 8,
            _ => 16,
        }
    }

    /// Bytes needed by a `width` x `height` x `depth` region (rounded up to whole blocks)
    pub fn memory_size(self, width: u32, height: u32, depth: u32) -> u64 {
        let block = self.block_size();
        let blocks_x = width.div_ceil(block) as u64;
        let blocks_y = height.div_ceil(block) as u64;
        blocks_x * blocks_y * depth as u64 * self.block_memory_size() as u64
    }

    /// Formats to try, in order, when `self` is requested for `usage`.
    ///
    /// Channel layouts are the outer loop (the requested one, then supersets),
    /// memory types the inner one (the requested one, then widenings). When the
    /// usage moves raw bytes in or out of the image (copies, storage), only
    /// candidates with the same per-channel size are kept. Compressed formats
    /// only yield themselves; `Undefined` yields nothing.
    pub fn fallback_candidates(self, usage: ImageUsage) -> Vec<ImageFormat> {
        let Some((channels, memory_type)) = self.decompose() else {
            return match self {
                ImageFormat::Undefined => Vec::new(),
                _ => vec![self],
            };
        };

        let raw_access = usage.intersects(
            ImageUsage::SOURCE_MEMORY | ImageUsage::DESTINATION_MEMORY | ImageUsage::STORAGE,
        );

        let mut candidates = Vec::new();
        for &candidate_channels in channels.supersets() {
            for &candidate_memory in memory_type.widenings() {
                if raw_access && candidate_memory.channel_size() != memory_type.channel_size() {
                    continue;
                }
                if let Some(format) = ImageFormat::compose(candidate_channels, candidate_memory) {
                    candidates.push(format);
                }
            }
        }
        candidates
    }
}

#[cfg(test)]
#[path = "image_format_tests.rs"]
mod tests;
