/// Sampler trait and sampler descriptor

use crate::error::Result;
use crate::rhi::rendering_resource::{validate_name, RenderingResource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerFilter {
    Nearest,
    #[default]
    Linear,
}

/// What happens to coordinates outside `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerAddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Maximum anisotropic filtering ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SamplerAnisotropy {
    #[default]
    X1,
    X2,
    X4,
    X8,
    X16,
    X32,
    X64,
}

impl SamplerAnisotropy {
    /// Every anisotropy value, highest first
    pub const DESCENDING: [SamplerAnisotropy; 7] = [
        SamplerAnisotropy::X64,
        SamplerAnisotropy::X32,
        SamplerAnisotropy::X16,
        SamplerAnisotropy::X8,
        SamplerAnisotropy::X4,
        SamplerAnisotropy::X2,
        SamplerAnisotropy::X1,
    ];

    pub fn ratio(self) -> f32 {
        match self {
            SamplerAnisotropy::X1 => 1.0,
            SamplerAnisotropy::X2 => 2.0,
            SamplerAnisotropy::X4 => 4.0,
            SamplerAnisotropy::X8 => 8.0,
            SamplerAnisotropy::X16 => 16.0,
            SamplerAnisotropy::X32 => 32.0,
            SamplerAnisotropy::X64 => 64.0,
        }
    }
}

/// Depth comparison, `None` disables comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerCompareOperation {
    #[default]
    None,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerBorderColor {
    #[default]
    Transparent,
    White,
    Black,
}

/// Descriptor for creating a sampler
#[derive(Debug, Clone, Default)]
pub struct SamplerDesc<'a> {
    pub name: &'a str,
    pub filter: SamplerFilter,
    pub address_mode: SamplerAddressMode,
    pub anisotropy: SamplerAnisotropy,
    pub compare_operation: SamplerCompareOperation,
    pub border_color: SamplerBorderColor,
}

impl SamplerDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        validate_name("Sampler", self.name)
    }
}

/// Sampler resource trait
pub trait Sampler: RenderingResource {}
