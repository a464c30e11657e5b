/// Image trait, image descriptor and the enums describing an image

use bitflags::bitflags;
use crate::error::Result;
use crate::rhi::image_format::ImageFormat;
use crate::rhi::rendering_resource::{validate_name, RenderingResource};
use crate::ridge_ensure;

bitflags! {
    /// How an image may be used on the GPU
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const SOURCE_MEMORY = 0x001;
        const DESTINATION_MEMORY = 0x002;
        const STORAGE = 0x004;
        const SAMPLE = 0x008;
        /// Linear filtering when sampled (requires `SAMPLE`)
        const FILTER = 0x010;
        const COLOR_ATTACHMENT = 0x020;
        const DEPTH_ATTACHMENT = 0x040;
        const INPUT_ATTACHMENT = 0x080;
        const RESOLVER_ATTACHMENT = 0x100;
        /// Contents never leave tile memory
        const TRANSIENT_ATTACHMENT = 0x200;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Line,
    Plane,
    Volume,
    Cube,
}

/// Samples per pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageSampling {
    X1,
    X2,
    X4,
    X8,
    X16,
    X32,
    X64,
}

impl ImageSampling {
    /// Every sampling value, highest first
    pub const DESCENDING: [ImageSampling; 7] = [
        ImageSampling::X64,
        ImageSampling::X32,
        ImageSampling::X16,
        ImageSampling::X8,
        ImageSampling::X4,
        ImageSampling::X2,
        ImageSampling::X1,
    ];

    pub fn sample_count(self) -> u32 {
        match self {
            ImageSampling::X1 => 1,
            ImageSampling::X2 => 2,
            ImageSampling::X4 => 4,
            ImageSampling::X8 => 8,
            ImageSampling::X16 => 16,
            ImageSampling::X32 => 32,
            ImageSampling::X64 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMemoryLocation {
    Cpu,
    Gpu,
}

/// Descriptor for creating an image
#[derive(Debug, Clone)]
pub struct ImageDesc<'a> {
    pub name: &'a str,
    pub width: u32,
    pub height: u32,
    /// Only meaningful for `ImageType::Volume`
    pub depth: u32,
    pub image_type: ImageType,
    pub format: ImageFormat,
    pub level_count: u32,
    pub layer_count: u32,
    pub sampling: ImageSampling,
    pub usage: ImageUsage,
    pub memory_location: ImageMemoryLocation,
}

impl Default for ImageDesc<'_> {
    fn default() -> Self {
        Self {
            name: "",
            width: 1,
            height: 1,
            depth: 1,
            image_type: ImageType::Plane,
            format: ImageFormat::Undefined,
            level_count: 1,
            layer_count: 1,
            sampling: ImageSampling::X1,
            usage: ImageUsage::empty(),
            memory_location: ImageMemoryLocation::Gpu,
        }
    }
}

/// Length of the full mip chain of an image of the given extent
pub fn max_level_count(width: u32, height: u32, depth: u32) -> u32 {
    let largest = width.max(height).max(depth).max(1);
    32 - largest.leading_zeros()
}

impl ImageDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        const SOURCE: &str = "ridge::rhi::Image";
        validate_name("Image", self.name)?;

        ridge_ensure!(
            self.width > 0 && self.height > 0 && self.depth > 0,
            SOURCE,
            InvalidValue,
            "Image '{}' has a zero dimension ({}x{}x{})",
            self.name,
            self.width,
            self.height,
            self.depth
        );
        ridge_ensure!(
            self.format != ImageFormat::Undefined,
            SOURCE,
            InvalidValue,
            "Image '{}' must not use ImageFormat::Undefined",
            self.name
        );
        let block = self.format.block_size();
        ridge_ensure!(
            self.width % block == 0 && self.height % block == 0,
            SOURCE,
            InvalidValue,
            "Dimensions {}x{} of image '{}' must be divisible by the {} block size of {:?}",
            self.width,
            self.height,
            self.name,
            block,
            self.format
        );
        ridge_ensure!(
            self.level_count > 0,
            SOURCE,
            InvalidValue,
            "Image '{}' must have at least one level",
            self.name
        );
        let max_levels = max_level_count(self.width, self.height, self.depth);
        ridge_ensure!(
            self.level_count <= max_levels,
            SOURCE,
            ValueOutOfRange,
            "Image '{}' requests {} levels but its extent only allows {}",
            self.name,
            self.level_count,
            max_levels
        );
        ridge_ensure!(
            self.layer_count > 0,
            SOURCE,
            InvalidValue,
            "Image '{}' must have at least one layer",
            self.name
        );

        match self.image_type {
            ImageType::Volume => {
                ridge_ensure!(
                    self.layer_count == 1,
                    SOURCE,
                    InvalidValue,
                    "Volume image '{}' must have exactly one layer",
                    self.name
                );
            }
            ImageType::Cube => {
                ridge_ensure!(
                    self.width == self.height,
                    SOURCE,
                    InvalidValue,
                    "Cube image '{}' must be square, got {}x{}",
                    self.name,
                    self.width,
                    self.height
                );
                ridge_ensure!(
                    self.layer_count % 6 == 0,
                    SOURCE,
                    InvalidValue,
                    "Layer count {} of cube image '{}' must be divisible by 6",
                    self.layer_count,
                    self.name
                );
            }
            ImageType::Line | ImageType::Plane => {}
        }

        ridge_ensure!(
            !self.usage.is_empty(),
            SOURCE,
            InvalidValue,
            "Image '{}' must have at least one usage",
            self.name
        );
        ridge_ensure!(
            !self.usage.contains(ImageUsage::COLOR_ATTACHMENT | ImageUsage::DEPTH_ATTACHMENT),
            SOURCE,
            InvalidConfiguration,
            "Image '{}' cannot be both a color and a depth attachment",
            self.name
        );
        ridge_ensure!(
            !self.usage.contains(ImageUsage::FILTER) || self.usage.contains(ImageUsage::SAMPLE),
            SOURCE,
            InvalidConfiguration,
            "Image '{}' uses FILTER without SAMPLE",
            self.name
        );
        ridge_ensure!(
            !self.usage.contains(ImageUsage::RESOLVER_ATTACHMENT) || self.sampling != ImageSampling::X1,
            SOURCE,
            InvalidConfiguration,
            "Resolver image '{}' must be created with a sampling other than X1",
            self.name
        );
        ridge_ensure!(
            self.image_type == ImageType::Plane || self.sampling == ImageSampling::X1,
            SOURCE,
            InvalidConfiguration,
            "Image '{}' of type {:?} must use X1 sampling",
            self.name,
            self.image_type
        );
        Ok(())
    }
}

/// Image resource trait
pub trait Image: RenderingResource {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn depth(&self) -> u32;

    fn image_type(&self) -> ImageType;

    fn format(&self) -> ImageFormat;

    fn level_count(&self) -> u32;

    fn layer_count(&self) -> u32;

    fn sampling(&self) -> ImageSampling;

    fn usage(&self) -> ImageUsage;

    fn memory_location(&self) -> ImageMemoryLocation;

    /// Width of mip `level` (never below 1)
    fn level_width(&self, level: u32) -> u32 {
        (self.width() >> level).max(1)
    }

    /// Height of mip `level` (never below 1)
    fn level_height(&self, level: u32) -> u32 {
        (self.height() >> level).max(1)
    }

    /// Bytes taken by one layer of mip `level`
    fn level_memory_size(&self, level: u32) -> u64 {
        let depth = (self.depth() >> level).max(1);
        self.format()
            .memory_size(self.level_width(level), self.level_height(level), depth)
    }
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
