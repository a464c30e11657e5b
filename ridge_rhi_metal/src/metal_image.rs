/// Image - Metal implementation of the Image trait

use objc2::runtime::ProtocolObject;
use objc2_metal::{MTLDevice, MTLResource, MTLStorageMode, MTLTexture, MTLTextureDescriptor};
use ridge_rhi::ridge::rhi::{
    Image, ImageDesc, ImageFormat, ImageMemoryLocation, ImageSampling, ImageType, ImageUsage,
};
use ridge_rhi::ridge::Result;
use ridge_rhi::ridge_err;
use std::sync::Arc;

use crate::metal_context::{label, nil_error, MetalContext};
use crate::metal_format::{pixel_format, texture_type, texture_usage};
use crate::metal_handle::MetalHandle;
use crate::metal_layout::SOURCE;

pub(crate) type NativeTexture = ProtocolObject<dyn MTLTexture>;

/// Storage of an image: transient attachments stay in tile memory on Apple
/// GPUs, CPU images are host visible, everything else is private
fn storage_mode(ctx: &MetalContext, desc: &ImageDesc) -> MTLStorageMode {
    if desc.usage.contains(ImageUsage::TRANSIENT_ATTACHMENT) && ctx.capabilities.apple_gpu {
        return MTLStorageMode::Memoryless;
    }
    match desc.memory_location {
        ImageMemoryLocation::Cpu if ctx.unified_memory => MTLStorageMode::Shared,
        ImageMemoryLocation::Cpu => MTLStorageMode::Managed,
        ImageMemoryLocation::Gpu => MTLStorageMode::Private,
    }
}

/// Metal image implementation
pub struct MetalImage {
    _ctx: Arc<MetalContext>,
    name: String,
    pub(crate) texture: MetalHandle<NativeTexture>,
    width: u32,
    height: u32,
    depth: u32,
    image_type: ImageType,
    format: ImageFormat,
    level_count: u32,
    layer_count: u32,
    sampling: ImageSampling,
    usage: ImageUsage,
    memory_location: ImageMemoryLocation,
}

impl MetalImage {
    /// `desc` is already validated and its format known to be supported
    pub(crate) fn new(ctx: Arc<MetalContext>, desc: &ImageDesc) -> Result<Self> {
        let format = pixel_format(desc.format).ok_or_else(|| {
            ridge_err!(SOURCE, UnsupportedFeature, "Format {:?} of image '{}' has no Metal equivalent", desc.format, desc.name)
        })?;
        let multisampled = desc.sampling != ImageSampling::X1;
        // Cube textures count whole cubes, not faces
        let array_length = match desc.image_type {
            ImageType::Cube => desc.layer_count / 6,
            _ => desc.layer_count,
        };

        let descriptor = unsafe { MTLTextureDescriptor::new() };
        unsafe {
            descriptor.setTextureType(texture_type(desc.image_type, desc.layer_count, multisampled));
            descriptor.setPixelFormat(format);
            descriptor.setWidth(desc.width as usize);
            descriptor.setHeight(desc.height as usize);
            descriptor.setDepth(desc.depth as usize);
            descriptor.setMipmapLevelCount(desc.level_count as usize);
            descriptor.setArrayLength(array_length.max(1) as usize);
            descriptor.setSampleCount(desc.sampling.sample_count() as usize);
            descriptor.setUsage(texture_usage(desc.usage));
            descriptor.setStorageMode(storage_mode(&ctx, desc));
        }

        let texture = unsafe { ctx.device.newTextureWithDescriptor(&descriptor) }
            .ok_or_else(|| nil_error(format_args!("create image '{}'", desc.name)))?;
        unsafe { texture.setLabel(Some(&label(desc.name))) };

        Ok(Self {
            _ctx: ctx,
            name: desc.name.to_string(),
            texture: MetalHandle::new(texture),
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            image_type: desc.image_type,
            format: desc.format,
            level_count: desc.level_count,
            layer_count: desc.layer_count,
            sampling: desc.sampling,
            usage: desc.usage,
            memory_location: desc.memory_location,
        })
    }
}

crate::metal_resource!(MetalImage);

impl Image for MetalImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn depth(&self) -> u32 {
        self.depth
    }

    fn image_type(&self) -> ImageType {
        self.image_type
    }

    fn format(&self) -> ImageFormat {
        self.format
    }

    fn level_count(&self) -> u32 {
        self.level_count
    }

    fn layer_count(&self) -> u32 {
        self.layer_count
    }

    fn sampling(&self) -> ImageSampling {
        self.sampling
    }

    fn usage(&self) -> ImageUsage {
        self.usage
    }

    fn memory_location(&self) -> ImageMemoryLocation {
        self.memory_location
    }
}
