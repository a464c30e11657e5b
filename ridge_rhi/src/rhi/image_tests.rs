//! Unit tests for image.rs

use crate::error::Error;
use crate::rhi::image::{max_level_count, ImageDesc, ImageSampling, ImageType, ImageUsage};
use crate::rhi::image_format::ImageFormat;
use crate::rhi::device::Device;
use crate::rhi::mock_backend::MockDevice;

fn texture_desc(name: &str) -> ImageDesc<'_> {
    ImageDesc {
        name,
        width: 64,
        height: 32,
        format: ImageFormat::R8G8B8A8_UNORM,
        usage: ImageUsage::SAMPLE | ImageUsage::DESTINATION_MEMORY,
        ..Default::default()
    }
}

// ============================================================================
// DESCRIPTOR VALIDATION
// ============================================================================

#[test]
fn test_valid_texture() {
    assert!(texture_desc("albedo").validate().is_ok());
}

#[test]
fn test_zero_dimension_rejected() {
    let desc = ImageDesc { width: 0, ..texture_desc("flat") };
    assert!(matches!(desc.validate(), Err(Error::InvalidValue(_))));
}

#[test]
fn test_undefined_format_rejected() {
    let desc = ImageDesc { format: ImageFormat::Undefined, ..texture_desc("nothing") };
    assert!(matches!(desc.validate(), Err(Error::InvalidValue(_))));
}

#[test]
fn test_compressed_dimensions_must_match_blocks() {
    let ok = ImageDesc { format: ImageFormat::BC7_RGBA_UNORM, ..texture_desc("bc7") };
    assert!(ok.validate().is_ok());

    let bad = ImageDesc { width: 30, format: ImageFormat::BC7_RGBA_UNORM, ..texture_desc("bc7") };
    assert!(matches!(bad.validate(), Err(Error::InvalidValue(_))));

    let astc = ImageDesc { width: 60, format: ImageFormat::ASTC_8X8_SRGB, ..texture_desc("astc") };
    assert!(matches!(astc.validate(), Err(Error::InvalidValue(_))));
}

#[test]
fn test_level_count_bounds() {
    let none = ImageDesc { level_count: 0, ..texture_desc("mips") };
    assert!(matches!(none.validate(), Err(Error::InvalidValue(_))));

    // 64x32 has 7 levels: 64, 32, 16, 8, 4, 2, 1
    let full = ImageDesc { level_count: 7, ..texture_desc("mips") };
    assert!(full.validate().is_ok());

    let too_many = ImageDesc { level_count: 8, ..texture_desc("mips") };
    assert!(matches!(too_many.validate(), Err(Error::ValueOutOfRange(_))));
}

#[test]
fn test_zero_layers_rejected() {
    let desc = ImageDesc { layer_count: 0, ..texture_desc("layers") };
    assert!(matches!(desc.validate(), Err(Error::InvalidValue(_))));
}

#[test]
fn test_volume_requires_single_layer() {
    let desc = ImageDesc {
        image_type: ImageType::Volume,
        depth: 16,
        layer_count: 2,
        ..texture_desc("volume")
    };
    assert!(matches!(desc.validate(), Err(Error::InvalidValue(_))));
}

#[test]
fn test_cube_must_be_square() {
    let desc = ImageDesc { image_type: ImageType::Cube, layer_count: 6, ..texture_desc("sky") };
    assert!(desc.validate().is_err());
}

#[test]
fn test_cube_layers_divisible_by_six() {
    let square = ImageDesc { width: 32, image_type: ImageType::Cube, ..texture_desc("sky") };
    assert!(ImageDesc { layer_count: 12, ..square.clone() }.validate().is_ok());
    assert!(ImageDesc { layer_count: 8, ..square }.validate().is_err());
}

#[test]
fn test_multisampling_restricted_to_plane() {
    let line = ImageDesc {
        height: 1,
        image_type: ImageType::Line,
        sampling: ImageSampling::X4,
        usage: ImageUsage::COLOR_ATTACHMENT,
        ..texture_desc("line")
    };
    assert!(matches!(line.validate(), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_empty_usage_rejected() {
    let desc = ImageDesc { usage: ImageUsage::empty(), ..texture_desc("unused") };
    assert!(matches!(desc.validate(), Err(Error::InvalidValue(_))));
}

#[test]
fn test_color_and_depth_are_exclusive() {
    let desc = ImageDesc {
        usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::DEPTH_ATTACHMENT,
        ..texture_desc("target")
    };
    assert!(matches!(desc.validate(), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_filter_requires_sample() {
    let desc = ImageDesc { usage: ImageUsage::FILTER, ..texture_desc("filtered") };
    assert!(matches!(desc.validate(), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_resolver_requires_multisampling() {
    let desc = ImageDesc { usage: ImageUsage::RESOLVER_ATTACHMENT, ..texture_desc("resolve") };
    assert!(matches!(desc.validate(), Err(Error::InvalidConfiguration(_))));

    let msaa = ImageDesc {
        sampling: ImageSampling::X4,
        usage: ImageUsage::RESOLVER_ATTACHMENT,
        ..texture_desc("resolve")
    };
    assert!(msaa.validate().is_ok());
}

// ============================================================================
// LEVEL GEOMETRY
// ============================================================================

#[test]
fn test_max_level_count() {
    assert_eq!(max_level_count(1, 1, 1), 1);
    assert_eq!(max_level_count(256, 256, 1), 9);
    assert_eq!(max_level_count(300, 20, 1), 9);
    assert_eq!(max_level_count(4, 4, 64), 7);
}

#[test]
fn test_level_sizes() {
    let device = MockDevice::new();
    let image = device
        .create_image(&ImageDesc { level_count: 7, ..texture_desc("mips") })
        .unwrap();

    assert_eq!(image.level_width(0), 64);
    assert_eq!(image.level_height(0), 32);
    assert_eq!(image.level_width(3), 8);
    assert_eq!(image.level_height(3), 4);
    assert_eq!(image.level_height(6), 1);
    assert_eq!(image.level_memory_size(0), 64 * 32 * 4);
    assert_eq!(image.level_memory_size(6), 4);
}

#[test]
fn test_compressed_level_memory_rounds_to_blocks() {
    let device = MockDevice::new();
    let image = device
        .create_image(&ImageDesc {
            width: 16,
            height: 16,
            level_count: 5,
            format: ImageFormat::BC1_RGBA_UNORM,
            ..texture_desc("bc1")
        })
        .unwrap();

    assert_eq!(image.level_memory_size(0), 4 * 4 * 8);
    // 2x2 and 1x1 levels still take one whole block
    assert_eq!(image.level_memory_size(3), 8);
    assert_eq!(image.level_memory_size(4), 8);
}

#[test]
fn test_unsupported_format_rejected_by_device() {
    let device = MockDevice::new().with_supported_formats(&[ImageFormat::R8_UNORM]);
    let result = device.create_image(&texture_desc("rgba"));
    assert!(matches!(result, Err(Error::UnsupportedFeature(_))));
}
