//! Unit tests for command_buffer.rs (state machine, synchronization, copies)

use std::sync::Arc;
use glam::{UVec3, Vec4};
use crate::error::Error;
use crate::rhi::*;
use crate::rhi::mock_backend::{
    as_mock_buffer, as_mock_image, buffer_desc, encoded_commands, graphics_queue, recording_command_buffer,
    spirv_bundle, MockCommandBuffer, MockDevice,
};

fn cpu_buffer(device: &MockDevice, name: &str, size: u64, usage: BufferUsage) -> Box<dyn Buffer> {
    device
        .create_buffer(&buffer_desc(name, size, usage, BufferMemoryLocation::Cpu))
        .unwrap()
}

fn color_target(device: &MockDevice, name: &str) -> Box<dyn Image> {
    device
        .create_image(&ImageDesc {
            name,
            width: 64,
            height: 64,
            format: ImageFormat::R8G8B8A8_UNORM,
            usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::DESTINATION_MEMORY,
            ..Default::default()
        })
        .unwrap()
}

/// Render pass with one color attachment and `subpass_count` subpasses
fn render_pass(device: &MockDevice, target: &dyn Image, subpass_count: usize) -> Box<dyn RenderPass> {
    let attachments = [RenderPassAttachment {
        template_output_image: target,
        template_resolver_image: None,
        attachment_type: AttachmentType::Color,
        load_operation: AttachmentLoadOperation::Clear,
        store_operation: AttachmentStoreOperation::Store,
    }];
    let subpasses = vec![SubpassDesc { render_targets: &[0], inputs: &[] }; subpass_count];
    device
        .create_render_pass(&RenderPassDesc {
            name: "pass",
            attachments: &attachments,
            subpass_descs: &subpasses,
        })
        .unwrap()
}

fn graphics_pipeline(device: &MockDevice, render_pass: &dyn RenderPass, push_constant_size: u32) -> Box<dyn GraphicsPipeline> {
    let bundle = spirv_bundle();
    let vertex = device
        .create_shader(&ShaderDesc { name: "vs", bundle: &bundle, shader_type: ShaderType::Vertex })
        .unwrap();
    let fragment = device
        .create_shader(&ShaderDesc { name: "fs", bundle: &bundle, shader_type: ShaderType::Fragment })
        .unwrap();
    device
        .create_graphics_pipeline(&GraphicsPipelineDesc {
            name: "opaque",
            vertex_inputs: &[VertexInput::POSITION_3D, VertexInput::UV],
            vertex_shader: vertex.as_ref(),
            fragment_shader: Some(fragment.as_ref()),
            template_render_pass: render_pass,
            subpass_index: 0,
            sampling: ImageSampling::X1,
            shade_mode: ShadeMode::Fill,
            cull_mode: CullMode::Back,
            front_face_mode: FrontFaceMode::CounterClockwise,
            push_constant_size,
        })
        .unwrap()
}

fn compute_pipeline(device: &MockDevice, push_constant_size: u32) -> Box<dyn ComputePipeline> {
    let bundle = spirv_bundle();
    let shader = device
        .create_shader(&ShaderDesc { name: "cs", bundle: &bundle, shader_type: ShaderType::Compute })
        .unwrap();
    device
        .create_compute_pipeline(&ComputePipelineDesc {
            name: "cull",
            compute_shader: shader.as_ref(),
            push_constant_size,
        })
        .unwrap()
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_state_transitions() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let mut cb = queue.create_command_buffer(&CommandBufferDesc { name: "frame" }).unwrap();

    assert_eq!(cb.state(), CommandBufferState::Initial);
    assert_eq!(cb.completion_signal_value(), 0);
    cb.begin().unwrap();
    assert_eq!(cb.state(), CommandBufferState::Recording);
    cb.end().unwrap();
    assert_eq!(cb.state(), CommandBufferState::Executable);
    queue.submit_command_buffer(cb.as_mut(), &[]).unwrap();
    assert_eq!(cb.state(), CommandBufferState::Submitted);
    assert!(cb.completion_signal_value() > 0);
    queue.wait_for_command_buffer(cb.as_mut()).unwrap();
    assert_eq!(cb.state(), CommandBufferState::Completed);

    cb.begin().unwrap();
    assert_eq!(cb.state(), CommandBufferState::Recording);
}

#[test]
fn test_begin_twice_rejected() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let mut cb = recording_command_buffer(&queue, "frame");
    assert!(matches!(cb.begin(), Err(Error::InvalidOperation(_))));
}

#[test]
fn test_end_without_begin_rejected() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let mut cb = queue.create_command_buffer(&CommandBufferDesc { name: "frame" }).unwrap();
    assert!(matches!(cb.end(), Err(Error::InvalidOperation(_))));
}

#[test]
fn test_submit_requires_end() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let mut cb = recording_command_buffer(&queue, "frame");
    assert!(matches!(
        queue.submit_command_buffer(cb.as_mut(), &[]),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn test_recording_rejected_outside_recording_state() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let buffer = cpu_buffer(&device, "b", 16, BufferUsage::SOURCE_MEMORY | BufferUsage::DESTINATION_MEMORY);
    let mut cb = queue.create_command_buffer(&CommandBufferDesc { name: "idle" }).unwrap();

    let result = cb.synchronize_buffer_usage(
        buffer.as_ref(),
        BufferCommandUsage::None,
        BufferCommandUsage::MemoryWrite,
        0,
        0,
    );
    assert!(matches!(result, Err(Error::InvalidOperation(_))));
}

#[test]
fn test_begin_while_in_flight_rejected() {
    let device = MockDevice::new().with_deferred_completion();
    let queue = graphics_queue(&device);
    let mut cb = recording_command_buffer(&queue, "frame");
    cb.end().unwrap();
    queue.submit_command_buffer(cb.as_mut(), &[]).unwrap();

    assert!(matches!(cb.begin(), Err(Error::InvalidOperation(_))));

    queue.complete_all();
    cb.begin().unwrap();
    assert_eq!(cb.state(), CommandBufferState::Recording);
}

#[test]
fn test_wait_on_never_submitted_returns_immediately() {
    let device = MockDevice::new().with_deferred_completion();
    let queue = graphics_queue(&device);
    let mut cb = queue.create_command_buffer(&CommandBufferDesc { name: "never" }).unwrap();
    assert!(queue.wait_for_command_buffer(cb.as_mut()).is_ok());
    assert_eq!(cb.state(), CommandBufferState::Initial);
}

#[test]
fn test_signal_values_increase() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let mut first = recording_command_buffer(&queue, "first");
    let mut second = recording_command_buffer(&queue, "second");
    first.end().unwrap();
    second.end().unwrap();
    queue.submit_command_buffer(first.as_mut(), &[]).unwrap();
    queue.submit_command_buffer(second.as_mut(), &[]).unwrap();
    assert!(second.completion_signal_value() > first.completion_signal_value());
}

#[test]
fn test_end_with_open_scopes_rejected() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let target = color_target(&device, "target");
    let pass = render_pass(&device, target.as_ref(), 1);

    let mut cb = recording_command_buffer(&queue, "frame");
    cb.begin_render_pass(pass.as_ref(), &[RenderPassBeginAttachment::new(target.as_ref())])
        .unwrap();
    assert!(matches!(cb.end(), Err(Error::InvalidOperation(_))));

    let mut cb = recording_command_buffer(&queue, "regions");
    cb.begin_debug_region("shadows", Vec4::ONE).unwrap();
    assert!(matches!(cb.end(), Err(Error::InvalidOperation(_))));
    cb.end_debug_region().unwrap();
    cb.end().unwrap();
}

// ============================================================================
// USAGE SYNCHRONIZATION
// ============================================================================

#[test]
fn test_identical_usage_is_a_no_op() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let buffer = cpu_buffer(&device, "b", 64, BufferUsage::STORAGE);
    let image = color_target(&device, "target");
    let mut cb = recording_command_buffer(&queue, "frame");

    cb.synchronize_buffer_usage(
        buffer.as_ref(),
        BufferCommandUsage::ComputeWrite,
        BufferCommandUsage::ComputeWrite,
        0,
        0,
    )
    .unwrap();
    cb.synchronize_image_usage(image.as_ref(), ImageCommandUsage::ColorWrite, ImageCommandUsage::ColorWrite, 0, 0, 0, 0)
        .unwrap();
    assert!(encoded_commands(cb.as_mut()).is_empty());
}

#[test]
fn test_transition_recorded_with_resolved_range() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let buffer = cpu_buffer(&device, "b", 64, BufferUsage::STORAGE);
    let mut cb = recording_command_buffer(&queue, "frame");

    cb.synchronize_buffer_usage(
        buffer.as_ref(),
        BufferCommandUsage::ComputeWrite,
        BufferCommandUsage::GraphicsRead,
        16,
        0,
    )
    .unwrap();
    assert_eq!(
        encoded_commands(cb.as_mut()),
        vec!["barrier buffer 'b' [16, +48) ComputeWrite -> GraphicsRead".to_string()]
    );
}

#[test]
fn test_transition_to_none_rejected() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let buffer = cpu_buffer(&device, "b", 64, BufferUsage::STORAGE);
    let mut cb = recording_command_buffer(&queue, "frame");

    let result = cb.synchronize_buffer_usage(
        buffer.as_ref(),
        BufferCommandUsage::MemoryRead,
        BufferCommandUsage::None,
        0,
        0,
    );
    assert!(matches!(result, Err(Error::InvalidValue(_))));
}

#[test]
fn test_buffer_transition_out_of_range() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let buffer = cpu_buffer(&device, "b", 64, BufferUsage::STORAGE);
    let mut cb = recording_command_buffer(&queue, "frame");

    let result = cb.synchronize_buffer_usage(
        buffer.as_ref(),
        BufferCommandUsage::None,
        BufferCommandUsage::ComputeRead,
        32,
        64,
    );
    assert!(matches!(result, Err(Error::InvalidRange(_))));
}

#[test]
fn test_buffer_transition_at_end_of_buffer_rejected() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let buffer = cpu_buffer(&device, "b", 16, BufferUsage::STORAGE);
    let mut cb = recording_command_buffer(&queue, "frame");

    // A whole-remainder range starting at the end would be empty
    let result = cb.synchronize_buffer_usage(
        buffer.as_ref(),
        BufferCommandUsage::None,
        BufferCommandUsage::MemoryRead,
        16,
        0,
    );
    assert!(matches!(result, Err(Error::ValueOutOfRange(_))));
    assert!(encoded_commands(cb.as_mut()).is_empty());

    cb.synchronize_buffer_usage(
        buffer.as_ref(),
        BufferCommandUsage::None,
        BufferCommandUsage::MemoryRead,
        15,
        0,
    )
    .unwrap();
    assert_eq!(
        encoded_commands(cb.as_mut()),
        vec!["barrier buffer 'b' [15, +1) None -> MemoryRead".to_string()]
    );
}

#[test]
fn test_image_subresource_defaults() {
    let device = MockDevice::new();
    let image = device
        .create_image(&ImageDesc {
            name: "array",
            width: 32,
            height: 32,
            format: ImageFormat::R8G8B8A8_UNORM,
            level_count: 6,
            layer_count: 4,
            usage: ImageUsage::SAMPLE,
            ..Default::default()
        })
        .unwrap();

    let range = resolve_subresource_range(image.as_ref(), 2, 0, 1, 0).unwrap();
    assert_eq!(
        range,
        ImageSubresourceRange { base_level: 2, level_count: 4, base_layer: 1, layer_count: 3 }
    );
    assert!(matches!(
        resolve_subresource_range(image.as_ref(), 6, 0, 0, 0),
        Err(Error::ValueOutOfRange(_))
    ));
    assert!(matches!(
        resolve_subresource_range(image.as_ref(), 0, 7, 0, 0),
        Err(Error::InvalidRange(_))
    ));
}

// ============================================================================
// COPIES
// ============================================================================

#[test]
fn test_buffer_copy_runs_at_submit() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let source = cpu_buffer(&device, "source", 8, BufferUsage::SOURCE_MEMORY);
    let destination = device
        .create_buffer(&buffer_desc("destination", 8, BufferUsage::DESTINATION_MEMORY, BufferMemoryLocation::Gpu))
        .unwrap();
    source.copy_from_memory(&[1, 2, 3, 4, 5, 6, 7, 8], 0).unwrap();

    let mut cb = recording_command_buffer(&queue, "copy");
    cb.copy_buffer_to_buffer(source.as_ref(), destination.as_ref(), 4, 2, 4).unwrap();
    cb.end().unwrap();
    assert_eq!(as_mock_buffer(destination.as_ref()).contents(), vec![0; 8]);

    queue.submit_command_buffer(cb.as_mut(), &[]).unwrap();
    assert_eq!(as_mock_buffer(destination.as_ref()).contents(), vec![0, 0, 0, 0, 3, 4, 5, 6]);
}

#[test]
fn test_buffer_copy_size_zero_copies_rest_of_source() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let usage = BufferUsage::SOURCE_MEMORY | BufferUsage::DESTINATION_MEMORY;
    let source = cpu_buffer(&device, "source", 4, usage);
    let destination = cpu_buffer(&device, "destination", 8, usage);
    source.copy_from_memory(&[9, 8, 7, 6], 0).unwrap();

    let mut cb = recording_command_buffer(&queue, "copy");
    cb.copy_buffer_to_buffer(source.as_ref(), destination.as_ref(), 0, 1, 0).unwrap();
    cb.end().unwrap();
    queue.submit_command_buffer(cb.as_mut(), &[]).unwrap();

    let mut out = [0u8; 8];
    destination.copy_to_memory(0, &mut out).unwrap();
    assert_eq!(out, [8, 7, 6, 0, 0, 0, 0, 0]);
}

#[test]
fn test_buffer_copy_checks_usage_and_range() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let source = cpu_buffer(&device, "source", 8, BufferUsage::SOURCE_MEMORY);
    let no_destination = cpu_buffer(&device, "read only", 8, BufferUsage::SOURCE_MEMORY);
    let destination = cpu_buffer(&device, "destination", 4, BufferUsage::DESTINATION_MEMORY);
    let mut cb = recording_command_buffer(&queue, "copy");

    assert!(matches!(
        cb.copy_buffer_to_buffer(source.as_ref(), no_destination.as_ref(), 4, 0, 0),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(matches!(
        cb.copy_buffer_to_buffer(source.as_ref(), destination.as_ref(), 8, 0, 0),
        Err(Error::InvalidRange(_))
    ));
    assert!(matches!(
        cb.copy_buffer_to_buffer(source.as_ref(), destination.as_ref(), 4, 6, 0),
        Err(Error::InvalidRange(_))
    ));
}

#[test]
fn test_copy_inside_render_pass_rejected() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let target = color_target(&device, "target");
    let pass = render_pass(&device, target.as_ref(), 1);
    let source = cpu_buffer(&device, "source", 8, BufferUsage::SOURCE_MEMORY);
    let destination = cpu_buffer(&device, "destination", 8, BufferUsage::DESTINATION_MEMORY);

    let mut cb = recording_command_buffer(&queue, "copy");
    cb.begin_render_pass(pass.as_ref(), &[RenderPassBeginAttachment::new(target.as_ref())])
        .unwrap();
    assert!(matches!(
        cb.copy_buffer_to_buffer(source.as_ref(), destination.as_ref(), 0, 0, 0),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn test_buffer_to_image_copy_places_rows() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let image = device
        .create_image(&ImageDesc {
            name: "tile",
            width: 4,
            height: 4,
            format: ImageFormat::R8_UNORM,
            usage: ImageUsage::SAMPLE | ImageUsage::DESTINATION_MEMORY,
            ..Default::default()
        })
        .unwrap();
    let staging = cpu_buffer(&device, "staging", 4, BufferUsage::SOURCE_MEMORY);
    staging.copy_from_memory(&[1, 2, 3, 4], 0).unwrap();

    let mut cb = recording_command_buffer(&queue, "upload");
    let region = BufferImageCopy {
        pixel_offset: UVec3::new(1, 1, 0),
        pixel_range: UVec3::new(2, 2, 1),
        ..Default::default()
    };
    cb.copy_buffer_to_image(staging.as_ref(), image.as_ref(), &region).unwrap();
    cb.end().unwrap();
    queue.submit_command_buffer(cb.as_mut(), &[]).unwrap();

    #[rustfmt::skip]
    let expected = vec![
        0, 0, 0, 0,
        0, 1, 2, 0,
        0, 3, 4, 0,
        0, 0, 0, 0,
    ];
    assert_eq!(as_mock_image(image.as_ref()).subresource(0, 0), expected);
}

#[test]
fn test_buffer_to_image_copy_validation() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let image = device
        .create_image(&ImageDesc {
            name: "bc1",
            width: 16,
            height: 16,
            format: ImageFormat::BC1_RGBA_UNORM,
            level_count: 2,
            usage: ImageUsage::SAMPLE | ImageUsage::DESTINATION_MEMORY,
            ..Default::default()
        })
        .unwrap();
    let staging = cpu_buffer(&device, "staging", 64, BufferUsage::SOURCE_MEMORY);
    let mut cb = recording_command_buffer(&queue, "upload");

    // Full level 1 (8x8 = 4 blocks of 8 bytes)
    let resolved = cb.copy_buffer_to_image(staging.as_ref(), image.as_ref(), &BufferImageCopy { level: 1, ..Default::default() });
    assert!(resolved.is_ok());

    let unaligned = BufferImageCopy {
        pixel_offset: UVec3::new(2, 0, 0),
        pixel_range: UVec3::new(4, 4, 1),
        ..Default::default()
    };
    assert!(matches!(
        cb.copy_buffer_to_image(staging.as_ref(), image.as_ref(), &unaligned),
        Err(Error::InvalidValue(_))
    ));

    let missing_level = BufferImageCopy { level: 2, ..Default::default() };
    assert!(matches!(
        cb.copy_buffer_to_image(staging.as_ref(), image.as_ref(), &missing_level),
        Err(Error::ValueOutOfRange(_))
    ));

    // Level 0 needs 128 bytes, the staging buffer has 64
    assert!(matches!(
        cb.copy_buffer_to_image(staging.as_ref(), image.as_ref(), &BufferImageCopy::default()),
        Err(Error::InvalidRange(_))
    ));
}

#[test]
fn test_generate_mip_maps_fills_levels() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let image = device
        .create_image(&ImageDesc {
            name: "mipped",
            width: 4,
            height: 4,
            format: ImageFormat::R8_UNORM,
            level_count: 3,
            usage: ImageUsage::SAMPLE | ImageUsage::SOURCE_MEMORY | ImageUsage::DESTINATION_MEMORY,
            ..Default::default()
        })
        .unwrap();
    let staging = cpu_buffer(&device, "staging", 16, BufferUsage::SOURCE_MEMORY);
    staging.copy_from_memory(&(1..=16).collect::<Vec<u8>>(), 0).unwrap();

    let mut cb = recording_command_buffer(&queue, "mips");
    cb.synchronize_image_usage(image.as_ref(), ImageCommandUsage::None, ImageCommandUsage::MemoryWrite, 0, 1, 0, 0)
        .unwrap();
    cb.copy_buffer_to_image(staging.as_ref(), image.as_ref(), &BufferImageCopy::default()).unwrap();
    cb.generate_mip_maps_for_image(image.as_ref()).unwrap();
    cb.end().unwrap();
    queue.submit_command_buffer(cb.as_mut(), &[]).unwrap();

    let mock = as_mock_image(image.as_ref());
    assert_eq!(mock.subresource(1, 0), vec![1, 3, 9, 11]);
    assert_eq!(mock.subresource(2, 0), vec![1]);
}

#[test]
fn test_generate_mip_maps_requires_copy_usages() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let image = device
        .create_image(&ImageDesc {
            name: "sample only",
            width: 4,
            height: 4,
            format: ImageFormat::R8_UNORM,
            level_count: 3,
            usage: ImageUsage::SAMPLE | ImageUsage::DESTINATION_MEMORY,
            ..Default::default()
        })
        .unwrap();
    let mut cb = recording_command_buffer(&queue, "mips");
    assert!(matches!(
        cb.generate_mip_maps_for_image(image.as_ref()),
        Err(Error::InvalidConfiguration(_))
    ));
}

// ============================================================================
// RENDER PASS / PIPELINE SCOPES
// ============================================================================

#[test]
fn test_subpass_sequence() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let target = color_target(&device, "target");
    let pass = render_pass(&device, target.as_ref(), 2);
    let attachments = [RenderPassBeginAttachment::new(target.as_ref()).with_clear_color(Vec4::ONE)];

    let mut cb = recording_command_buffer(&queue, "frame");
    cb.begin_render_pass(pass.as_ref(), &attachments).unwrap();
    assert!(matches!(cb.end_render_pass(pass.as_ref()), Err(Error::InvalidOperation(_))));
    cb.begin_next_subpass(pass.as_ref()).unwrap();
    assert!(matches!(cb.begin_next_subpass(pass.as_ref()), Err(Error::InvalidOperation(_))));
    cb.end_render_pass(pass.as_ref()).unwrap();
    cb.end().unwrap();
}

#[test]
fn test_begin_render_pass_checks_attachments() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let target = color_target(&device, "target");
    let pass = render_pass(&device, target.as_ref(), 1);
    let small = device
        .create_image(&ImageDesc {
            name: "small",
            width: 32,
            height: 32,
            format: ImageFormat::R8G8B8A8_UNORM,
            usage: ImageUsage::COLOR_ATTACHMENT,
            ..Default::default()
        })
        .unwrap();

    let mut cb = recording_command_buffer(&queue, "frame");
    assert!(matches!(cb.begin_render_pass(pass.as_ref(), &[]), Err(Error::UnexpectedSize(_))));
    assert!(matches!(
        cb.begin_render_pass(pass.as_ref(), &[RenderPassBeginAttachment::new(small.as_ref())]),
        Err(Error::UnexpectedSize(_))
    ));
}

#[test]
fn test_graphics_pipeline_needs_render_pass() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let target = color_target(&device, "target");
    let pass = render_pass(&device, target.as_ref(), 1);
    let pipeline = graphics_pipeline(&device, pass.as_ref(), 0);

    let mut cb = recording_command_buffer(&queue, "frame");
    assert!(matches!(cb.begin_graphics_pipeline(pipeline.as_ref()), Err(Error::InvalidOperation(_))));
}

#[test]
fn test_compute_pipeline_outside_render_pass_only() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let target = color_target(&device, "target");
    let pass = render_pass(&device, target.as_ref(), 1);
    let compute = compute_pipeline(&device, 0);

    let mut cb = recording_command_buffer(&queue, "frame");
    cb.begin_render_pass(pass.as_ref(), &[RenderPassBeginAttachment::new(target.as_ref())])
        .unwrap();
    assert!(matches!(cb.begin_compute_pipeline(compute.as_ref()), Err(Error::InvalidOperation(_))));
}

#[test]
fn test_full_draw_sequence() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let target = color_target(&device, "target");
    let pass = render_pass(&device, target.as_ref(), 1);
    let pipeline = graphics_pipeline(&device, pass.as_ref(), 64);
    let table = device.create_resource_table(&ResourceTableDesc { name: "bindless" }).unwrap();
    let vertices = cpu_buffer(&device, "vertices", 1024, BufferUsage::VERTEX);
    let indices = cpu_buffer(&device, "indices", 256, BufferUsage::INDEX);

    let mut cb = recording_command_buffer(&queue, "frame");
    cb.begin_debug_region("opaque", Vec4::new(1.0, 0.0, 0.0, 1.0)).unwrap();
    cb.begin_render_pass(pass.as_ref(), &[RenderPassBeginAttachment::new(target.as_ref())])
        .unwrap();
    cb.begin_graphics_pipeline(pipeline.as_ref()).unwrap();
    cb.bind_resource_table(table.as_ref()).unwrap();
    cb.push_constants(&[0u8; 16], 48).unwrap();
    cb.set_scissor(Scissor { x: 0, y: 0, width: 64, height: 64 }).unwrap();
    cb.bind_vertex_buffer(vertices.as_ref(), 0).unwrap();
    assert!(matches!(cb.draw_indexed(3, 0, 0), Err(Error::InvalidOperation(_))));
    cb.bind_index_buffer(indices.as_ref(), 0).unwrap();
    cb.draw_indexed(36, 0, 0).unwrap();
    cb.draw(3, 0).unwrap();
    cb.insert_debug_marker("after draw", Vec4::ONE).unwrap();
    cb.end_graphics_pipeline(pipeline.as_ref()).unwrap();
    cb.end_render_pass(pass.as_ref()).unwrap();
    cb.end_debug_region().unwrap();
    cb.end().unwrap();

    let commands = encoded_commands(cb.as_mut());
    assert_eq!(commands.first().map(String::as_str), Some("begin region 'opaque'"));
    assert!(commands.contains(&"draw indexed 36 from 0 base 0".to_string()));
    assert_eq!(commands.last().map(String::as_str), Some("end region"));
}

#[test]
fn test_draw_without_pipeline_rejected() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let mut cb = recording_command_buffer(&queue, "frame");
    assert!(matches!(cb.draw(3, 0), Err(Error::InvalidOperation(_))));
    assert!(matches!(cb.dispatch(1, 1, 1), Err(Error::InvalidOperation(_))));
}

#[test]
fn test_draw_zero_vertices_rejected() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let target = color_target(&device, "target");
    let pass = render_pass(&device, target.as_ref(), 1);
    let pipeline = graphics_pipeline(&device, pass.as_ref(), 0);

    let mut cb = recording_command_buffer(&queue, "frame");
    cb.begin_render_pass(pass.as_ref(), &[RenderPassBeginAttachment::new(target.as_ref())])
        .unwrap();
    cb.begin_graphics_pipeline(pipeline.as_ref()).unwrap();
    assert!(matches!(cb.draw(0, 0), Err(Error::InvalidValue(_))));
}

#[test]
fn test_dispatch_zero_y_z_treated_as_one() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let compute = compute_pipeline(&device, 0);

    let mut cb = recording_command_buffer(&queue, "compute");
    cb.begin_compute_pipeline(compute.as_ref()).unwrap();
    cb.dispatch(8, 0, 0).unwrap();
    assert!(matches!(cb.dispatch(0, 1, 1), Err(Error::InvalidValue(_))));
    cb.end_compute_pipeline(compute.as_ref()).unwrap();

    assert_eq!(
        encoded_commands(cb.as_mut()),
        vec!["bind compute pipeline 'cull'".to_string(), "dispatch 8x1x1".to_string()]
    );
}

#[test]
fn test_push_constants_bounded_by_pipeline() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let compute = compute_pipeline(&device, 32);

    let mut cb = recording_command_buffer(&queue, "compute");
    assert!(matches!(cb.push_constants(&[0; 4], 0), Err(Error::InvalidOperation(_))));
    cb.begin_compute_pipeline(compute.as_ref()).unwrap();
    cb.push_constants(&[0; 32], 0).unwrap();
    assert!(matches!(cb.push_constants(&[0; 8], 28), Err(Error::InvalidRange(_))));
    assert!(matches!(cb.push_constants(&[], 0), Err(Error::InvalidValue(_))));
    assert!(matches!(cb.push_constants(&[0; 4], 128), Err(Error::InvalidRange(_))));
}

#[test]
fn test_unbalanced_debug_region_rejected() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let mut cb = recording_command_buffer(&queue, "frame");
    assert!(matches!(cb.end_debug_region(), Err(Error::InvalidOperation(_))));
    assert!(matches!(cb.begin_debug_region("", Vec4::ONE), Err(Error::InvalidValue(_))));
}

// ============================================================================
// DEFERRED DESTRUCTION
// ============================================================================

#[test]
fn test_queued_buffer_lives_until_completion() {
    let device = MockDevice::new().with_deferred_completion();
    let queue = graphics_queue(&device);
    let buffer = cpu_buffer(&device, "old", 16, BufferUsage::VERTEX);
    let storage = as_mock_buffer(buffer.as_ref()).storage();
    assert_eq!(Arc::strong_count(&storage), 2);

    let mut cb = recording_command_buffer(&queue, "frame");
    cb.queue_buffer_for_destruction(buffer);
    cb.end().unwrap();
    queue.submit_command_buffer(cb.as_mut(), &[]).unwrap();
    assert_eq!(Arc::strong_count(&storage), 2);

    queue.wait_for_command_buffer(cb.as_mut()).unwrap();
    assert_eq!(Arc::strong_count(&storage), 1);
}

#[test]
fn test_queued_image_released_on_next_begin() {
    let device = MockDevice::new();
    let queue = graphics_queue(&device);
    let image = color_target(&device, "old");

    let mut cb = recording_command_buffer(&queue, "frame");
    cb.queue_image_for_destruction(image);
    cb.end().unwrap();
    queue.submit_command_buffer(cb.as_mut(), &[]).unwrap();
    assert_eq!(queued_images(cb.as_mut()), 1);

    cb.begin().unwrap();
    assert_eq!(queued_images(cb.as_mut()), 0);
}

fn queued_images(command_buffer: &mut dyn CommandBuffer) -> usize {
    downcast_command_buffer_mut::<MockCommandBuffer>(command_buffer, GraphicsApi::Vulkan)
        .unwrap()
        .recorder()
        .queued_image_count()
}

// ============================================================================
// DOWNCASTING
// ============================================================================

#[test]
fn test_foreign_command_buffer_rejected() {
    let vulkan = MockDevice::new();
    let metal = MockDevice::new().with_graphics_api(GraphicsApi::Metal);
    let vulkan_queue = graphics_queue(&vulkan);
    let metal_queue = graphics_queue(&metal);

    let mut cb = recording_command_buffer(&metal_queue, "metal frame");
    cb.end().unwrap();
    assert!(matches!(
        vulkan_queue.submit_command_buffer(cb.as_mut(), &[]),
        Err(Error::UnexpectedType(_))
    ));
}
