//! Integration tests for the Vulkan backend
//!
//! These tests verify that the Vulkan implementation honors the ridge_rhi contracts
//! on a real device. All tests require a GPU and are marked with #[ignore].
//!
//! Run with: cargo test --test vulkan_backend_tests -- --ignored

use std::sync::OnceLock;
use ridge_rhi::glam::{UVec3, Vec4};
use ridge_rhi::ridge::rhi::*;
use ridge_rhi::ridge::Error;
use ridge_rhi_vulkan::VulkanRenderingContext;
use serial_test::serial;

/// Device shared by every test (the instance stays alive through it)
fn device() -> &'static dyn Device {
    static DEVICE: OnceLock<Box<dyn Device>> = OnceLock::new();
    DEVICE
        .get_or_init(|| {
            let context = VulkanRenderingContext::new(&RenderingContextDesc {
                name: "tests",
                graphics_api: GraphicsApi::Vulkan,
                config: Config::default(),
            })
            .unwrap();
            context.create_device(&DeviceDesc { name: "test device" }).unwrap()
        })
        .as_ref()
}

fn queue(operations: QueueOperations) -> Box<dyn Queue> {
    device()
        .create_queue(&QueueDesc {
            name: "test queue",
            operations,
            priority: QueuePriority::LeastUsed,
        })
        .unwrap()
}

fn buffer(name: &str, size: u64, usage: BufferUsage, memory_location: BufferMemoryLocation) -> Box<dyn Buffer> {
    device()
        .create_buffer(&BufferDesc {
            name,
            memory_size: size,
            usage,
            memory_location,
        })
        .unwrap()
}

const fn op(word_count: u32, opcode: u32) -> u32 {
    (word_count << 16) | opcode
}

/// Empty "main" entry point of the given execution model
fn empty_shader(execution_model: u32, execution_mode: &[u32]) -> Vec<u8> {
    let mut words = vec![
        0x0723_0203, 0x0001_0000, 0, 5, 0,
        op(2, 17), 1,                                // OpCapability Shader
        op(3, 14), 0, 1,                             // OpMemoryModel Logical GLSL450
        op(5, 15), execution_model, 1, 0x6E69_616D, 0, // OpEntryPoint <model> %1 "main"
    ];
    words.extend_from_slice(execution_mode);
    words.extend_from_slice(&[
        op(2, 19), 2,                                // %2 = OpTypeVoid
        op(3, 33), 3, 2,                             // %3 = OpTypeFunction %2
        op(5, 54), 2, 1, 0, 3,                       // %1 = OpFunction %2 None %3
        op(2, 248), 4,                               // %4 = OpLabel
        op(1, 253),                                  // OpReturn
        op(1, 56),                                   // OpFunctionEnd
    ]);
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    ShaderBundle::pack(&[(ShaderBlob::SpirV, &bytes)])
}

fn compute_bundle() -> Vec<u8> {
    empty_shader(5, &[op(6, 16), 1, 17, 1, 1, 1]) // LocalSize 1 1 1
}

fn vertex_bundle() -> Vec<u8> {
    empty_shader(0, &[])
}

fn fragment_bundle() -> Vec<u8> {
    empty_shader(4, &[op(3, 16), 1, 7]) // OriginUpperLeft
}

// ============================================================================
// DEVICE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_device_queries() {
    let device = device();
    assert_eq!(device.graphics_api(), GraphicsApi::Vulkan);
    assert!(!device.hardware_name().is_empty());
    assert!(device.limits().max_render_pass_width >= 4096);
    assert!(device.limits().resource_table_capacities.storage_buffers > 0);
    assert!(device.is_image_sampling_supported(ImageSampling::X1));
    assert!(device.is_image_format_supported(ImageFormat::R8G8B8A8_UNORM, ImageUsage::SAMPLE));
    assert_eq!(
        device.get_supported_image_format(ImageFormat::R8G8B8A8_UNORM, ImageUsage::COLOR_ATTACHMENT),
        Some(ImageFormat::R8G8B8A8_UNORM)
    );
}

// ============================================================================
// BUFFER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_cpu_buffer_host_round_trip() {
    let staging = buffer("staging", 64, BufferUsage::SOURCE_MEMORY, BufferMemoryLocation::Cpu);
    staging.copy_from_memory(&[7u8; 16], 8).unwrap();

    let mut out = [0u8; 32];
    staging.copy_to_memory(0, &mut out).unwrap();
    assert_eq!(&out[..8], &[0u8; 8]);
    assert_eq!(&out[8..24], &[7u8; 16]);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_gpu_buffer_rejects_host_access() {
    let gpu = buffer("gpu only", 64, BufferUsage::STORAGE, BufferMemoryLocation::Gpu);
    let error = gpu.copy_from_memory(&[1, 2, 3, 4], 0).unwrap_err();
    assert!(matches!(error, Error::InvalidOperation(_)));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_copy_through_gpu_buffer() {
    let data: Vec<u8> = (0..=255).collect();
    let upload = buffer("upload", 256, BufferUsage::SOURCE_MEMORY, BufferMemoryLocation::Cpu);
    let gpu = buffer(
        "device local",
        256,
        BufferUsage::SOURCE_MEMORY | BufferUsage::DESTINATION_MEMORY,
        BufferMemoryLocation::Gpu,
    );
    let readback = buffer("readback", 256, BufferUsage::DESTINATION_MEMORY, BufferMemoryLocation::Cpu);
    upload.copy_from_memory(&data, 0).unwrap();

    let queue = queue(QueueOperations::TRANSFER);
    let mut command_buffer = queue.create_command_buffer(&CommandBufferDesc { name: "copy" }).unwrap();
    command_buffer.begin().unwrap();
    command_buffer
        .synchronize_buffer_usage(gpu.as_ref(), BufferCommandUsage::None, BufferCommandUsage::MemoryWrite, 0, 0)
        .unwrap();
    command_buffer.copy_buffer_to_buffer(upload.as_ref(), gpu.as_ref(), 0, 0, 0).unwrap();
    command_buffer
        .synchronize_buffer_usage(gpu.as_ref(), BufferCommandUsage::MemoryWrite, BufferCommandUsage::MemoryRead, 0, 0)
        .unwrap();
    command_buffer.copy_buffer_to_buffer(gpu.as_ref(), readback.as_ref(), 128, 64, 0).unwrap();
    command_buffer.end().unwrap();

    queue.submit_command_buffer(command_buffer.as_mut(), &[]).unwrap();
    assert_eq!(command_buffer.state(), CommandBufferState::Submitted);
    queue.wait_for_command_buffer(command_buffer.as_mut()).unwrap();
    assert_eq!(command_buffer.state(), CommandBufferState::Completed);

    let mut out = [0u8; 128];
    readback.copy_to_memory(0, &mut out).unwrap();
    assert_eq!(&out[..], &data[64..192]);
}

// ============================================================================
// QUEUE / SYNCHRONIZATION TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_wait_list_across_queues() {
    let upload = buffer("upload", 64, BufferUsage::SOURCE_MEMORY, BufferMemoryLocation::Cpu);
    let middle = buffer(
        "middle",
        64,
        BufferUsage::SOURCE_MEMORY | BufferUsage::DESTINATION_MEMORY,
        BufferMemoryLocation::Gpu,
    );
    let readback = buffer("readback", 64, BufferUsage::DESTINATION_MEMORY, BufferMemoryLocation::Cpu);
    upload.copy_from_memory(&[42u8; 64], 0).unwrap();

    let first_queue = queue(QueueOperations::TRANSFER);
    let second_queue = queue(QueueOperations::GRAPHICS);

    let mut first = first_queue.create_command_buffer(&CommandBufferDesc { name: "first" }).unwrap();
    first.begin().unwrap();
    first.copy_buffer_to_buffer(upload.as_ref(), middle.as_ref(), 0, 0, 0).unwrap();
    first.end().unwrap();
    first_queue.submit_command_buffer(first.as_mut(), &[]).unwrap();

    let mut second = second_queue.create_command_buffer(&CommandBufferDesc { name: "second" }).unwrap();
    second.begin().unwrap();
    second.copy_buffer_to_buffer(middle.as_ref(), readback.as_ref(), 0, 0, 0).unwrap();
    second.end().unwrap();
    second_queue.submit_command_buffer(second.as_mut(), &[first.as_ref()]).unwrap();
    assert!(second.completion_signal_value() > first.completion_signal_value());

    second_queue.wait_for_command_buffer(second.as_mut()).unwrap();
    first_queue.wait_for_command_buffer(first.as_mut()).unwrap();

    let mut out = [0u8; 64];
    readback.copy_to_memory(0, &mut out).unwrap();
    assert_eq!(out, [42u8; 64]);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_submit_to_foreign_queue_fails() {
    let owner = queue(QueueOperations::GRAPHICS);
    let other = queue(QueueOperations::GRAPHICS);
    let mut command_buffer = owner.create_command_buffer(&CommandBufferDesc { name: "owned" }).unwrap();
    command_buffer.begin().unwrap();
    command_buffer.end().unwrap();

    let error = other.submit_command_buffer(command_buffer.as_mut(), &[]).unwrap_err();
    assert!(matches!(error, Error::InvalidOperation(_)));
    assert_eq!(command_buffer.state(), CommandBufferState::Executable);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_command_buffer_reuse_after_completion() {
    let queue = queue(QueueOperations::GRAPHICS);
    let mut command_buffer = queue.create_command_buffer(&CommandBufferDesc { name: "reused" }).unwrap();
    for _ in 0..3 {
        command_buffer.begin().unwrap();
        command_buffer.end().unwrap();
        queue.submit_command_buffer(command_buffer.as_mut(), &[]).unwrap();
        queue.wait_for_command_buffer(command_buffer.as_mut()).unwrap();
    }

    // Deferred destruction happens on the next begin
    command_buffer.begin().unwrap();
    command_buffer.queue_buffer_for_destruction(buffer(
        "garbage",
        16,
        BufferUsage::STORAGE,
        BufferMemoryLocation::Gpu,
    ));
    command_buffer.end().unwrap();
    queue.submit_command_buffer(command_buffer.as_mut(), &[]).unwrap();
    queue.wait_for_command_buffer(command_buffer.as_mut()).unwrap();
    command_buffer.begin().unwrap();
}

// ============================================================================
// IMAGE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_upload_and_generate_mip_maps() {
    let image = device()
        .create_image(&ImageDesc {
            name: "mipped",
            width: 64,
            height: 32,
            format: ImageFormat::R8G8B8A8_UNORM,
            level_count: 7,
            usage: ImageUsage::SAMPLE | ImageUsage::SOURCE_MEMORY | ImageUsage::DESTINATION_MEMORY,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(image.level_count(), 7);

    let pixels = vec![0x80u8; 64 * 32 * 4];
    let upload = buffer("pixels", pixels.len() as u64, BufferUsage::SOURCE_MEMORY, BufferMemoryLocation::Cpu);
    upload.copy_from_memory(&pixels, 0).unwrap();

    let queue = queue(QueueOperations::GRAPHICS);
    let mut command_buffer = queue.create_command_buffer(&CommandBufferDesc { name: "mips" }).unwrap();
    command_buffer.begin().unwrap();
    command_buffer
        .synchronize_image_usage(image.as_ref(), ImageCommandUsage::None, ImageCommandUsage::MemoryWrite, 0, 1, 0, 0)
        .unwrap();
    command_buffer
        .copy_buffer_to_image(
            upload.as_ref(),
            image.as_ref(),
            &BufferImageCopy {
                pixel_range: UVec3::ZERO,
                ..Default::default()
            },
        )
        .unwrap();
    command_buffer.generate_mip_maps_for_image(image.as_ref()).unwrap();
    command_buffer
        .synchronize_image_usage(image.as_ref(), ImageCommandUsage::MemoryRead, ImageCommandUsage::GraphicsRead, 0, 0, 0, 0)
        .unwrap();
    command_buffer.end().unwrap();
    queue.submit_command_buffer(command_buffer.as_mut(), &[]).unwrap();
    queue.wait_for_command_buffer(command_buffer.as_mut()).unwrap();
}

// ============================================================================
// PIPELINE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_compute_dispatch() {
    let device = device();
    let bundle = compute_bundle();
    let shader = device
        .create_shader(&ShaderDesc { name: "cs", bundle: &bundle, shader_type: ShaderType::Compute })
        .unwrap();
    let pipeline = device
        .create_compute_pipeline(&ComputePipelineDesc {
            name: "compute",
            compute_shader: shader.as_ref(),
            push_constant_size: 16,
        })
        .unwrap();

    let storage = buffer("storage", 256, BufferUsage::STORAGE, BufferMemoryLocation::Gpu);
    let mut table = device.create_resource_table(&ResourceTableDesc { name: "table" }).unwrap();
    table.bind_storage_buffer(3, storage.as_ref(), 0, 0).unwrap();

    let queue = queue(QueueOperations::COMPUTE);
    let mut command_buffer = queue.create_command_buffer(&CommandBufferDesc { name: "dispatch" }).unwrap();
    command_buffer.begin().unwrap();
    command_buffer.begin_compute_pipeline(pipeline.as_ref()).unwrap();
    command_buffer.bind_resource_table(table.as_ref()).unwrap();
    command_buffer.push_constants(&[0u8; 16], 0).unwrap();
    command_buffer.dispatch(4, 2, 1).unwrap();
    command_buffer.end_compute_pipeline(pipeline.as_ref()).unwrap();
    command_buffer.end().unwrap();
    queue.submit_command_buffer(command_buffer.as_mut(), &[]).unwrap();
    queue.wait_for_command_buffer(command_buffer.as_mut()).unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_resource_table_rejects_out_of_range_index() {
    let mut table = device().create_resource_table(&ResourceTableDesc { name: "table" }).unwrap();
    let storage = buffer("storage", 64, BufferUsage::STORAGE, BufferMemoryLocation::Gpu);
    let capacity = table.capacity(ResourceTableCategory::StorageBuffer);
    let error = table.bind_storage_buffer(capacity, storage.as_ref(), 0, 0).unwrap_err();
    assert!(matches!(error, Error::ValueOutOfRange(_)));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_render_pass_with_graphics_pipeline() {
    let device = device();
    let target = device
        .create_image(&ImageDesc {
            name: "color",
            width: 128,
            height: 128,
            format: ImageFormat::R8G8B8A8_UNORM,
            usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLE,
            ..Default::default()
        })
        .unwrap();
    let attachments = [RenderPassAttachment {
        template_output_image: target.as_ref(),
        template_resolver_image: None,
        attachment_type: AttachmentType::Color,
        load_operation: AttachmentLoadOperation::Clear,
        store_operation: AttachmentStoreOperation::Store,
    }];
    let subpasses = [SubpassDesc { render_targets: &[0], inputs: &[] }];
    let render_pass = device
        .create_render_pass(&RenderPassDesc {
            name: "pass",
            attachments: &attachments,
            subpass_descs: &subpasses,
        })
        .unwrap();
    assert_eq!(render_pass.extent(), (128, 128));

    let vertex_bundle = vertex_bundle();
    let fragment_bundle = fragment_bundle();
    let vertex = device
        .create_shader(&ShaderDesc { name: "vs", bundle: &vertex_bundle, shader_type: ShaderType::Vertex })
        .unwrap();
    let fragment = device
        .create_shader(&ShaderDesc { name: "fs", bundle: &fragment_bundle, shader_type: ShaderType::Fragment })
        .unwrap();
    let pipeline = device
        .create_graphics_pipeline(&GraphicsPipelineDesc {
            name: "opaque",
            vertex_inputs: &[VertexInput::POSITION_3D],
            vertex_shader: vertex.as_ref(),
            fragment_shader: Some(fragment.as_ref()),
            template_render_pass: render_pass.as_ref(),
            subpass_index: 0,
            sampling: ImageSampling::X1,
            shade_mode: ShadeMode::Fill,
            cull_mode: CullMode::Back,
            front_face_mode: FrontFaceMode::CounterClockwise,
            push_constant_size: 0,
        })
        .unwrap();
    assert_eq!(pipeline.vertex_stride(), 12);

    let queue = queue(QueueOperations::GRAPHICS);
    let mut command_buffer = queue.create_command_buffer(&CommandBufferDesc { name: "frame" }).unwrap();
    command_buffer.begin().unwrap();
    command_buffer
        .synchronize_image_usage(target.as_ref(), ImageCommandUsage::None, ImageCommandUsage::ColorWrite, 0, 0, 0, 0)
        .unwrap();
    command_buffer.begin_debug_region("frame", Vec4::new(1.0, 0.0, 0.0, 1.0)).unwrap();
    command_buffer
        .begin_render_pass(
            render_pass.as_ref(),
            &[RenderPassBeginAttachment {
                output_image: target.as_ref(),
                resolver_image: None,
                clear_color: Vec4::new(0.1, 0.2, 0.3, 1.0),
            }],
        )
        .unwrap();
    command_buffer.begin_graphics_pipeline(pipeline.as_ref()).unwrap();
    command_buffer.set_scissor(Scissor { x: 0, y: 0, width: 64, height: 64 }).unwrap();
    command_buffer.end_graphics_pipeline(pipeline.as_ref()).unwrap();
    command_buffer.end_render_pass(render_pass.as_ref()).unwrap();
    command_buffer.end_debug_region().unwrap();
    command_buffer
        .synchronize_image_usage(target.as_ref(), ImageCommandUsage::ColorWrite, ImageCommandUsage::GraphicsRead, 0, 0, 0, 0)
        .unwrap();
    command_buffer.end().unwrap();
    queue.submit_command_buffer(command_buffer.as_mut(), &[]).unwrap();
    queue.wait_for_command_buffer(command_buffer.as_mut()).unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_pipeline_rejects_large_push_constants() {
    let device = device();
    let bundle = compute_bundle();
    let shader = device
        .create_shader(&ShaderDesc { name: "cs", bundle: &bundle, shader_type: ShaderType::Compute })
        .unwrap();
    let result = device.create_compute_pipeline(&ComputePipelineDesc {
        name: "too big",
        compute_shader: shader.as_ref(),
        push_constant_size: MAX_PUSH_CONSTANT_SIZE + 4,
    });
    assert!(result.is_err());
}
