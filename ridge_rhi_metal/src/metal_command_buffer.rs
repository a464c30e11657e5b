/// CommandBuffer - Metal implementation of the CommandBuffer trait
///
/// Native command buffers are single use, so every `begin` takes a fresh one
/// from the queue. Commands go through one open encoder at a time: blit for
/// copies, compute for compute pipelines and one render encoder per subpass.
/// Switching kinds ends the open encoder; hazard tracking orders work across
/// encoders and explicit barriers are only encoded inside one.

use objc2::runtime::ProtocolObject;
use objc2_metal::{
    MTLBarrierScope, MTLBlitCommandEncoder, MTLCommandBuffer, MTLCommandEncoder, MTLComputeCommandEncoder,
    MTLIndexType, MTLOrigin, MTLPrimitiveType, MTLRenderCommandEncoder, MTLRenderPassDescriptor, MTLRenderStages,
    MTLScissorRect, MTLSize, MTLViewport,
};
use ridge_rhi::glam::Vec4;
use ridge_rhi::ridge::rhi::{
    downcast_resource, Buffer, BufferCommandUsage, BufferImageCopy, CommandBuffer, CommandBufferState,
    CommandRecorder, ComputePipeline, GraphicsApi, GraphicsPipeline, Image, ImageCommandUsage, ImageType,
    RenderPass, RenderPassBeginAttachment, RenderingResource, ResourceTable, Scissor, MAX_PUSH_CONSTANT_SIZE,
};
use ridge_rhi::ridge::Result;
use ridge_rhi::ridge_err;
use std::any::Any;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::metal_buffer::{MetalBuffer, NativeBuffer};
use crate::metal_context::{completion_result, label, nil_error, MetalTimeline, NativeCommandBuffer};
use crate::metal_handle::MetalHandle;
use crate::metal_image::MetalImage;
use crate::metal_layout::{
    RenderStages, PUSH_CONSTANT_BUFFER_INDEX, RESOURCE_TABLE_BUFFER_INDEX, SOURCE, VERTEX_BUFFER_INDEX,
};
use crate::metal_pipeline::{MetalComputePipeline, MetalGraphicsPipeline};
use crate::metal_render_pass::MetalRenderPass;
use crate::metal_resource_table::MetalResourceTable;

type BlitEncoder = ProtocolObject<dyn MTLBlitCommandEncoder>;
type RenderEncoder = ProtocolObject<dyn MTLRenderCommandEncoder>;
type ComputeEncoder = ProtocolObject<dyn MTLComputeCommandEncoder>;

/// Encoder currently open on the native command buffer
enum Encoder {
    None,
    Blit(MetalHandle<BlitEncoder>),
    Render(MetalHandle<RenderEncoder>),
    Compute(MetalHandle<ComputeEncoder>),
}

impl Encoder {
    fn as_command_encoder(&self) -> Option<&ProtocolObject<dyn MTLCommandEncoder>> {
        match self {
            Encoder::None => None,
            Encoder::Blit(encoder) => Some(ProtocolObject::from_ref(&**encoder)),
            Encoder::Render(encoder) => Some(ProtocolObject::from_ref(&**encoder)),
            Encoder::Compute(encoder) => Some(ProtocolObject::from_ref(&**encoder)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BoundPipeline {
    Graphics { push_constant_size: u32 },
    Compute { push_constant_size: u32, threadgroup_size: [u32; 3] },
}

/// Subpasses of the render pass being recorded
struct ActiveRenderPass {
    descriptors: Vec<MetalHandle<MTLRenderPassDescriptor>>,
    extent: (u32, u32),
}

fn native_stages(stages: RenderStages) -> MTLRenderStages {
    let mut native = MTLRenderStages::empty();
    if stages.contains(RenderStages::VERTEX) {
        native |= MTLRenderStages::Vertex;
    }
    if stages.contains(RenderStages::FRAGMENT) {
        native |= MTLRenderStages::Fragment;
    }
    native
}

fn is_attachment_usage(usage: ImageCommandUsage) -> bool {
    matches!(
        usage,
        ImageCommandUsage::ColorRead
            | ImageCommandUsage::ColorWrite
            | ImageCommandUsage::DepthRead
            | ImageCommandUsage::DepthWrite
    )
}

/// Metal command buffer implementation
pub struct MetalCommandBuffer {
    name: String,
    recorder: CommandRecorder,
    /// Timeline of the queue that created this buffer
    timeline: Arc<MetalTimeline>,
    /// Native buffer of the current recording, kept until the next `begin`
    native: Option<MetalHandle<NativeCommandBuffer>>,
    encoder: Encoder,
    render_pass: Option<ActiveRenderPass>,
    pipeline: Option<BoundPipeline>,
    index_buffer: Option<(MetalHandle<NativeBuffer>, u64)>,
    push_constants: [u8; MAX_PUSH_CONSTANT_SIZE as usize],
}

impl MetalCommandBuffer {
    pub(crate) fn new(timeline: Arc<MetalTimeline>, name: &str) -> Self {
        Self {
            name: name.to_string(),
            recorder: CommandRecorder::new(name),
            timeline,
            native: None,
            encoder: Encoder::None,
            render_pass: None,
            pipeline: None,
            index_buffer: None,
            push_constants: [0; MAX_PUSH_CONSTANT_SIZE as usize],
        }
    }

    /// Timeline and value a dependent submission waits on
    pub(crate) fn completion_point(&self) -> (Arc<MetalTimeline>, u64) {
        (Arc::clone(&self.timeline), self.recorder.signal_value())
    }

    pub(crate) fn timeline(&self) -> &Arc<MetalTimeline> {
        &self.timeline
    }

    /// Native buffer of the finished recording, for `queue_name` to commit
    pub(crate) fn recorded_native(&self, queue_name: &str) -> Result<MetalHandle<NativeCommandBuffer>> {
        self.native.clone().ok_or_else(|| {
            ridge_err!(
                SOURCE,
                InvalidOperation,
                "Command buffer '{}' has nothing recorded to submit to queue '{}'",
                self.name,
                queue_name
            )
        })
    }

    pub(crate) fn mark_submitted(&mut self, signal_value: u64) -> Result<()> {
        self.recorder.mark_submitted(signal_value)
    }

    /// Block until the last submission completes, then release deferred resources
    pub(crate) fn wait_completed(&mut self) -> Result<()> {
        if self.recorder.signal_value() == 0 {
            return Ok(());
        }
        let result = match &self.native {
            Some(native) => {
                unsafe { native.waitUntilCompleted() };
                completion_result(&self.timeline.ctx, &self.name, native)
            }
            None => Ok(()),
        };
        self.recorder.mark_completed();
        result
    }

    fn native(&self) -> Result<&NativeCommandBuffer> {
        self.native.as_deref().ok_or_else(|| {
            ridge_err!(SOURCE, InvalidOperation, "Command buffer '{}' is not recording", self.name)
        })
    }

    fn end_encoding(&mut self) {
        if let Some(encoder) = self.encoder.as_command_encoder() {
            unsafe { encoder.endEncoding() };
        }
        self.encoder = Encoder::None;
    }

    fn blit_encoder(&mut self) -> Result<MetalHandle<BlitEncoder>> {
        if let Encoder::Blit(encoder) = &self.encoder {
            return Ok(encoder.clone());
        }
        self.end_encoding();
        let encoder = unsafe { self.native()?.blitCommandEncoder() }
            .ok_or_else(|| nil_error(format_args!("open blit encoder on '{}'", self.name)))?;
        let encoder = MetalHandle::new(encoder);
        self.encoder = Encoder::Blit(encoder.clone());
        Ok(encoder)
    }

    fn compute_encoder(&mut self) -> Result<MetalHandle<ComputeEncoder>> {
        if let Encoder::Compute(encoder) = &self.encoder {
            return Ok(encoder.clone());
        }
        self.end_encoding();
        let encoder = unsafe { self.native()?.computeCommandEncoder() }
            .ok_or_else(|| nil_error(format_args!("open compute encoder on '{}'", self.name)))?;
        let encoder = MetalHandle::new(encoder);
        self.encoder = Encoder::Compute(encoder.clone());
        Ok(encoder)
    }

    fn render_encoder(&self, operation: &str) -> Result<&RenderEncoder> {
        match &self.encoder {
            Encoder::Render(encoder) => Ok(&**encoder),
            _ => Err(ridge_err!(
                SOURCE,
                InvalidOperation,
                "Cannot {} on command buffer '{}' outside a render encoder",
                operation,
                self.name
            )),
        }
    }

    /// Open the render encoder of `subpass`, covering the whole pass extent
    fn open_subpass(&mut self, subpass: u32) -> Result<()> {
        self.end_encoding();
        let (descriptor, (width, height)) = match &self.render_pass {
            Some(pass) => match pass.descriptors.get(subpass as usize) {
                Some(descriptor) => (descriptor.clone(), pass.extent),
                None => {
                    return Err(ridge_err!(SOURCE, ValueOutOfRange, "Render pass has no subpass {}", subpass));
                }
            },
            None => {
                return Err(ridge_err!(
                    SOURCE,
                    InvalidOperation,
                    "Command buffer '{}' has no render pass to open subpass {} of",
                    self.name,
                    subpass
                ));
            }
        };
        let encoder = unsafe { self.native()?.renderCommandEncoderWithDescriptor(&descriptor) }
            .ok_or_else(|| nil_error(format_args!("open render encoder on '{}'", self.name)))?;
        unsafe {
            encoder.setViewport(MTLViewport {
                originX: 0.0,
                originY: 0.0,
                width: width as f64,
                height: height as f64,
                znear: 0.0,
                zfar: 1.0,
            });
            encoder.setScissorRect(MTLScissorRect {
                x: 0,
                y: 0,
                width: width as usize,
                height: height as usize,
            });
        }
        self.encoder = Encoder::Render(MetalHandle::new(encoder));
        Ok(())
    }

    fn bound_pipeline(&self, operation: &str) -> Result<BoundPipeline> {
        self.pipeline.ok_or_else(|| {
            ridge_err!(
                SOURCE,
                InvalidOperation,
                "Cannot {} on command buffer '{}' without a bound pipeline",
                operation,
                self.name
            )
        })
    }

    /// Barrier inside the open encoder; across encoders hazard tracking applies
    fn memory_barrier(&self, scope: MTLBarrierScope, after: RenderStages, before: RenderStages) {
        match &self.encoder {
            Encoder::Render(encoder) if !after.is_empty() && !before.is_empty() => unsafe {
                encoder.memoryBarrierWithScope_afterStages_beforeStages(
                    scope,
                    native_stages(after),
                    native_stages(before),
                );
            },
            Encoder::Compute(encoder) => unsafe { encoder.memoryBarrierWithScope(scope) },
            _ => {}
        }
    }
}

crate::metal_resource!(MetalCommandBuffer);

impl CommandBuffer for MetalCommandBuffer {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn state(&self) -> CommandBufferState {
        self.recorder.state()
    }

    fn completion_signal_value(&self) -> u64 {
        self.recorder.signal_value()
    }

    fn begin(&mut self) -> Result<()> {
        let gpu_completed = self.timeline.completed_value() >= self.recorder.signal_value();
        self.recorder.begin(gpu_completed)?;
        self.end_encoding();
        self.render_pass = None;
        self.pipeline = None;
        self.index_buffer = None;
        self.native = Some(MetalHandle::new(self.timeline.new_command_buffer(&self.name)?));
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.recorder.end()?;
        self.end_encoding();
        Ok(())
    }

    fn synchronize_buffer_usage(
        &mut self,
        buffer: &dyn Buffer,
        previous: BufferCommandUsage,
        next: BufferCommandUsage,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        downcast_resource::<MetalBuffer, _>(buffer, GraphicsApi::Metal)?;
        if self.recorder.check_buffer_usage(buffer, previous, next, offset, size)?.is_some() {
            self.memory_barrier(
                MTLBarrierScope::Buffers,
                RenderStages::for_buffer_usage(previous),
                RenderStages::for_buffer_usage(next),
            );
        }
        Ok(())
    }

    fn synchronize_image_usage(
        &mut self,
        image: &dyn Image,
        previous: ImageCommandUsage,
        next: ImageCommandUsage,
        base_level: u32,
        level_count: u32,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<()> {
        downcast_resource::<MetalImage, _>(image, GraphicsApi::Metal)?;
        let range = self
            .recorder
            .check_image_usage(image, previous, next, base_level, level_count, base_layer, layer_count)?;
        if range.is_some() {
            let mut scope = MTLBarrierScope::Textures;
            if is_attachment_usage(previous) || is_attachment_usage(next) {
                scope |= MTLBarrierScope::RenderTargets;
            }
            self.memory_barrier(
                scope,
                RenderStages::for_image_usage(previous),
                RenderStages::for_image_usage(next),
            );
        }
        Ok(())
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: &dyn Buffer,
        destination: &dyn Buffer,
        size: u64,
        source_offset: u64,
        destination_offset: u64,
    ) -> Result<()> {
        let metal_source = downcast_resource::<MetalBuffer, _>(source, GraphicsApi::Metal)?;
        let metal_destination = downcast_resource::<MetalBuffer, _>(destination, GraphicsApi::Metal)?;
        let size = self
            .recorder
            .check_copy_buffer_to_buffer(source, destination, size, source_offset, destination_offset)?;

        let encoder = self.blit_encoder()?;
        unsafe {
            encoder.copyFromBuffer_sourceOffset_toBuffer_destinationOffset_size(
                &metal_source.buffer,
                source_offset as usize,
                &metal_destination.buffer,
                destination_offset as usize,
                size as usize,
            );
        }
        Ok(())
    }

    fn copy_buffer_to_image(&mut self, source: &dyn Buffer, destination: &dyn Image, region: &BufferImageCopy) -> Result<()> {
        let metal_source = downcast_resource::<MetalBuffer, _>(source, GraphicsApi::Metal)?;
        let metal_destination = downcast_resource::<MetalImage, _>(destination, GraphicsApi::Metal)?;
        let copy = self.recorder.check_copy_buffer_to_image(source, destination, region)?;

        // Rows are tightly packed in blocks of the format
        let format = destination.format();
        let block = format.block_size();
        let bytes_per_row = copy.pixel_range.x.div_ceil(block) as u64 * format.block_memory_size() as u64;
        let bytes_per_image = match destination.image_type() {
            ImageType::Volume => bytes_per_row * copy.pixel_range.y.div_ceil(block) as u64,
            _ => 0,
        };

        let encoder = self.blit_encoder()?;
        unsafe {
            encoder.copyFromBuffer_sourceOffset_sourceBytesPerRow_sourceBytesPerImage_sourceSize_toTexture_destinationSlice_destinationLevel_destinationOrigin(
                &metal_source.buffer,
                copy.source_offset as usize,
                bytes_per_row as usize,
                bytes_per_image as usize,
                MTLSize {
                    width: copy.pixel_range.x as usize,
                    height: copy.pixel_range.y as usize,
                    depth: copy.pixel_range.z as usize,
                },
                &metal_destination.texture,
                copy.layer as usize,
                copy.level as usize,
                MTLOrigin {
                    x: copy.pixel_offset.x as usize,
                    y: copy.pixel_offset.y as usize,
                    z: copy.pixel_offset.z as usize,
                },
            );
        }
        Ok(())
    }

    fn generate_mip_maps_for_image(&mut self, image: &dyn Image) -> Result<()> {
        let metal_image = downcast_resource::<MetalImage, _>(image, GraphicsApi::Metal)?;
        self.recorder.check_generate_mip_maps(image)?;
        let encoder = self.blit_encoder()?;
        unsafe { encoder.generateMipmapsForTexture(&metal_image.texture) };
        Ok(())
    }

    fn begin_render_pass(&mut self, render_pass: &dyn RenderPass, attachments: &[RenderPassBeginAttachment]) -> Result<()> {
        let metal_render_pass = downcast_resource::<MetalRenderPass, _>(render_pass, GraphicsApi::Metal)?;
        let mut descriptors = Vec::with_capacity(render_pass.subpass_count() as usize);
        for subpass in 0..render_pass.subpass_count() {
            descriptors.push(MetalHandle::new(metal_render_pass.subpass_descriptor(subpass, attachments)?));
        }
        self.recorder.begin_render_pass(render_pass, attachments)?;

        self.render_pass = Some(ActiveRenderPass {
            descriptors,
            extent: render_pass.extent(),
        });
        self.open_subpass(0)
    }

    fn begin_next_subpass(&mut self, render_pass: &dyn RenderPass) -> Result<()> {
        let subpass = self.recorder.begin_next_subpass(render_pass)?;
        self.open_subpass(subpass)
    }

    fn end_render_pass(&mut self, render_pass: &dyn RenderPass) -> Result<()> {
        self.recorder.end_render_pass(render_pass)?;
        self.end_encoding();
        self.render_pass = None;
        Ok(())
    }

    fn begin_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) -> Result<()> {
        let metal_pipeline = downcast_resource::<MetalGraphicsPipeline, _>(pipeline, GraphicsApi::Metal)?;
        self.recorder.begin_graphics_pipeline(pipeline)?;
        let encoder = self.render_encoder("begin graphics pipeline")?;
        unsafe {
            encoder.setRenderPipelineState(&metal_pipeline.state);
            encoder.setDepthStencilState(metal_pipeline.depth_state.as_deref());
            encoder.setTriangleFillMode(metal_pipeline.fill_mode);
            encoder.setCullMode(metal_pipeline.cull_mode);
            encoder.setFrontFacingWinding(metal_pipeline.winding);
        }
        self.pipeline = Some(BoundPipeline::Graphics {
            push_constant_size: pipeline.push_constant_size(),
        });
        self.index_buffer = None;
        Ok(())
    }

    fn end_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) -> Result<()> {
        self.recorder.end_graphics_pipeline(pipeline)?;
        self.pipeline = None;
        self.index_buffer = None;
        Ok(())
    }

    fn begin_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline) -> Result<()> {
        let metal_pipeline = downcast_resource::<MetalComputePipeline, _>(pipeline, GraphicsApi::Metal)?;
        self.recorder.begin_compute_pipeline(pipeline)?;
        let encoder = self.compute_encoder()?;
        unsafe { encoder.setComputePipelineState(&metal_pipeline.state) };
        self.pipeline = Some(BoundPipeline::Compute {
            push_constant_size: pipeline.push_constant_size(),
            threadgroup_size: metal_pipeline.threadgroup_size,
        });
        Ok(())
    }

    fn end_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline) -> Result<()> {
        self.recorder.end_compute_pipeline(pipeline)?;
        self.pipeline = None;
        Ok(())
    }

    fn bind_resource_table(&mut self, resource_table: &dyn ResourceTable) -> Result<()> {
        let metal_table = downcast_resource::<MetalResourceTable, _>(resource_table, GraphicsApi::Metal)?;
        self.recorder.check_bind_resource_table(resource_table)?;
        let index = RESOURCE_TABLE_BUFFER_INDEX as usize;
        match (self.bound_pipeline("bind resource table")?, &self.encoder) {
            (BoundPipeline::Graphics { .. }, Encoder::Render(encoder)) => unsafe {
                encoder.setVertexBuffer_offset_atIndex(Some(&metal_table.argument_buffer), 0, index);
                encoder.setFragmentBuffer_offset_atIndex(Some(&metal_table.argument_buffer), 0, index);
                for resident in metal_table.residents() {
                    encoder.useResource_usage(&resident.resource, resident.usage);
                }
            },
            (BoundPipeline::Compute { .. }, Encoder::Compute(encoder)) => unsafe {
                encoder.setBuffer_offset_atIndex(Some(&metal_table.argument_buffer), 0, index);
                for resident in metal_table.residents() {
                    encoder.useResource_usage(&resident.resource, resident.usage);
                }
            },
            _ => {
                return Err(ridge_err!(
                    SOURCE,
                    InvalidOperation,
                    "Command buffer '{}' has no encoder for its bound pipeline",
                    self.name
                ));
            }
        }
        Ok(())
    }

    fn push_constants(&mut self, data: &[u8], offset: u32) -> Result<()> {
        self.recorder.check_push_constants(data, offset)?;
        let start = offset as usize;
        self.push_constants[start..start + data.len()].copy_from_slice(data);

        // Metal copies inline bytes at encode time, so the whole block is resent
        let (size, graphics) = match self.bound_pipeline("push constants")? {
            BoundPipeline::Graphics { push_constant_size } => (push_constant_size as usize, true),
            BoundPipeline::Compute { push_constant_size, .. } => (push_constant_size as usize, false),
        };
        let bytes = NonNull::from(&self.push_constants[..size]).cast();
        let index = PUSH_CONSTANT_BUFFER_INDEX as usize;
        match (&self.encoder, graphics) {
            (Encoder::Render(encoder), true) => unsafe {
                encoder.setVertexBytes_length_atIndex(bytes, size, index);
                encoder.setFragmentBytes_length_atIndex(bytes, size, index);
            },
            (Encoder::Compute(encoder), false) => unsafe { encoder.setBytes_length_atIndex(bytes, size, index) },
            _ => {
                return Err(ridge_err!(
                    SOURCE,
                    InvalidOperation,
                    "Command buffer '{}' has no encoder for its bound pipeline",
                    self.name
                ));
            }
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()> {
        let metal_buffer = downcast_resource::<MetalBuffer, _>(buffer, GraphicsApi::Metal)?;
        self.recorder.check_vertex_buffer(buffer, offset)?;
        let encoder = self.render_encoder("bind vertex buffer")?;
        unsafe {
            encoder.setVertexBuffer_offset_atIndex(
                Some(&metal_buffer.buffer),
                offset as usize,
                VERTEX_BUFFER_INDEX as usize,
            );
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()> {
        let metal_buffer = downcast_resource::<MetalBuffer, _>(buffer, GraphicsApi::Metal)?;
        self.recorder.check_index_buffer(buffer, offset)?;
        // Index buffers are draw arguments in Metal
        self.index_buffer = Some((metal_buffer.buffer.clone(), offset));
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Scissor) -> Result<()> {
        self.recorder.check_scissor(&scissor)?;
        let encoder = self.render_encoder("set scissor")?;
        unsafe {
            encoder.setScissorRect(MTLScissorRect {
                x: scissor.x as usize,
                y: scissor.y as usize,
                width: scissor.width as usize,
                height: scissor.height as usize,
            });
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, vertex_offset: u32) -> Result<()> {
        self.recorder.check_draw(vertex_count)?;
        let encoder = self.render_encoder("draw")?;
        unsafe {
            encoder.drawPrimitives_vertexStart_vertexCount(
                MTLPrimitiveType::Triangle,
                vertex_offset as usize,
                vertex_count as usize,
            );
        }
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, index_offset: u32, vertex_offset: i32) -> Result<()> {
        self.recorder.check_draw_indexed(index_count)?;
        let (index_buffer, buffer_offset) = self.index_buffer.clone().ok_or_else(|| {
            ridge_err!(SOURCE, InvalidOperation, "Command buffer '{}' has no index buffer bound", self.name)
        })?;
        let encoder = self.render_encoder("draw indexed")?;
        let byte_offset = buffer_offset + index_offset as u64 * std::mem::size_of::<u32>() as u64;
        unsafe {
            encoder.drawIndexedPrimitives_indexCount_indexType_indexBuffer_indexBufferOffset_instanceCount_baseVertex_baseInstance(
                MTLPrimitiveType::Triangle,
                index_count as usize,
                MTLIndexType::UInt32,
                &index_buffer,
                byte_offset as usize,
                1,
                vertex_offset as isize,
                0,
            );
        }
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        let (x, y, z) = self.recorder.check_dispatch(x, y, z)?;
        let BoundPipeline::Compute { threadgroup_size, .. } = self.bound_pipeline("dispatch")? else {
            return Err(ridge_err!(
                SOURCE,
                InvalidOperation,
                "Cannot dispatch on command buffer '{}' without a compute pipeline",
                self.name
            ));
        };
        let Encoder::Compute(encoder) = &self.encoder else {
            return Err(ridge_err!(SOURCE, InvalidOperation, "Command buffer '{}' has no compute encoder", self.name));
        };
        unsafe {
            encoder.dispatchThreadgroups_threadsPerThreadgroup(
                MTLSize {
                    width: x as usize,
                    height: y as usize,
                    depth: z as usize,
                },
                MTLSize {
                    width: threadgroup_size[0] as usize,
                    height: threadgroup_size[1] as usize,
                    depth: threadgroup_size[2] as usize,
                },
            );
        }
        Ok(())
    }

    // Metal debug groups carry no color
    fn begin_debug_region(&mut self, name: &str, _color: Vec4) -> Result<()> {
        self.recorder.begin_debug_region(name)?;
        unsafe { self.native()?.pushDebugGroup(&label(name)) };
        Ok(())
    }

    fn insert_debug_marker(&mut self, name: &str, _color: Vec4) -> Result<()> {
        self.recorder.check_debug_marker(name)?;
        // Signposts live on encoders; between encoders there is nothing to mark
        if let Some(encoder) = self.encoder.as_command_encoder() {
            unsafe { encoder.insertDebugSignpost(&label(name)) };
        }
        Ok(())
    }

    fn end_debug_region(&mut self) -> Result<()> {
        self.recorder.end_debug_region()?;
        unsafe { self.native()?.popDebugGroup() };
        Ok(())
    }

    fn queue_buffer_for_destruction(&mut self, buffer: Box<dyn Buffer>) {
        self.recorder.queue_buffer(buffer);
    }

    fn queue_image_for_destruction(&mut self, image: Box<dyn Image>) {
        self.recorder.queue_image(image);
    }
}

impl Drop for MetalCommandBuffer {
    fn drop(&mut self) {
        // Metal asserts when an open encoder is released
        self.end_encoding();
        if self.recorder.state() == CommandBufferState::Submitted {
            if let Some(native) = &self.native {
                unsafe { native.waitUntilCompleted() };
            }
        }
    }
}
