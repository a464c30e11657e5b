//! Command buffer trait, usage enums and the recording state machine
//!
//! Every backend command buffer embeds a [`CommandRecorder`]. The recorder
//! owns the lifecycle state, the render pass and pipeline scopes, the debug
//! region depth and the resources queued for deferred destruction. Each
//! backend method first asks the recorder to validate the call, then encodes
//! the native command. Validation is therefore identical on every backend.
//!
//! Lifecycle:
//!
//! ```text
//! Initial --begin--> Recording --end--> Executable --submit--> Submitted
//!    ^                   ^                                        |
//!    |                   +----------------begin-------------- Completed
//! ```

use std::any::Any;
use glam::{UVec3, Vec4};
use crate::error::Result;
use crate::rhi::buffer::{Buffer, BufferUsage};
use crate::rhi::image::{Image, ImageUsage};
use crate::rhi::pipeline::{ComputePipeline, GraphicsPipeline, MAX_PUSH_CONSTANT_SIZE};
use crate::rhi::render_pass::{RenderPass, RenderPassBeginAttachment};
use crate::rhi::rendering_resource::{validate_name, GraphicsApi, RenderingResource};
use crate::rhi::resource_table::ResourceTable;
use crate::{ridge_bail, ridge_ensure};

const SOURCE: &str = "ridge::rhi::CommandBuffer";

/// How a command accesses a buffer region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferCommandUsage {
    None,
    MemoryRead,
    MemoryWrite,
    VertexRead,
    IndexRead,
    GraphicsRead,
    GraphicsWrite,
    ComputeRead,
    ComputeWrite,
}

impl BufferCommandUsage {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            BufferCommandUsage::MemoryWrite | BufferCommandUsage::GraphicsWrite | BufferCommandUsage::ComputeWrite
        )
    }
}

/// How a command accesses an image subresource range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageCommandUsage {
    None,
    MemoryRead,
    MemoryWrite,
    ColorRead,
    ColorWrite,
    DepthRead,
    DepthWrite,
    GraphicsRead,
    GraphicsWrite,
    ComputeRead,
    ComputeWrite,
    Present,
}

impl ImageCommandUsage {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ImageCommandUsage::MemoryWrite
                | ImageCommandUsage::ColorWrite
                | ImageCommandUsage::DepthWrite
                | ImageCommandUsage::GraphicsWrite
                | ImageCommandUsage::ComputeWrite
        )
    }
}

/// Lifecycle state of a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    Initial,
    Recording,
    /// Recorded and ready to submit
    Executable,
    /// Handed to a queue, GPU completion not yet observed
    Submitted,
    Completed,
}

/// Descriptor for creating a command buffer
#[derive(Debug, Clone)]
pub struct CommandBufferDesc<'a> {
    pub name: &'a str,
}

impl CommandBufferDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        validate_name("Command buffer", self.name)
    }
}

/// Pixel rectangle draws are clipped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scissor {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Region of a buffer-to-image copy
///
/// A zero component of `pixel_range` extends the copy to the edge of the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferImageCopy {
    pub level: u32,
    pub layer: u32,
    /// Byte offset of the first pixel in the source buffer
    pub source_offset: u64,
    pub pixel_offset: UVec3,
    pub pixel_range: UVec3,
}

/// Byte range of a buffer, after defaults are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRange {
    pub offset: u64,
    pub size: u64,
}

/// Levels and layers of an image, after defaults are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSubresourceRange {
    pub base_level: u32,
    pub level_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

/// Buffer-to-image copy with every default resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedImageCopy {
    pub level: u32,
    pub layer: u32,
    pub source_offset: u64,
    pub pixel_offset: UVec3,
    pub pixel_range: UVec3,
    /// Bytes read from the source buffer
    pub byte_size: u64,
}

/// Command buffer trait
///
/// Recording is single threaded (`&mut self`); a command buffer is
/// submitted through the [`crate::rhi::queue::Queue`] that created it.
pub trait CommandBuffer: RenderingResource {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn state(&self) -> CommandBufferState;

    /// Value of the device completion counter that marks this buffer done
    /// (0 until first submitted)
    fn completion_signal_value(&self) -> u64;

    fn begin(&mut self) -> Result<()>;

    fn end(&mut self) -> Result<()>;

    /// Declare that `[offset, offset + size)` of `buffer` goes from `previous`
    /// to `next` usage (`size == 0` means up to the end)
    fn synchronize_buffer_usage(
        &mut self,
        buffer: &dyn Buffer,
        previous: BufferCommandUsage,
        next: BufferCommandUsage,
        offset: u64,
        size: u64,
    ) -> Result<()>;

    /// Declare a usage transition of a level/layer range of `image`
    /// (a count of 0 means all remaining levels or layers)
    #[allow(clippy::too_many_arguments)]
    fn synchronize_image_usage(
        &mut self,
        image: &dyn Image,
        previous: ImageCommandUsage,
        next: ImageCommandUsage,
        base_level: u32,
        level_count: u32,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<()>;

    /// Copy `size` bytes (0 = rest of the source)
    fn copy_buffer_to_buffer(
        &mut self,
        source: &dyn Buffer,
        destination: &dyn Buffer,
        size: u64,
        source_offset: u64,
        destination_offset: u64,
    ) -> Result<()>;

    fn copy_buffer_to_image(&mut self, source: &dyn Buffer, destination: &dyn Image, region: &BufferImageCopy) -> Result<()>;

    /// Fill levels 1.. of every layer by downsampling level 0.
    /// Level 0 must be in `MemoryWrite` usage; afterwards every level is in `MemoryRead`.
    fn generate_mip_maps_for_image(&mut self, image: &dyn Image) -> Result<()>;

    fn begin_render_pass(&mut self, render_pass: &dyn RenderPass, attachments: &[RenderPassBeginAttachment]) -> Result<()>;

    fn begin_next_subpass(&mut self, render_pass: &dyn RenderPass) -> Result<()>;

    fn end_render_pass(&mut self, render_pass: &dyn RenderPass) -> Result<()>;

    fn begin_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) -> Result<()>;

    fn end_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) -> Result<()>;

    fn begin_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline) -> Result<()>;

    fn end_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline) -> Result<()>;

    fn bind_resource_table(&mut self, resource_table: &dyn ResourceTable) -> Result<()>;

    fn push_constants(&mut self, data: &[u8], offset: u32) -> Result<()>;

    fn bind_vertex_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()>;

    fn bind_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()>;

    fn set_scissor(&mut self, scissor: Scissor) -> Result<()>;

    fn draw(&mut self, vertex_count: u32, vertex_offset: u32) -> Result<()>;

    /// Indices are `u32`
    fn draw_indexed(&mut self, index_count: u32, index_offset: u32, vertex_offset: i32) -> Result<()>;

    /// A `y` or `z` of 0 is treated as 1
    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()>;

    fn begin_debug_region(&mut self, name: &str, color: Vec4) -> Result<()>;

    fn insert_debug_marker(&mut self, name: &str, color: Vec4) -> Result<()>;

    fn end_debug_region(&mut self) -> Result<()>;

    /// Keep `buffer` alive until this command buffer completes on the GPU
    fn queue_buffer_for_destruction(&mut self, buffer: Box<dyn Buffer>);

    /// Keep `image` alive until this command buffer completes on the GPU
    fn queue_image_for_destruction(&mut self, image: Box<dyn Image>);
}

/// Mutable counterpart of [`crate::rhi::rendering_resource::downcast_resource`]
pub fn downcast_command_buffer_mut<T: 'static>(
    command_buffer: &mut dyn CommandBuffer,
    expected: GraphicsApi,
) -> Result<&mut T> {
    ridge_ensure!(
        command_buffer.graphics_api() == expected,
        SOURCE,
        UnexpectedType,
        "Command buffer '{}' was created by the {} backend, expected {}",
        command_buffer.name(),
        command_buffer.graphics_api().name(),
        expected.name()
    );
    let name = command_buffer.name().to_string();
    match command_buffer.as_any_mut().downcast_mut::<T>() {
        Some(concrete) => Ok(concrete),
        None => ridge_bail!(
            SOURCE,
            UnexpectedType,
            "Command buffer '{}' is not a {}",
            name,
            std::any::type_name::<T>()
        ),
    }
}

#[derive(Debug, Clone, Copy)]
struct RenderPassScope {
    current_subpass: u32,
    subpass_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineScope {
    Graphics { push_constant_size: u32 },
    Compute { push_constant_size: u32 },
}

/// Backend-independent half of a command buffer
pub struct CommandRecorder {
    name: String,
    state: CommandBufferState,
    render_pass: Option<RenderPassScope>,
    pipeline: Option<PipelineScope>,
    index_buffer_bound: bool,
    debug_region_depth: u32,
    queued_buffers: Vec<Box<dyn Buffer>>,
    queued_images: Vec<Box<dyn Image>>,
    signal_value: u64,
}

impl CommandRecorder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: CommandBufferState::Initial,
            render_pass: None,
            pipeline: None,
            index_buffer_bound: false,
            debug_region_depth: 0,
            queued_buffers: Vec::new(),
            queued_images: Vec::new(),
            signal_value: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn signal_value(&self) -> u64 {
        self.signal_value
    }

    pub fn queued_buffer_count(&self) -> usize {
        self.queued_buffers.len()
    }

    pub fn queued_image_count(&self) -> usize {
        self.queued_images.len()
    }

    /// Current subpass index, `None` outside a render pass
    pub fn current_subpass(&self) -> Option<u32> {
        self.render_pass.map(|scope| scope.current_subpass)
    }

    // ===== LIFECYCLE =====

    /// Start recording. `gpu_completed` tells whether the backend observed
    /// completion of the last submission.
    pub fn begin(&mut self, gpu_completed: bool) -> Result<()> {
        match self.state {
            CommandBufferState::Recording => ridge_bail!(
                SOURCE,
                InvalidOperation,
                "Cannot begin command buffer '{}' while it is already recording",
                self.name
            ),
            CommandBufferState::Submitted if !gpu_completed => ridge_bail!(
                SOURCE,
                InvalidOperation,
                "Cannot begin command buffer '{}' while its previous submission is still executing",
                self.name
            ),
            CommandBufferState::Submitted => self.mark_completed(),
            _ => {}
        }

        self.render_pass = None;
        self.pipeline = None;
        self.index_buffer_bound = false;
        self.debug_region_depth = 0;
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        self.ensure_recording("end")?;
        ridge_ensure!(
            self.render_pass.is_none(),
            SOURCE,
            InvalidOperation,
            "Cannot end command buffer '{}' inside a render pass",
            self.name
        );
        ridge_ensure!(
            self.pipeline.is_none(),
            SOURCE,
            InvalidOperation,
            "Cannot end command buffer '{}' while a pipeline is still bound",
            self.name
        );
        ridge_ensure!(
            self.debug_region_depth == 0,
            SOURCE,
            InvalidOperation,
            "Cannot end command buffer '{}' with {} open debug region(s)",
            self.name,
            self.debug_region_depth
        );
        self.state = CommandBufferState::Executable;
        Ok(())
    }

    /// Record a submission that signals `signal_value` on completion
    pub fn mark_submitted(&mut self, signal_value: u64) -> Result<()> {
        ridge_ensure!(
            self.state == CommandBufferState::Executable,
            SOURCE,
            InvalidOperation,
            "Command buffer '{}' must be ended before submission (state: {:?})",
            self.name,
            self.state
        );
        self.signal_value = signal_value;
        self.state = CommandBufferState::Submitted;
        Ok(())
    }

    /// GPU completion observed: release everything queued for destruction
    pub fn mark_completed(&mut self) {
        if self.state == CommandBufferState::Submitted {
            self.state = CommandBufferState::Completed;
        }
        self.queued_buffers.clear();
        self.queued_images.clear();
    }

    pub fn queue_buffer(&mut self, buffer: Box<dyn Buffer>) {
        self.queued_buffers.push(buffer);
    }

    pub fn queue_image(&mut self, image: Box<dyn Image>) {
        self.queued_images.push(image);
    }

    // ===== SCOPE CHECKS =====

    pub fn ensure_recording(&self, operation: &str) -> Result<()> {
        ridge_ensure!(
            self.state == CommandBufferState::Recording,
            SOURCE,
            InvalidOperation,
            "Cannot {} on command buffer '{}', it is not recording (state: {:?})",
            operation,
            self.name,
            self.state
        );
        Ok(())
    }

    fn ensure_outside_render_pass(&self, operation: &str) -> Result<()> {
        self.ensure_recording(operation)?;
        ridge_ensure!(
            self.render_pass.is_none(),
            SOURCE,
            InvalidOperation,
            "Cannot {} inside a render pass of command buffer '{}'",
            operation,
            self.name
        );
        Ok(())
    }

    fn ensure_graphics_pipeline(&self, operation: &str) -> Result<u32> {
        self.ensure_recording(operation)?;
        match self.pipeline {
            Some(PipelineScope::Graphics { push_constant_size }) => Ok(push_constant_size),
            _ => ridge_bail!(
                SOURCE,
                InvalidOperation,
                "Cannot {} on command buffer '{}' without a bound graphics pipeline",
                operation,
                self.name
            ),
        }
    }

    fn ensure_any_pipeline(&self, operation: &str) -> Result<u32> {
        self.ensure_recording(operation)?;
        match self.pipeline {
            Some(PipelineScope::Graphics { push_constant_size })
            | Some(PipelineScope::Compute { push_constant_size }) => Ok(push_constant_size),
            None => ridge_bail!(
                SOURCE,
                InvalidOperation,
                "Cannot {} on command buffer '{}' without a bound pipeline",
                operation,
                self.name
            ),
        }
    }

    // ===== SYNCHRONIZATION =====

    /// Validate a buffer usage transition; `None` when it is a no-op
    pub fn check_buffer_usage(
        &self,
        buffer: &dyn Buffer,
        previous: BufferCommandUsage,
        next: BufferCommandUsage,
        offset: u64,
        size: u64,
    ) -> Result<Option<BufferRange>> {
        self.ensure_recording("synchronize buffer usage")?;
        ridge_ensure!(
            next != BufferCommandUsage::None,
            SOURCE,
            InvalidValue,
            "Cannot synchronize buffer '{}' to BufferCommandUsage::None",
            buffer.name()
        );

        let memory_size = buffer.memory_size();
        ridge_ensure!(
            offset < memory_size,
            SOURCE,
            ValueOutOfRange,
            "Cannot synchronize buffer '{}' from offset {}, it is {} bytes",
            buffer.name(),
            offset,
            memory_size
        );
        let size = if size == 0 { memory_size - offset } else { size };
        ridge_ensure!(
            offset.checked_add(size).is_some_and(|end| end <= memory_size),
            SOURCE,
            InvalidRange,
            "Cannot synchronize range [{}, +{}) of buffer '{}', which is {} bytes",
            offset,
            size,
            buffer.name(),
            memory_size
        );

        if previous == next {
            return Ok(None);
        }
        Ok(Some(BufferRange { offset, size }))
    }

    /// Validate an image usage transition; `None` when it is a no-op
    #[allow(clippy::too_many_arguments)]
    pub fn check_image_usage(
        &self,
        image: &dyn Image,
        previous: ImageCommandUsage,
        next: ImageCommandUsage,
        base_level: u32,
        level_count: u32,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<Option<ImageSubresourceRange>> {
        self.ensure_recording("synchronize image usage")?;
        ridge_ensure!(
            next != ImageCommandUsage::None,
            SOURCE,
            InvalidValue,
            "Cannot synchronize image '{}' to ImageCommandUsage::None",
            image.name()
        );

        let range = resolve_subresource_range(image, base_level, level_count, base_layer, layer_count)?;
        if previous == next {
            return Ok(None);
        }
        Ok(Some(range))
    }

    // ===== COPIES =====

    /// Validate a buffer-to-buffer copy and resolve its size
    pub fn check_copy_buffer_to_buffer(
        &self,
        source: &dyn Buffer,
        destination: &dyn Buffer,
        size: u64,
        source_offset: u64,
        destination_offset: u64,
    ) -> Result<u64> {
        self.ensure_outside_render_pass("copy buffer to buffer")?;
        ridge_ensure!(
            source.usage().contains(BufferUsage::SOURCE_MEMORY),
            SOURCE,
            InvalidConfiguration,
            "Cannot copy from buffer '{}', it lacks SOURCE_MEMORY usage",
            source.name()
        );
        ridge_ensure!(
            destination.usage().contains(BufferUsage::DESTINATION_MEMORY),
            SOURCE,
            InvalidConfiguration,
            "Cannot copy to buffer '{}', it lacks DESTINATION_MEMORY usage",
            destination.name()
        );

        let size = if size == 0 { source.memory_size().saturating_sub(source_offset) } else { size };
        ridge_ensure!(
            size > 0,
            SOURCE,
            InvalidValue,
            "Copy from buffer '{}' at offset {} has nothing to copy",
            source.name(),
            source_offset
        );
        ridge_ensure!(
            source_offset.checked_add(size).is_some_and(|end| end <= source.memory_size()),
            SOURCE,
            InvalidRange,
            "Source range [{}, +{}) overflows buffer '{}' of {} bytes",
            source_offset,
            size,
            source.name(),
            source.memory_size()
        );
        ridge_ensure!(
            destination_offset.checked_add(size).is_some_and(|end| end <= destination.memory_size()),
            SOURCE,
            InvalidRange,
            "Destination range [{}, +{}) overflows buffer '{}' of {} bytes",
            destination_offset,
            size,
            destination.name(),
            destination.memory_size()
        );
        Ok(size)
    }

    /// Validate a buffer-to-image copy and resolve its region
    pub fn check_copy_buffer_to_image(
        &self,
        source: &dyn Buffer,
        destination: &dyn Image,
        region: &BufferImageCopy,
    ) -> Result<ResolvedImageCopy> {
        self.ensure_outside_render_pass("copy buffer to image")?;
        ridge_ensure!(
            source.usage().contains(BufferUsage::SOURCE_MEMORY),
            SOURCE,
            InvalidConfiguration,
            "Cannot copy from buffer '{}', it lacks SOURCE_MEMORY usage",
            source.name()
        );
        ridge_ensure!(
            destination.usage().contains(ImageUsage::DESTINATION_MEMORY),
            SOURCE,
            InvalidConfiguration,
            "Cannot copy to image '{}', it lacks DESTINATION_MEMORY usage",
            destination.name()
        );
        ridge_ensure!(
            region.level < destination.level_count(),
            SOURCE,
            ValueOutOfRange,
            "Level {} of image '{}' does not exist, it has {}",
            region.level,
            destination.name(),
            destination.level_count()
        );
        ridge_ensure!(
            region.layer < destination.layer_count(),
            SOURCE,
            ValueOutOfRange,
            "Layer {} of image '{}' does not exist, it has {}",
            region.layer,
            destination.name(),
            destination.layer_count()
        );

        let extent = UVec3::new(
            destination.level_width(region.level),
            destination.level_height(region.level),
            (destination.depth() >> region.level).max(1),
        );
        let offset = region.pixel_offset;
        let range = UVec3::new(
            if region.pixel_range.x == 0 { extent.x.saturating_sub(offset.x) } else { region.pixel_range.x },
            if region.pixel_range.y == 0 { extent.y.saturating_sub(offset.y) } else { region.pixel_range.y },
            if region.pixel_range.z == 0 { extent.z.saturating_sub(offset.z) } else { region.pixel_range.z },
        );
        let fits = |o: u32, r: u32, e: u32| r > 0 && o.checked_add(r).is_some_and(|end| end <= e);
        ridge_ensure!(
            fits(offset.x, range.x, extent.x) && fits(offset.y, range.y, extent.y) && fits(offset.z, range.z, extent.z),
            SOURCE,
            InvalidRange,
            "Pixel region {:?} + {:?} does not fit level {} ({:?}) of image '{}'",
            offset,
            range,
            region.level,
            extent,
            destination.name()
        );

        let block = destination.format().block_size();
        ridge_ensure!(
            offset.x % block == 0 && offset.y % block == 0,
            SOURCE,
            InvalidValue,
            "Pixel offset {:?} into image '{}' must be aligned to its {} pixel blocks",
            offset,
            destination.name(),
            block
        );

        let byte_size = destination.format().memory_size(range.x, range.y, range.z);
        ridge_ensure!(
            region.source_offset.checked_add(byte_size).is_some_and(|end| end <= source.memory_size()),
            SOURCE,
            InvalidRange,
            "Copy reads [{}, +{}) of buffer '{}', which is {} bytes",
            region.source_offset,
            byte_size,
            source.name(),
            source.memory_size()
        );

        Ok(ResolvedImageCopy {
            level: region.level,
            layer: region.layer,
            source_offset: region.source_offset,
            pixel_offset: offset,
            pixel_range: range,
            byte_size,
        })
    }

    pub fn check_generate_mip_maps(&self, image: &dyn Image) -> Result<()> {
        self.ensure_outside_render_pass("generate mip maps")?;
        ridge_ensure!(
            image.usage().contains(ImageUsage::SOURCE_MEMORY | ImageUsage::DESTINATION_MEMORY),
            SOURCE,
            InvalidConfiguration,
            "Generating mip maps for image '{}' requires SOURCE_MEMORY and DESTINATION_MEMORY usage",
            image.name()
        );
        ridge_ensure!(
            !image.format().is_compressed(),
            SOURCE,
            UnsupportedFeature,
            "Cannot generate mip maps for image '{}' with compressed format {:?}",
            image.name(),
            image.format()
        );
        Ok(())
    }

    // ===== RENDER PASS =====

    pub fn begin_render_pass(&mut self, render_pass: &dyn RenderPass, attachments: &[RenderPassBeginAttachment]) -> Result<()> {
        self.ensure_outside_render_pass("begin render pass")?;
        ridge_ensure!(
            self.pipeline.is_none(),
            SOURCE,
            InvalidOperation,
            "Cannot begin render pass '{}' while a pipeline is bound",
            render_pass.name()
        );
        ridge_ensure!(
            attachments.len() as u32 == render_pass.attachment_count(),
            SOURCE,
            UnexpectedSize,
            "Render pass '{}' expects {} attachments, got {}",
            render_pass.name(),
            render_pass.attachment_count(),
            attachments.len()
        );

        let (width, height) = render_pass.extent();
        for (index, attachment) in attachments.iter().enumerate() {
            let image = attachment.output_image;
            ridge_ensure!(
                image.width() == width && image.height() == height,
                SOURCE,
                UnexpectedSize,
                "Attachment {} ('{}') is {}x{}, render pass '{}' was created for {}x{}",
                index,
                image.name(),
                image.width(),
                image.height(),
                render_pass.name(),
                width,
                height
            );
        }

        self.render_pass = Some(RenderPassScope {
            current_subpass: 0,
            subpass_count: render_pass.subpass_count(),
        });
        Ok(())
    }

    /// Advance to the next subpass and return its index
    pub fn begin_next_subpass(&mut self, render_pass: &dyn RenderPass) -> Result<u32> {
        self.ensure_recording("begin next subpass")?;
        ridge_ensure!(
            self.pipeline.is_none(),
            SOURCE,
            InvalidOperation,
            "Cannot advance render pass '{}' while a pipeline is bound",
            render_pass.name()
        );
        let Some(scope) = self.render_pass.as_mut() else {
            ridge_bail!(
                SOURCE,
                InvalidOperation,
                "Cannot begin next subpass of '{}' outside a render pass",
                render_pass.name()
            );
        };
        ridge_ensure!(
            scope.current_subpass + 1 < scope.subpass_count,
            SOURCE,
            InvalidOperation,
            "Render pass '{}' has no subpass after {}",
            render_pass.name(),
            scope.current_subpass
        );
        scope.current_subpass += 1;
        Ok(scope.current_subpass)
    }

    pub fn end_render_pass(&mut self, render_pass: &dyn RenderPass) -> Result<()> {
        self.ensure_recording("end render pass")?;
        ridge_ensure!(
            self.pipeline.is_none(),
            SOURCE,
            InvalidOperation,
            "Cannot end render pass '{}' while a pipeline is bound",
            render_pass.name()
        );
        let Some(scope) = self.render_pass else {
            ridge_bail!(
                SOURCE,
                InvalidOperation,
                "Cannot end render pass '{}', none was begun",
                render_pass.name()
            );
        };
        ridge_ensure!(
            scope.current_subpass + 1 == scope.subpass_count,
            SOURCE,
            InvalidOperation,
            "Cannot end render pass '{}' in subpass {} of {}",
            render_pass.name(),
            scope.current_subpass,
            scope.subpass_count
        );
        self.render_pass = None;
        Ok(())
    }

    // ===== PIPELINES =====

    pub fn begin_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) -> Result<()> {
        self.ensure_recording("begin graphics pipeline")?;
        ridge_ensure!(
            self.render_pass.is_some(),
            SOURCE,
            InvalidOperation,
            "Graphics pipeline '{}' must be begun inside a render pass",
            pipeline.name()
        );
        ridge_ensure!(
            self.pipeline.is_none(),
            SOURCE,
            InvalidOperation,
            "Cannot begin graphics pipeline '{}', another pipeline is still bound",
            pipeline.name()
        );
        self.pipeline = Some(PipelineScope::Graphics {
            push_constant_size: pipeline.push_constant_size(),
        });
        self.index_buffer_bound = false;
        Ok(())
    }

    pub fn end_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) -> Result<()> {
        self.ensure_recording("end graphics pipeline")?;
        ridge_ensure!(
            matches!(self.pipeline, Some(PipelineScope::Graphics { .. })),
            SOURCE,
            InvalidOperation,
            "Cannot end graphics pipeline '{}', it is not the bound pipeline",
            pipeline.name()
        );
        self.pipeline = None;
        self.index_buffer_bound = false;
        Ok(())
    }

    pub fn begin_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline) -> Result<()> {
        self.ensure_outside_render_pass("begin compute pipeline")?;
        ridge_ensure!(
            self.pipeline.is_none(),
            SOURCE,
            InvalidOperation,
            "Cannot begin compute pipeline '{}', another pipeline is still bound",
            pipeline.name()
        );
        self.pipeline = Some(PipelineScope::Compute {
            push_constant_size: pipeline.push_constant_size(),
        });
        Ok(())
    }

    pub fn end_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline) -> Result<()> {
        self.ensure_recording("end compute pipeline")?;
        ridge_ensure!(
            matches!(self.pipeline, Some(PipelineScope::Compute { .. })),
            SOURCE,
            InvalidOperation,
            "Cannot end compute pipeline '{}', it is not the bound pipeline",
            pipeline.name()
        );
        self.pipeline = None;
        Ok(())
    }

    // ===== BINDING =====

    pub fn check_bind_resource_table(&self, resource_table: &dyn ResourceTable) -> Result<()> {
        ridge_ensure!(
            self.pipeline.is_some(),
            SOURCE,
            InvalidOperation,
            "Resource table '{}' must be bound after a pipeline on command buffer '{}'",
            resource_table.name(),
            self.name
        );
        self.ensure_recording("bind resource table")
    }

    pub fn check_push_constants(&self, data: &[u8], offset: u32) -> Result<()> {
        let declared = self.ensure_any_pipeline("push constants")?;
        ridge_ensure!(
            !data.is_empty(),
            SOURCE,
            InvalidValue,
            "Cannot push an empty constant block on command buffer '{}'",
            self.name
        );
        let end = offset as u64 + data.len() as u64;
        ridge_ensure!(
            end <= MAX_PUSH_CONSTANT_SIZE as u64,
            SOURCE,
            InvalidRange,
            "Push constant range [{}, +{}) exceeds the maximum of {} bytes",
            offset,
            data.len(),
            MAX_PUSH_CONSTANT_SIZE
        );
        ridge_ensure!(
            end <= declared as u64,
            SOURCE,
            InvalidRange,
            "Push constant range [{}, +{}) exceeds the {} bytes declared by the bound pipeline",
            offset,
            data.len(),
            declared
        );
        Ok(())
    }

    fn check_geometry_buffer(&self, buffer: &dyn Buffer, offset: u64, usage: BufferUsage, operation: &str) -> Result<()> {
        self.ensure_graphics_pipeline(operation)?;
        ridge_ensure!(
            buffer.usage().contains(usage),
            SOURCE,
            InvalidConfiguration,
            "Cannot {} '{}', it lacks {:?} usage",
            operation,
            buffer.name(),
            usage
        );
        ridge_ensure!(
            offset < buffer.memory_size(),
            SOURCE,
            ValueOutOfRange,
            "Cannot {} '{}' at offset {}, it is {} bytes",
            operation,
            buffer.name(),
            offset,
            buffer.memory_size()
        );
        Ok(())
    }

    pub fn check_vertex_buffer(&self, buffer: &dyn Buffer, offset: u64) -> Result<()> {
        self.check_geometry_buffer(buffer, offset, BufferUsage::VERTEX, "bind vertex buffer")
    }

    pub fn check_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()> {
        self.check_geometry_buffer(buffer, offset, BufferUsage::INDEX, "bind index buffer")?;
        self.index_buffer_bound = true;
        Ok(())
    }

    pub fn check_scissor(&self, scissor: &Scissor) -> Result<()> {
        self.ensure_recording("set scissor")?;
        ridge_ensure!(
            self.render_pass.is_some(),
            SOURCE,
            InvalidOperation,
            "Scissor {:?} must be set inside a render pass",
            scissor
        );
        Ok(())
    }

    // ===== DRAW / DISPATCH =====

    pub fn check_draw(&self, vertex_count: u32) -> Result<()> {
        self.ensure_graphics_pipeline("draw")?;
        ridge_ensure!(
            vertex_count != 0,
            SOURCE,
            InvalidValue,
            "Cannot draw 0 vertices on command buffer '{}'",
            self.name
        );
        Ok(())
    }

    pub fn check_draw_indexed(&self, index_count: u32) -> Result<()> {
        self.ensure_graphics_pipeline("draw indexed")?;
        ridge_ensure!(
            index_count != 0,
            SOURCE,
            InvalidValue,
            "Cannot draw 0 indices on command buffer '{}'",
            self.name
        );
        ridge_ensure!(
            self.index_buffer_bound,
            SOURCE,
            InvalidOperation,
            "Cannot draw indexed on command buffer '{}' without a bound index buffer",
            self.name
        );
        Ok(())
    }

    /// Validate a dispatch and return the group counts with 0 replaced by 1 on y and z
    pub fn check_dispatch(&self, x: u32, y: u32, z: u32) -> Result<(u32, u32, u32)> {
        self.ensure_recording("dispatch")?;
        ridge_ensure!(
            matches!(self.pipeline, Some(PipelineScope::Compute { .. })),
            SOURCE,
            InvalidOperation,
            "Cannot dispatch on command buffer '{}' without a bound compute pipeline",
            self.name
        );
        ridge_ensure!(
            x != 0,
            SOURCE,
            InvalidValue,
            "Dispatch group count x must not be 0 on command buffer '{}'",
            self.name
        );
        Ok((x, y.max(1), z.max(1)))
    }

    // ===== DEBUG REGIONS =====

    pub fn begin_debug_region(&mut self, name: &str) -> Result<()> {
        self.ensure_recording("begin debug region")?;
        validate_name("Debug region", name)?;
        self.debug_region_depth += 1;
        Ok(())
    }

    pub fn check_debug_marker(&self, name: &str) -> Result<()> {
        self.ensure_recording("insert debug marker")?;
        validate_name("Debug marker", name)
    }

    pub fn end_debug_region(&mut self) -> Result<()> {
        self.ensure_recording("end debug region")?;
        ridge_ensure!(
            self.debug_region_depth > 0,
            SOURCE,
            InvalidOperation,
            "Command buffer '{}' has no open debug region to end",
            self.name
        );
        self.debug_region_depth -= 1;
        Ok(())
    }
}

/// Validate and resolve a level/layer range of `image`
pub fn resolve_subresource_range(
    image: &dyn Image,
    base_level: u32,
    level_count: u32,
    base_layer: u32,
    layer_count: u32,
) -> Result<ImageSubresourceRange> {
    ridge_ensure!(
        base_level < image.level_count(),
        SOURCE,
        ValueOutOfRange,
        "Base level {} of image '{}' does not exist, it has {}",
        base_level,
        image.name(),
        image.level_count()
    );
    ridge_ensure!(
        base_layer < image.layer_count(),
        SOURCE,
        ValueOutOfRange,
        "Base layer {} of image '{}' does not exist, it has {}",
        base_layer,
        image.name(),
        image.layer_count()
    );

    let level_count = if level_count == 0 { image.level_count() - base_level } else { level_count };
    let layer_count = if layer_count == 0 { image.layer_count() - base_layer } else { layer_count };
    ridge_ensure!(
        base_level.checked_add(level_count).is_some_and(|end| end <= image.level_count()),
        SOURCE,
        InvalidRange,
        "Levels [{}, +{}) overflow image '{}' with {} levels",
        base_level,
        level_count,
        image.name(),
        image.level_count()
    );
    ridge_ensure!(
        base_layer.checked_add(layer_count).is_some_and(|end| end <= image.layer_count()),
        SOURCE,
        InvalidRange,
        "Layers [{}, +{}) overflow image '{}' with {} layers",
        base_layer,
        layer_count,
        image.name(),
        image.layer_count()
    );

    Ok(ImageSubresourceRange {
        base_level,
        level_count,
        base_layer,
        layer_count,
    })
}

#[cfg(test)]
#[path = "command_buffer_tests.rs"]
mod tests;
