/// CommandBuffer - Vulkan implementation of the CommandBuffer trait
///
/// Each command buffer owns its command pool, so recording never contends
/// with other threads. The embedded `CommandRecorder` validates every call
/// before the native command is encoded.

use ash::vk;
use ridge_rhi::glam::Vec4;
use ridge_rhi::ridge::rhi::{
    downcast_resource, Buffer, BufferCommandUsage, BufferImageCopy, CommandBuffer, CommandBufferState,
    CommandRecorder, ComputePipeline, GraphicsApi, GraphicsPipeline, Image, ImageCommandUsage, RenderPass,
    RenderPassBeginAttachment, RenderingResource, ResourceTable, Scissor,
};
use ridge_rhi::ridge::Result;
use ridge_rhi::ridge_err;
use std::any::Any;
use std::ffi::CString;
use std::sync::Arc;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::{vk_error, GpuContext, VulkanTimeline, SOURCE};
use crate::vulkan_format::{blit_filter, buffer_usage_barrier, image_aspect, image_usage_barrier};
use crate::vulkan_image::VulkanImage;
use crate::vulkan_pipeline::{
    VulkanComputePipeline, VulkanGraphicsPipeline, COMPUTE_PUSH_CONSTANT_STAGES, GRAPHICS_PUSH_CONSTANT_STAGES,
};
use crate::vulkan_render_pass::VulkanRenderPass;
use crate::vulkan_resource_table::VulkanResourceTable;

/// Pipeline state needed by bindings and push constants
#[derive(Debug, Clone, Copy)]
struct BoundPipeline {
    bind_point: vk::PipelineBindPoint,
    layout: vk::PipelineLayout,
    push_constant_stages: vk::ShaderStageFlags,
}

/// Vulkan command buffer implementation
pub struct VulkanCommandBuffer {
    name: String,
    recorder: CommandRecorder,
    /// Timeline of the queue that created this buffer
    timeline: Arc<VulkanTimeline>,
    pool: vk::CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
    /// Created per render pass begin, destroyed once the GPU is done
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: Option<BoundPipeline>,
}

impl VulkanCommandBuffer {
    pub(crate) fn new(timeline: Arc<VulkanTimeline>, queue_family_index: u32, name: &str) -> Result<Self> {
        let ctx = Arc::clone(&timeline.ctx);
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_family_index);
        let pool = unsafe { ctx.device.create_command_pool(&pool_info, None) }
            .map_err(|e| vk_error(format_args!("create command pool of '{}'", name), e))?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = match unsafe { ctx.device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { ctx.device.destroy_command_pool(pool, None) };
                return Err(vk_error(format_args!("allocate command buffer '{}'", name), e));
            }
        };
        ctx.set_object_name(command_buffer, name);

        Ok(Self {
            name: name.to_string(),
            recorder: CommandRecorder::new(name),
            timeline,
            pool,
            command_buffer,
            framebuffers: Vec::new(),
            pipeline: None,
        })
    }

    fn ctx(&self) -> &GpuContext {
        &self.timeline.ctx
    }

    fn device(&self) -> &ash::Device {
        &self.timeline.ctx.device
    }

    /// Semaphore and value a dependent submission waits on
    pub(crate) fn completion_point(&self) -> (vk::Semaphore, u64) {
        (self.timeline.semaphore, self.recorder.signal_value())
    }

    pub(crate) fn timeline(&self) -> &Arc<VulkanTimeline> {
        &self.timeline
    }

    pub(crate) fn mark_submitted(&mut self, signal_value: u64) -> Result<()> {
        self.recorder.mark_submitted(signal_value)
    }

    /// Block until the last submission completes, then release deferred resources
    pub(crate) fn wait_completed(&mut self) -> Result<()> {
        let signal_value = self.recorder.signal_value();
        if signal_value == 0 {
            return Ok(());
        }
        self.timeline.wait(signal_value)?;
        self.recorder.mark_completed();
        Ok(())
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { self.timeline.ctx.device.destroy_framebuffer(framebuffer, None) };
        }
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

    fn debug_label(name: &str, color: Vec4) -> Result<(CString, [f32; 4])> {
        let label = CString::new(name)
            .map_err(|_| ridge_err!(SOURCE, InvalidValue, "Debug label '{}' contains a NUL byte", name))?;
        Ok((label, color.to_array()))
    }

    #[allow(clippy::too_many_arguments)]
    fn image_barrier(
        &self,
        image: &VulkanImage,
        previous: ImageCommandUsage,
        next: ImageCommandUsage,
        base_level: u32,
        level_count: u32,
        base_layer: u32,
        layer_count: u32,
    ) {
        let (src_stage, src_access, old_layout) = image_usage_barrier(previous);
        let (dst_stage, dst_access, new_layout) = image_usage_barrier(next);
        let barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.image)
            .subresource_range(image.subresource_range(base_level, level_count, base_layer, layer_count));
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}

crate::vulkan_resource!(VulkanCommandBuffer);

impl CommandBuffer for VulkanCommandBuffer {
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
        let gpu_completed = self.timeline.completed_value()? >= self.recorder.signal_value();
        self.recorder.begin(gpu_completed)?;
        self.destroy_framebuffers();
        self.pipeline = None;

        unsafe {
            self.device()
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| vk_error(format_args!("reset command buffer '{}'", self.name), e))?;
            let begin_info =
                vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device()
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| vk_error(format_args!("begin command buffer '{}'", self.name), e))?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.recorder.end()?;
        unsafe { self.device().end_command_buffer(self.command_buffer) }
            .map_err(|e| vk_error(format_args!("end command buffer '{}'", self.name), e))
    }

    fn synchronize_buffer_usage(
        &mut self,
        buffer: &dyn Buffer,
        previous: BufferCommandUsage,
        next: BufferCommandUsage,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        let vulkan_buffer = downcast_resource::<VulkanBuffer, _>(buffer, GraphicsApi::Vulkan)?;
        let Some(range) = self.recorder.check_buffer_usage(buffer, previous, next, offset, size)? else {
            return Ok(());
        };

        let (src_stage, src_access) = buffer_usage_barrier(previous);
        let (dst_stage, dst_access) = buffer_usage_barrier(next);
        let barrier = vk::BufferMemoryBarrier::default()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(vulkan_buffer.buffer)
            .offset(range.offset)
            .size(range.size);
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
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
        let vulkan_image = downcast_resource::<VulkanImage, _>(image, GraphicsApi::Vulkan)?;
        let range = self
            .recorder
            .check_image_usage(image, previous, next, base_level, level_count, base_layer, layer_count)?;
        if let Some(range) = range {
            self.image_barrier(
                vulkan_image,
                previous,
                next,
                range.base_level,
                range.level_count,
                range.base_layer,
                range.layer_count,
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
        let vulkan_source = downcast_resource::<VulkanBuffer, _>(source, GraphicsApi::Vulkan)?;
        let vulkan_destination = downcast_resource::<VulkanBuffer, _>(destination, GraphicsApi::Vulkan)?;
        let size = self
            .recorder
            .check_copy_buffer_to_buffer(source, destination, size, source_offset, destination_offset)?;

        let region = vk::BufferCopy {
            src_offset: source_offset,
            dst_offset: destination_offset,
            size,
        };
        unsafe {
            self.device()
                .cmd_copy_buffer(self.command_buffer, vulkan_source.buffer, vulkan_destination.buffer, &[region]);
        }
        Ok(())
    }

    fn copy_buffer_to_image(&mut self, source: &dyn Buffer, destination: &dyn Image, region: &BufferImageCopy) -> Result<()> {
        let vulkan_source = downcast_resource::<VulkanBuffer, _>(source, GraphicsApi::Vulkan)?;
        let vulkan_destination = downcast_resource::<VulkanImage, _>(destination, GraphicsApi::Vulkan)?;
        let copy = self.recorder.check_copy_buffer_to_image(source, destination, region)?;

        // Zero row length and image height mean tightly packed rows
        let region = vk::BufferImageCopy {
            buffer_offset: copy.source_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: image_aspect(destination.format()),
                mip_level: copy.level,
                base_array_layer: copy.layer,
                layer_count: 1,
            },
            image_offset: vk::Offset3D {
                x: copy.pixel_offset.x as i32,
                y: copy.pixel_offset.y as i32,
                z: copy.pixel_offset.z as i32,
            },
            image_extent: vk::Extent3D {
                width: copy.pixel_range.x,
                height: copy.pixel_range.y,
                depth: copy.pixel_range.z,
            },
        };
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                self.command_buffer,
                vulkan_source.buffer,
                vulkan_destination.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        Ok(())
    }

    fn generate_mip_maps_for_image(&mut self, image: &dyn Image) -> Result<()> {
        let vulkan_image = downcast_resource::<VulkanImage, _>(image, GraphicsApi::Vulkan)?;
        self.recorder.check_generate_mip_maps(image)?;

        let level_count = image.level_count();
        let layer_count = image.layer_count();
        if level_count > 1 {
            self.image_barrier(
                vulkan_image,
                ImageCommandUsage::None,
                ImageCommandUsage::MemoryWrite,
                1,
                level_count - 1,
                0,
                layer_count,
            );
        }

        let aspect = image_aspect(image.format());
        let filter = blit_filter(image.format());
        let level_extent = |level: u32| vk::Offset3D {
            x: image.level_width(level) as i32,
            y: image.level_height(level) as i32,
            z: (image.depth() >> level).max(1) as i32,
        };
        for level in 1..level_count {
            // Each source level moves to MemoryRead once written
            self.image_barrier(
                vulkan_image,
                ImageCommandUsage::MemoryWrite,
                ImageCommandUsage::MemoryRead,
                level - 1,
                1,
                0,
                layer_count,
            );
            let blit = vk::ImageBlit {
                src_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count,
                },
                src_offsets: [vk::Offset3D::default(), level_extent(level - 1)],
                dst_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count,
                },
                dst_offsets: [vk::Offset3D::default(), level_extent(level)],
            };
            unsafe {
                self.device().cmd_blit_image(
                    self.command_buffer,
                    vulkan_image.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vulkan_image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    filter,
                );
            }
        }

        self.image_barrier(
            vulkan_image,
            ImageCommandUsage::MemoryWrite,
            ImageCommandUsage::MemoryRead,
            level_count - 1,
            1,
            0,
            layer_count,
        );
        Ok(())
    }

    fn begin_render_pass(&mut self, render_pass: &dyn RenderPass, attachments: &[RenderPassBeginAttachment]) -> Result<()> {
        let vulkan_render_pass = downcast_resource::<VulkanRenderPass, _>(render_pass, GraphicsApi::Vulkan)?;
        let (views, clear_values) = vulkan_render_pass.begin_views(attachments)?;
        let (width, height) = render_pass.extent();

        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(vulkan_render_pass.render_pass)
            .attachments(&views)
            .width(width)
            .height(height)
            .layers(1);
        let framebuffer = unsafe { self.device().create_framebuffer(&framebuffer_info, None) }
            .map_err(|e| vk_error(format_args!("create framebuffer of render pass '{}'", render_pass.name()), e))?;
        if let Err(error) = self.recorder.begin_render_pass(render_pass, attachments) {
            unsafe { self.device().destroy_framebuffer(framebuffer, None) };
            return Err(error);
        }
        self.framebuffers.push(framebuffer);

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width, height },
        };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(vulkan_render_pass.render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            let device = self.device();
            device.cmd_begin_render_pass(self.command_buffer, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(self.command_buffer, 0, &[render_area]);
        }
        Ok(())
    }

    fn begin_next_subpass(&mut self, render_pass: &dyn RenderPass) -> Result<()> {
        self.recorder.begin_next_subpass(render_pass)?;
        unsafe {
            self.device()
                .cmd_next_subpass(self.command_buffer, vk::SubpassContents::INLINE);
        }
        Ok(())
    }

    fn end_render_pass(&mut self, render_pass: &dyn RenderPass) -> Result<()> {
        self.recorder.end_render_pass(render_pass)?;
        unsafe { self.device().cmd_end_render_pass(self.command_buffer) };
        Ok(())
    }

    fn begin_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) -> Result<()> {
        let vulkan_pipeline = downcast_resource::<VulkanGraphicsPipeline, _>(pipeline, GraphicsApi::Vulkan)?;
        self.recorder.begin_graphics_pipeline(pipeline)?;
        unsafe {
            self.device().cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vulkan_pipeline.pipeline,
            );
        }
        self.pipeline = Some(BoundPipeline {
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            layout: vulkan_pipeline.layout,
            push_constant_stages: GRAPHICS_PUSH_CONSTANT_STAGES,
        });
        Ok(())
    }

    fn end_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) -> Result<()> {
        self.recorder.end_graphics_pipeline(pipeline)?;
        self.pipeline = None;
        Ok(())
    }

    fn begin_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline) -> Result<()> {
        let vulkan_pipeline = downcast_resource::<VulkanComputePipeline, _>(pipeline, GraphicsApi::Vulkan)?;
        self.recorder.begin_compute_pipeline(pipeline)?;
        unsafe {
            self.device().cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::COMPUTE,
                vulkan_pipeline.pipeline,
            );
        }
        self.pipeline = Some(BoundPipeline {
            bind_point: vk::PipelineBindPoint::COMPUTE,
            layout: vulkan_pipeline.layout,
            push_constant_stages: COMPUTE_PUSH_CONSTANT_STAGES,
        });
        Ok(())
    }

    fn end_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline) -> Result<()> {
        self.recorder.end_compute_pipeline(pipeline)?;
        self.pipeline = None;
        Ok(())
    }

    fn bind_resource_table(&mut self, resource_table: &dyn ResourceTable) -> Result<()> {
        let vulkan_table = downcast_resource::<VulkanResourceTable, _>(resource_table, GraphicsApi::Vulkan)?;
        self.recorder.check_bind_resource_table(resource_table)?;
        let pipeline = self.bound_pipeline("bind resource table")?;
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.command_buffer,
                pipeline.bind_point,
                pipeline.layout,
                0,
                &[vulkan_table.set],
                &[],
            );
        }
        Ok(())
    }

    fn push_constants(&mut self, data: &[u8], offset: u32) -> Result<()> {
        self.recorder.check_push_constants(data, offset)?;
        let pipeline = self.bound_pipeline("push constants")?;
        unsafe {
            self.device().cmd_push_constants(
                self.command_buffer,
                pipeline.layout,
                pipeline.push_constant_stages,
                offset,
                data,
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()> {
        let vulkan_buffer = downcast_resource::<VulkanBuffer, _>(buffer, GraphicsApi::Vulkan)?;
        self.recorder.check_vertex_buffer(buffer, offset)?;
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[vulkan_buffer.buffer], &[offset]);
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()> {
        let vulkan_buffer = downcast_resource::<VulkanBuffer, _>(buffer, GraphicsApi::Vulkan)?;
        self.recorder.check_index_buffer(buffer, offset)?;
        unsafe {
            self.device()
                .cmd_bind_index_buffer(self.command_buffer, vulkan_buffer.buffer, offset, vk::IndexType::UINT32);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Scissor) -> Result<()> {
        self.recorder.check_scissor(&scissor)?;
        let rect = vk::Rect2D {
            offset: vk::Offset2D {
                x: scissor.x as i32,
                y: scissor.y as i32,
            },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };
        unsafe { self.device().cmd_set_scissor(self.command_buffer, 0, &[rect]) };
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, vertex_offset: u32) -> Result<()> {
        self.recorder.check_draw(vertex_count)?;
        unsafe {
            self.device()
                .cmd_draw(self.command_buffer, vertex_count, 1, vertex_offset, 0);
        }
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, index_offset: u32, vertex_offset: i32) -> Result<()> {
        self.recorder.check_draw_indexed(index_count)?;
        unsafe {
            self.device()
                .cmd_draw_indexed(self.command_buffer, index_count, 1, index_offset, vertex_offset, 0);
        }
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        let (x, y, z) = self.recorder.check_dispatch(x, y, z)?;
        unsafe { self.device().cmd_dispatch(self.command_buffer, x, y, z) };
        Ok(())
    }

    fn begin_debug_region(&mut self, name: &str, color: Vec4) -> Result<()> {
        self.recorder.begin_debug_region(name)?;
        if let Some(debug_utils) = &self.ctx().debug_utils {
            let (label, color) = Self::debug_label(name, color)?;
            let label = vk::DebugUtilsLabelEXT::default().label_name(&label).color(color);
            unsafe { debug_utils.cmd_begin_debug_utils_label(self.command_buffer, &label) };
        }
        Ok(())
    }

    fn insert_debug_marker(&mut self, name: &str, color: Vec4) -> Result<()> {
        self.recorder.check_debug_marker(name)?;
        if let Some(debug_utils) = &self.ctx().debug_utils {
            let (label, color) = Self::debug_label(name, color)?;
            let label = vk::DebugUtilsLabelEXT::default().label_name(&label).color(color);
            unsafe { debug_utils.cmd_insert_debug_utils_label(self.command_buffer, &label) };
        }
        Ok(())
    }

    fn end_debug_region(&mut self) -> Result<()> {
        self.recorder.end_debug_region()?;
        if let Some(debug_utils) = &self.ctx().debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(self.command_buffer) };
        }
        Ok(())
    }

    fn queue_buffer_for_destruction(&mut self, buffer: Box<dyn Buffer>) {
        self.recorder.queue_buffer(buffer);
    }

    fn queue_image_for_destruction(&mut self, image: Box<dyn Image>) {
        self.recorder.queue_image(image);
    }
}

impl Drop for VulkanCommandBuffer {
    fn drop(&mut self) {
        if self.recorder.state() == CommandBufferState::Submitted {
            let _ = self.timeline.wait(self.recorder.signal_value());
        }
        self.destroy_framebuffers();
        // Destroying the pool frees the command buffer
        unsafe {
            self.timeline.ctx.device.destroy_command_pool(self.pool, None);
        }
    }
}
