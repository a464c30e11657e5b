/// In-memory backend for unit tests (no GPU required)
///
/// Buffers and images are plain byte vectors. Copies and mip generation are
/// recorded as closures over those vectors and run when the command buffer is
/// submitted, so data paths can be checked end to end. Validation goes
/// through the same `CommandRecorder` and descriptor checks as the real
/// backends.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use glam::{UVec3, Vec4};
use raw_window_handle::{DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle};
use rustc_hash::{FxHashMap, FxHashSet};
use crate::error::Result;
use crate::rhi::*;
use crate::utils::event_dispatcher::{EventDispatcher, Listener, ListenerId};
use crate::ridge_ensure;

type Storage = Arc<Mutex<Vec<u8>>>;
type PendingCommand = Box<dyn FnOnce() + Send + Sync>;

macro_rules! mock_resource {
    ($type:ty) => {
        impl RenderingResource for $type {
            fn name(&self) -> &str {
                &self.name
            }

            fn graphics_api(&self) -> GraphicsApi {
                self.graphics_api
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

// ============================================================================
// Mock Window
// ============================================================================

pub struct MockWindow {
    size: Mutex<(u32, u32)>,
    scaling: f32,
    closed: AtomicBool,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            size: Mutex::new((width, height)),
            scaling: 1.0,
            closed: AtomicBool::new(false),
        })
    }

    pub fn resize(&self, width: u32, height: u32) {
        *self.size.lock().unwrap() = (width, height);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl HasWindowHandle for MockWindow {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl HasDisplayHandle for MockWindow {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl SurfaceWindow for MockWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        *self.size.lock().unwrap()
    }

    fn scaling(&self) -> f32 {
        self.scaling
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ============================================================================
// Mock Buffer
// ============================================================================

pub struct MockBuffer {
    name: String,
    graphics_api: GraphicsApi,
    memory_size: u64,
    usage: BufferUsage,
    memory_location: BufferMemoryLocation,
    storage: Storage,
}

impl MockBuffer {
    /// Bytes of the buffer, whatever its memory location
    pub fn contents(&self) -> Vec<u8> {
        self.storage.lock().unwrap().clone()
    }

    pub fn storage(&self) -> Storage {
        Arc::clone(&self.storage)
    }
}

mock_resource!(MockBuffer);

impl Buffer for MockBuffer {
    fn memory_size(&self) -> u64 {
        self.memory_size
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn memory_location(&self) -> BufferMemoryLocation {
        self.memory_location
    }

    fn copy_from_memory(&self, data: &[u8], offset: u64) -> Result<()> {
        validate_host_access(self, offset, data.len() as u64)?;
        let offset = offset as usize;
        self.storage.lock().unwrap()[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn copy_to_memory(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        validate_host_access(self, offset, out.len() as u64)?;
        let offset = offset as usize;
        out.copy_from_slice(&self.storage.lock().unwrap()[offset..offset + out.len()]);
        Ok(())
    }
}

// ============================================================================
// Mock Image
// ============================================================================

pub struct MockImage {
    name: String,
    graphics_api: GraphicsApi,
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
    /// One byte vector per (level, layer), level-major
    subresources: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockImage {
    fn new(desc: &ImageDesc, graphics_api: GraphicsApi) -> Self {
        let mut image = Self {
            name: desc.name.to_string(),
            graphics_api,
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
            subresources: Arc::default(),
        };
        let mut subresources = Vec::new();
        for level in 0..image.level_count {
            for _ in 0..image.layer_count {
                subresources.push(vec![0u8; image.level_memory_size(level) as usize]);
            }
        }
        image.subresources = Arc::new(Mutex::new(subresources));
        image
    }

    /// Bytes of one layer of one level
    pub fn subresource(&self, level: u32, layer: u32) -> Vec<u8> {
        self.subresources.lock().unwrap()[(level * self.layer_count + layer) as usize].clone()
    }
}

mock_resource!(MockImage);

impl Image for MockImage {
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

// ============================================================================
// Mock Sampler / Shader / RenderPass / Pipelines
// ============================================================================

pub struct MockSampler {
    name: String,
    graphics_api: GraphicsApi,
    pub anisotropy: SamplerAnisotropy,
}

mock_resource!(MockSampler);

impl Sampler for MockSampler {}

pub struct MockShader {
    name: String,
    graphics_api: GraphicsApi,
    shader_type: ShaderType,
    pub code_size: usize,
}

mock_resource!(MockShader);

impl Shader for MockShader {
    fn shader_type(&self) -> ShaderType {
        self.shader_type
    }
}

pub struct MockRenderPass {
    name: String,
    graphics_api: GraphicsApi,
    attachment_count: u32,
    color_attachment_count: u32,
    has_depth_attachment: bool,
    subpass_count: u32,
    extent: (u32, u32),
}

mock_resource!(MockRenderPass);

impl RenderPass for MockRenderPass {
    fn attachment_count(&self) -> u32 {
        self.attachment_count
    }

    fn color_attachment_count(&self) -> u32 {
        self.color_attachment_count
    }

    fn has_depth_attachment(&self) -> bool {
        self.has_depth_attachment
    }

    fn subpass_count(&self) -> u32 {
        self.subpass_count
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }
}

pub struct MockGraphicsPipeline {
    name: String,
    graphics_api: GraphicsApi,
    push_constant_size: u32,
    vertex_stride: u32,
}

mock_resource!(MockGraphicsPipeline);

impl GraphicsPipeline for MockGraphicsPipeline {
    fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }
}

pub struct MockComputePipeline {
    name: String,
    graphics_api: GraphicsApi,
    push_constant_size: u32,
}

mock_resource!(MockComputePipeline);

impl ComputePipeline for MockComputePipeline {
    fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }
}

// ============================================================================
// Mock ResourceTable
// ============================================================================

pub struct MockResourceTable {
    name: String,
    graphics_api: GraphicsApi,
    capacities: ResourceTableCapacities,
    bindings: FxHashMap<(ResourceTableCategory, u32), String>,
}

impl MockResourceTable {
    /// Name of the resource bound at `index`, if any
    pub fn bound_name(&self, category: ResourceTableCategory, index: u32) -> Option<&str> {
        self.bindings.get(&(category, index)).map(String::as_str)
    }

    fn bind_buffer(
        &mut self,
        category: ResourceTableCategory,
        index: u32,
        buffer: &dyn Buffer,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        downcast_resource::<MockBuffer, _>(buffer, self.graphics_api)?;
        validate_buffer_binding(&self.name, &self.capacities, category, index, buffer, offset, size)?;
        self.bindings.insert((category, index), buffer.name().to_string());
        Ok(())
    }

    fn bind_image(&mut self, category: ResourceTableCategory, index: u32, image: &dyn Image) -> Result<()> {
        downcast_resource::<MockImage, _>(image, self.graphics_api)?;
        validate_image_binding(&self.name, &self.capacities, category, index, image)?;
        self.bindings.insert((category, index), image.name().to_string());
        Ok(())
    }
}

mock_resource!(MockResourceTable);

impl ResourceTable for MockResourceTable {
    fn bind_uniform_buffer(&mut self, index: u32, buffer: &dyn Buffer, offset: u64, size: u64) -> Result<()> {
        self.bind_buffer(ResourceTableCategory::UniformBuffer, index, buffer, offset, size)
    }

    fn bind_storage_buffer(&mut self, index: u32, buffer: &dyn Buffer, offset: u64, size: u64) -> Result<()> {
        self.bind_buffer(ResourceTableCategory::StorageBuffer, index, buffer, offset, size)
    }

    fn bind_sampled_image(&mut self, index: u32, image: &dyn Image) -> Result<()> {
        self.bind_image(ResourceTableCategory::SampledImage, index, image)
    }

    fn bind_storage_image(&mut self, index: u32, image: &dyn Image) -> Result<()> {
        self.bind_image(ResourceTableCategory::StorageImage, index, image)
    }

    fn bind_sampler(&mut self, index: u32, sampler: &dyn Sampler) -> Result<()> {
        downcast_resource::<MockSampler, _>(sampler, self.graphics_api)?;
        validate_binding_index(&self.name, &self.capacities, ResourceTableCategory::Sampler, index)?;
        self.bindings
            .insert((ResourceTableCategory::Sampler, index), sampler.name().to_string());
        Ok(())
    }

    fn capacities(&self) -> &ResourceTableCapacities {
        &self.capacities
    }
}

// ============================================================================
// Mock CommandBuffer
// ============================================================================

/// Device-wide completion counter
#[derive(Default)]
pub struct MockTimeline {
    next_value: AtomicU64,
    completed_value: AtomicU64,
}

impl MockTimeline {
    pub fn completed_value(&self) -> u64 {
        self.completed_value.load(Ordering::Acquire)
    }

    fn signal(&self, value: u64) {
        self.completed_value.fetch_max(value, Ordering::AcqRel);
    }
}

pub struct MockCommandBuffer {
    name: String,
    graphics_api: GraphicsApi,
    recorder: CommandRecorder,
    timeline: Arc<MockTimeline>,
    /// Human readable log of every encoded command
    pub commands: Vec<String>,
    pending: Vec<PendingCommand>,
}

impl MockCommandBuffer {
    pub fn recorder(&self) -> &CommandRecorder {
        &self.recorder
    }

    fn encode(&mut self, command: String) {
        self.commands.push(command);
    }
}

mock_resource!(MockCommandBuffer);

fn copy_into_subresource(source: &[u8], destination: &mut [u8], format: ImageFormat, level_extent: UVec3, copy: &ResolvedImageCopy) {
    let block = format.block_size();
    let block_bytes = format.block_memory_size() as usize;
    let level_blocks_x = level_extent.x.div_ceil(block) as usize;
    let level_blocks_y = level_extent.y.div_ceil(block) as usize;
    let range_blocks_x = copy.pixel_range.x.div_ceil(block) as usize;
    let range_blocks_y = copy.pixel_range.y.div_ceil(block) as usize;
    let offset_x = (copy.pixel_offset.x / block) as usize;
    let offset_y = (copy.pixel_offset.y / block) as usize;
    let row_bytes = range_blocks_x * block_bytes;

    let mut read = copy.source_offset as usize;
    for z in 0..copy.pixel_range.z as usize {
        let slice = z + copy.pixel_offset.z as usize;
        for y in 0..range_blocks_y {
            let write = ((slice * level_blocks_y + offset_y + y) * level_blocks_x + offset_x) * block_bytes;
            destination[write..write + row_bytes].copy_from_slice(&source[read..read + row_bytes]);
            read += row_bytes;
        }
    }
}

/// Point-sampled 2x downscale of every level from the one above it
fn downsample_levels(subresources: &mut [Vec<u8>], image: &ImageExtent) {
    let pixel_bytes = image.format.block_memory_size() as usize;
    for layer in 0..image.layer_count {
        for level in 1..image.level_count {
            let above = ((level - 1) * image.layer_count + layer) as usize;
            let current = (level * image.layer_count + layer) as usize;
            let (above_width, above_height) = image.level_size(level - 1);
            let (width, height, depth) = image.level_size3(level);
            let mut pixels = vec![0u8; subresources[current].len()];
            for z in 0..depth {
                let above_z = (z * 2).min(image.level_size3(level - 1).2 - 1);
                for y in 0..height {
                    let above_y = (y * 2).min(above_height - 1);
                    for x in 0..width {
                        let above_x = (x * 2).min(above_width - 1);
                        let read = (((above_z * above_height + above_y) * above_width + above_x) as usize) * pixel_bytes;
                        let write = (((z * height + y) * width + x) as usize) * pixel_bytes;
                        pixels[write..write + pixel_bytes]
                            .copy_from_slice(&subresources[above][read..read + pixel_bytes]);
                    }
                }
            }
            subresources[current] = pixels;
        }
    }
}

/// Geometry of an image captured for a deferred command
#[derive(Clone, Copy)]
struct ImageExtent {
    width: u32,
    height: u32,
    depth: u32,
    format: ImageFormat,
    level_count: u32,
    layer_count: u32,
}

impl ImageExtent {
    fn of(image: &dyn Image) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            depth: image.depth(),
            format: image.format(),
            level_count: image.level_count(),
            layer_count: image.layer_count(),
        }
    }

    fn level_size(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }

    fn level_size3(&self, level: u32) -> (u32, u32, u32) {
        let (width, height) = self.level_size(level);
        (width, height, (self.depth >> level).max(1))
    }
}

impl CommandBuffer for MockCommandBuffer {
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
        self.commands.clear();
        self.pending.clear();
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.recorder.end()
    }

    fn synchronize_buffer_usage(
        &mut self,
        buffer: &dyn Buffer,
        previous: BufferCommandUsage,
        next: BufferCommandUsage,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        downcast_resource::<MockBuffer, _>(buffer, self.graphics_api)?;
        if let Some(range) = self.recorder.check_buffer_usage(buffer, previous, next, offset, size)? {
            self.encode(format!(
                "barrier buffer '{}' [{}, +{}) {:?} -> {:?}",
                buffer.name(),
                range.offset,
                range.size,
                previous,
                next
            ));
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
        downcast_resource::<MockImage, _>(image, self.graphics_api)?;
        let range = self
            .recorder
            .check_image_usage(image, previous, next, base_level, level_count, base_layer, layer_count)?;
        if let Some(range) = range {
            self.encode(format!(
                "barrier image '{}' levels [{}, +{}) layers [{}, +{}) {:?} -> {:?}",
                image.name(),
                range.base_level,
                range.level_count,
                range.base_layer,
                range.layer_count,
                previous,
                next
            ));
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
        let mock_source = downcast_resource::<MockBuffer, _>(source, self.graphics_api)?;
        let mock_destination = downcast_resource::<MockBuffer, _>(destination, self.graphics_api)?;
        let size = self
            .recorder
            .check_copy_buffer_to_buffer(source, destination, size, source_offset, destination_offset)?;

        let (from, to) = (mock_source.storage(), mock_destination.storage());
        let (source_offset, destination_offset, size) = (source_offset as usize, destination_offset as usize, size as usize);
        self.pending.push(Box::new(move || {
            if Arc::ptr_eq(&from, &to) {
                from.lock()
                    .unwrap()
                    .copy_within(source_offset..source_offset + size, destination_offset);
            } else {
                let from = from.lock().unwrap();
                to.lock().unwrap()[destination_offset..destination_offset + size]
                    .copy_from_slice(&from[source_offset..source_offset + size]);
            }
        }));
        self.encode(format!(
            "copy {} bytes '{}'+{} -> '{}'+{}",
            size,
            source.name(),
            source_offset,
            destination.name(),
            destination_offset
        ));
        Ok(())
    }

    fn copy_buffer_to_image(&mut self, source: &dyn Buffer, destination: &dyn Image, region: &BufferImageCopy) -> Result<()> {
        let mock_source = downcast_resource::<MockBuffer, _>(source, self.graphics_api)?;
        let mock_destination = downcast_resource::<MockImage, _>(destination, self.graphics_api)?;
        let copy = self.recorder.check_copy_buffer_to_image(source, destination, region)?;

        let from = mock_source.storage();
        let to = Arc::clone(&mock_destination.subresources);
        let extent = ImageExtent::of(destination);
        let (width, height, depth) = extent.level_size3(copy.level);
        self.pending.push(Box::new(move || {
            let from = from.lock().unwrap();
            let mut to = to.lock().unwrap();
            let index = (copy.level * extent.layer_count + copy.layer) as usize;
            copy_into_subresource(&from, &mut to[index], extent.format, UVec3::new(width, height, depth), &copy);
        }));
        self.encode(format!(
            "copy buffer '{}' -> image '{}' level {} layer {}",
            source.name(),
            destination.name(),
            copy.level,
            copy.layer
        ));
        Ok(())
    }

    fn generate_mip_maps_for_image(&mut self, image: &dyn Image) -> Result<()> {
        let mock_image = downcast_resource::<MockImage, _>(image, self.graphics_api)?;
        self.recorder.check_generate_mip_maps(image)?;

        let subresources = Arc::clone(&mock_image.subresources);
        let extent = ImageExtent::of(image);
        self.pending.push(Box::new(move || {
            downsample_levels(&mut subresources.lock().unwrap(), &extent);
        }));
        self.encode(format!("generate mip maps '{}'", image.name()));
        Ok(())
    }

    fn begin_render_pass(&mut self, render_pass: &dyn RenderPass, attachments: &[RenderPassBeginAttachment]) -> Result<()> {
        downcast_resource::<MockRenderPass, _>(render_pass, self.graphics_api)?;
        self.recorder.begin_render_pass(render_pass, attachments)?;
        self.encode(format!("begin render pass '{}'", render_pass.name()));
        Ok(())
    }

    fn begin_next_subpass(&mut self, render_pass: &dyn RenderPass) -> Result<()> {
        let subpass = self.recorder.begin_next_subpass(render_pass)?;
        self.encode(format!("subpass {}", subpass));
        Ok(())
    }

    fn end_render_pass(&mut self, render_pass: &dyn RenderPass) -> Result<()> {
        self.recorder.end_render_pass(render_pass)?;
        self.encode(format!("end render pass '{}'", render_pass.name()));
        Ok(())
    }

    fn begin_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) -> Result<()> {
        downcast_resource::<MockGraphicsPipeline, _>(pipeline, self.graphics_api)?;
        self.recorder.begin_graphics_pipeline(pipeline)?;
        self.encode(format!("bind graphics pipeline '{}'", pipeline.name()));
        Ok(())
    }

    fn end_graphics_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) -> Result<()> {
        self.recorder.end_graphics_pipeline(pipeline)
    }

    fn begin_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline) -> Result<()> {
        downcast_resource::<MockComputePipeline, _>(pipeline, self.graphics_api)?;
        self.recorder.begin_compute_pipeline(pipeline)?;
        self.encode(format!("bind compute pipeline '{}'", pipeline.name()));
        Ok(())
    }

    fn end_compute_pipeline(&mut self, pipeline: &dyn ComputePipeline) -> Result<()> {
        self.recorder.end_compute_pipeline(pipeline)
    }

    fn bind_resource_table(&mut self, resource_table: &dyn ResourceTable) -> Result<()> {
        downcast_resource::<MockResourceTable, _>(resource_table, self.graphics_api)?;
        self.recorder.check_bind_resource_table(resource_table)?;
        self.encode(format!("bind resource table '{}'", resource_table.name()));
        Ok(())
    }

    fn push_constants(&mut self, data: &[u8], offset: u32) -> Result<()> {
        self.recorder.check_push_constants(data, offset)?;
        self.encode(format!("push constants {} bytes at {}", data.len(), offset));
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()> {
        downcast_resource::<MockBuffer, _>(buffer, self.graphics_api)?;
        self.recorder.check_vertex_buffer(buffer, offset)?;
        self.encode(format!("bind vertex buffer '{}'+{}", buffer.name(), offset));
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()> {
        downcast_resource::<MockBuffer, _>(buffer, self.graphics_api)?;
        self.recorder.check_index_buffer(buffer, offset)?;
        self.encode(format!("bind index buffer '{}'+{}", buffer.name(), offset));
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Scissor) -> Result<()> {
        self.recorder.check_scissor(&scissor)?;
        self.encode(format!("scissor {:?}", scissor));
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, vertex_offset: u32) -> Result<()> {
        self.recorder.check_draw(vertex_count)?;
        self.encode(format!("draw {} from {}", vertex_count, vertex_offset));
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, index_offset: u32, vertex_offset: i32) -> Result<()> {
        self.recorder.check_draw_indexed(index_count)?;
        self.encode(format!("draw indexed {} from {} base {}", index_count, index_offset, vertex_offset));
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        let (x, y, z) = self.recorder.check_dispatch(x, y, z)?;
        self.encode(format!("dispatch {}x{}x{}", x, y, z));
        Ok(())
    }

    fn begin_debug_region(&mut self, name: &str, _color: Vec4) -> Result<()> {
        self.recorder.begin_debug_region(name)?;
        self.encode(format!("begin region '{}'", name));
        Ok(())
    }

    fn insert_debug_marker(&mut self, name: &str, _color: Vec4) -> Result<()> {
        self.recorder.check_debug_marker(name)?;
        self.encode(format!("marker '{}'", name));
        Ok(())
    }

    fn end_debug_region(&mut self) -> Result<()> {
        self.recorder.end_debug_region()?;
        self.encode("end region".to_string());
        Ok(())
    }

    fn queue_buffer_for_destruction(&mut self, buffer: Box<dyn Buffer>) {
        self.recorder.queue_buffer(buffer);
    }

    fn queue_image_for_destruction(&mut self, image: Box<dyn Image>) {
        self.recorder.queue_image(image);
    }
}

// ============================================================================
// Mock Queue
// ============================================================================

/// One submission as seen by the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSubmission {
    pub command_buffer: String,
    pub signal_value: u64,
    pub wait_value: u64,
}

pub struct MockQueue {
    name: String,
    graphics_api: GraphicsApi,
    operations: QueueOperations,
    timeline: Arc<MockTimeline>,
    /// Leave submissions in flight until `complete_all` or a wait
    deferred_completion: bool,
    submissions: Mutex<Vec<MockSubmission>>,
}

impl MockQueue {
    pub fn submissions(&self) -> Vec<MockSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Let the "GPU" finish everything submitted so far
    pub fn complete_all(&self) {
        self.timeline.signal(self.timeline.next_value.load(Ordering::Acquire));
    }
}

mock_resource!(MockQueue);

impl Queue for MockQueue {
    fn operations(&self) -> QueueOperations {
        self.operations
    }

    fn create_command_buffer(&self, desc: &CommandBufferDesc) -> Result<Box<dyn CommandBuffer>> {
        desc.validate()?;
        Ok(Box::new(MockCommandBuffer {
            name: desc.name.to_string(),
            graphics_api: self.graphics_api,
            recorder: CommandRecorder::new(desc.name),
            timeline: Arc::clone(&self.timeline),
            commands: Vec::new(),
            pending: Vec::new(),
        }))
    }

    fn submit_command_buffer(&self, command_buffer: &mut dyn CommandBuffer, wait_list: &[&dyn CommandBuffer]) -> Result<()> {
        let wait_value = validate_submission(command_buffer, wait_list)?;
        let mock = downcast_command_buffer_mut::<MockCommandBuffer>(command_buffer, self.graphics_api)?;

        let signal_value = self.timeline.next_value.fetch_add(1, Ordering::AcqRel) + 1;
        mock.recorder.mark_submitted(signal_value)?;
        for command in mock.pending.drain(..) {
            command();
        }
        if !self.deferred_completion {
            self.timeline.signal(signal_value);
        }

        self.submissions.lock().unwrap().push(MockSubmission {
            command_buffer: mock.name.clone(),
            signal_value,
            wait_value,
        });
        Ok(())
    }

    fn wait_for_command_buffer(&self, command_buffer: &mut dyn CommandBuffer) -> Result<()> {
        let mock = downcast_command_buffer_mut::<MockCommandBuffer>(command_buffer, self.graphics_api)?;
        let signal_value = mock.recorder.signal_value();
        if signal_value == 0 {
            return Ok(());
        }
        self.timeline.signal(signal_value);
        mock.recorder.mark_completed();
        Ok(())
    }
}

// ============================================================================
// Mock Swapchain
// ============================================================================

pub struct MockSwapchain {
    name: String,
    graphics_api: GraphicsApi,
    window: Arc<dyn SurfaceWindow>,
    presentation_mode: SwapchainPresentationMode,
    format: ImageFormat,
    images: Vec<MockImage>,
    extent: (u32, u32),
    frame_index: u32,
    image_index: u32,
    resize_dispatcher: EventDispatcher<SwapchainResizeEvent>,
    pub present_count: u32,
}

impl MockSwapchain {
    fn create_images(name: &str, graphics_api: GraphicsApi, format: ImageFormat, extent: (u32, u32), count: u32) -> Vec<MockImage> {
        (0..count)
            .map(|index| {
                let image_name = format!("{} image {}", name, index);
                MockImage::new(
                    &ImageDesc {
                        name: &image_name,
                        width: extent.0,
                        height: extent.1,
                        format,
                        usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::DESTINATION_MEMORY,
                        ..Default::default()
                    },
                    graphics_api,
                )
            })
            .collect()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

mock_resource!(MockSwapchain);

impl Swapchain for MockSwapchain {
    fn acquire_next_image(&mut self) -> Result<()> {
        validate_window_open(&self.name, self.window.as_ref(), "acquire an image")?;
        let size = self.window.framebuffer_size();
        ridge_ensure!(
            size.0 > 0 && size.1 > 0,
            "ridge::rhi::Swapchain",
            InvalidOperation,
            "Swapchain '{}' cannot acquire an image while its window is minimized",
            self.name
        );
        if size != self.extent {
            self.resize_dispatcher.dispatch(&SwapchainResizeEvent {
                width: size.0,
                height: size.1,
                scaling: self.window.scaling(),
            });
            let count = self.images.len() as u32;
            self.images = Self::create_images(&self.name, self.graphics_api, self.format, size, count);
            self.extent = size;
        }
        self.image_index = self.frame_index;
        Ok(())
    }

    fn present(&mut self, command_buffer: &dyn CommandBuffer) -> Result<()> {
        validate_window_open(&self.name, self.window.as_ref(), "present")?;
        ridge_ensure!(
            command_buffer.completion_signal_value() > 0,
            "ridge::rhi::Swapchain",
            InvalidOperation,
            "Swapchain '{}' cannot present after command buffer '{}', which was never submitted",
            self.name,
            command_buffer.name()
        );
        self.present_count += 1;
        self.frame_index = (self.frame_index + 1) % self.images.len() as u32;
        Ok(())
    }

    fn add_resize_listener(&mut self, listener: Listener<SwapchainResizeEvent>) -> ListenerId {
        self.resize_dispatcher.add(listener)
    }

    fn remove_resize_listener(&mut self, id: ListenerId) -> bool {
        self.resize_dispatcher.remove(id)
    }

    fn presentation_mode(&self) -> SwapchainPresentationMode {
        self.presentation_mode
    }

    fn current_frame_index(&self) -> u32 {
        self.frame_index
    }

    fn current_image_index(&self) -> u32 {
        self.image_index
    }

    fn concurrent_frame_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn scaling(&self) -> f32 {
        self.window.scaling()
    }

    fn get_image(&self, index: u32) -> Result<&dyn Image> {
        validate_image_index(&self.name, index, self.images.len() as u32)?;
        Ok(&self.images[index as usize])
    }
}

// ============================================================================
// Mock Device
// ============================================================================

pub struct MockDevice {
    name: String,
    graphics_api: GraphicsApi,
    limits: DeviceLimits,
    supported_formats: FxHashSet<ImageFormat>,
    max_sampling: ImageSampling,
    max_anisotropy: SamplerAnisotropy,
    timeline: Arc<MockTimeline>,
    deferred_completion: bool,
}

impl MockDevice {
    /// Device supporting every uncompressed and BC format, up to 8x MSAA and 16x anisotropy
    pub fn new() -> Self {
        let mut supported_formats = FxHashSet::default();
        for &(format, _, _) in crate::rhi::image_format::UNCOMPRESSED_FORMATS {
            supported_formats.insert(format);
        }
        supported_formats.extend([
            ImageFormat::B8G8R8A8_UNORM,
            ImageFormat::B8G8R8A8_SRGB,
            ImageFormat::BC1_RGBA_UNORM,
            ImageFormat::BC3_RGBA_UNORM,
            ImageFormat::BC7_RGBA_SRGB,
        ]);
        Self {
            name: "Mock device".to_string(),
            graphics_api: GraphicsApi::Vulkan,
            limits: DeviceLimits::default(),
            supported_formats,
            max_sampling: ImageSampling::X8,
            max_anisotropy: SamplerAnisotropy::X16,
            timeline: Arc::default(),
            deferred_completion: false,
        }
    }

    pub fn with_graphics_api(mut self, graphics_api: GraphicsApi) -> Self {
        self.graphics_api = graphics_api;
        self
    }

    pub fn with_supported_formats(mut self, formats: &[ImageFormat]) -> Self {
        self.supported_formats = formats.iter().copied().collect();
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_sampling(mut self, sampling: ImageSampling) -> Self {
        self.max_sampling = sampling;
        self
    }

    pub fn with_max_anisotropy(mut self, anisotropy: SamplerAnisotropy) -> Self {
        self.max_anisotropy = anisotropy;
        self
    }

    /// Queues created afterwards leave submissions in flight until waited on
    pub fn with_deferred_completion(mut self) -> Self {
        self.deferred_completion = true;
        self
    }

    pub fn timeline(&self) -> &MockTimeline {
        &self.timeline
    }

    /// Concrete queue, for tests that need `complete_all` or `submissions`
    pub fn create_mock_queue(&self, desc: &QueueDesc) -> Result<MockQueue> {
        desc.validate()?;
        Ok(MockQueue {
            name: desc.name.to_string(),
            graphics_api: self.graphics_api,
            operations: desc.operations,
            timeline: Arc::clone(&self.timeline),
            deferred_completion: self.deferred_completion,
            submissions: Mutex::default(),
        })
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

mock_resource!(MockDevice);

impl Device for MockDevice {
    fn hardware_name(&self) -> &str {
        "Mock GPU"
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Cpu
    }

    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn is_image_format_supported(&self, format: ImageFormat, _usage: ImageUsage) -> bool {
        self.supported_formats.contains(&format)
    }

    fn is_image_sampling_supported(&self, sampling: ImageSampling) -> bool {
        sampling <= self.max_sampling
    }

    fn is_sampler_anisotropy_supported(&self, anisotropy: SamplerAnisotropy) -> bool {
        anisotropy <= self.max_anisotropy
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Box<dyn Buffer>> {
        desc.validate(&self.limits)?;
        Ok(Box::new(MockBuffer {
            name: desc.name.to_string(),
            graphics_api: self.graphics_api,
            memory_size: desc.memory_size,
            usage: desc.usage,
            memory_location: desc.memory_location,
            storage: Arc::new(Mutex::new(vec![0u8; desc.memory_size as usize])),
        }))
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<Box<dyn Image>> {
        desc.validate()?;
        ridge_ensure!(
            self.is_image_format_supported(desc.format, desc.usage),
            "ridge::rhi::Image",
            UnsupportedFeature,
            "Format {:?} of image '{}' is not supported",
            desc.format,
            desc.name
        );
        ridge_ensure!(
            self.is_image_sampling_supported(desc.sampling),
            "ridge::rhi::Image",
            UnsupportedFeature,
            "Sampling {:?} of image '{}' is not supported",
            desc.sampling,
            desc.name
        );
        Ok(Box::new(MockImage::new(desc, self.graphics_api)))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Box<dyn Sampler>> {
        desc.validate()?;
        ridge_ensure!(
            self.is_sampler_anisotropy_supported(desc.anisotropy),
            "ridge::rhi::Sampler",
            UnsupportedFeature,
            "Anisotropy {:?} of sampler '{}' is not supported",
            desc.anisotropy,
            desc.name
        );
        Ok(Box::new(MockSampler {
            name: desc.name.to_string(),
            graphics_api: self.graphics_api,
            anisotropy: desc.anisotropy,
        }))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Box<dyn RenderPass>> {
        let extent = desc.validate(&self.limits)?;
        let color_attachment_count = desc
            .attachments
            .iter()
            .filter(|attachment| attachment.attachment_type == AttachmentType::Color)
            .count() as u32;
        Ok(Box::new(MockRenderPass {
            name: desc.name.to_string(),
            graphics_api: self.graphics_api,
            attachment_count: desc.attachments.len() as u32,
            color_attachment_count,
            has_depth_attachment: color_attachment_count < desc.attachments.len() as u32,
            subpass_count: desc.subpass_descs.len() as u32,
            extent,
        }))
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<Box<dyn Swapchain>> {
        desc.validate()?;
        let format = desc
            .preferred_image_memory_type
            .preferred_formats()
            .iter()
            .copied()
            .find(|&format| self.is_image_format_supported(format, ImageUsage::COLOR_ATTACHMENT))
            .unwrap_or(ImageFormat::B8G8R8A8_UNORM);
        let extent = desc.window.framebuffer_size();
        let count = desc.preferred_buffering.image_count();
        Ok(Box::new(MockSwapchain {
            name: desc.name.to_string(),
            graphics_api: self.graphics_api,
            window: Arc::clone(&desc.window),
            presentation_mode: desc.preferred_presentation_mode,
            format,
            images: MockSwapchain::create_images(desc.name, self.graphics_api, format, extent, count),
            extent,
            frame_index: 0,
            image_index: 0,
            resize_dispatcher: EventDispatcher::new(),
            present_count: 0,
        }))
    }

    fn create_shader(&self, desc: &ShaderDesc) -> Result<Box<dyn Shader>> {
        desc.validate()?;
        let bundle = ShaderBundle::parse(desc.bundle)?;
        let code = bundle.require_blob(ShaderBlob::SpirV, desc.name)?;
        Ok(Box::new(MockShader {
            name: desc.name.to_string(),
            graphics_api: self.graphics_api,
            shader_type: desc.shader_type,
            code_size: code.len(),
        }))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Box<dyn GraphicsPipeline>> {
        desc.validate()?;
        downcast_resource::<MockRenderPass, _>(desc.template_render_pass, self.graphics_api)?;
        Ok(Box::new(MockGraphicsPipeline {
            name: desc.name.to_string(),
            graphics_api: self.graphics_api,
            push_constant_size: desc.push_constant_size,
            vertex_stride: vertex_stride(desc.vertex_inputs),
        }))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<Box<dyn ComputePipeline>> {
        desc.validate()?;
        downcast_resource::<MockShader, _>(desc.compute_shader, self.graphics_api)?;
        Ok(Box::new(MockComputePipeline {
            name: desc.name.to_string(),
            graphics_api: self.graphics_api,
            push_constant_size: desc.push_constant_size,
        }))
    }

    fn create_resource_table(&self, desc: &ResourceTableDesc) -> Result<Box<dyn ResourceTable>> {
        desc.validate()?;
        Ok(Box::new(MockResourceTable {
            name: desc.name.to_string(),
            graphics_api: self.graphics_api,
            capacities: self.limits.resource_table_capacities,
            bindings: FxHashMap::default(),
        }))
    }

    fn create_queue(&self, desc: &QueueDesc) -> Result<Box<dyn Queue>> {
        Ok(Box::new(self.create_mock_queue(desc)?))
    }

    fn wait_idle(&self) -> Result<()> {
        self.timeline.signal(self.timeline.next_value.load(Ordering::Acquire));
        Ok(())
    }
}

// ============================================================================
// Test helpers
// ============================================================================

/// Bundle with only a (fake) SPIR-V blob
pub fn spirv_bundle() -> Vec<u8> {
    ShaderBundle::pack(&[(ShaderBlob::SpirV, &[0x03, 0x02, 0x23, 0x07])])
}

pub fn buffer_desc(name: &str, memory_size: u64, usage: BufferUsage, memory_location: BufferMemoryLocation) -> BufferDesc<'_> {
    BufferDesc {
        name,
        memory_size,
        usage,
        memory_location,
    }
}

pub fn graphics_queue(device: &MockDevice) -> MockQueue {
    device
        .create_mock_queue(&QueueDesc {
            name: "Graphics queue",
            operations: QueueOperations::GRAPHICS | QueueOperations::TRANSFER,
            priority: QueuePriority::LeastUsed,
        })
        .unwrap()
}

/// Command buffer of `queue`, already recording
pub fn recording_command_buffer(queue: &MockQueue, name: &str) -> Box<dyn CommandBuffer> {
    let mut command_buffer = queue.create_command_buffer(&CommandBufferDesc { name }).unwrap();
    command_buffer.begin().unwrap();
    command_buffer
}

/// Log of the commands encoded into a mock command buffer
pub fn encoded_commands(command_buffer: &mut dyn CommandBuffer) -> Vec<String> {
    let graphics_api = command_buffer.graphics_api();
    downcast_command_buffer_mut::<MockCommandBuffer>(command_buffer, graphics_api)
        .map(|mock| mock.commands.clone())
        .unwrap_or_default()
}

pub fn as_mock_buffer(buffer: &dyn Buffer) -> &MockBuffer {
    buffer.as_any().downcast_ref::<MockBuffer>().unwrap()
}

pub fn as_mock_image(image: &dyn Image) -> &MockImage {
    image.as_any().downcast_ref::<MockImage>().unwrap()
}
