/// Graphics and compute pipelines
///
/// Rasterizer and depth state are encoder state in Metal, so graphics
/// pipelines carry them next to the pipeline state object and the command
/// buffer applies them when the pipeline begins.

use objc2::runtime::ProtocolObject;
use objc2_metal::{
    MTLCompareFunction, MTLComputePipelineState, MTLCullMode, MTLDepthStencilDescriptor, MTLDepthStencilState,
    MTLDevice, MTLRenderPipelineDescriptor, MTLRenderPipelineState, MTLTriangleFillMode, MTLVertexDescriptor,
    MTLVertexStepFunction, MTLWinding,
};
use ridge_rhi::ridge::rhi::{
    downcast_resource, vertex_stride, ComputePipeline, ComputePipelineDesc, CullMode, FrontFaceMode, GraphicsApi,
    GraphicsPipeline, GraphicsPipelineDesc, ShadeMode,
};
use ridge_rhi::ridge::Result;
use std::sync::Arc;

use crate::metal_context::{label, nil_error, ns_error, MetalContext};
use crate::metal_format::vertex_format;
use crate::metal_handle::MetalHandle;
use crate::metal_layout::VERTEX_BUFFER_INDEX;
use crate::metal_render_pass::MetalRenderPass;
use crate::metal_shader::MetalShader;

fn fill_mode(mode: ShadeMode) -> MTLTriangleFillMode {
    match mode {
        ShadeMode::Fill => MTLTriangleFillMode::Fill,
        ShadeMode::Wireframe => MTLTriangleFillMode::Lines,
    }
}

fn cull_mode(mode: CullMode) -> MTLCullMode {
    match mode {
        CullMode::None => MTLCullMode::None,
        CullMode::Front => MTLCullMode::Front,
        CullMode::Back => MTLCullMode::Back,
    }
}

fn winding(mode: FrontFaceMode) -> MTLWinding {
    match mode {
        FrontFaceMode::Clockwise => MTLWinding::Clockwise,
        FrontFaceMode::CounterClockwise => MTLWinding::CounterClockwise,
    }
}

/// Attributes are tightly packed in the vertex buffer slot
fn vertex_descriptor(desc: &GraphicsPipelineDesc) -> objc2::rc::Retained<MTLVertexDescriptor> {
    let descriptor = unsafe { MTLVertexDescriptor::new() };
    let mut offset = 0;
    for (location, &input) in desc.vertex_inputs.iter().enumerate() {
        unsafe {
            let attribute = descriptor.attributes().objectAtIndexedSubscript(location);
            attribute.setFormat(vertex_format(input));
            attribute.setOffset(offset as usize);
            attribute.setBufferIndex(VERTEX_BUFFER_INDEX as usize);
        }
        offset += input.byte_size();
    }
    if !desc.vertex_inputs.is_empty() {
        unsafe {
            let layout = descriptor.layouts().objectAtIndexedSubscript(VERTEX_BUFFER_INDEX as usize);
            layout.setStride(vertex_stride(desc.vertex_inputs) as usize);
            layout.setStepFunction(MTLVertexStepFunction::PerVertex);
            layout.setStepRate(1);
        }
    }
    descriptor
}

// ============================================================================
// GRAPHICS PIPELINE
// ============================================================================

/// Metal graphics pipeline implementation
pub struct MetalGraphicsPipeline {
    _ctx: Arc<MetalContext>,
    name: String,
    pub(crate) state: MetalHandle<ProtocolObject<dyn MTLRenderPipelineState>>,
    /// Present when the subpass has a depth attachment
    pub(crate) depth_state: Option<MetalHandle<ProtocolObject<dyn MTLDepthStencilState>>>,
    pub(crate) fill_mode: MTLTriangleFillMode,
    pub(crate) cull_mode: MTLCullMode,
    pub(crate) winding: MTLWinding,
    push_constant_size: u32,
    vertex_stride: u32,
}

impl MetalGraphicsPipeline {
    /// `desc` is already validated
    pub(crate) fn new(ctx: Arc<MetalContext>, desc: &GraphicsPipelineDesc) -> Result<Self> {
        let render_pass = downcast_resource::<MetalRenderPass, _>(desc.template_render_pass, GraphicsApi::Metal)?;
        let vertex_shader = downcast_resource::<MetalShader, _>(desc.vertex_shader, GraphicsApi::Metal)?;
        let fragment_shader = desc
            .fragment_shader
            .map(|shader| downcast_resource::<MetalShader, _>(shader, GraphicsApi::Metal))
            .transpose()?;
        let formats = render_pass.subpass_formats(desc.subpass_index);

        let descriptor = unsafe { MTLRenderPipelineDescriptor::new() };
        unsafe {
            descriptor.setLabel(Some(&label(desc.name)));
            descriptor.setVertexFunction(Some(&vertex_shader.function));
            descriptor.setFragmentFunction(fragment_shader.map(|shader| &*shader.function));
            descriptor.setVertexDescriptor(Some(&vertex_descriptor(desc)));
            descriptor.setRasterSampleCount(desc.sampling.sample_count() as usize);
            for (slot, format) in formats.colors.iter().enumerate() {
                descriptor
                    .colorAttachments()
                    .objectAtIndexedSubscript(slot)
                    .setPixelFormat(*format);
            }
            if let Some(depth) = formats.depth {
                descriptor.setDepthAttachmentPixelFormat(depth);
            }
        }

        let state = unsafe { ctx.device.newRenderPipelineStateWithDescriptor_error(&descriptor) }
            .map_err(|e| ns_error(format_args!("create graphics pipeline '{}'", desc.name), &e))?;

        let depth_state = match formats.depth {
            Some(_) => {
                let depth_descriptor = unsafe { MTLDepthStencilDescriptor::new() };
                unsafe {
                    depth_descriptor.setDepthCompareFunction(MTLCompareFunction::LessEqual);
                    depth_descriptor.setDepthWriteEnabled(true);
                    depth_descriptor.setLabel(Some(&label(desc.name)));
                }
                let depth_state = unsafe { ctx.device.newDepthStencilStateWithDescriptor(&depth_descriptor) }
                    .ok_or_else(|| nil_error(format_args!("create depth state of pipeline '{}'", desc.name)))?;
                Some(MetalHandle::new(depth_state))
            }
            None => None,
        };

        Ok(Self {
            _ctx: ctx,
            name: desc.name.to_string(),
            state: MetalHandle::new(state),
            depth_state,
            fill_mode: fill_mode(desc.shade_mode),
            cull_mode: cull_mode(desc.cull_mode),
            winding: winding(desc.front_face_mode),
            push_constant_size: desc.push_constant_size,
            vertex_stride: vertex_stride(desc.vertex_inputs),
        })
    }
}

crate::metal_resource!(MetalGraphicsPipeline);

impl GraphicsPipeline for MetalGraphicsPipeline {
    fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }
}

// ============================================================================
// COMPUTE PIPELINE
// ============================================================================

/// Metal compute pipeline implementation
pub struct MetalComputePipeline {
    _ctx: Arc<MetalContext>,
    name: String,
    pub(crate) state: MetalHandle<ProtocolObject<dyn MTLComputePipelineState>>,
    /// Threads per threadgroup, from the shader's declared workgroup size
    pub(crate) threadgroup_size: [u32; 3],
    push_constant_size: u32,
}

impl MetalComputePipeline {
    pub(crate) fn new(ctx: Arc<MetalContext>, desc: &ComputePipelineDesc) -> Result<Self> {
        let shader = downcast_resource::<MetalShader, _>(desc.compute_shader, GraphicsApi::Metal)?;
        let state = unsafe { ctx.device.newComputePipelineStateWithFunction_error(&shader.function) }
            .map_err(|e| ns_error(format_args!("create compute pipeline '{}'", desc.name), &e))?;

        Ok(Self {
            _ctx: ctx,
            name: desc.name.to_string(),
            state: MetalHandle::new(state),
            threadgroup_size: shader.threadgroup_size,
            push_constant_size: desc.push_constant_size,
        })
    }
}

crate::metal_resource!(MetalComputePipeline);

impl ComputePipeline for MetalComputePipeline {
    fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }
}
