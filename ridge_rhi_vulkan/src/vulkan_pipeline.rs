/// Graphics and compute pipelines
///
/// Every pipeline layout is the device-wide resource table layout at set 0
/// plus one push constant range sized by the descriptor.

use ash::vk;
use ridge_rhi::ridge::rhi::{
    downcast_resource, vertex_stride, ComputePipeline, ComputePipelineDesc, CullMode, FrontFaceMode, GraphicsApi,
    GraphicsPipeline, GraphicsPipelineDesc, RenderingResource, ShadeMode, Shader,
};
use ridge_rhi::ridge::Result;
use ridge_rhi::ridge_ensure;
use std::sync::Arc;

use crate::vulkan_context::{vk_error, GpuContext, SOURCE};
use crate::vulkan_format::{sampling_to_vk, vertex_input_to_vk};
use crate::vulkan_render_pass::VulkanRenderPass;
use crate::vulkan_shader::VulkanShader;

pub(crate) const GRAPHICS_PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::ALL_GRAPHICS;
pub(crate) const COMPUTE_PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::COMPUTE;

fn shade_mode_to_vk(mode: ShadeMode) -> vk::PolygonMode {
    match mode {
        ShadeMode::Fill => vk::PolygonMode::FILL,
        ShadeMode::Wireframe => vk::PolygonMode::LINE,
    }
}

fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

fn front_face_to_vk(mode: FrontFaceMode) -> vk::FrontFace {
    match mode {
        FrontFaceMode::Clockwise => vk::FrontFace::CLOCKWISE,
        FrontFaceMode::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
    }
}

/// Downcast `shader` and check it reads no more push constants than declared
fn pipeline_shader<'a>(pipeline_name: &str, shader: &'a dyn Shader, push_constant_size: u32) -> Result<&'a VulkanShader> {
    let shader = downcast_resource::<VulkanShader, _>(shader, GraphicsApi::Vulkan)?;
    ridge_ensure!(
        shader.push_constant_size <= push_constant_size,
        SOURCE,
        InvalidConfiguration,
        "Shader '{}' reads {} bytes of push constants, pipeline '{}' declares {}",
        shader.name(),
        shader.push_constant_size,
        pipeline_name,
        push_constant_size
    );
    Ok(shader)
}

fn create_pipeline_layout(
    ctx: &GpuContext,
    name: &str,
    push_constant_size: u32,
    stages: vk::ShaderStageFlags,
) -> Result<vk::PipelineLayout> {
    let set_layouts = [ctx.resource_table_layout];
    let push_ranges = [vk::PushConstantRange {
        stage_flags: stages,
        offset: 0,
        size: push_constant_size,
    }];
    let mut layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    if push_constant_size > 0 {
        layout_info = layout_info.push_constant_ranges(&push_ranges);
    }
    let layout = unsafe { ctx.device.create_pipeline_layout(&layout_info, None) }
        .map_err(|e| vk_error(format_args!("create layout of pipeline '{}'", name), e))?;
    ctx.set_object_name(layout, name);
    Ok(layout)
}

// ============================================================================
// GRAPHICS PIPELINE
// ============================================================================

/// Vulkan graphics pipeline implementation
pub struct VulkanGraphicsPipeline {
    ctx: Arc<GpuContext>,
    name: String,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    push_constant_size: u32,
    vertex_stride: u32,
}

impl VulkanGraphicsPipeline {
    /// `desc` is already validated; `wireframe_supported` reflects `fillModeNonSolid`
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &GraphicsPipelineDesc, wireframe_supported: bool) -> Result<Self> {
        ridge_ensure!(
            desc.shade_mode != ShadeMode::Wireframe || wireframe_supported,
            SOURCE,
            UnsupportedFeature,
            "Wireframe shading of pipeline '{}' is not supported by the device",
            desc.name
        );
        let render_pass = downcast_resource::<VulkanRenderPass, _>(desc.template_render_pass, GraphicsApi::Vulkan)?;
        let vertex_shader = pipeline_shader(desc.name, desc.vertex_shader, desc.push_constant_size)?;
        let fragment_shader = desc
            .fragment_shader
            .map(|shader| pipeline_shader(desc.name, shader, desc.push_constant_size))
            .transpose()?;

        let mut stages = vec![vk::PipelineShaderStageCreateInfo::default()
            .stage(vertex_shader.stage())
            .module(vertex_shader.module)
            .name(&vertex_shader.entry_point)];
        if let Some(fragment_shader) = fragment_shader {
            stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(fragment_shader.stage())
                    .module(fragment_shader.module)
                    .name(&fragment_shader.entry_point),
            );
        }

        // Attributes are tightly packed in binding 0
        let vertex_stride = vertex_stride(desc.vertex_inputs);
        let mut offset = 0;
        let attributes: Vec<_> = desc
            .vertex_inputs
            .iter()
            .enumerate()
            .map(|(location, &input)| {
                let attribute = vk::VertexInputAttributeDescription {
                    location: location as u32,
                    binding: 0,
                    format: vertex_input_to_vk(input),
                    offset,
                };
                offset += input.byte_size();
                attribute
            })
            .collect();
        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: vertex_stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let mut vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        if !attributes.is_empty() {
            vertex_input = vertex_input
                .vertex_binding_descriptions(&bindings)
                .vertex_attribute_descriptions(&attributes);
        }

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(shade_mode_to_vk(desc.shade_mode))
            .cull_mode(cull_mode_to_vk(desc.cull_mode))
            .front_face(front_face_to_vk(desc.front_face_mode))
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(sampling_to_vk(desc.sampling))
            .sample_shading_enable(false);

        let (color_count, writes_depth) = render_pass.subpass_targets(desc.subpass_index);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(writes_depth)
            .depth_write_enable(writes_depth)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments = vec![
            vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(false)
                .color_write_mask(
                    vk::ColorComponentFlags::R
                        | vk::ColorComponentFlags::G
                        | vk::ColorComponentFlags::B
                        | vk::ColorComponentFlags::A,
                );
            color_count as usize
        ];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let layout = create_pipeline_layout(&ctx, desc.name, desc.push_constant_size, GRAPHICS_PUSH_CONSTANT_STAGES)?;
        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.render_pass)
            .subpass(desc.subpass_index);

        let pipeline = unsafe {
            ctx.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match pipeline {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { ctx.device.destroy_pipeline_layout(layout, None) };
                return Err(vk_error(format_args!("create graphics pipeline '{}'", desc.name), e));
            }
        };
        ctx.set_object_name(pipeline, desc.name);

        Ok(Self {
            ctx,
            name: desc.name.to_string(),
            pipeline,
            layout,
            push_constant_size: desc.push_constant_size,
            vertex_stride,
        })
    }
}

crate::vulkan_resource!(VulkanGraphicsPipeline);

impl GraphicsPipeline for VulkanGraphicsPipeline {
    fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }
}

impl Drop for VulkanGraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
            self.ctx.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

// ============================================================================
// COMPUTE PIPELINE
// ============================================================================

/// Vulkan compute pipeline implementation
pub struct VulkanComputePipeline {
    ctx: Arc<GpuContext>,
    name: String,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    push_constant_size: u32,
}

impl VulkanComputePipeline {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &ComputePipelineDesc) -> Result<Self> {
        let shader = pipeline_shader(desc.name, desc.compute_shader, desc.push_constant_size)?;
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(shader.stage())
            .module(shader.module)
            .name(&shader.entry_point);

        let layout = create_pipeline_layout(&ctx, desc.name, desc.push_constant_size, COMPUTE_PUSH_CONSTANT_STAGES)?;
        let pipeline_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(layout);

        let pipeline = unsafe {
            ctx.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match pipeline {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { ctx.device.destroy_pipeline_layout(layout, None) };
                return Err(vk_error(format_args!("create compute pipeline '{}'", desc.name), e));
            }
        };
        ctx.set_object_name(pipeline, desc.name);

        Ok(Self {
            ctx,
            name: desc.name.to_string(),
            pipeline,
            layout,
            push_constant_size: desc.push_constant_size,
        })
    }
}

crate::vulkan_resource!(VulkanComputePipeline);

impl ComputePipeline for VulkanComputePipeline {
    fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }
}

impl Drop for VulkanComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
            self.ctx.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
