/// Graphics and compute pipeline traits and descriptors

use crate::error::Result;
use crate::rhi::image::ImageSampling;
use crate::rhi::render_pass::RenderPass;
use crate::rhi::rendering_resource::{validate_name, RenderingResource};
use crate::rhi::shader::{Shader, ShaderType};
use crate::ridge_ensure;

/// Largest push constant block any pipeline may declare, in bytes
pub const MAX_PUSH_CONSTANT_SIZE: u32 = 128;

/// Per-vertex attribute, tightly packed in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInput {
    Float,
    Float2,
    Float3,
    Float4,
}

impl VertexInput {
    pub const POSITION_2D: VertexInput = VertexInput::Float2;
    pub const POSITION_3D: VertexInput = VertexInput::Float3;
    pub const NORMAL: VertexInput = VertexInput::Float3;
    pub const COLOR_RGB: VertexInput = VertexInput::Float3;
    pub const COLOR_RGBA: VertexInput = VertexInput::Float4;
    pub const UV: VertexInput = VertexInput::Float2;

    pub fn component_count(self) -> u32 {
        match self {
            VertexInput::Float => 1,
            VertexInput::Float2 => 2,
            VertexInput::Float3 => 3,
            VertexInput::Float4 => 4,
        }
    }

    pub fn byte_size(self) -> u32 {
        self.component_count() * 4
    }
}

/// Bytes between consecutive vertices for the given layout
pub fn vertex_stride(inputs: &[VertexInput]) -> u32 {
    inputs.iter().map(|input| input.byte_size()).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadeMode {
    #[default]
    Fill,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFaceMode {
    Clockwise,
    #[default]
    CounterClockwise,
}

/// Descriptor for creating a graphics pipeline
#[derive(Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub name: &'a str,
    pub vertex_inputs: &'a [VertexInput],
    pub vertex_shader: &'a dyn Shader,
    pub fragment_shader: Option<&'a dyn Shader>,
    pub template_render_pass: &'a dyn RenderPass,
    pub subpass_index: u32,
    pub sampling: ImageSampling,
    pub shade_mode: ShadeMode,
    pub cull_mode: CullMode,
    pub front_face_mode: FrontFaceMode,
    /// Bytes of push constants the shaders read
    pub push_constant_size: u32,
}

fn validate_push_constant_size(name: &str, size: u32) -> Result<()> {
    ridge_ensure!(
        size <= MAX_PUSH_CONSTANT_SIZE,
        "ridge::rhi::Pipeline",
        ValueOutOfRange,
        "Push constant size {} of pipeline '{}' exceeds the maximum of {} bytes",
        size,
        name,
        MAX_PUSH_CONSTANT_SIZE
    );
    ridge_ensure!(
        size % 4 == 0,
        "ridge::rhi::Pipeline",
        InvalidValue,
        "Push constant size {} of pipeline '{}' must be a multiple of 4",
        size,
        name
    );
    Ok(())
}

impl GraphicsPipelineDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        const SOURCE: &str = "ridge::rhi::GraphicsPipeline";
        validate_name("Graphics pipeline", self.name)?;

        ridge_ensure!(
            self.vertex_shader.shader_type() == ShaderType::Vertex,
            SOURCE,
            InvalidConfiguration,
            "Vertex shader '{}' of pipeline '{}' is a {:?} shader",
            self.vertex_shader.name(),
            self.name,
            self.vertex_shader.shader_type()
        );

        let api = self.template_render_pass.graphics_api();
        ridge_ensure!(
            self.vertex_shader.graphics_api() == api,
            SOURCE,
            UnexpectedType,
            "Vertex shader '{}' and render pass '{}' of pipeline '{}' come from different backends",
            self.vertex_shader.name(),
            self.template_render_pass.name(),
            self.name
        );
        if let Some(fragment_shader) = self.fragment_shader {
            ridge_ensure!(
                fragment_shader.shader_type() == ShaderType::Fragment,
                SOURCE,
                InvalidConfiguration,
                "Fragment shader '{}' of pipeline '{}' is a {:?} shader",
                fragment_shader.name(),
                self.name,
                fragment_shader.shader_type()
            );
            ridge_ensure!(
                fragment_shader.graphics_api() == api,
                SOURCE,
                UnexpectedType,
                "Fragment shader '{}' and render pass '{}' of pipeline '{}' come from different backends",
                fragment_shader.name(),
                self.template_render_pass.name(),
                self.name
            );
        }

        ridge_ensure!(
            self.subpass_index < self.template_render_pass.subpass_count(),
            SOURCE,
            ValueOutOfRange,
            "Subpass {} of pipeline '{}' does not exist, render pass '{}' has {}",
            self.subpass_index,
            self.name,
            self.template_render_pass.name(),
            self.template_render_pass.subpass_count()
        );

        validate_push_constant_size(self.name, self.push_constant_size)
    }
}

/// Graphics pipeline resource trait
pub trait GraphicsPipeline: RenderingResource {
    fn push_constant_size(&self) -> u32;

    /// Bytes between consecutive vertices of the bound vertex buffer
    fn vertex_stride(&self) -> u32;
}

/// Descriptor for creating a compute pipeline
#[derive(Clone, Copy)]
pub struct ComputePipelineDesc<'a> {
    pub name: &'a str,
    pub compute_shader: &'a dyn Shader,
    pub push_constant_size: u32,
}

impl ComputePipelineDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        validate_name("Compute pipeline", self.name)?;
        ridge_ensure!(
            self.compute_shader.shader_type() == ShaderType::Compute,
            "ridge::rhi::ComputePipeline",
            InvalidConfiguration,
            "Compute shader '{}' of pipeline '{}' is a {:?} shader",
            self.compute_shader.name(),
            self.name,
            self.compute_shader.shader_type()
        );
        validate_push_constant_size(self.name, self.push_constant_size)
    }
}

/// Compute pipeline resource trait
pub trait ComputePipeline: RenderingResource {
    fn push_constant_size(&self) -> u32;
}
