/// Shader - Vulkan implementation of the Shader trait
///
/// The SPIR-V blob of the bundle is reflected with spirq to find the entry
/// point and the size of its push constant block.

use ash::vk;
use ridge_rhi::ridge::rhi::{Shader, ShaderBlob, ShaderBundle, ShaderDesc, ShaderType};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_bail, ridge_err};
use std::ffi::CString;
use std::io::Cursor;
use std::sync::Arc;

use crate::vulkan_context::{vk_error, GpuContext, SOURCE};

/// Vulkan shader implementation
pub struct VulkanShader {
    ctx: Arc<GpuContext>,
    name: String,
    pub(crate) module: vk::ShaderModule,
    pub(crate) entry_point: CString,
    /// Bytes of push constants the entry point reads
    pub(crate) push_constant_size: u32,
    shader_type: ShaderType,
}

impl VulkanShader {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &ShaderDesc) -> Result<Self> {
        let bundle = ShaderBundle::parse(desc.bundle)?;
        let blob = bundle.require_blob(ShaderBlob::SpirV, desc.name)?;
        let code = ash::util::read_spv(&mut Cursor::new(blob)).map_err(|e| {
            ridge_err!(SOURCE, InvalidValue, "SPIR-V of shader '{}' is malformed: {}", desc.name, e)
        })?;

        let (entry_point, push_constant_size) = reflect(desc.name, &code)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { ctx.device.create_shader_module(&create_info, None) }
            .map_err(|e| vk_error(format_args!("create shader module '{}'", desc.name), e))?;
        ctx.set_object_name(module, desc.name);

        Ok(Self {
            ctx,
            name: desc.name.to_string(),
            module,
            entry_point,
            push_constant_size,
            shader_type: desc.shader_type,
        })
    }

    pub(crate) fn stage(&self) -> vk::ShaderStageFlags {
        shader_stage_to_vk(self.shader_type)
    }
}

pub(crate) fn shader_stage_to_vk(shader_type: ShaderType) -> vk::ShaderStageFlags {
    match shader_type {
        ShaderType::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderType::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderType::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

/// Entry point name ("main" when present, else the first one) and push constant block size
fn reflect(name: &str, code: &[u32]) -> Result<(CString, u32)> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| ridge_err!(SOURCE, InvalidValue, "SPIR-V reflection of shader '{}' failed: {:?}", name, e))?;

    let Some(entry_point) = entry_points
        .iter()
        .find(|entry_point| entry_point.name == "main")
        .or_else(|| entry_points.first())
    else {
        ridge_bail!(SOURCE, InvalidValue, "Shader '{}' has no entry point", name);
    };

    let push_constant_size = entry_point
        .vars
        .iter()
        .filter_map(|var| match var {
            spirq::var::Variable::PushConstant { ty, .. } => ty.nbyte(),
            _ => None,
        })
        .max()
        .unwrap_or(0) as u32;

    let entry_name = CString::new(entry_point.name.as_str())
        .map_err(|_| ridge_err!(SOURCE, InvalidValue, "Entry point of shader '{}' contains a NUL byte", name))?;
    Ok((entry_name, push_constant_size))
}

crate::vulkan_resource!(VulkanShader);

impl Shader for VulkanShader {
    fn shader_type(&self) -> ShaderType {
        self.shader_type
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_shader_module(self.module, None);
        }
    }
}
