/// Shader - Metal implementation of the Shader trait
///
/// The metallib blob matching the target OS is loaded into a library and its
/// entry function looked up. Compute shaders also read their threadgroup
/// size from the SPIR-V blob the library was translated from.

use objc2::runtime::ProtocolObject;
use objc2_foundation::{NSString, NSURL};
use objc2_metal::{MTLDevice, MTLFunction, MTLLibrary};
use ridge_rhi::ridge::rhi::{Shader, ShaderBlob, ShaderBundle, ShaderDesc, ShaderType};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_debug, ridge_err};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::metal_context::{label, nil_error, ns_error, MetalContext};
use crate::metal_handle::MetalHandle;
use crate::metal_layout::{entry_point_name, threadgroup_size, SOURCE};

/// Metal shader implementation
pub struct MetalShader {
    _ctx: Arc<MetalContext>,
    name: String,
    pub(crate) function: MetalHandle<ProtocolObject<dyn MTLFunction>>,
    /// Threads per threadgroup of compute shaders
    pub(crate) threadgroup_size: [u32; 3],
    shader_type: ShaderType,
}

/// Library file written for `newLibraryWithURL`, removed on drop
struct TemporaryLibrary(PathBuf);

impl TemporaryLibrary {
    fn write(shader_name: &str, bytes: &[u8]) -> Result<Self> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        let path = std::env::temp_dir().join(format!(
            "ridge-{}-{}.metallib",
            std::process::id(),
            NEXT_ID.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&path, bytes).map_err(|e| {
            ridge_err!(SOURCE, BackendError, "Could not stage metallib of shader '{}': {}", shader_name, e)
        })?;
        Ok(Self(path))
    }
}

impl Drop for TemporaryLibrary {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

impl MetalShader {
    pub(crate) fn new(ctx: Arc<MetalContext>, desc: &ShaderDesc) -> Result<Self> {
        let bundle = ShaderBundle::parse(desc.bundle)?;
        let metallib = bundle.require_blob(ShaderBlob::native_metal_lib(), desc.name)?;

        let staged = TemporaryLibrary::write(desc.name, metallib)?;
        let path = NSString::from_str(&staged.0.to_string_lossy());
        let url = unsafe { NSURL::fileURLWithPath(&path) };
        let library = unsafe { ctx.device.newLibraryWithURL_error(&url) }
            .map_err(|e| ns_error(format_args!("load metallib of shader '{}'", desc.name), &e))?;
        drop(staged);

        let function_names: Vec<String> = unsafe { library.functionNames() }
            .iter()
            .map(|name| name.to_string())
            .collect();
        let entry_point = entry_point_name(&function_names)
            .ok_or_else(|| ridge_err!(SOURCE, InvalidValue, "Metal library of shader '{}' has no function", desc.name))?;
        let function = unsafe { library.newFunctionWithName(&NSString::from_str(entry_point)) }
            .ok_or_else(|| nil_error(format_args!("look up function '{}' of shader '{}'", entry_point, desc.name)))?;
        unsafe { function.setLabel(Some(&label(desc.name))) };

        let threadgroup_size = match desc.shader_type {
            ShaderType::Compute => threadgroup_size(desc.name, bundle.blob(ShaderBlob::SpirV)),
            ShaderType::Vertex | ShaderType::Fragment => [1, 1, 1],
        };
        ridge_debug!(SOURCE, "Shader '{}' entered through '{}'", desc.name, entry_point);

        Ok(Self {
            _ctx: ctx,
            name: desc.name.to_string(),
            function: MetalHandle::new(function),
            threadgroup_size,
            shader_type: desc.shader_type,
        })
    }
}

crate::metal_resource!(MetalShader);

impl Shader for MetalShader {
    fn shader_type(&self) -> ShaderType {
        self.shader_type
    }
}
