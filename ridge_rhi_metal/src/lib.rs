/*!
# Ridge - Metal backend

Metal implementation of the `ridge_rhi` contracts on top of the objc2
bindings. The native code only exists on Apple targets; everywhere else the
crate still builds and [`MetalRenderingContext::new`] reports
`UnsupportedFeature`.

Resources are bound through one argument buffer per resource table, shader
bytes come from the metallib blob of the shader bundle matching the target
OS, and queue completion is tracked with one shared event per queue.
*/

// Layout and planning helpers are only called by the native implementation
#![cfg_attr(not(target_vendor = "apple"), allow(dead_code))]
// Native calls are wrapped uniformly, whether or not objc2 marks them unsafe
#![cfg_attr(target_vendor = "apple", allow(unused_unsafe))]

/// Implement `RenderingResource` for a Metal type with a `name: String` field
#[cfg_attr(not(target_vendor = "apple"), allow(unused_macros))]
macro_rules! metal_resource {
    ($type:ty) => {
        impl ::ridge_rhi::ridge::rhi::RenderingResource for $type {
            fn name(&self) -> &str {
                &self.name
            }

            fn graphics_api(&self) -> ::ridge_rhi::ridge::rhi::GraphicsApi {
                ::ridge_rhi::ridge::rhi::GraphicsApi::Metal
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}
#[cfg_attr(not(target_vendor = "apple"), allow(unused_imports))]
pub(crate) use metal_resource;

mod metal;
mod metal_format;
mod metal_handle;
mod metal_layout;
mod metal_subpass;

#[cfg(target_vendor = "apple")]
mod metal_context;
#[cfg(target_vendor = "apple")]
mod metal_device;
#[cfg(target_vendor = "apple")]
mod metal_queue;
#[cfg(target_vendor = "apple")]
mod metal_command_buffer;
#[cfg(target_vendor = "apple")]
mod metal_swapchain;

// Resources
#[cfg(target_vendor = "apple")]
mod metal_buffer;
#[cfg(target_vendor = "apple")]
mod metal_image;
#[cfg(target_vendor = "apple")]
mod metal_sampler;
#[cfg(target_vendor = "apple")]
mod metal_shader;
#[cfg(target_vendor = "apple")]
mod metal_pipeline;
#[cfg(target_vendor = "apple")]
mod metal_render_pass;
#[cfg(target_vendor = "apple")]
mod metal_resource_table;

pub use metal::MetalRenderingContext;
pub use metal_handle::MetalHandle;
pub use metal_layout::{
    PUSH_CONSTANT_BUFFER_INDEX, RESOURCE_TABLE_BUFFER_INDEX, RESOURCE_TABLE_CAPACITIES, VERTEX_BUFFER_INDEX,
};

#[cfg(target_vendor = "apple")]
pub use metal_device::MetalDevice;
