/*!
# Ridge - Vulkan backend

Vulkan implementation of the `ridge_rhi` contracts, built on ash for the
bindings and gpu-allocator for memory management.

Resources from this backend report [`GraphicsApi::Vulkan`](ridge_rhi::ridge::rhi::GraphicsApi)
and may only be combined with other Vulkan resources.

```no_run
use ridge_rhi::ridge::rhi::{Config, DeviceDesc, GraphicsApi, RenderingContext, RenderingContextDesc};
use ridge_rhi_vulkan::VulkanRenderingContext;

let context = VulkanRenderingContext::new(&RenderingContextDesc {
    name: "main",
    graphics_api: GraphicsApi::Vulkan,
    config: Config::default(),
})?;
let device = context.create_device(&DeviceDesc { name: "gpu" })?;
# Ok::<(), ridge_rhi::ridge::Error>(())
```
*/

/// Implement `RenderingResource` for a Vulkan type with a `name: String` field
macro_rules! vulkan_resource {
    ($type:ty) => {
        impl ::ridge_rhi::ridge::rhi::RenderingResource for $type {
            fn name(&self) -> &str {
                &self.name
            }

            fn graphics_api(&self) -> ::ridge_rhi::ridge::rhi::GraphicsApi {
                ::ridge_rhi::ridge::rhi::GraphicsApi::Vulkan
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}
pub(crate) use vulkan_resource;

mod vulkan;
mod vulkan_context;
mod vulkan_device;
mod vulkan_format;
mod vulkan_queue;
mod vulkan_command_buffer;
mod vulkan_swapchain;

// Resources
mod vulkan_buffer;
mod vulkan_image;
mod vulkan_sampler;
mod vulkan_shader;
mod vulkan_pipeline;
mod vulkan_render_pass;
mod vulkan_resource_table;

#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
mod debug;

pub use vulkan::VulkanRenderingContext;
pub use vulkan_device::VulkanDevice;
