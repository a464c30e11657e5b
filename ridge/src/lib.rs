/*!
# Ridge

Entry point of the Ridge rendering hardware interface.

Applications depend on this crate only. It re-exports the backend-agnostic
contracts of `ridge_rhi` and creates a [`RenderingContext`] on the graphics
API the caller names. Backends are compiled in through cargo features:

- `vulkan` (default): `ridge_rhi_vulkan`
- `vulkan-validation`: Vulkan plus the Khronos validation layer support
- `metal`: `ridge_rhi_metal` (only functional on Apple targets)

# Example

```no_run
use ridge::ridge::rhi::{Config, DeviceDesc, GraphicsApi, RenderingContextDesc};

let context = ridge::create_rendering_context(&RenderingContextDesc {
    name: "main",
    graphics_api: GraphicsApi::Vulkan,
    config: Config::default(),
})
.expect("Vulkan is not available");
let device = context.create_device(&DeviceDesc { name: "main device" }).unwrap();
```
*/

mod rendering_context;

pub use rendering_context::{create_rendering_context, is_backend_available};

pub use ridge_rhi::{glam, ridge};
pub use ridge_rhi::{ridge_bail, ridge_debug, ridge_ensure, ridge_err, ridge_error, ridge_info, ridge_trace, ridge_warn};

#[cfg(feature = "vulkan")]
pub use ridge_rhi_vulkan;

#[cfg(feature = "metal")]
pub use ridge_rhi_metal;
