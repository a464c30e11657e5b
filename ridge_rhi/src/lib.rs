/*!
# Ridge RHI

Backend-agnostic rendering hardware interface.

This crate holds the contracts every backend implements, the creation rules
that validate them, and the logic that does not depend on a native API:

- **Device / RenderingContext**: factories and capability queries
- **Buffer, Image, Sampler, Shader**: leaf resources
- **ResourceTable**: bindless binding of buffers, images and samplers
- **RenderPass, GraphicsPipeline, ComputePipeline**: fixed-function and programmable state
- **CommandBuffer**: recording state machine, usage synchronization, deferred destruction
- **Queue, Swapchain**: submission and presentation
- **ArenaAllocator, UploadQueue**: mesh consolidation and threaded image uploads

Backends (`ridge_rhi_vulkan`, `ridge_rhi_metal`) provide concrete types behind
these traits; the `ridge` crate selects one at runtime.
*/

mod error;
mod instance;
pub mod log;
pub mod rhi;
pub mod utils;
pub mod arena_allocator;
pub mod upload_queue;

// Main ridge namespace module
pub mod ridge {
    // Error types
    pub use crate::error::{Error, Result};

    // Process logger
    pub use crate::instance::Ridge;

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
    }

    // Rendering contracts
    pub mod rhi {
        pub use crate::rhi::*;
        pub use crate::arena_allocator::{ArenaAllocator, ArenaMesh, Vertex};
        pub use crate::upload_queue::{ImageUploadRequest, UploadQueue, UploadSender, UploadTicket};
    }

    pub mod utils {
        pub use crate::utils::*;
    }
}

// Re-export math library at crate root
pub use glam;
