//! Backend-agnostic rendering contracts
//!
//! Traits describe what every backend implements; descriptors and their
//! `validate` methods hold the creation rules so that each backend checks
//! exactly the same things.

pub mod buffer;
pub mod command_buffer;
pub mod config;
pub mod device;
pub mod image;
pub mod image_format;
pub mod pipeline;
pub mod queue;
pub mod render_pass;
pub mod rendering_context;
pub mod rendering_resource;
pub mod resource_table;
pub mod sampler;
pub mod shader;
pub mod swapchain;

#[cfg(test)]
pub(crate) mod mock_backend;

pub use buffer::*;
pub use command_buffer::*;
pub use config::*;
pub use device::*;
pub use image::*;
pub use image_format::*;
pub use pipeline::*;
pub use queue::*;
pub use render_pass::*;
pub use rendering_context::*;
pub use rendering_resource::{downcast_resource, GraphicsApi, RenderingResource};
pub use resource_table::*;
pub use sampler::*;
pub use shader::*;
pub use swapchain::*;
