/// Rendering context: the entry point of a backend

use crate::error::Result;
use crate::rhi::config::{Config, ValidationStats};
use crate::rhi::device::{Device, DeviceDesc};
use crate::rhi::rendering_resource::{validate_name, GraphicsApi, RenderingResource};

/// Descriptor for creating a rendering context
#[derive(Debug, Clone)]
pub struct RenderingContextDesc<'a> {
    pub name: &'a str,
    pub graphics_api: GraphicsApi,
    pub config: Config,
}

impl RenderingContextDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        validate_name("Rendering context", self.name)
    }
}

/// Backend instance (Vulkan instance, Metal system device list)
pub trait RenderingContext: RenderingResource {
    /// Create a logical device on the most capable adapter
    fn create_device(&self, desc: &DeviceDesc) -> Result<Box<dyn Device>>;

    /// Validation messages counted so far (all zero when stats are disabled)
    fn validation_stats(&self) -> ValidationStats {
        ValidationStats::default()
    }
}
