/// Backend selection
///
/// The caller names the graphics API; there is no automatic choice and no
/// substitution. A backend that is compiled out, declared without an
/// implementation, or that fails to start yields an error entry in the log
/// and `None`.

use ridge_rhi::ridge::rhi::{GraphicsApi, RenderingContext, RenderingContextDesc};
use ridge_rhi::ridge::{Error, Result};
use ridge_rhi::{ridge_error, ridge_info};

const SOURCE: &str = "ridge::RenderingContext";

/// Create a rendering context on `desc.graphics_api`
///
/// Returns `None` when that backend cannot be used; the reason is logged at
/// ERROR severity. Another backend is never tried in its place.
pub fn create_rendering_context(desc: &RenderingContextDesc) -> Option<Box<dyn RenderingContext>> {
    match create_backend(desc) {
        Ok(context) => {
            ridge_info!(SOURCE, "Rendering context '{}' uses {}", desc.name, desc.graphics_api.name());
            Some(context)
        }
        Err(error) => {
            ridge_error!(
                SOURCE,
                "Cannot create rendering context '{}' on {}: {}",
                desc.name,
                desc.graphics_api.name(),
                error
            );
            None
        }
    }
}

/// Whether `api` has a backend compiled into this build for the current target
pub fn is_backend_available(api: GraphicsApi) -> bool {
    match api {
        GraphicsApi::Vulkan => cfg!(feature = "vulkan"),
        GraphicsApi::Metal => cfg!(all(feature = "metal", target_vendor = "apple")),
        GraphicsApi::DirectX | GraphicsApi::OpenGL => false,
    }
}

fn create_backend(desc: &RenderingContextDesc) -> Result<Box<dyn RenderingContext>> {
    desc.validate()?;
    match desc.graphics_api {
        GraphicsApi::Vulkan => create_vulkan(desc),
        GraphicsApi::Metal => create_metal(desc),
        api @ (GraphicsApi::DirectX | GraphicsApi::OpenGL) => {
            Err(Error::UnsupportedFeature(format!("{} has no backend", api.name())))
        }
    }
}

#[cfg(feature = "vulkan")]
fn create_vulkan(desc: &RenderingContextDesc) -> Result<Box<dyn RenderingContext>> {
    Ok(Box::new(ridge_rhi_vulkan::VulkanRenderingContext::new(desc)?))
}

#[cfg(not(feature = "vulkan"))]
fn create_vulkan(_desc: &RenderingContextDesc) -> Result<Box<dyn RenderingContext>> {
    Err(Error::UnsupportedFeature("the Vulkan backend is not compiled in (feature \"vulkan\")".to_string()))
}

#[cfg(feature = "metal")]
fn create_metal(desc: &RenderingContextDesc) -> Result<Box<dyn RenderingContext>> {
    Ok(Box::new(ridge_rhi_metal::MetalRenderingContext::new(desc)?))
}

#[cfg(not(feature = "metal"))]
fn create_metal(_desc: &RenderingContextDesc) -> Result<Box<dyn RenderingContext>> {
    Err(Error::UnsupportedFeature("the Metal backend is not compiled in (feature \"metal\")".to_string()))
}

#[cfg(test)]
#[path = "rendering_context_tests.rs"]
mod tests;
