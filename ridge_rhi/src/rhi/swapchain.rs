/// Swapchain trait, swapchain descriptor and the window boundary

use std::sync::Arc;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use crate::error::Result;
use crate::rhi::command_buffer::CommandBuffer;
use crate::rhi::image::Image;
use crate::rhi::image_format::ImageFormat;
use crate::rhi::rendering_resource::{validate_name, RenderingResource};
use crate::ridge_ensure;
use crate::utils::event_dispatcher::{Listener, ListenerId};

/// Window a swapchain presents to
///
/// Implemented for `winit::window::Window`; anything exposing raw window
/// handles can implement it.
pub trait SurfaceWindow: HasWindowHandle + HasDisplayHandle + Send + Sync {
    /// Size of the drawable area in physical pixels
    fn framebuffer_size(&self) -> (u32, u32);

    /// Physical pixels per logical pixel
    fn scaling(&self) -> f32;

    fn is_closed(&self) -> bool;

    fn is_minimized(&self) -> bool {
        let (width, height) = self.framebuffer_size();
        width == 0 || height == 0
    }
}

impl SurfaceWindow for winit::window::Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }

    fn scaling(&self) -> f32 {
        self.scale_factor() as f32
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn is_minimized(&self) -> bool {
        winit::window::Window::is_minimized(self).unwrap_or(false) || {
            let size = self.inner_size();
            size.width == 0 || size.height == 0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SwapchainPresentationMode {
    /// Present as soon as possible, tearing allowed
    Immediate,
    /// Wait for the vertical blank
    #[default]
    VSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SwapchainBuffering {
    DoubleBuffering,
    #[default]
    TripleBuffering,
}

impl SwapchainBuffering {
    pub fn image_count(self) -> u32 {
        match self {
            SwapchainBuffering::DoubleBuffering => 2,
            SwapchainBuffering::TripleBuffering => 3,
        }
    }
}

/// Preferred storage of swapchain pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SwapchainImageMemoryType {
    UNorm8,
    #[default]
    SRGB8,
    UNorm16,
}

impl SwapchainImageMemoryType {
    /// Surface formats to look for, best match first
    pub fn preferred_formats(self) -> &'static [ImageFormat] {
        match self {
            SwapchainImageMemoryType::UNorm8 => &[ImageFormat::B8G8R8A8_UNORM, ImageFormat::R8G8B8A8_UNORM],
            SwapchainImageMemoryType::SRGB8 => &[ImageFormat::B8G8R8A8_SRGB, ImageFormat::R8G8B8A8_SRGB],
            SwapchainImageMemoryType::UNorm16 => &[ImageFormat::R16G16B16A16_UNORM, ImageFormat::R16G16B16A16_FLOAT],
        }
    }
}

/// Sent to resize listeners before the swapchain images are recreated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapchainResizeEvent {
    pub width: u32,
    pub height: u32,
    pub scaling: f32,
}

/// Descriptor for creating a swapchain
#[derive(Clone)]
pub struct SwapchainDesc<'a> {
    pub name: &'a str,
    pub window: Arc<dyn SurfaceWindow>,
    pub preferred_presentation_mode: SwapchainPresentationMode,
    pub preferred_buffering: SwapchainBuffering,
    pub preferred_image_memory_type: SwapchainImageMemoryType,
}

impl SwapchainDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        validate_name("Swapchain", self.name)?;
        ridge_ensure!(
            !self.window.is_closed(),
            "ridge::rhi::Swapchain",
            InvalidOperation,
            "Cannot create swapchain '{}' for a closed window",
            self.name
        );
        Ok(())
    }
}

/// Swapchain trait
pub trait Swapchain: RenderingResource {
    /// Advance to the next presentable image. Recreates the images (and
    /// notifies resize listeners first) when the window size changed.
    fn acquire_next_image(&mut self) -> Result<()>;

    /// Present the current image once `command_buffer` (already submitted)
    /// has completed
    fn present(&mut self, command_buffer: &dyn CommandBuffer) -> Result<()>;

    fn add_resize_listener(&mut self, listener: Listener<SwapchainResizeEvent>) -> ListenerId;

    fn remove_resize_listener(&mut self, id: ListenerId) -> bool;

    fn presentation_mode(&self) -> SwapchainPresentationMode;

    /// Frame slot cycling through `0..concurrent_frame_count()`
    fn current_frame_index(&self) -> u32;

    /// Index of the image acquired last
    fn current_image_index(&self) -> u32;

    fn concurrent_frame_count(&self) -> u32;

    fn scaling(&self) -> f32;

    /// Swapchain image `index`, `ValueOutOfRange` past `concurrent_frame_count()`
    fn get_image(&self, index: u32) -> Result<&dyn Image>;

    fn current_image(&self) -> Result<&dyn Image> {
        self.get_image(self.current_image_index())
    }
}

/// Acquire and present both refuse a closed window
pub fn validate_window_open(swapchain_name: &str, window: &dyn SurfaceWindow, operation: &str) -> Result<()> {
    ridge_ensure!(
        !window.is_closed(),
        "ridge::rhi::Swapchain",
        InvalidOperation,
        "Swapchain '{}' cannot {} on a closed window",
        swapchain_name,
        operation
    );
    Ok(())
}

/// Range check shared by the `get_image` implementations
pub fn validate_image_index(swapchain_name: &str, index: u32, count: u32) -> Result<()> {
    ridge_ensure!(
        index < count,
        "ridge::rhi::Swapchain",
        ValueOutOfRange,
        "Swapchain '{}' has {} images, index {} does not exist",
        swapchain_name,
        count,
        index
    );
    Ok(())
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;
