/// Swapchain - Metal implementation of the Swapchain trait
///
/// A `CAMetalLayer` hands out drawables only at present time, so the
/// swapchain renders into its own offscreen images and copies the current
/// one into a fresh drawable when presenting. The copy runs on an internal
/// queue after the presented command buffer's completion event.

use objc2::rc::Retained;
use objc2::runtime::{AnyObject, ProtocolObject};
use objc2::msg_send;
use objc2_core_foundation::CGSize;
use objc2_metal::{MTLBlitCommandEncoder, MTLCommandBuffer, MTLCommandEncoder, MTLDrawable};
use objc2_quartz_core::{CAMetalDrawable, CAMetalLayer};
use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use ridge_rhi::ridge::rhi::{
    downcast_resource, validate_image_index, validate_window_open, CommandBuffer, GraphicsApi, Image, ImageDesc,
    ImageFormat, ImageMemoryLocation, ImageSampling, ImageType, ImageUsage, RenderingResource, SurfaceWindow,
    Swapchain, SwapchainDesc, SwapchainPresentationMode, SwapchainResizeEvent,
};
use ridge_rhi::ridge::utils::event_dispatcher::{EventDispatcher, Listener, ListenerId};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_bail, ridge_debug, ridge_ensure, ridge_err, ridge_info};
use std::sync::Arc;

use crate::metal_command_buffer::MetalCommandBuffer;
use crate::metal_context::{label, nil_error, MetalContext, MetalTimeline, NativeCommandBuffer};
use crate::metal_format::{layer_format, pixel_format};
use crate::metal_handle::MetalHandle;
use crate::metal_image::MetalImage;
use crate::metal_layout::SOURCE;

/// Metal swapchain implementation
pub struct MetalSwapchain {
    ctx: Arc<MetalContext>,
    name: String,
    window: Arc<dyn SurfaceWindow>,
    layer: MetalHandle<CAMetalLayer>,
    /// Internal queue running the copies into drawables
    present_timeline: Arc<MetalTimeline>,
    format: ImageFormat,
    presentation_mode: SwapchainPresentationMode,
    image_count: u32,
    extent: (u32, u32),
    images: Vec<MetalImage>,
    /// Last present copy reading each image
    present_commits: Vec<Option<MetalHandle<NativeCommandBuffer>>>,
    frame_index: u32,
    image_index: u32,
    resize_dispatcher: EventDispatcher<SwapchainResizeEvent>,
}

impl MetalSwapchain {
    /// `desc` is already validated
    pub(crate) fn new(ctx: Arc<MetalContext>, desc: &SwapchainDesc) -> Result<Self> {
        let format = layer_format(desc.preferred_image_memory_type.preferred_formats());
        let native_format = pixel_format(format).ok_or_else(|| {
            ridge_err!(SOURCE, UnsupportedFeature, "Format {:?} of swapchain '{}' has no Metal equivalent", format, desc.name)
        })?;
        let image_count = desc.preferred_buffering.image_count();

        let layer = unsafe { CAMetalLayer::new() };
        unsafe {
            layer.setDevice(Some(&ctx.device));
            layer.setPixelFormat(native_format);
            layer.setFramebufferOnly(false);
            layer.setMaximumDrawableCount(image_count as usize);
            layer.setContentsScale(desc.window.scaling() as f64);
            #[cfg(target_os = "macos")]
            layer.setDisplaySyncEnabled(desc.preferred_presentation_mode == SwapchainPresentationMode::VSync);
        }
        attach_layer(desc.window.as_ref(), &layer, desc.name)?;

        let present_timeline = MetalTimeline::new(Arc::clone(&ctx), &format!("{} present queue", desc.name))?;
        let mut swapchain = Self {
            ctx,
            name: desc.name.to_string(),
            window: Arc::clone(&desc.window),
            layer: MetalHandle::new(layer),
            present_timeline,
            format,
            presentation_mode: desc.preferred_presentation_mode,
            image_count,
            extent: (0, 0),
            images: Vec::new(),
            present_commits: Vec::new(),
            frame_index: 0,
            image_index: 0,
            resize_dispatcher: EventDispatcher::new(),
        };
        swapchain.create_images(desc.window.framebuffer_size())?;

        ridge_info!(
            SOURCE,
            "Swapchain '{}' created: {} images of {:?}, {}x{}, {:?}",
            swapchain.name,
            swapchain.images.len(),
            swapchain.format,
            swapchain.extent.0,
            swapchain.extent.1,
            swapchain.presentation_mode
        );
        Ok(swapchain)
    }

    /// (Re)create the offscreen images and resize the layer to `window_size`
    fn create_images(&mut self, window_size: (u32, u32)) -> Result<()> {
        let extent = (window_size.0.max(1), window_size.1.max(1));
        self.images.clear();
        self.present_commits.clear();
        for index in 0..self.image_count {
            let image_name = format!("{} image {}", self.name, index);
            let desc = ImageDesc {
                name: &image_name,
                width: extent.0,
                height: extent.1,
                depth: 1,
                image_type: ImageType::Plane,
                format: self.format,
                level_count: 1,
                layer_count: 1,
                sampling: ImageSampling::X1,
                usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::SOURCE_MEMORY | ImageUsage::DESTINATION_MEMORY,
                memory_location: ImageMemoryLocation::Gpu,
            };
            self.images.push(MetalImage::new(Arc::clone(&self.ctx), &desc)?);
            self.present_commits.push(None);
        }
        unsafe {
            self.layer.setDrawableSize(CGSize {
                width: extent.0 as f64,
                height: extent.1 as f64,
            });
        }
        self.extent = extent;
        self.frame_index = 0;
        self.image_index = 0;
        Ok(())
    }

    /// Notify listeners, then rebuild the images once the GPU no longer uses them
    fn recreate(&mut self, window_size: (u32, u32)) -> Result<()> {
        ridge_debug!(
            SOURCE,
            "Swapchain '{}' resized to {}x{}",
            self.name,
            window_size.0,
            window_size.1
        );
        self.resize_dispatcher.dispatch(&SwapchainResizeEvent {
            width: window_size.0,
            height: window_size.1,
            scaling: self.window.scaling(),
        });
        self.ctx.wait_idle()?;
        unsafe { self.layer.setContentsScale(self.window.scaling() as f64) };
        self.create_images(window_size)
    }
}

/// Make `layer` the backing layer of the window's view
fn attach_layer(window: &dyn SurfaceWindow, layer: &CAMetalLayer, name: &str) -> Result<()> {
    let handle = window
        .window_handle()
        .map_err(|e| ridge_err!(SOURCE, BackendError, "Window of swapchain '{}' has no window handle: {}", name, e))?;
    match handle.as_raw() {
        RawWindowHandle::AppKit(handle) => {
            let view = handle.ns_view.as_ptr() as *mut AnyObject;
            unsafe {
                let _: () = msg_send![view, setWantsLayer: true];
                let _: () = msg_send![view, setLayer: layer];
            }
        }
        RawWindowHandle::UiKit(handle) => {
            let view = handle.ui_view.as_ptr() as *mut AnyObject;
            unsafe {
                let root: *mut AnyObject = msg_send![view, layer];
                let _: () = msg_send![root, addSublayer: layer];
            }
        }
        other => ridge_bail!(
            SOURCE,
            UnsupportedFeature,
            "Swapchain '{}' cannot present to a {:?} window",
            name,
            other
        ),
    }
    Ok(())
}

crate::metal_resource!(MetalSwapchain);

impl Swapchain for MetalSwapchain {
    fn acquire_next_image(&mut self) -> Result<()> {
        validate_window_open(&self.name, self.window.as_ref(), "acquire an image")?;
        ridge_ensure!(
            !self.window.is_minimized(),
            SOURCE,
            InvalidOperation,
            "Swapchain '{}' cannot acquire an image while its window is minimized",
            self.name
        );

        let window_size = self.window.framebuffer_size();
        if window_size != self.extent {
            self.recreate(window_size)?;
        }

        // The image is free again once its last copy into a drawable ran
        self.image_index = self.frame_index;
        if let Some(commit) = self.present_commits[self.image_index as usize].take() {
            unsafe { commit.waitUntilCompleted() };
        }
        Ok(())
    }

    fn present(&mut self, command_buffer: &dyn CommandBuffer) -> Result<()> {
        validate_window_open(&self.name, self.window.as_ref(), "present")?;
        ridge_ensure!(
            command_buffer.completion_signal_value() > 0,
            SOURCE,
            InvalidOperation,
            "Swapchain '{}' cannot present after command buffer '{}', which was never submitted",
            self.name,
            command_buffer.name()
        );
        let metal_buffer = downcast_resource::<MetalCommandBuffer, _>(command_buffer, GraphicsApi::Metal)?;
        let (timeline, value) = metal_buffer.completion_point();

        let drawable: Retained<ProtocolObject<dyn CAMetalDrawable>> = unsafe { self.layer.nextDrawable() }
            .ok_or_else(|| nil_error(format_args!("get a drawable for swapchain '{}'", self.name)))?;
        let image = &self.images[self.image_index as usize];
        let native = self.present_timeline.new_command_buffer(&format!("{} present", self.name))?;
        let encoder = unsafe { native.blitCommandEncoder() }
            .ok_or_else(|| nil_error(format_args!("open blit encoder of swapchain '{}'", self.name)))?;
        unsafe {
            encoder.setLabel(Some(&label(&self.name)));
            encoder.copyFromTexture_toTexture(&image.texture, &drawable.texture());
            encoder.endEncoding();
            let drawable: &ProtocolObject<dyn MTLDrawable> = ProtocolObject::from_ref(&*drawable);
            native.presentDrawable(drawable);
        }
        self.present_timeline.commit(&native, &[(timeline.as_ref(), value)])?;
        self.present_commits[self.image_index as usize] = Some(MetalHandle::new(native));

        self.frame_index = (self.frame_index + 1) % self.images.len() as u32;
        Ok(())
    }

    fn add_resize_listener(&mut self, listener: Listener<SwapchainResizeEvent>) -> ListenerId {
        self.resize_dispatcher.add(listener)
    }

    fn remove_resize_listener(&mut self, id: ListenerId) -> bool {
        self.resize_dispatcher.remove(id)
    }

    fn presentation_mode(&self) -> SwapchainPresentationMode {
        self.presentation_mode
    }

    fn current_frame_index(&self) -> u32 {
        self.frame_index
    }

    fn current_image_index(&self) -> u32 {
        self.image_index
    }

    fn concurrent_frame_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn scaling(&self) -> f32 {
        self.window.scaling()
    }

    fn get_image(&self, index: u32) -> Result<&dyn Image> {
        validate_image_index(&self.name, index, self.images.len() as u32)?;
        Ok(&self.images[index as usize])
    }
}

impl Drop for MetalSwapchain {
    fn drop(&mut self) {
        let _ = self.ctx.wait_idle();
    }
}
