/// Swapchain - Vulkan implementation of the Swapchain trait
///
/// Acquisition waits on a fence, so the acquired image is ready as soon as
/// `acquire_next_image` returns. Presentation bridges the timeline of the
/// presented command buffer to a binary semaphore with an empty submission.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use ridge_rhi::ridge::rhi::{
    downcast_resource, validate_image_index, validate_window_open, CommandBuffer, GraphicsApi, Image, ImageFormat,
    QueueOperations, RenderingResource, SurfaceWindow, Swapchain, SwapchainDesc, SwapchainPresentationMode,
    SwapchainResizeEvent,
};
use ridge_rhi::ridge::utils::event_dispatcher::{EventDispatcher, Listener, ListenerId};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_bail, ridge_debug, ridge_ensure, ridge_err, ridge_info};
use std::sync::Arc;

use crate::vulkan_command_buffer::VulkanCommandBuffer;
use crate::vulkan_context::{lock, vk_error, GpuContext, SOURCE};
use crate::vulkan_format::{image_format_to_vk, SWAPCHAIN_FALLBACK_FORMATS};
use crate::vulkan_image::VulkanImage;
use crate::vulkan_queue::VulkanQueue;

/// Vulkan swapchain implementation
pub struct VulkanSwapchain {
    ctx: Arc<GpuContext>,
    name: String,
    window: Arc<dyn SurfaceWindow>,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    /// Internal queue on a family able to present to `surface`
    queue: VulkanQueue,
    surface_format: vk::SurfaceFormatKHR,
    format: ImageFormat,
    presentation_mode: SwapchainPresentationMode,
    present_mode: vk::PresentModeKHR,
    requested_image_count: u32,
    extent: vk::Extent2D,
    images: Vec<VulkanImage>,
    /// One per image, signaled by the bridging submission and waited by present
    present_semaphores: Vec<vk::Semaphore>,
    acquire_fence: vk::Fence,
    frame_index: u32,
    image_index: u32,
    /// Set when the native swapchain reported suboptimal or out of date
    outdated: bool,
    resize_dispatcher: EventDispatcher<SwapchainResizeEvent>,
}

/// Surface properties picked once at creation
struct SurfaceChoice {
    family_index: u32,
    format: ImageFormat,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
}

impl VulkanSwapchain {
    /// `desc` is already validated
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &SwapchainDesc) -> Result<Self> {
        let surface = create_surface(&ctx, desc.window.as_ref(), desc.name)?;
        let destroy_surface = |ctx: &GpuContext| unsafe { ctx.instance.surface_loader.destroy_surface(surface, None) };

        let choice = match choose_surface(&ctx, desc, surface) {
            Ok(choice) => choice,
            Err(error) => {
                destroy_surface(&ctx);
                return Err(error);
            }
        };
        let acquire_fence = match unsafe { ctx.device.create_fence(&vk::FenceCreateInfo::default(), None) } {
            Ok(fence) => fence,
            Err(e) => {
                destroy_surface(&ctx);
                return Err(vk_error(format_args!("create acquire fence of swapchain '{}'", desc.name), e));
            }
        };
        let queue = VulkanQueue::new(
            Arc::clone(&ctx),
            &format!("{} present queue", desc.name),
            choice.family_index,
            QueueOperations::GRAPHICS,
        );
        let queue = match queue {
            Ok(queue) => queue,
            Err(error) => {
                unsafe { ctx.device.destroy_fence(acquire_fence, None) };
                destroy_surface(&ctx);
                return Err(error);
            }
        };

        // From here on Drop releases everything
        let mut swapchain = Self {
            ctx,
            name: desc.name.to_string(),
            window: Arc::clone(&desc.window),
            surface,
            swapchain: vk::SwapchainKHR::null(),
            queue,
            surface_format: choice.surface_format,
            format: choice.format,
            presentation_mode: desc.preferred_presentation_mode,
            present_mode: choice.present_mode,
            requested_image_count: desc.preferred_buffering.image_count(),
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            present_semaphores: Vec::new(),
            acquire_fence,
            frame_index: 0,
            image_index: 0,
            outdated: false,
            resize_dispatcher: EventDispatcher::new(),
        };
        swapchain.create_images(desc.window.framebuffer_size())?;

        ridge_info!(
            SOURCE,
            "Swapchain '{}' created: {} images of {:?}, {}x{}, {:?}",
            swapchain.name,
            swapchain.images.len(),
            swapchain.format,
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.present_mode
        );
        Ok(swapchain)
    }

    /// (Re)create the native swapchain and its images at `window_size`
    fn create_images(&mut self, window_size: (u32, u32)) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        let surface = self.surface;
        let capabilities = unsafe {
            ctx.instance
                .surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, surface)
        }
        .map_err(|e| vk_error(format_args!("query surface capabilities of swapchain '{}'", self.name), e))?;

        let extent = swapchain_extent(&capabilities, window_size);
        let mut image_count = self.requested_image_count.max(capabilities.min_image_count);
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);
        let swapchain = unsafe { ctx.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| vk_error(format_args!("create swapchain '{}'", self.name), e))?;

        // The old images must be released before the old swapchain
        self.release_images();
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { ctx.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;
        self.extent = extent;

        let native_images = unsafe { ctx.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(|e| vk_error(format_args!("get images of swapchain '{}'", self.name), e))?;
        for (index, &image) in native_images.iter().enumerate() {
            let image_name = format!("{} image {}", self.name, index);
            self.images
                .push(VulkanImage::from_swapchain(Arc::clone(&ctx), image_name, image, self.format, extent)?);
            let semaphore = unsafe { ctx.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
                .map_err(|e| vk_error(format_args!("create present semaphore of swapchain '{}'", self.name), e))?;
            self.present_semaphores.push(semaphore);
        }

        self.frame_index = 0;
        self.image_index = 0;
        self.outdated = false;
        Ok(())
    }

    fn release_images(&mut self) {
        self.images.clear();
        for semaphore in self.present_semaphores.drain(..) {
            unsafe { self.ctx.device.destroy_semaphore(semaphore, None) };
        }
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
        unsafe { self.ctx.device.device_wait_idle() }
            .map_err(|e| vk_error(format_args!("wait for idle before resizing swapchain '{}'", self.name), e))?;
        self.create_images(window_size)
    }
}

fn choose_surface(ctx: &GpuContext, desc: &SwapchainDesc, surface: vk::SurfaceKHR) -> Result<SurfaceChoice> {
    let surface_loader = &ctx.instance.surface_loader;
    let family_index = ctx
        .queue_families
        .iter()
        .filter(|family| family.operations.contains(QueueOperations::GRAPHICS))
        .find(|family| unsafe {
            surface_loader
                .get_physical_device_surface_support(ctx.physical_device, family.index, surface)
                .unwrap_or(false)
        })
        .map(|family| family.index)
        .ok_or_else(|| ridge_err!(SOURCE, UnsupportedFeature, "No queue family can present swapchain '{}'", desc.name))?;

    let surface_formats = unsafe { surface_loader.get_physical_device_surface_formats(ctx.physical_device, surface) }
        .map_err(|e| vk_error(format_args!("query surface formats of swapchain '{}'", desc.name), e))?;
    let (format, surface_format) =
        choose_surface_format(desc.preferred_image_memory_type.preferred_formats(), &surface_formats)
            .ok_or_else(|| ridge_err!(SOURCE, UnsupportedFeature, "No usable surface format for swapchain '{}'", desc.name))?;

    let present_modes = unsafe { surface_loader.get_physical_device_surface_present_modes(ctx.physical_device, surface) }
        .map_err(|e| vk_error(format_args!("query present modes of swapchain '{}'", desc.name), e))?;

    Ok(SurfaceChoice {
        family_index,
        format,
        surface_format,
        present_mode: choose_present_mode(desc.preferred_presentation_mode, &present_modes),
    })
}

fn create_surface(ctx: &GpuContext, window: &dyn SurfaceWindow, name: &str) -> Result<vk::SurfaceKHR> {
    let display = window
        .display_handle()
        .map_err(|e| ridge_err!(SOURCE, BackendError, "Window of swapchain '{}' has no display handle: {}", name, e))?;
    let handle = window
        .window_handle()
        .map_err(|e| ridge_err!(SOURCE, BackendError, "Window of swapchain '{}' has no window handle: {}", name, e))?;
    unsafe {
        ash_window::create_surface(
            &ctx.instance.entry,
            &ctx.instance.instance,
            display.as_raw(),
            handle.as_raw(),
            None,
        )
    }
    .map_err(|e| vk_error(format_args!("create surface of swapchain '{}'", name), e))
}

/// First preferred format the surface offers, then the fallback list
pub(crate) fn choose_surface_format(
    preferred: &[ImageFormat],
    available: &[vk::SurfaceFormatKHR],
) -> Option<(ImageFormat, vk::SurfaceFormatKHR)> {
    preferred
        .iter()
        .chain(SWAPCHAIN_FALLBACK_FORMATS.iter())
        .find_map(|&format| {
            let vk_format = image_format_to_vk(format);
            available
                .iter()
                .find(|surface_format| surface_format.format == vk_format)
                .map(|&surface_format| (format, surface_format))
        })
}

/// FIFO is always available and is the VSync mode
pub(crate) fn choose_present_mode(
    mode: SwapchainPresentationMode,
    available: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    match mode {
        SwapchainPresentationMode::VSync => vk::PresentModeKHR::FIFO,
        SwapchainPresentationMode::Immediate => [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
            .into_iter()
            .find(|mode| available.contains(mode))
            .unwrap_or(vk::PresentModeKHR::FIFO),
    }
}

pub(crate) fn swapchain_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: window_size
            .0
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: window_size
            .1
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

crate::vulkan_resource!(VulkanSwapchain);

impl Swapchain for VulkanSwapchain {
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
        if self.outdated || window_size != (self.extent.width, self.extent.height) {
            self.recreate(window_size)?;
        }

        // A second out-of-date report right after recreation is an error
        for attempt in 0..2 {
            let acquired = unsafe {
                self.ctx
                    .swapchain_loader
                    .acquire_next_image(self.swapchain, u64::MAX, vk::Semaphore::null(), self.acquire_fence)
            };
            match acquired {
                Ok((index, suboptimal)) => {
                    unsafe {
                        self.ctx
                            .device
                            .wait_for_fences(&[self.acquire_fence], true, u64::MAX)
                            .and_then(|()| self.ctx.device.reset_fences(&[self.acquire_fence]))
                    }
                    .map_err(|e| vk_error(format_args!("wait for image of swapchain '{}'", self.name), e))?;
                    self.image_index = index;
                    self.outdated = suboptimal;
                    return Ok(());
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) if attempt == 0 => {
                    self.recreate(self.window.framebuffer_size())?;
                }
                Err(e) => return Err(vk_error(format_args!("acquire image of swapchain '{}'", self.name), e)),
            }
        }
        ridge_bail!(SOURCE, BackendError, "Swapchain '{}' stayed out of date after recreation", self.name)
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
        let vulkan_buffer = downcast_resource::<VulkanCommandBuffer, _>(command_buffer, GraphicsApi::Vulkan)?;
        let (timeline, value) = vulkan_buffer.completion_point();
        let semaphore = self.present_semaphores[self.image_index as usize];

        self.queue
            .submit(None, &[(timeline, value, vk::PipelineStageFlags::ALL_COMMANDS)], Some(semaphore))?;

        let family = self.ctx.queue_family(self.queue.family_index()).ok_or_else(|| {
            ridge_err!(SOURCE, BackendError, "Present queue family of swapchain '{}' disappeared", self.name)
        })?;
        let wait_semaphores = [semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [self.image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let presented = {
            let queue = lock(&family.queue);
            unsafe { self.ctx.swapchain_loader.queue_present(*queue, &present_info) }
        };
        match presented {
            Ok(suboptimal) => self.outdated |= suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.outdated = true,
            Err(e) => return Err(vk_error(format_args!("present swapchain '{}'", self.name), e)),
        }

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

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            let _ = self.ctx.device.device_wait_idle();
        }
        self.release_images();
        unsafe {
            self.ctx.device.destroy_fence(self.acquire_fence, None);
            if self.swapchain != vk::SwapchainKHR::null() {
                self.ctx.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            if self.surface != vk::SurfaceKHR::null() {
                self.ctx.instance.surface_loader.destroy_surface(self.surface, None);
            }
        }
    }
}
