/// Shared Vulkan state
///
/// `VulkanInstance` belongs to the rendering context, `GpuContext` to a
/// device. Every resource holds an `Arc<GpuContext>`, so the logical device
/// and the instance are destroyed only after the last resource is dropped.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use ridge_rhi::ridge::rhi::QueueOperations;
use ridge_rhi::ridge::Error;
use std::ffi::CString;
use std::fmt::Display;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::debug::DebugReporter;

pub(crate) const SOURCE: &str = "ridge::vulkan";

/// Log a failed Vulkan call and turn its result code into an [`Error`]
pub(crate) fn vk_error(action: impl Display, result: vk::Result) -> Error {
    ridge_rhi::ridge_error!(SOURCE, "Failed to {}: {:?}", action, result);
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Error::OutOfMemory,
        _ => Error::BackendError(format!("Failed to {}: {:?}", action, result)),
    }
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Instance-level objects, destroyed last
pub(crate) struct VulkanInstance {
    /// Keeps the loader library loaded; also needed to create surfaces
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub surface_loader: ash::khr::surface::Instance,
    pub debug_messenger: Option<DebugMessenger>,
}

/// Validation messenger with the reporter its callback writes to
pub(crate) struct DebugMessenger {
    pub loader: ash::ext::debug_utils::Instance,
    pub messenger: vk::DebugUtilsMessengerEXT,
    /// Boxed so the address handed to the callback stays fixed
    pub reporter: Box<DebugReporter>,
}

impl VulkanInstance {
    pub fn validation_enabled(&self) -> bool {
        self.debug_messenger.is_some()
    }

    pub fn debug_reporter(&self) -> Option<&DebugReporter> {
        self.debug_messenger.as_ref().map(|debug| debug.reporter.as_ref())
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            // The reporter is freed only after its messenger is gone
            if let Some(debug) = self.debug_messenger.take() {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// One native queue family with the single queue created on it
pub(crate) struct QueueFamily {
    pub index: u32,
    pub operations: QueueOperations,
    /// Submissions to a `vk::Queue` must be externally synchronized
    pub queue: Mutex<vk::Queue>,
}

/// Device-level objects shared by every resource
pub(crate) struct GpuContext {
    pub instance: Arc<VulkanInstance>,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    /// Dropped explicitly before the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,
    pub swapchain_loader: ash::khr::swapchain::Device,
    /// Present when validation is enabled
    pub debug_utils: Option<ash::ext::debug_utils::Device>,
    pub queue_families: Vec<QueueFamily>,
    /// Layout of the bindless set, shared by every resource table and pipeline layout
    pub resource_table_layout: vk::DescriptorSetLayout,
    /// Device-wide completion counter
    signal_counter: AtomicU64,
}

impl GpuContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: Arc<VulkanInstance>,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        allocator: Allocator,
        debug_utils: Option<ash::ext::debug_utils::Device>,
        queue_families: Vec<QueueFamily>,
        resource_table_layout: vk::DescriptorSetLayout,
    ) -> Self {
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance.instance, &device);
        Self {
            instance,
            physical_device,
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            swapchain_loader,
            debug_utils,
            queue_families,
            resource_table_layout,
            signal_counter: AtomicU64::new(0),
        }
    }

    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        lock(&self.allocator)
    }

    /// Family indices a resource must be shared with. Resources move between
    /// queues without ownership transfers, so they are concurrent across families.
    pub fn sharing_family_indices(&self) -> Vec<u32> {
        self.queue_families.iter().map(|family| family.index).collect()
    }

    pub fn queue_family(&self, index: u32) -> Option<&QueueFamily> {
        self.queue_families.iter().find(|family| family.index == index)
    }

    /// Next value of the completion counter; callers hold the queue lock
    /// until the value is submitted so each timeline only moves forward
    pub fn next_signal_value(&self) -> u64 {
        self.signal_counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Attach `name` to `handle` for validation messages and captures
    pub fn set_object_name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        unsafe {
            let _ = debug_utils.set_debug_utils_object_name(&info);
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device
                .destroy_descriptor_set_layout(self.resource_table_layout, None);
            // The allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
    }
}

/// Timeline semaphore of one queue, signaled with device-wide counter values
pub(crate) struct VulkanTimeline {
    pub ctx: Arc<GpuContext>,
    pub semaphore: vk::Semaphore,
    /// Highest value submitted for signaling
    last_submitted: AtomicU64,
}

impl VulkanTimeline {
    pub fn new(ctx: Arc<GpuContext>, name: &str) -> ridge_rhi::ridge::Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let semaphore = unsafe { ctx.device.create_semaphore(&create_info, None) }
            .map_err(|e| vk_error(format_args!("create timeline semaphore of queue '{}'", name), e))?;
        ctx.set_object_name(semaphore, name);
        Ok(Self {
            ctx,
            semaphore,
            last_submitted: AtomicU64::new(0),
        })
    }

    pub fn record_submitted(&self, value: u64) {
        self.last_submitted.fetch_max(value, Ordering::AcqRel);
    }

    pub fn completed_value(&self) -> ridge_rhi::ridge::Result<u64> {
        unsafe { self.ctx.device.get_semaphore_counter_value(self.semaphore) }
            .map_err(|e| vk_error("query timeline semaphore", e))
    }

    /// Block until the timeline reaches `value`
    pub fn wait(&self, value: u64) -> ridge_rhi::ridge::Result<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.ctx.device.wait_semaphores(&wait_info, u64::MAX) }
            .map_err(|e| vk_error(format_args!("wait for completion value {}", value), e))
    }
}

impl Drop for VulkanTimeline {
    fn drop(&mut self) {
        unsafe {
            let _ = self.wait(self.last_submitted.load(Ordering::Acquire));
            self.ctx.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
