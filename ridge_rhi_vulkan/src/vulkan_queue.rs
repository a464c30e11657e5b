/// Queue - Vulkan implementation of the Queue trait
///
/// Every queue owns a timeline semaphore. A submission signals the next value
/// of the device-wide counter on it and waits on the timeline of each command
/// buffer in its wait list.

use ash::vk;
use ridge_rhi::ridge::rhi::{
    downcast_command_buffer_mut, downcast_resource, validate_submission, CommandBuffer, CommandBufferDesc,
    GraphicsApi, Queue, QueueOperations, RenderingResource,
};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_debug, ridge_err};
use std::sync::Arc;

use crate::vulkan_command_buffer::VulkanCommandBuffer;
use crate::vulkan_context::{lock, vk_error, GpuContext, VulkanTimeline, SOURCE};

/// Vulkan queue implementation
pub struct VulkanQueue {
    name: String,
    family_index: u32,
    operations: QueueOperations,
    timeline: Arc<VulkanTimeline>,
}

impl VulkanQueue {
    pub(crate) fn new(ctx: Arc<GpuContext>, name: &str, family_index: u32, operations: QueueOperations) -> Result<Self> {
        ctx.queue_family(family_index).ok_or_else(|| {
            ridge_err!(SOURCE, BackendError, "Queue family {} of queue '{}' does not exist", family_index, name)
        })?;
        let timeline = Arc::new(VulkanTimeline::new(ctx, name)?);
        ridge_debug!(SOURCE, "Queue '{}' created on family {}", name, family_index);
        Ok(Self {
            name: name.to_string(),
            family_index,
            operations,
            timeline,
        })
    }

    pub(crate) fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Submit `command_buffer` with extra binary semaphores to wait on and signal.
    /// Used by presentation.
    pub(crate) fn submit(
        &self,
        command_buffer: Option<vk::CommandBuffer>,
        waits: &[(vk::Semaphore, u64, vk::PipelineStageFlags)],
        binary_signal: Option<vk::Semaphore>,
    ) -> Result<u64> {
        let ctx = &self.timeline.ctx;
        let family = ctx.queue_family(self.family_index).ok_or_else(|| {
            ridge_err!(SOURCE, BackendError, "Queue family {} disappeared", self.family_index)
        })?;

        // Counter values are taken under the queue lock so the timeline only moves forward
        let queue = lock(&family.queue);
        let signal_value = ctx.next_signal_value();

        let wait_semaphores: Vec<vk::Semaphore> = waits.iter().map(|wait| wait.0).collect();
        let wait_values: Vec<u64> = waits.iter().map(|wait| wait.1).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = waits.iter().map(|wait| wait.2).collect();
        let mut signal_semaphores = vec![self.timeline.semaphore];
        let mut signal_values = vec![signal_value];
        if let Some(semaphore) = binary_signal {
            signal_semaphores.push(semaphore);
            // Ignored for binary semaphores
            signal_values.push(0);
        }
        let command_buffers: Vec<vk::CommandBuffer> = command_buffer.into_iter().collect();

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);
        unsafe { ctx.device.queue_submit(*queue, &[submit_info], vk::Fence::null()) }
            .map_err(|e| vk_error(format_args!("submit to queue '{}'", self.name), e))?;
        self.timeline.record_submitted(signal_value);
        Ok(signal_value)
    }
}

crate::vulkan_resource!(VulkanQueue);

impl Queue for VulkanQueue {
    fn operations(&self) -> QueueOperations {
        self.operations
    }

    fn create_command_buffer(&self, desc: &CommandBufferDesc) -> Result<Box<dyn CommandBuffer>> {
        desc.validate()?;
        Ok(Box::new(VulkanCommandBuffer::new(
            Arc::clone(&self.timeline),
            self.family_index,
            desc.name,
        )?))
    }

    fn submit_command_buffer(&self, command_buffer: &mut dyn CommandBuffer, wait_list: &[&dyn CommandBuffer]) -> Result<()> {
        validate_submission(command_buffer, wait_list)?;
        let mut waits = Vec::with_capacity(wait_list.len());
        for waited in wait_list {
            let waited = downcast_resource::<VulkanCommandBuffer, _>(*waited, GraphicsApi::Vulkan)?;
            let (semaphore, value) = waited.completion_point();
            waits.push((semaphore, value, vk::PipelineStageFlags::ALL_COMMANDS));
        }

        let vulkan_buffer = downcast_command_buffer_mut::<VulkanCommandBuffer>(command_buffer, GraphicsApi::Vulkan)?;
        if !Arc::ptr_eq(vulkan_buffer.timeline(), &self.timeline) {
            return Err(ridge_err!(
                SOURCE,
                InvalidOperation,
                "Command buffer '{}' was not created by queue '{}'",
                vulkan_buffer.name(),
                self.name
            ));
        }
        let signal_value = self.submit(Some(vulkan_buffer.command_buffer), &waits, None)?;
        vulkan_buffer.mark_submitted(signal_value)
    }

    fn wait_for_command_buffer(&self, command_buffer: &mut dyn CommandBuffer) -> Result<()> {
        let vulkan_buffer = downcast_command_buffer_mut::<VulkanCommandBuffer>(command_buffer, GraphicsApi::Vulkan)?;
        vulkan_buffer.wait_completed()
    }
}
