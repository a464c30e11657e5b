/// Queue - Metal implementation of the Queue trait
///
/// A queue is a native command queue plus its completion event. Each commit
/// signals the next device-wide counter value on that event; waits in the
/// wait list become event waits encoded ahead of the commit.

use ridge_rhi::ridge::rhi::{
    downcast_command_buffer_mut, downcast_resource, validate_submission, CommandBuffer, CommandBufferDesc,
    GraphicsApi, Queue, QueueOperations, RenderingResource,
};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_debug, ridge_err};
use std::sync::Arc;

use crate::metal_command_buffer::MetalCommandBuffer;
use crate::metal_context::{MetalContext, MetalTimeline};
use crate::metal_layout::SOURCE;

/// Metal queue implementation
pub struct MetalQueue {
    name: String,
    operations: QueueOperations,
    timeline: Arc<MetalTimeline>,
}

impl MetalQueue {
    pub(crate) fn new(ctx: Arc<MetalContext>, name: &str, operations: QueueOperations) -> Result<Self> {
        let timeline = MetalTimeline::new(ctx, name)?;
        ridge_debug!(SOURCE, "Queue '{}' created with {:?}", name, operations);
        Ok(Self {
            name: name.to_string(),
            operations,
            timeline,
        })
    }

    pub(crate) fn timeline(&self) -> &Arc<MetalTimeline> {
        &self.timeline
    }
}

crate::metal_resource!(MetalQueue);

impl Queue for MetalQueue {
    fn operations(&self) -> QueueOperations {
        self.operations
    }

    fn create_command_buffer(&self, desc: &CommandBufferDesc) -> Result<Box<dyn CommandBuffer>> {
        desc.validate()?;
        Ok(Box::new(MetalCommandBuffer::new(Arc::clone(&self.timeline), desc.name)))
    }

    fn submit_command_buffer(&self, command_buffer: &mut dyn CommandBuffer, wait_list: &[&dyn CommandBuffer]) -> Result<()> {
        validate_submission(command_buffer, wait_list)?;
        let mut waits = Vec::with_capacity(wait_list.len());
        for waited in wait_list {
            let waited = downcast_resource::<MetalCommandBuffer, _>(*waited, GraphicsApi::Metal)?;
            waits.push(waited.completion_point());
        }
        let waits: Vec<(&MetalTimeline, u64)> = waits
            .iter()
            .map(|(timeline, value)| (timeline.as_ref(), *value))
            .collect();

        let metal_buffer = downcast_command_buffer_mut::<MetalCommandBuffer>(command_buffer, GraphicsApi::Metal)?;
        if !Arc::ptr_eq(metal_buffer.timeline(), &self.timeline) {
            return Err(ridge_err!(
                SOURCE,
                InvalidOperation,
                "Command buffer '{}' was not created by queue '{}'",
                metal_buffer.name(),
                self.name
            ));
        }
        let native = metal_buffer.recorded_native(&self.name)?;
        let signal_value = self.timeline.commit(&native, &waits)?;
        metal_buffer.mark_submitted(signal_value)
    }

    fn wait_for_command_buffer(&self, command_buffer: &mut dyn CommandBuffer) -> Result<()> {
        let metal_buffer = downcast_command_buffer_mut::<MetalCommandBuffer>(command_buffer, GraphicsApi::Metal)?;
        metal_buffer.wait_completed()
    }
}
