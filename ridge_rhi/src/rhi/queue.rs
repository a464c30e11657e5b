/// Queue trait, queue descriptor and queue family selection

use bitflags::bitflags;
use crate::error::Result;
use crate::rhi::command_buffer::{CommandBuffer, CommandBufferDesc, CommandBufferState};
use crate::rhi::rendering_resource::{validate_name, RenderingResource};
use crate::ridge_ensure;

bitflags! {
    /// Kinds of work a queue accepts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueOperations: u32 {
        const GRAPHICS = 0x1;
        const COMPUTE = 0x2;
        const TRANSFER = 0x4;
    }
}

/// Hint for picking the native queue family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueuePriority {
    /// Prefer a family nobody else uses (currently resolved like `LeastUsed`)
    Dedicated,
    #[default]
    LeastUsed,
}

/// Descriptor for creating a queue
#[derive(Debug, Clone)]
pub struct QueueDesc<'a> {
    pub name: &'a str,
    pub operations: QueueOperations,
    pub priority: QueuePriority,
}

impl QueueDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        validate_name("Queue", self.name)?;
        ridge_ensure!(
            !self.operations.is_empty(),
            "ridge::rhi::Queue",
            InvalidValue,
            "Queue '{}' must request at least one operation",
            self.name
        );
        Ok(())
    }
}

/// Native queue family as seen by the selection logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyCandidate {
    pub index: u32,
    pub operations: QueueOperations,
    /// Queues already created on this family
    pub use_count: u32,
}

/// Index of the least used family supporting all `requested` operations
/// (ties go to the lowest index)
pub fn select_queue_family(
    families: &[QueueFamilyCandidate],
    requested: QueueOperations,
    priority: QueuePriority,
) -> Option<u32> {
    match priority {
        QueuePriority::Dedicated | QueuePriority::LeastUsed => families
            .iter()
            .filter(|family| family.operations.contains(requested))
            .min_by_key(|family| (family.use_count, family.index))
            .map(|family| family.index),
    }
}

/// Queue trait
///
/// Execution order between command buffers is only guaranteed through
/// `wait_list`; everything else runs in issue order at best.
pub trait Queue: RenderingResource {
    fn operations(&self) -> QueueOperations;

    fn create_command_buffer(&self, desc: &CommandBufferDesc) -> Result<Box<dyn CommandBuffer>>;

    /// Submit an ended command buffer; it starts only after every buffer of
    /// `wait_list` has completed
    fn submit_command_buffer(
        &self,
        command_buffer: &mut dyn CommandBuffer,
        wait_list: &[&dyn CommandBuffer],
    ) -> Result<()>;

    /// Block until `command_buffer` completes and release what it queued for
    /// destruction. Returns immediately for a never submitted buffer.
    fn wait_for_command_buffer(&self, command_buffer: &mut dyn CommandBuffer) -> Result<()>;
}

/// Checks shared by every `submit_command_buffer`; returns the highest
/// completion value found in `wait_list`
pub fn validate_submission(command_buffer: &dyn CommandBuffer, wait_list: &[&dyn CommandBuffer]) -> Result<u64> {
    ridge_ensure!(
        command_buffer.state() == CommandBufferState::Executable,
        "ridge::rhi::Queue",
        InvalidOperation,
        "Command buffer '{}' must be ended before submission (state: {:?})",
        command_buffer.name(),
        command_buffer.state()
    );

    let mut wait_value = 0;
    for waited in wait_list {
        ridge_ensure!(
            waited.graphics_api() == command_buffer.graphics_api(),
            "ridge::rhi::Queue",
            UnexpectedType,
            "Command buffer '{}' cannot wait on '{}' from another backend",
            command_buffer.name(),
            waited.name()
        );
        ridge_ensure!(
            waited.completion_signal_value() > 0,
            "ridge::rhi::Queue",
            InvalidOperation,
            "Command buffer '{}' cannot wait on '{}', which was never submitted",
            command_buffer.name(),
            waited.name()
        );
        wait_value = wait_value.max(waited.completion_signal_value());
    }
    Ok(wait_value)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
