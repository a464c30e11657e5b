/// Shared Metal state
///
/// `MetalContext` belongs to a device and is shared by every resource it
/// creates. Each queue owns a `MetalTimeline`: a command queue plus a shared
/// event signaled with device-wide counter values, the Metal counterpart of a
/// timeline semaphore.

use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_foundation::{NSError, NSString};
use objc2_metal::{MTLCommandBuffer, MTLCommandBufferStatus, MTLCommandQueue, MTLDevice, MTLEvent, MTLSharedEvent};
use ridge_rhi::ridge::{Error, Result};
use ridge_rhi::{ridge_err, ridge_error};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::metal::MetalInstance;
use crate::metal_format::FormatCapabilities;
use crate::metal_handle::MetalHandle;
use crate::metal_layout::SOURCE;

pub(crate) type NativeDevice = ProtocolObject<dyn MTLDevice>;
pub(crate) type NativeCommandBuffer = ProtocolObject<dyn MTLCommandBuffer>;

/// Log a failed Metal call and turn its `NSError` into an [`Error`]
pub(crate) fn ns_error(action: impl Display, error: &NSError) -> Error {
    let description = error.localizedDescription().to_string();
    ridge_error!(SOURCE, "Failed to {}: {}", action, description);
    Error::BackendError(format!("Failed to {}: {}", action, description))
}

/// Metal returned nil where an object was expected
pub(crate) fn nil_error(action: impl Display) -> Error {
    ridge_error!(SOURCE, "Failed to {}: Metal returned nil", action);
    Error::BackendError(format!("Failed to {}: Metal returned nil", action))
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Label shown in Xcode captures and validation messages
pub(crate) fn label(name: &str) -> Retained<NSString> {
    NSString::from_str(name)
}

/// Device-level state shared by every resource
pub(crate) struct MetalContext {
    pub instance: Arc<MetalInstance>,
    pub device: MetalHandle<NativeDevice>,
    pub capabilities: FormatCapabilities,
    /// CPU and GPU share memory, so CPU images can use shared storage
    pub unified_memory: bool,
    /// Device-wide completion counter
    signal_counter: AtomicU64,
    /// Timelines alive on this device, for `wait_idle`
    timelines: Mutex<Vec<Weak<MetalTimeline>>>,
}

impl MetalContext {
    pub fn new(
        instance: Arc<MetalInstance>,
        device: Retained<NativeDevice>,
        capabilities: FormatCapabilities,
        unified_memory: bool,
    ) -> Self {
        Self {
            instance,
            device: MetalHandle::new(device),
            capabilities,
            unified_memory,
            signal_counter: AtomicU64::new(0),
            timelines: Mutex::new(Vec::new()),
        }
    }

    /// Next value of the completion counter; callers hold the submit lock of
    /// their queue until the value is committed so each event only moves forward
    pub fn next_signal_value(&self) -> u64 {
        self.signal_counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn register_timeline(&self, timeline: &Arc<MetalTimeline>) {
        let mut timelines = lock(&self.timelines);
        timelines.retain(|weak| weak.strong_count() > 0);
        timelines.push(Arc::downgrade(timeline));
    }

    /// Wait for the last commit of every live queue
    pub fn wait_idle(&self) -> Result<()> {
        let timelines: Vec<Arc<MetalTimeline>> = lock(&self.timelines).iter().filter_map(Weak::upgrade).collect();
        for timeline in timelines {
            timeline.wait_idle()?;
        }
        Ok(())
    }
}

/// Check the status of a finished native command buffer
pub(crate) fn completion_result(ctx: &MetalContext, name: &str, native: &NativeCommandBuffer) -> Result<()> {
    let status = unsafe { native.status() };
    if status == MTLCommandBufferStatus::Error {
        ctx.instance.record_failure();
        return Err(match unsafe { native.error() } {
            Some(error) => ns_error(format_args!("execute command buffer '{}'", name), &error),
            None => ridge_err!(SOURCE, BackendError, "Command buffer '{}' failed without an error", name),
        });
    }
    Ok(())
}

/// Command queue and completion event of one queue
pub(crate) struct MetalTimeline {
    pub ctx: Arc<MetalContext>,
    pub name: String,
    pub queue: MetalHandle<ProtocolObject<dyn MTLCommandQueue>>,
    pub event: MetalHandle<ProtocolObject<dyn MTLSharedEvent>>,
    /// Serializes counter allocation and commit
    submit_lock: Mutex<()>,
    /// Command buffers on a queue complete in commit order, so waiting on
    /// the newest one waits for the whole queue
    last_committed: Mutex<Option<MetalHandle<NativeCommandBuffer>>>,
}

impl MetalTimeline {
    pub fn new(ctx: Arc<MetalContext>, name: &str) -> Result<Arc<Self>> {
        let queue = unsafe { ctx.device.newCommandQueue() }
            .ok_or_else(|| nil_error(format_args!("create command queue '{}'", name)))?;
        unsafe { queue.setLabel(Some(&label(name))) };
        let event = unsafe { ctx.device.newSharedEvent() }
            .ok_or_else(|| nil_error(format_args!("create completion event of queue '{}'", name)))?;

        let timeline = Arc::new(Self {
            ctx: Arc::clone(&ctx),
            name: name.to_string(),
            queue: MetalHandle::new(queue),
            event: MetalHandle::new(event),
            submit_lock: Mutex::new(()),
            last_committed: Mutex::new(None),
        });
        ctx.register_timeline(&timeline);
        Ok(timeline)
    }

    pub fn completed_value(&self) -> u64 {
        unsafe { self.event.signaledValue() }
    }

    fn event(&self) -> &ProtocolObject<dyn MTLEvent> {
        ProtocolObject::from_ref(&*self.event)
    }

    /// A fresh native command buffer on this queue
    pub fn new_command_buffer(&self, name: &str) -> Result<Retained<NativeCommandBuffer>> {
        let native = unsafe { self.queue.commandBuffer() }
            .ok_or_else(|| nil_error(format_args!("create native command buffer '{}'", name)))?;
        unsafe { native.setLabel(Some(&label(name))) };
        Ok(native)
    }

    /// Commit `native` after the GPU reached every `(timeline, value)` of
    /// `waits`, and return the value its completion signals
    pub fn commit(&self, native: &NativeCommandBuffer, waits: &[(&MetalTimeline, u64)]) -> Result<u64> {
        let _guard = lock(&self.submit_lock);
        if !waits.is_empty() {
            // Waits must precede every recorded encoder, so they get their own
            // command buffer committed first on the same queue
            let waiting = self.new_command_buffer(&format!("{} (wait)", self.name))?;
            for (timeline, value) in waits {
                unsafe { waiting.encodeWaitForEvent_value(timeline.event(), *value) };
            }
            unsafe { waiting.commit() };
        }

        let signal_value = self.ctx.next_signal_value();
        unsafe {
            native.encodeSignalEvent_value(self.event(), signal_value);
            native.commit();
        }
        let retained = unsafe { Retained::retain(native as *const _ as *mut NativeCommandBuffer) };
        if let Some(retained) = retained {
            *lock(&self.last_committed) = Some(MetalHandle::new(retained));
        }
        Ok(signal_value)
    }

    /// Block until everything committed so far has completed
    pub fn wait_idle(&self) -> Result<()> {
        let last = lock(&self.last_committed).clone();
        if let Some(native) = last {
            unsafe { native.waitUntilCompleted() };
        }
        Ok(())
    }
}

impl Drop for MetalTimeline {
    fn drop(&mut self) {
        let _ = self.wait_idle();
    }
}
