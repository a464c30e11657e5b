/// Image upload queue shared between asset worker threads and the render thread
///
/// Workers push decoded pixel data through an [`UploadSender`]. The render
/// thread calls [`UploadQueue::drain`] once per frame; it creates the images
/// and records the staging copies, so every device call stays on that thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use crate::error::Result;
use crate::rhi::{
    max_level_count, BufferCommandUsage, BufferDesc, BufferImageCopy, BufferMemoryLocation, BufferUsage,
    CommandBuffer, Device, Image, ImageCommandUsage, ImageDesc, ImageFormat, ImageUsage,
};
use crate::{ridge_debug, ridge_ensure};

const SOURCE: &str = "ridge::rhi::UploadQueue";

/// Decoded 2D image waiting for upload
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUploadRequest {
    pub name: String,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Raw bytes of each mip level, level 0 first
    pub levels: Vec<Vec<u8>>,
    /// Build the full mip chain from level 0 (extra levels are ignored)
    pub generate_mip_maps: bool,
}

/// Identifies a request once its image comes out of [`UploadQueue::drain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadTicket(u64);

#[derive(Default)]
struct UploadShared {
    pending: Mutex<Vec<(UploadTicket, ImageUploadRequest)>>,
    next_ticket: AtomicU64,
}

impl UploadShared {
    fn pending(&self) -> MutexGuard<'_, Vec<(UploadTicket, ImageUploadRequest)>> {
        // Pushes and takes are single Vec operations, a poisoned lock still holds a valid list
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable producer handle, safe to move to worker threads
#[derive(Clone)]
pub struct UploadSender {
    shared: Arc<UploadShared>,
}

impl UploadSender {
    pub fn send(&self, request: ImageUploadRequest) -> UploadTicket {
        let ticket = UploadTicket(self.shared.next_ticket.fetch_add(1, Ordering::Relaxed));
        self.shared.pending().push((ticket, request));
        ticket
    }
}

/// Consumer side, owned by the render thread
#[derive(Default)]
pub struct UploadQueue {
    shared: Arc<UploadShared>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> UploadSender {
        UploadSender {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending().len()
    }

    /// Create an image for every pending request and record its upload into
    /// `command_buffer`. Images end up in `GraphicsRead` usage.
    ///
    /// On error the failing request is dropped and every other request of
    /// this drain goes back to the queue, ahead of the ones sent meanwhile.
    /// Images already created for them are handed to `command_buffer` for
    /// deferred destruction and get uploaded again by the next drain.
    pub fn drain(
        &self,
        device: &dyn Device,
        command_buffer: &mut dyn CommandBuffer,
    ) -> Result<Vec<(UploadTicket, Box<dyn Image>)>> {
        let requests = std::mem::take(&mut *self.shared.pending());
        let mut uploaded = Vec::with_capacity(requests.len());

        let mut requests = requests.into_iter();
        while let Some((ticket, request)) = requests.next() {
            match upload_image(device, command_buffer, &request) {
                Ok(image) => uploaded.push((ticket, request, image)),
                Err(error) => {
                    let mut retried = Vec::with_capacity(uploaded.len() + requests.len());
                    for (ticket, request, image) in uploaded {
                        command_buffer.queue_image_for_destruction(image);
                        retried.push((ticket, request));
                    }
                    retried.extend(requests);

                    let mut pending = self.shared.pending();
                    let newer = std::mem::replace(&mut *pending, retried);
                    pending.extend(newer);
                    return Err(error);
                }
            }
        }
        let uploaded: Vec<_> = uploaded
            .into_iter()
            .map(|(ticket, _, image)| (ticket, image))
            .collect();

        if !uploaded.is_empty() {
            ridge_debug!(SOURCE, "Recorded {} image upload(s)", uploaded.len());
        }
        Ok(uploaded)
    }
}

fn upload_image(
    device: &dyn Device,
    command_buffer: &mut dyn CommandBuffer,
    request: &ImageUploadRequest,
) -> Result<Box<dyn Image>> {
    ridge_ensure!(
        !request.levels.is_empty(),
        SOURCE,
        InvalidValue,
        "Upload of image '{}' carries no pixel data",
        request.name
    );

    let (level_count, provided_levels) = if request.generate_mip_maps {
        (max_level_count(request.width, request.height, 1), 1)
    } else {
        (request.levels.len() as u32, request.levels.len())
    };
    for (level, data) in request.levels.iter().take(provided_levels).enumerate() {
        let expected = request.format.memory_size(
            (request.width >> level).max(1),
            (request.height >> level).max(1),
            1,
        );
        ridge_ensure!(
            data.len() as u64 == expected,
            SOURCE,
            UnexpectedSize,
            "Level {} of image '{}' has {} bytes, expected {}",
            level,
            request.name,
            data.len(),
            expected
        );
    }

    let generate_mip_maps = request.generate_mip_maps && level_count > 1;
    let mut usage = ImageUsage::SAMPLE | ImageUsage::DESTINATION_MEMORY;
    if generate_mip_maps {
        usage |= ImageUsage::SOURCE_MEMORY;
    }
    let image = device.create_image(&ImageDesc {
        name: &request.name,
        width: request.width,
        height: request.height,
        format: request.format,
        level_count,
        usage,
        ..Default::default()
    })?;

    match record_upload(device, command_buffer, image.as_ref(), &request.levels[..provided_levels], generate_mip_maps) {
        Ok(()) => Ok(image),
        Err(error) => {
            command_buffer.queue_image_for_destruction(image);
            Err(error)
        }
    }
}

fn record_upload(
    device: &dyn Device,
    command_buffer: &mut dyn CommandBuffer,
    image: &dyn Image,
    levels: &[Vec<u8>],
    generate_mip_maps: bool,
) -> Result<()> {
    command_buffer.synchronize_image_usage(image, ImageCommandUsage::None, ImageCommandUsage::MemoryWrite, 0, 0, 0, 0)?;

    for (level, data) in levels.iter().enumerate() {
        let staging = device.create_buffer(&BufferDesc {
            name: "Image upload staging buffer",
            memory_size: data.len() as u64,
            usage: BufferUsage::SOURCE_MEMORY,
            memory_location: BufferMemoryLocation::Cpu,
        })?;
        staging.copy_from_memory(data, 0)?;
        command_buffer.synchronize_buffer_usage(
            staging.as_ref(),
            BufferCommandUsage::None,
            BufferCommandUsage::MemoryRead,
            0,
            0,
        )?;
        let region = BufferImageCopy {
            level: level as u32,
            ..Default::default()
        };
        let copied = command_buffer.copy_buffer_to_image(staging.as_ref(), image, &region);
        command_buffer.queue_buffer_for_destruction(staging);
        copied?;
    }

    let uploaded_usage = if generate_mip_maps {
        command_buffer.generate_mip_maps_for_image(image)?;
        ImageCommandUsage::MemoryRead
    } else {
        ImageCommandUsage::MemoryWrite
    };
    command_buffer.synchronize_image_usage(image, uploaded_usage, ImageCommandUsage::GraphicsRead, 0, 0, 0, 0)
}

#[cfg(test)]
#[path = "upload_queue_tests.rs"]
mod tests;
