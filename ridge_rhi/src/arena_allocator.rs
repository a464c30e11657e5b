/// Arena allocator: every registered mesh lives in one shared vertex buffer
/// and one shared index buffer
///
/// Meshes are appended through CPU staging buffers. When a buffer runs out of
/// space it is replaced by a larger one, the live bytes are copied over on the
/// GPU and the old buffer is queued for destruction on the command buffer.

use std::marker::PhantomData;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use crate::error::Result;
use crate::rhi::{
    Buffer, BufferCommandUsage, BufferDesc, BufferMemoryLocation, BufferUsage, CommandBuffer, Device, VertexInput,
};
use crate::{ridge_debug, ridge_err};

const SOURCE: &str = "ridge::rhi::ArenaAllocator";

const VERTEX_GROWTH_FACTOR: f64 = 1.8;
const INDEX_GROWTH_FACTOR: f64 = VERTEX_GROWTH_FACTOR * 3.6;

/// Default vertex layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    /// Pipeline vertex inputs matching this layout
    pub const INPUTS: &'static [VertexInput] = &[VertexInput::POSITION_3D, VertexInput::NORMAL, VertexInput::UV];
}

/// Where a registered mesh lives inside the arena buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArenaMesh {
    pub vertex_byte_offset: u64,
    pub vertex_count: u32,
    pub index_byte_offset: u64,
    pub index_count: u32,
}

/// One growing GPU buffer plus its write cursor
struct ArenaStream {
    name: &'static str,
    buffer: Box<dyn Buffer>,
    usage: BufferUsage,
    read_usage: BufferCommandUsage,
    growth_factor: f64,
    byte_offset: u64,
}

impl ArenaStream {
    fn new(
        device: &dyn Device,
        name: &'static str,
        capacity: u64,
        usage: BufferUsage,
        read_usage: BufferCommandUsage,
        growth_factor: f64,
    ) -> Result<Self> {
        let usage = usage | BufferUsage::SOURCE_MEMORY | BufferUsage::DESTINATION_MEMORY;
        let buffer = device.create_buffer(&BufferDesc {
            name,
            memory_size: capacity,
            usage,
            memory_location: BufferMemoryLocation::Gpu,
        })?;
        Ok(Self {
            name,
            buffer,
            usage,
            read_usage,
            growth_factor,
            byte_offset: 0,
        })
    }

    /// Append `bytes` and return the offset they were written at
    fn append(&mut self, device: &dyn Device, command_buffer: &mut dyn CommandBuffer, bytes: &[u8]) -> Result<u64> {
        let offset = self.byte_offset;
        if bytes.is_empty() {
            return Ok(offset);
        }

        let end = offset + bytes.len() as u64;
        if end > self.buffer.memory_size() {
            self.grow(device, command_buffer, bytes, end)?;
        } else {
            let staging = device.create_buffer(&BufferDesc {
                name: "Arena staging buffer",
                memory_size: bytes.len() as u64,
                usage: BufferUsage::SOURCE_MEMORY,
                memory_location: BufferMemoryLocation::Cpu,
            })?;
            staging.copy_from_memory(bytes, 0)?;

            command_buffer.synchronize_buffer_usage(
                staging.as_ref(),
                BufferCommandUsage::None,
                BufferCommandUsage::MemoryRead,
                0,
                0,
            )?;
            command_buffer.synchronize_buffer_usage(
                self.buffer.as_ref(),
                self.read_usage,
                BufferCommandUsage::MemoryWrite,
                offset,
                bytes.len() as u64,
            )?;
            command_buffer.copy_buffer_to_buffer(staging.as_ref(), self.buffer.as_ref(), 0, 0, offset)?;
            command_buffer.queue_buffer_for_destruction(staging);
            command_buffer.synchronize_buffer_usage(
                self.buffer.as_ref(),
                BufferCommandUsage::MemoryWrite,
                self.read_usage,
                offset,
                bytes.len() as u64,
            )?;
        }

        self.byte_offset = end;
        Ok(offset)
    }

    /// Replace the buffer by one holding at least `end` bytes, carrying the
    /// live bytes over and appending `bytes` at the current cursor
    fn grow(&mut self, device: &dyn Device, command_buffer: &mut dyn CommandBuffer, bytes: &[u8], end: u64) -> Result<()> {
        let old_size = self.buffer.memory_size();
        let new_size = end.max((old_size as f64 * self.growth_factor) as u64);
        ridge_debug!(
            SOURCE,
            "Growing '{}' from {} to {} bytes ({} live)",
            self.name,
            old_size,
            new_size,
            self.byte_offset
        );

        let staging = device.create_buffer(&BufferDesc {
            name: "Arena staging buffer",
            memory_size: end,
            usage: BufferUsage::SOURCE_MEMORY | BufferUsage::DESTINATION_MEMORY,
            memory_location: BufferMemoryLocation::Cpu,
        })?;
        staging.copy_from_memory(bytes, self.byte_offset)?;

        let mut staging_usage = BufferCommandUsage::None;
        if self.byte_offset > 0 {
            command_buffer.synchronize_buffer_usage(
                self.buffer.as_ref(),
                self.read_usage,
                BufferCommandUsage::MemoryRead,
                0,
                self.byte_offset,
            )?;
            command_buffer.synchronize_buffer_usage(
                staging.as_ref(),
                BufferCommandUsage::None,
                BufferCommandUsage::MemoryWrite,
                0,
                self.byte_offset,
            )?;
            command_buffer.copy_buffer_to_buffer(self.buffer.as_ref(), staging.as_ref(), self.byte_offset, 0, 0)?;
            staging_usage = BufferCommandUsage::MemoryWrite;
        }

        let replacement = device.create_buffer(&BufferDesc {
            name: self.name,
            memory_size: new_size,
            usage: self.usage,
            memory_location: BufferMemoryLocation::Gpu,
        })?;
        let old = std::mem::replace(&mut self.buffer, replacement);
        command_buffer.queue_buffer_for_destruction(old);

        command_buffer.synchronize_buffer_usage(staging.as_ref(), staging_usage, BufferCommandUsage::MemoryRead, 0, 0)?;
        command_buffer.synchronize_buffer_usage(
            self.buffer.as_ref(),
            BufferCommandUsage::None,
            BufferCommandUsage::MemoryWrite,
            0,
            end,
        )?;
        command_buffer.copy_buffer_to_buffer(staging.as_ref(), self.buffer.as_ref(), end, 0, 0)?;
        command_buffer.queue_buffer_for_destruction(staging);
        command_buffer.synchronize_buffer_usage(
            self.buffer.as_ref(),
            BufferCommandUsage::MemoryWrite,
            self.read_usage,
            0,
            end,
        )?;
        Ok(())
    }
}

/// Consolidates mesh geometry of vertex type `V` into two shared buffers
pub struct ArenaAllocator<V: Pod = Vertex> {
    vertices: ArenaStream,
    indices: ArenaStream,
    _vertex: PhantomData<V>,
}

impl<V: Pod> ArenaAllocator<V> {
    /// Create the arena with room for the given number of vertices and indices
    pub fn new(device: &dyn Device, initial_vertex_capacity: u64, initial_index_capacity: u64) -> Result<Self> {
        let vertices = ArenaStream::new(
            device,
            "Arena vertex buffer",
            initial_vertex_capacity * std::mem::size_of::<V>() as u64,
            BufferUsage::VERTEX,
            BufferCommandUsage::VertexRead,
            VERTEX_GROWTH_FACTOR,
        )?;
        let indices = ArenaStream::new(
            device,
            "Arena index buffer",
            initial_index_capacity * std::mem::size_of::<u32>() as u64,
            BufferUsage::INDEX,
            BufferCommandUsage::IndexRead,
            INDEX_GROWTH_FACTOR,
        )?;
        Ok(Self {
            vertices,
            indices,
            _vertex: PhantomData,
        })
    }

    /// Append a mesh. The copies are recorded into `command_buffer`, so the
    /// geometry is usable by commands recorded after this call.
    pub fn register_mesh(
        &mut self,
        device: &dyn Device,
        command_buffer: &mut dyn CommandBuffer,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<ArenaMesh> {
        let vertex_count = element_count(vertices.len(), "vertices")?;
        let index_count = element_count(indices.len(), "indices")?;
        let vertex_byte_offset = self
            .vertices
            .append(device, command_buffer, bytemuck::cast_slice(vertices))?;
        let index_byte_offset = self
            .indices
            .append(device, command_buffer, bytemuck::cast_slice(indices))?;
        Ok(ArenaMesh {
            vertex_byte_offset,
            vertex_count,
            index_byte_offset,
            index_count,
        })
    }

    pub fn vertex_buffer(&self) -> &dyn Buffer {
        self.vertices.buffer.as_ref()
    }

    pub fn index_buffer(&self) -> &dyn Buffer {
        self.indices.buffer.as_ref()
    }

    /// Bytes of vertex data registered so far
    pub fn vertex_byte_size(&self) -> u64 {
        self.vertices.byte_offset
    }

    /// Bytes of index data registered so far
    pub fn index_byte_size(&self) -> u64 {
        self.indices.byte_offset
    }
}

/// `len` as the `u32` count stored in an [`ArenaMesh`]
fn element_count(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| ridge_err!(SOURCE, ValueOutOfRange, "Mesh has {} {}, more than {} fit in an arena mesh", len, what, u32::MAX))
}

#[cfg(test)]
#[path = "arena_allocator_tests.rs"]
mod tests;
