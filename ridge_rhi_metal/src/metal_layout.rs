//! Shader interface layout shared by every Metal pipeline
//!
//! Shaders translated for this backend read the resource table through one
//! argument buffer, push constants through a small inline buffer and vertices
//! through a fixed high buffer slot. The helpers here are pure so they run
//! on any host.

use bitflags::bitflags;
use ridge_rhi::ridge::rhi::{
    BufferCommandUsage, ImageCommandUsage, ResourceTableCapacities, ResourceTableCategory,
};
use ridge_rhi::ridge_warn;

pub(crate) const SOURCE: &str = "ridge::metal";

/// Buffer slot of the resource table argument buffer
pub const RESOURCE_TABLE_BUFFER_INDEX: u64 = 0;
/// Buffer slot of push constant bytes
pub const PUSH_CONSTANT_BUFFER_INDEX: u64 = 1;
/// Buffer slot of the vertex buffer, the last one Metal exposes
pub const VERTEX_BUFFER_INDEX: u64 = 30;

/// Slot counts of the argument buffer, matching the shader translation layout
pub const RESOURCE_TABLE_CAPACITIES: ResourceTableCapacities = ResourceTableCapacities {
    uniform_buffers: 8192,
    storage_buffers: 8192,
    sampled_images: 8192,
    storage_images: 8192,
    samplers: 1024,
};

/// First argument id of `category`; categories follow each other in table order
pub fn argument_base(category: ResourceTableCategory) -> u64 {
    let capacities = RESOURCE_TABLE_CAPACITIES;
    ResourceTableCategory::ALL
        .iter()
        .take_while(|other| **other != category)
        .map(|other| capacities.get(*other) as u64)
        .sum()
}

/// Argument id of slot `index` of `category`
pub fn argument_index(category: ResourceTableCategory, index: u32) -> u64 {
    argument_base(category) + index as u64
}

/// Total number of argument ids in a resource table
pub fn argument_count() -> u64 {
    let capacities = RESOURCE_TABLE_CAPACITIES;
    ResourceTableCategory::ALL
        .iter()
        .map(|category| capacities.get(*category) as u64)
        .sum()
}

bitflags! {
    /// Render stages a memory barrier inside a render encoder waits on or blocks
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
    }
}

impl RenderStages {
    /// Stages touching a buffer used as `usage`; empty outside render encoders
    pub fn for_buffer_usage(usage: BufferCommandUsage) -> Self {
        match usage {
            BufferCommandUsage::None
            | BufferCommandUsage::MemoryRead
            | BufferCommandUsage::MemoryWrite
            | BufferCommandUsage::ComputeRead
            | BufferCommandUsage::ComputeWrite => RenderStages::empty(),
            BufferCommandUsage::VertexRead | BufferCommandUsage::IndexRead => RenderStages::VERTEX,
            // Resource table reads happen in either stage
            BufferCommandUsage::GraphicsRead | BufferCommandUsage::GraphicsWrite => {
                RenderStages::VERTEX | RenderStages::FRAGMENT
            }
        }
    }

    /// Stages touching an image used as `usage`; empty outside render encoders
    pub fn for_image_usage(usage: ImageCommandUsage) -> Self {
        match usage {
            ImageCommandUsage::None
            | ImageCommandUsage::MemoryRead
            | ImageCommandUsage::MemoryWrite
            | ImageCommandUsage::ComputeRead
            | ImageCommandUsage::ComputeWrite => RenderStages::empty(),
            ImageCommandUsage::GraphicsRead | ImageCommandUsage::GraphicsWrite => {
                RenderStages::VERTEX | RenderStages::FRAGMENT
            }
            ImageCommandUsage::ColorRead
            | ImageCommandUsage::ColorWrite
            | ImageCommandUsage::DepthRead
            | ImageCommandUsage::DepthWrite
            | ImageCommandUsage::Present => RenderStages::FRAGMENT,
        }
    }
}

const SPIRV_MAGIC: u32 = 0x0723_0203;
const SPIRV_HEADER_WORDS: usize = 5;
const OP_EXECUTION_MODE: u32 = 16;
const EXECUTION_MODE_LOCAL_SIZE: u32 = 17;

/// Workgroup size declared by a compute module through `OpExecutionMode LocalSize`
///
/// Metal takes the threadgroup size at dispatch time, so it is read back from
/// the SPIR-V blob the metallib was translated from. Returns `None` when the
/// blob is not SPIR-V or declares no local size.
pub fn spirv_local_size(spirv: &[u8]) -> Option<[u32; 3]> {
    if spirv.len() % 4 != 0 || spirv.len() < SPIRV_HEADER_WORDS * 4 {
        return None;
    }
    let words: Vec<u32> = spirv
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if words[0] != SPIRV_MAGIC {
        return None;
    }

    let mut cursor = SPIRV_HEADER_WORDS;
    while cursor < words.len() {
        let word_count = (words[cursor] >> 16) as usize;
        let opcode = words[cursor] & 0xFFFF;
        if word_count == 0 || cursor + word_count > words.len() {
            return None;
        }
        // OpExecutionMode <entry point> LocalSize x y z
        if opcode == OP_EXECUTION_MODE && word_count == 6 && words[cursor + 2] == EXECUTION_MODE_LOCAL_SIZE {
            return Some([words[cursor + 3], words[cursor + 4], words[cursor + 5]]);
        }
        cursor += word_count;
    }
    None
}

/// Threadgroup size for a compute shader, falling back to a single thread
pub fn threadgroup_size(shader_name: &str, spirv: Option<&[u8]>) -> [u32; 3] {
    match spirv.and_then(spirv_local_size) {
        Some(size) if size.iter().all(|extent| *extent > 0) => size,
        _ => {
            ridge_warn!(
                SOURCE,
                "Compute shader '{}' declares no workgroup size, dispatching one thread per group",
                shader_name
            );
            [1, 1, 1]
        }
    }
}

/// Function a library is entered through: SPIRV-Cross names translated
/// entry points `main0`, hand written libraries usually use `main`,
/// otherwise the first function wins
pub fn entry_point_name<S: AsRef<str>>(function_names: &[S]) -> Option<&str> {
    ["main0", "main"]
        .into_iter()
        .find_map(|preferred| {
            function_names
                .iter()
                .map(AsRef::as_ref)
                .find(|name| *name == preferred)
        })
        .or_else(|| function_names.first().map(AsRef::as_ref))
}

#[cfg(test)]
#[path = "metal_layout_tests.rs"]
mod tests;
