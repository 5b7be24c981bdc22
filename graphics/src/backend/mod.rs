//! GPU backend abstraction layer.
//!
//! The material system never talks to a graphics API directly. Buffers,
//! textures, compute dispatches and indirect draws all go through the
//! [`GpuBackend`] trait; native backends wrap a real device while
//! [`dummy::DummyBackend`] keeps everything in host memory and runs the
//! compute kernels on the CPU.

#[cfg(feature = "dummy")]
pub mod dummy;
#[cfg(feature = "dummy")]
mod kernels;

use bitflags::bitflags;

use crate::error::GraphicsError;
use crate::graph::{CompiledGraph, RenderGraph};
use crate::material::{CullType, StateBits};
use crate::sync::Fence;
use crate::types::{BufferDescriptor, BufferHandle, TextureDescriptor, TextureHandle};

bitflags! {
    /// Memory made visible by a barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BarrierScope: u32 {
        /// Storage buffer and image writes.
        const STORAGE = 1 << 0;
        /// Atomic counter updates.
        const ATOMIC_COUNTER = 1 << 1;
        /// Indirect command reads.
        const COMMAND = 1 << 2;
    }
}

/// Primitive topology of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    #[default]
    Triangles,
    /// Wireframe overlay.
    Lines,
}

/// Fixed-function state applied before a material's draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PipelineState {
    pub state_bits: StateBits,
    pub cull_type: CullType,
    pub polygon_offset: bool,
    pub topology: Topology,
}

/// A count-indirect multi-draw: up to `max_draw_count` commands read from
/// `command_buffer`, actual count read from `count_buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndirectCountDraw {
    pub command_buffer: BufferHandle,
    /// Byte offset of the first command.
    pub command_offset: u64,
    pub count_buffer: BufferHandle,
    /// Byte offset of the `u32` draw count.
    pub count_offset: u64,
    pub max_draw_count: u32,
    /// Byte stride between commands.
    pub stride: u32,
}

/// Operations the material system needs from a GPU device.
///
/// All methods are called from the single control thread.
pub trait GpuBackend {
    fn name(&self) -> &'static str;

    /// Create a zero-initialized buffer.
    fn create_buffer(&mut self, descriptor: &BufferDescriptor)
    -> Result<BufferHandle, GraphicsError>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, GraphicsError>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Upload `data` at byte `offset`.
    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError>;

    /// Map a byte range for CPU writes. The range is flushed by [`unmap_buffer`].
    ///
    /// [`unmap_buffer`]: GpuBackend::unmap_buffer
    fn map_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<&mut [u8], GraphicsError>;

    fn unmap_buffer(&mut self, buffer: BufferHandle);

    /// Read back a byte range. Used for persistently mapped read-back buffers.
    fn read_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError>;

    /// Bind a buffer to a slot of the graphics pipeline.
    fn bind_buffer(&mut self, slot: u32, buffer: BufferHandle);

    /// Record the passes of `graph` in compiled order, with a barrier on
    /// every dependency edge.
    fn execute_graph(
        &mut self,
        graph: &RenderGraph,
        compiled: &CompiledGraph,
    ) -> Result<(), GraphicsError>;

    fn memory_barrier(&mut self, scope: BarrierScope);

    /// Submit the work recorded so far. The fence signals on completion.
    fn submit(&mut self) -> Fence;

    fn set_pipeline_state(&mut self, state: &PipelineState);

    fn bind_geometry(&mut self, vertex_buffer: BufferHandle, index_buffer: BufferHandle);

    fn draw_indexed_indirect_count(&mut self, draw: &IndirectCountDraw)
    -> Result<(), GraphicsError>;

    /// Returns `false` when the resident texture budget is exhausted.
    fn make_texture_resident(&mut self, texture: TextureHandle) -> bool;

    fn make_texture_non_resident(&mut self, texture: TextureHandle);

    fn is_texture_resident(&self, texture: TextureHandle) -> bool;
}
