//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be used as an indirect buffer.
        const INDIRECT = 1 << 4;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 5;
        /// Buffer is mappable for CPU reads.
        const MAP_READ = 1 << 6;
        /// Buffer is mappable for CPU writes.
        const MAP_WRITE = 1 << 7;
        /// Buffer is the target of atomic operations.
        const ATOMIC_COUNTER = 1 << 8;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Descriptor sized for `count` elements of `T`.
    pub fn for_elements<T>(count: usize, usage: BufferUsage) -> Self {
        Self::new((count * std::mem::size_of::<T>()) as u64, usage)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Arguments for an indexed indirect draw call.
///
/// Matches the layout of `vkCmdDrawIndexedIndirect` / `wgpu::DrawIndexedIndirect`:
/// 20 bytes, 4-byte aligned. `first_instance` carries the uniform slot of the
/// draw, which shaders use to index the material buffer.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct DrawIndexedIndirectArgs {
    /// Number of indices to draw.
    pub index_count: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// Index of the first index to draw.
    pub first_index: u32,
    /// Value added to each index before reading from the vertex buffer.
    pub base_vertex: i32,
    /// Instance ID of the first instance to draw.
    pub first_instance: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<DrawIndexedIndirectArgs>(), 20);

impl DrawIndexedIndirectArgs {
    /// Size of the struct in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(index_count: u32, instance_count: u32) -> Self {
        Self {
            index_count,
            instance_count,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }

    pub fn with_first_index(mut self, first_index: u32) -> Self {
        self.first_index = first_index;
        self
    }

    pub fn with_first_instance(mut self, first_instance: u32) -> Self {
        self.first_instance = first_instance;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_for_elements() {
        let desc = BufferDescriptor::for_elements::<DrawIndexedIndirectArgs>(
            10,
            BufferUsage::INDIRECT | BufferUsage::STORAGE,
        )
        .with_label("culled commands");
        assert_eq!(desc.size, 200);
        assert_eq!(desc.label.as_deref(), Some("culled commands"));
    }

    #[test]
    fn test_indirect_args_layout() {
        let args = DrawIndexedIndirectArgs::new(36, 1)
            .with_first_index(12)
            .with_first_instance(5);
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&args));
        assert_eq!(words, &[36, 1, 12, 0, 5]);
    }
}
