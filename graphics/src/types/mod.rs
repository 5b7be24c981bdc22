//! Common types, handles and GPU data layouts.

mod buffer;
mod gpu;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, DrawIndexedIndirectArgs};
pub use gpu::{
    CullPushConstants, DepthReducePushConstants, FramePushConstants, GpuPortalSurface,
    GpuSurfaceBatch, GpuSurfaceCommand,
};
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};

/// Opaque handle to a backend buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(u32);

impl BufferHandle {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

/// Opaque handle to a backend texture.
///
/// Material textures are referenced bindlessly through these handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}
