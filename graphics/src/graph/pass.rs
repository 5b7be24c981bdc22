//! Compute pass description.

use crate::types::{BufferHandle, TextureHandle};

/// The fixed set of compute kernels the material system dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeKernel {
    /// Reset the atomic command counters of a frame.
    ClearCounters,
    /// Copy the depth buffer into level 0 of the depth pyramid.
    DepthCopy,
    /// Reduce one pyramid level into the next.
    DepthReduce,
    /// Frustum/occlusion test of surface descriptors and portals.
    CullSurfaces,
    /// Compact enabled surface commands into the culled command buffer.
    ProcessSurfaces,
}

impl ComputeKernel {
    /// Threads per workgroup along x.
    pub fn workgroup_size(self) -> [u32; 3] {
        match self {
            Self::ClearCounters => [crate::MAX_COMMAND_COUNTERS as u32, 1, 1],
            Self::DepthCopy | Self::DepthReduce => {
                [crate::DEPTH_REDUCE_WORKGROUP, crate::DEPTH_REDUCE_WORKGROUP, 1]
            }
            Self::CullSurfaces => [crate::CULL_WORKGROUP_SIZE, 1, 1],
            Self::ProcessSurfaces => [crate::SURFACE_COMMANDS_PER_BATCH as u32, 1, 1],
        }
    }
}

/// A resource bound to a kernel binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Buffer(BufferHandle),
    /// A single mip level of a texture.
    TextureLevel { texture: TextureHandle, level: u32 },
}

/// A single compute dispatch.
#[derive(Debug, Clone)]
pub struct ComputePass {
    name: String,
    kernel: ComputeKernel,
    workgroups: [u32; 3],
    bindings: Vec<(u32, Binding)>,
    /// Raw push-constant block, laid out by the kernel's uniform struct.
    push_constants: Vec<u8>,
}

impl ComputePass {
    pub fn new(name: String, kernel: ComputeKernel) -> Self {
        Self {
            name,
            kernel,
            workgroups: [1, 1, 1],
            bindings: Vec::new(),
            push_constants: Vec::new(),
        }
    }

    pub fn with_workgroups(mut self, x: u32, y: u32, z: u32) -> Self {
        self.workgroups = [x, y, z];
        self
    }

    pub fn with_buffer(mut self, slot: u32, buffer: BufferHandle) -> Self {
        self.bindings.push((slot, Binding::Buffer(buffer)));
        self
    }

    pub fn with_texture_level(mut self, slot: u32, texture: TextureHandle, level: u32) -> Self {
        self.bindings
            .push((slot, Binding::TextureLevel { texture, level }));
        self
    }

    pub fn with_push_constants<T: bytemuck::Pod>(mut self, value: &T) -> Self {
        self.push_constants = bytemuck::bytes_of(value).to_vec();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kernel(&self) -> ComputeKernel {
        self.kernel
    }

    pub fn workgroups(&self) -> [u32; 3] {
        self.workgroups
    }

    pub fn bindings(&self) -> &[(u32, Binding)] {
        &self.bindings
    }

    pub fn binding(&self, slot: u32) -> Option<Binding> {
        self.bindings
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, binding)| *binding)
    }

    pub fn push_constants(&self) -> &[u8] {
        &self.push_constants
    }

    /// Decode the push-constant block as `T`.
    pub fn read_push_constants<T: bytemuck::Pod>(&self) -> Option<T> {
        if self.push_constants.len() != std::mem::size_of::<T>() {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(&self.push_constants))
    }
}
